// src/file/export.rs

use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Result, Context};
use csv::Writer;

use super::pretty_config;
use crate::analysis::{MethodResult, StudyReport, TailResult};

/// Writes a study report as plain numeric CSV series plus a RON copy of the
/// whole report.
#[derive(Debug)]
pub struct StudyExporter {
    directory: PathBuf,
}

impl StudyExporter {
    pub fn new(directory: &Path) -> Self {
        Self {
            directory: directory.to_path_buf(),
        }
    }

    /// Returns the paths written, in order.
    pub fn export(&self, report: &StudyReport) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.directory)
            .with_context(|| format!("Failed to create export directory {}", self.directory.display()))?;

        let mut written = Vec::new();
        if let Some(tail) = &report.tail {
            written.push(self.write_tail(tail)?);
        }
        for result in report.method_results() {
            written.push(self.write_envelope(result)?);
            if result.convergence.is_some() {
                written.push(self.write_convergence(result)?);
            }
        }

        let report_path = self.directory.join("report.ron");
        let content = ron::ser::to_string_pretty(report, pretty_config())?;
        fs::write(&report_path, content)?;
        written.push(report_path);

        Ok(written)
    }

    fn write_tail(&self, tail: &TailResult) -> Result<PathBuf> {
        let path = self.directory.join("tail_convergence.csv");
        let mut writer = Writer::from_path(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        writer.write_record(["sample_count", "absolute_error"])?;
        for point in tail.convergence.points() {
            writer.write_record(&[point.sample_count.to_string(), point.error.to_string()])?;
        }
        writer.flush()?;
        Ok(path)
    }

    fn write_envelope(&self, result: &MethodResult) -> Result<PathBuf> {
        let path = self.directory.join(format!("envelope_{}.csv", result.method.label()));
        let mut writer = Writer::from_path(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        writer.write_record(["time", "mean", "variance", "lower", "upper", "true_mean", "true_variance"])?;

        let envelope = &result.envelope;
        for j in 0..envelope.times.len() {
            writer.write_record(&[
                envelope.times[j].to_string(),
                envelope.mean[j].to_string(),
                envelope.variance[j].to_string(),
                envelope.lower[j].to_string(),
                envelope.upper[j].to_string(),
                result.true_mean[j].to_string(),
                result.true_variance[j].to_string(),
            ])?;
        }
        writer.flush()?;
        Ok(path)
    }

    fn write_convergence(&self, result: &MethodResult) -> Result<PathBuf> {
        let path = self.directory.join(format!("convergence_{}.csv", result.method.label()));
        let mut writer = Writer::from_path(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        writer.write_record(["sample_count", "mean_error", "lower", "upper"])?;

        if let Some(summary) = &result.convergence {
            for j in 0..summary.sample_counts.len() {
                writer.write_record(&[
                    summary.sample_counts[j].to_string(),
                    summary.mean[j].to_string(),
                    summary.lower[j].to_string(),
                    summary.upper[j].to_string(),
                ])?;
            }
        }
        writer.flush()?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::run_study;
    use crate::config::{ConvergenceSettings, StudyConfig};

    #[test]
    fn test_export_writes_all_series() {
        let mut config = StudyConfig::default();
        config.seed = Some(5);
        config.tail.budget = 100;
        config.model.time_points = 6;
        config.propagation.samples = 20;
        config.convergence = Some(ConvergenceSettings { max_samples: 10, replicates: 2, ..ConvergenceSettings::default() });
        let report = run_study(&config).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let written = StudyExporter::new(dir.path()).export(&report).unwrap();
        let names: Vec<String> = written
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "tail_convergence.csv",
                "envelope_monte_carlo.csv",
                "convergence_monte_carlo.csv",
                "envelope_lhs_prefix.csv",
                "convergence_lhs_prefix.csv",
                "report.ron",
            ]
        );

        let envelope = fs::read_to_string(dir.path().join("envelope_monte_carlo.csv")).unwrap();
        // header plus one row per time point
        assert_eq!(envelope.lines().count(), 7);
        assert!(envelope.starts_with("time,mean,variance,lower,upper,true_mean,true_variance"));

        let convergence = fs::read_to_string(dir.path().join("convergence_lhs_prefix.csv")).unwrap();
        assert_eq!(convergence.lines().count(), 11);
    }
}
