// src/config/study.rs
use std::path::PathBuf;

use serde::{Serialize, Deserialize};

use crate::analysis::convergence::validate_counts;
use crate::analysis::{Execution, LhsStrategy, ProposalKind};
use crate::error::{ensure_percentiles, ensure_sample_count, Result, UqError};
use crate::model::{DecayParameters, TimeGrid};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StudyMethod {
    ImportanceSampling,
    MonteCarlo,
    LatinHypercube,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyConfig {
    pub name: String,
    pub seed: Option<u64>,
    pub methods: Vec<StudyMethod>,
    pub tail: TailSettings,
    pub model: ModelSettings,
    pub propagation: PropagationSettings,
    pub convergence: Option<ConvergenceSettings>,
    pub export: Option<ExportSettings>,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            name: "decay-study".to_string(),
            seed: None,
            methods: vec![
                StudyMethod::ImportanceSampling,
                StudyMethod::MonteCarlo,
                StudyMethod::LatinHypercube,
            ],
            tail: TailSettings::default(),
            model: ModelSettings::default(),
            propagation: PropagationSettings::default(),
            convergence: Some(ConvergenceSettings::default()),
            export: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TailSettings {
    pub threshold: f64,
    pub budget: usize,
    pub proposal: ProposalKind,
    /// Also run plain Monte Carlo with the same budget.
    pub compare_nominal: bool,
}

impl Default for TailSettings {
    fn default() -> Self {
        Self {
            threshold: 4.5,
            budget: 10_000,
            proposal: ProposalKind::ShiftedExponential,
            compare_nominal: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub horizon: f64,
    pub time_points: usize,
    pub parameters: DecayParameters,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            horizon: 10.0,
            time_points: 1000,
            parameters: DecayParameters::default(),
        }
    }
}

impl ModelSettings {
    pub fn time_grid(&self) -> Result<TimeGrid> {
        TimeGrid::uniform(self.horizon, self.time_points)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationSettings {
    pub samples: usize,
    pub lower_percentile: f64,
    pub upper_percentile: f64,
    pub execution: Execution,
}

impl Default for PropagationSettings {
    fn default() -> Self {
        Self {
            samples: 1000,
            lower_percentile: 2.75,
            upper_percentile: 97.5,
            execution: Execution::Sequential,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvergenceSettings {
    pub max_samples: usize,
    /// Explicit sample counts to test; empty means every n up to `max_samples`.
    pub schedule: Vec<usize>,
    pub replicates: usize,
    pub lhs_strategy: LhsStrategy,
    pub lower_percentile: f64,
    pub upper_percentile: f64,
}

impl Default for ConvergenceSettings {
    fn default() -> Self {
        Self {
            max_samples: 1000,
            schedule: Vec::new(),
            replicates: 20,
            lhs_strategy: LhsStrategy::Prefix,
            lower_percentile: 2.5,
            upper_percentile: 97.5,
        }
    }
}

impl ConvergenceSettings {
    pub fn sample_counts(&self) -> Vec<usize> {
        if self.schedule.is_empty() {
            (1..=self.max_samples).collect()
        } else {
            self.schedule.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSettings {
    pub directory: PathBuf,
}

impl StudyConfig {
    /// Rejects configurations that would fail part-way through a study.
    pub fn validate(&self) -> Result<()> {
        if let Some((i, method)) = self
            .methods
            .iter()
            .enumerate()
            .find(|&(i, method)| self.methods[..i].contains(method))
        {
            return Err(UqError::invalid_parameter(
                "methods",
                format!("{method:?} is listed twice (again at position {i})"),
            ));
        }
        if !self.tail.threshold.is_finite() {
            return Err(UqError::invalid_parameter("tail.threshold", "must be finite"));
        }
        ensure_sample_count(self.tail.budget)?;

        self.model.parameters.validate()?;
        self.model.time_grid()?;

        ensure_sample_count(self.propagation.samples)?;
        ensure_percentiles(self.propagation.lower_percentile, self.propagation.upper_percentile)?;

        if let Some(convergence) = &self.convergence {
            ensure_sample_count(convergence.max_samples)?;
            if convergence.replicates < 1 {
                return Err(UqError::InvalidReplicateCount(convergence.replicates));
            }
            if !convergence.schedule.is_empty() {
                validate_counts(&convergence.schedule)?;
            }
            ensure_percentiles(convergence.lower_percentile, convergence.upper_percentile)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(StudyConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let config: StudyConfig = ron::from_str("(seed: Some(3), propagation: (samples: 50))").unwrap();
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.propagation.samples, 50);
        assert_eq!(config.propagation.upper_percentile, 97.5);
        assert_eq!(config.tail.threshold, 4.5);
        assert_eq!(config.methods.len(), 3);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = StudyConfig::default();
        config.propagation.samples = 0;
        assert_eq!(config.validate(), Err(UqError::InvalidSampleCount(0)));

        let mut config = StudyConfig::default();
        config.model.time_points = 0;
        assert!(matches!(config.validate(), Err(UqError::MalformedTimeGrid(_))));

        let mut config = StudyConfig::default();
        if let Some(convergence) = config.convergence.as_mut() {
            convergence.replicates = 0;
        }
        assert_eq!(config.validate(), Err(UqError::InvalidReplicateCount(0)));
    }

    #[test]
    fn test_schedule_must_increase() {
        let mut config = StudyConfig::default();
        config.convergence = Some(ConvergenceSettings { schedule: vec![10, 5], ..ConvergenceSettings::default() });
        assert!(matches!(
            config.validate(),
            Err(UqError::InvalidParameter { name: "sample_counts", .. })
        ));

        config.convergence = Some(ConvergenceSettings { schedule: vec![0, 5], ..ConvergenceSettings::default() });
        assert_eq!(config.validate(), Err(UqError::InvalidSampleCount(0)));

        config.convergence = Some(ConvergenceSettings { schedule: vec![5, 50], ..ConvergenceSettings::default() });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_methods_rejected() {
        let mut config = StudyConfig::default();
        config.methods = vec![StudyMethod::MonteCarlo, StudyMethod::LatinHypercube, StudyMethod::MonteCarlo];
        assert!(matches!(
            config.validate(),
            Err(UqError::InvalidParameter { name: "methods", .. })
        ));
    }

    #[test]
    fn test_schedule_overrides_max_samples() {
        let settings = ConvergenceSettings { schedule: vec![10, 100], ..ConvergenceSettings::default() };
        assert_eq!(settings.sample_counts(), vec![10, 100]);
        let settings = ConvergenceSettings { max_samples: 3, ..ConvergenceSettings::default() };
        assert_eq!(settings.sample_counts(), vec![1, 2, 3]);
    }
}
