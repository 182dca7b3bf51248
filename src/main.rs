// src/main.rs
use std::path::Path;

use anyhow::Result;
use env_logger::Env;
use log::{info, warn};

use uq_estimators::config::StudyConfig;
use uq_estimators::file::{FileHandler, StudyExporter, StudyFileHandler};
use uq_estimators::run_study;

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("loading study from {}", path);
            StudyFileHandler::new().load(Path::new(&path))?
        }
        None => {
            warn!("no study file given, running the default study");
            StudyConfig::default()
        }
    };

    let report = run_study(&config)?;

    if let Some(tail) = &report.tail {
        println!(
            "P[X > {}]: estimate {:.6e} +/- {:.2e}, reference {:.6e}",
            tail.threshold,
            tail.estimate.mean,
            tail.estimate.standard_error(),
            tail.reference
        );
    }
    for result in report.method_results() {
        println!(
            "{:<12} n = {:<6} mean RSE {:.4e}  variance RSE {:.4e}",
            result.method.label(),
            result.envelope.sample_count,
            result.mean_error,
            result.variance_error
        );
    }

    if let Some(export) = &config.export {
        let written = StudyExporter::new(&export.directory).export(&report)?;
        info!("wrote {} files to {}", written.len(), export.directory.display());
    }

    Ok(())
}
