// src/file/study.rs
use super::{pretty_config, FileHandler};
use crate::config::StudyConfig;
use std::path::Path;
use std::fs;
use anyhow::{Result, Context};

#[derive(Debug, Default)]
pub struct StudyFileHandler;

impl StudyFileHandler {
    pub fn new() -> Self {
        Self
    }
}

impl FileHandler<StudyConfig> for StudyFileHandler {
    fn load(&self, path: &Path) -> Result<StudyConfig> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read study file {}", path.display()))?;
        let config: StudyConfig = ron::from_str(&content).context("Failed to parse study file")?;
        config.validate()
            .with_context(|| format!("Invalid study configuration in {}", path.display()))?;
        Ok(config)
    }

    fn save(&self, data: &StudyConfig, path: &Path) -> Result<()> {
        let content = ron::ser::to_string_pretty(data, pretty_config())?;
        fs::write(path, content)?;
        Ok(())
    }
}
