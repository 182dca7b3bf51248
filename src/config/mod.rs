// src/config/mod.rs
pub mod study;

// Re-export commonly used types
pub use study::{
    StudyConfig,
    StudyMethod,
    TailSettings,
    ModelSettings,
    PropagationSettings,
    ConvergenceSettings,
    ExportSettings,
};
