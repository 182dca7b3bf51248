// src/lib.rs
//! Sampling-based uncertainty quantification: importance sampling of rare
//! Gaussian tails, Monte Carlo and Latin hypercube propagation through an
//! ODE response model, and convergence studies against closed-form moments.

pub mod error;
pub mod sampling;
pub mod analysis;
pub mod model;
pub mod config;
pub mod file;

// Re-export commonly used types
pub use error::{Result, UqError};
pub use sampling::{DesignKind, DesignMatrix, RandomVariateSource};
pub use analysis::{
    run_study,
    ConvergenceAnalyzer,
    EmpiricalEnvelope,
    Execution,
    ImportanceSampler,
    SamplingMethod,
    StudyReport,
    TailProblem,
    UncertaintyPropagator,
};
pub use model::{DecayModel, ResponseModel, TimeGrid, Trajectory};
pub use config::StudyConfig;
