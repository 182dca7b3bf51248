// src/analysis/mod.rs
pub mod moments;
pub mod importance;
pub mod propagation;
pub mod convergence;
pub mod study;

// Re-export commonly used types
pub use moments::{RunningMoments, TrajectoryMoments};
pub use importance::{
    ImportanceSampler,
    ImportanceEstimate,
    ProposalKind,
    TailProblem,
    TailEstimator,
};
pub use propagation::{
    EmpiricalEnvelope,
    Execution,
    UncertaintyPropagator,
    percentile,
};
pub use convergence::{
    ConvergenceAnalyzer,
    ErrorPoint,
    ErrorTrajectory,
    LhsStrategy,
    ReplicateSet,
    ReplicateSummary,
    SamplingMethod,
    root_sum_squared_error,
};
pub use study::{run_study, MethodResult, StudyReport, TailResult};
