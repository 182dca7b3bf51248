// src/error.rs
use thiserror::Error;

pub type Result<T> = std::result::Result<T, UqError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum UqError {
    #[error("sample count must be at least 1, got {0}")]
    InvalidSampleCount(usize),

    #[error("dimension must be at least 1, got {0}")]
    InvalidDimension(usize),

    #[error("replicate count must be at least 1, got {0}")]
    InvalidReplicateCount(usize),

    #[error("design has {design} columns but the model expects {model} inputs")]
    DimensionMismatch { design: usize, model: usize },

    #[error("malformed time grid: {0}")]
    MalformedTimeGrid(String),

    #[error("invalid percentile pair ({lower}, {upper}): need 0 <= lower < upper <= 100")]
    InvalidPercentiles { lower: f64, upper: f64 },

    #[error("expected {expected} values, one per time grid point, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("input coordinate {index} = {value} lies outside the unit interval")]
    OutOfDesignInput { index: usize, value: f64 },

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("IVP solver failed at t = {time}: {reason}")]
    Solver { time: f64, reason: String },

    #[error("evaluation of sample {index} failed: {source}")]
    SampleEvaluation {
        index: usize,
        #[source]
        source: Box<UqError>,
    },
}

impl UqError {
    pub fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        UqError::InvalidParameter { name, reason: reason.into() }
    }

    /// True for configuration mistakes that a caller should fix before rerunning.
    pub fn is_usage_error(&self) -> bool {
        !matches!(self, UqError::Solver { .. } | UqError::SampleEvaluation { .. })
    }
}

pub(crate) fn ensure_sample_count(n: usize) -> Result<()> {
    if n < 1 {
        return Err(UqError::InvalidSampleCount(n));
    }
    Ok(())
}

pub(crate) fn ensure_percentiles(lower: f64, upper: f64) -> Result<()> {
    let valid = lower.is_finite() && upper.is_finite() && 0.0 <= lower && lower < upper && upper <= 100.0;
    if !valid {
        return Err(UqError::InvalidPercentiles { lower, upper });
    }
    Ok(())
}
