// src/model/mod.rs
use std::sync::Arc;

use serde::{Serialize, Deserialize};

use crate::error::{Result, UqError};

pub mod ivp;
pub mod decay;

// Re-export commonly used types
pub use ivp::{IvpSolver, DormandPrince};
pub use decay::{DecayModel, DecayParameters, DecayGroundTruth};

/// Output times of a response model: strictly increasing, starting at 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct TimeGrid {
    points: Arc<[f64]>,
}

impl TimeGrid {
    pub fn new(points: Vec<f64>) -> Result<Self> {
        ivp::validate_times(&points)?;
        if points[0] != 0.0 {
            return Err(UqError::MalformedTimeGrid(format!("first time must be 0, got {}", points[0])));
        }
        Ok(Self { points: points.into() })
    }

    /// `nt` equally spaced points covering `[0, horizon]`.
    pub fn uniform(horizon: f64, nt: usize) -> Result<Self> {
        if nt < 1 {
            return Err(UqError::MalformedTimeGrid("need at least one time point".to_string()));
        }
        if nt == 1 {
            return Self::new(vec![0.0]);
        }
        if !(horizon.is_finite() && horizon > 0.0) {
            return Err(UqError::MalformedTimeGrid(format!("horizon must be positive, got {horizon}")));
        }
        let step = horizon / (nt - 1) as f64;
        let mut points: Vec<f64> = (0..nt).map(|i| i as f64 * step).collect();
        points[nt - 1] = horizon;
        Self::new(points)
    }

    pub fn points(&self) -> &[f64] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn horizon(&self) -> f64 {
        self.points[self.points.len() - 1]
    }

    pub fn map<F: Fn(f64) -> f64>(&self, f: F) -> Vec<f64> {
        self.points.iter().map(|&t| f(t)).collect()
    }
}

impl TryFrom<Vec<f64>> for TimeGrid {
    type Error = UqError;

    fn try_from(points: Vec<f64>) -> Result<Self> {
        Self::new(points)
    }
}

impl From<TimeGrid> for Vec<f64> {
    fn from(grid: TimeGrid) -> Self {
        grid.points.to_vec()
    }
}

/// Model output for one input point, one value per grid time.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    grid: TimeGrid,
    values: Vec<f64>,
}

impl Trajectory {
    pub fn new(grid: TimeGrid, values: Vec<f64>) -> Result<Self> {
        if values.len() != grid.len() {
            return Err(UqError::LengthMismatch { expected: grid.len(), got: values.len() });
        }
        Ok(Self { grid, values })
    }

    pub fn times(&self) -> &[f64] {
        self.grid.points()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.times().iter().copied().zip(self.values.iter().copied())
    }
}

/// Deterministic map from a point in the unit hypercube to a trajectory.
pub trait ResponseModel {
    fn input_dimension(&self) -> usize;

    fn time_grid(&self) -> &TimeGrid;

    fn evaluate(&self, input: &[f64]) -> Result<Trajectory>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_grid() {
        let grid = TimeGrid::uniform(10.0, 5).unwrap();
        assert_eq!(grid.points(), &[0.0, 2.5, 5.0, 7.5, 10.0]);
        assert_eq!(grid.horizon(), 10.0);
        assert_eq!(TimeGrid::uniform(3.0, 1).unwrap().points(), &[0.0]);
    }

    #[test]
    fn test_grid_validation() {
        assert!(TimeGrid::new(vec![0.0, 1.0, 1.0]).is_err());
        assert!(TimeGrid::new(vec![0.5, 1.0]).is_err());
        assert!(TimeGrid::new(vec![]).is_err());
        assert!(TimeGrid::uniform(-1.0, 4).is_err());
        assert!(TimeGrid::uniform(1.0, 0).is_err());
    }

    #[test]
    fn test_grid_deserialization_validates() {
        let grid: TimeGrid = ron::from_str("[0.0, 1.0, 4.0]").unwrap();
        assert_eq!(grid.len(), 3);
        assert!(ron::from_str::<TimeGrid>("[1.0, 0.0]").is_err());
    }

    #[test]
    fn test_trajectory_pairs() {
        let grid = TimeGrid::uniform(1.0, 3).unwrap();
        let trajectory = Trajectory::new(grid.clone(), vec![3.0, 2.0, 1.0]).unwrap();
        let pairs: Vec<_> = trajectory.iter().collect();
        assert_eq!(pairs, vec![(0.0, 3.0), (0.5, 2.0), (1.0, 1.0)]);
        assert!(Trajectory::new(grid, vec![1.0]).is_err());
    }
}
