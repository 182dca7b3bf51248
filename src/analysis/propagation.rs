// src/analysis/propagation.rs

use log::{debug, warn};
use rayon::prelude::*;
use serde::{Serialize, Deserialize};

use super::moments::TrajectoryMoments;
use crate::error::{ensure_percentiles, Result, UqError};
use crate::model::{ResponseModel, Trajectory};
use crate::sampling::DesignMatrix;

/// Rows evaluated per parallel batch before folding into the accumulator.
const PARALLEL_CHUNK: usize = 256;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Execution {
    Sequential,
    /// Evaluate independent samples or replicates on the rayon pool. The
    /// reduction still runs in row order, so results match `Sequential`.
    Parallel,
}

impl Default for Execution {
    fn default() -> Self {
        Execution::Sequential
    }
}

/// Per-time-index mean, variance and empirical percentile band of a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmpiricalEnvelope {
    pub times: Vec<f64>,
    pub mean: Vec<f64>,
    pub variance: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower_percentile: f64,
    pub upper_percentile: f64,
    pub sample_count: usize,
}

impl EmpiricalEnvelope {
    /// A single sample has no spread; its variance is reported as 0.
    pub fn is_variance_degenerate(&self) -> bool {
        self.sample_count <= 1
    }
}

/// Pushes a design through a response model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UncertaintyPropagator {
    lower_percentile: f64,
    upper_percentile: f64,
    execution: Execution,
}

impl Default for UncertaintyPropagator {
    fn default() -> Self {
        Self {
            lower_percentile: 2.75,
            upper_percentile: 97.5,
            execution: Execution::Sequential,
        }
    }
}

impl UncertaintyPropagator {
    pub fn new(lower_percentile: f64, upper_percentile: f64, execution: Execution) -> Result<Self> {
        ensure_percentiles(lower_percentile, upper_percentile)?;
        Ok(Self { lower_percentile, upper_percentile, execution })
    }

    pub fn execution(&self) -> Execution {
        self.execution
    }

    pub fn propagate<M>(&self, model: &M, design: &DesignMatrix) -> Result<EmpiricalEnvelope>
    where
        M: ResponseModel + Sync,
    {
        check_dimension(model, design)?;
        let trajectories = evaluate_rows(model, design, 0..design.n_samples(), self.execution)?;

        let mut moments = TrajectoryMoments::new(model.time_grid().len());
        for trajectory in &trajectories {
            moments.push(trajectory.values());
        }
        if moments.count() == 1 {
            warn!("propagating a single sample; variance is reported as 0");
        }
        debug!("propagated {} samples over {} time points", moments.count(), moments.len());

        let (lower, upper) = percentile_bands(&trajectories, self.lower_percentile, self.upper_percentile);
        Ok(EmpiricalEnvelope {
            times: model.time_grid().points().to_vec(),
            mean: moments.mean(),
            variance: moments.variance(),
            lower,
            upper,
            lower_percentile: self.lower_percentile,
            upper_percentile: self.upper_percentile,
            sample_count: moments.count(),
        })
    }

    /// Moments only, without retaining trajectories.
    pub fn moments<M>(&self, model: &M, design: &DesignMatrix) -> Result<TrajectoryMoments>
    where
        M: ResponseModel + Sync,
    {
        check_dimension(model, design)?;
        let mut moments = TrajectoryMoments::new(model.time_grid().len());
        for_each_trajectory(model, design, design.n_samples(), self.execution, |_, trajectory| {
            moments.push(trajectory.values());
        })?;
        Ok(moments)
    }
}

pub(crate) fn check_dimension<M: ResponseModel + ?Sized>(model: &M, design: &DesignMatrix) -> Result<()> {
    if design.dimension() != model.input_dimension() {
        return Err(UqError::DimensionMismatch {
            design: design.dimension(),
            model: model.input_dimension(),
        });
    }
    Ok(())
}

fn evaluate_row<M: ResponseModel + ?Sized>(model: &M, design: &DesignMatrix, index: usize) -> Result<Trajectory> {
    model
        .evaluate(design.row(index))
        .map_err(|e| UqError::SampleEvaluation { index, source: Box::new(e) })
}

pub(crate) fn evaluate_rows<M>(
    model: &M,
    design: &DesignMatrix,
    rows: std::ops::Range<usize>,
    execution: Execution,
) -> Result<Vec<Trajectory>>
where
    M: ResponseModel + Sync,
{
    match execution {
        Execution::Sequential => rows.map(|i| evaluate_row(model, design, i)).collect(),
        Execution::Parallel => rows.into_par_iter().map(|i| evaluate_row(model, design, i)).collect(),
    }
}

/// Streams the first `count` rows through the model in row order. The first
/// failing row aborts the walk.
pub(crate) fn for_each_trajectory<M, F>(
    model: &M,
    design: &DesignMatrix,
    count: usize,
    execution: Execution,
    mut visit: F,
) -> Result<()>
where
    M: ResponseModel + Sync,
    F: FnMut(usize, &Trajectory),
{
    match execution {
        Execution::Sequential => {
            for i in 0..count {
                visit(i, &evaluate_row(model, design, i)?);
            }
        }
        Execution::Parallel => {
            let mut start = 0;
            while start < count {
                let end = (start + PARALLEL_CHUNK).min(count);
                for (offset, trajectory) in evaluate_rows(model, design, start..end, execution)?.iter().enumerate() {
                    visit(start + offset, trajectory);
                }
                start = end;
            }
        }
    }
    Ok(())
}

fn percentile_bands(trajectories: &[Trajectory], lower: f64, upper: f64) -> (Vec<f64>, Vec<f64>) {
    let nt = trajectories.first().map_or(0, Trajectory::len);
    let mut column = Vec::with_capacity(trajectories.len());
    (0..nt)
        .map(|j| {
            column.clear();
            column.extend(trajectories.iter().map(|tr| tr.values()[j]));
            column.sort_by(|a, b| a.total_cmp(b));
            (percentile(&column, lower), percentile(&column, upper))
        })
        .unzip()
}

/// Linearly interpolated percentile of sorted data, `p` in [0, 100].
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = (p / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let below = rank.floor() as usize;
            let above = (below + 1).min(n - 1);
            let fraction = rank - below as f64;
            sorted[below] + fraction * (sorted[above] - sorted[below])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DecayModel, DecayParameters, TimeGrid};
    use crate::sampling::{uniform_design, RandomVariateSource};
    use approx::assert_relative_eq;

    fn model() -> DecayModel {
        DecayModel::new(TimeGrid::uniform(10.0, 21).unwrap(), DecayParameters::default()).unwrap()
    }

    #[test]
    fn test_percentile_interpolation() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&data, 0.0), 1.0);
        assert_eq!(percentile(&data, 50.0), 3.0);
        assert_eq!(percentile(&data, 100.0), 5.0);
        assert_relative_eq!(percentile(&data, 2.75), 1.11, max_relative = 1e-12);
        assert_relative_eq!(percentile(&data, 97.5), 4.9, max_relative = 1e-12);
        assert!(percentile(&[], 50.0).is_nan());
    }

    #[test]
    fn test_single_sample_matches_direct_evaluation() {
        let model = model();
        let design = DesignMatrix::from_rows(&[vec![0.3, 0.6]]).unwrap();
        let envelope = UncertaintyPropagator::default().propagate(&model, &design).unwrap();
        let direct = model.evaluate(&[0.3, 0.6]).unwrap();

        assert!(envelope.is_variance_degenerate());
        assert_eq!(envelope.mean, direct.values());
        assert!(envelope.variance.iter().all(|&v| v == 0.0));
        assert_eq!(envelope.lower, direct.values());
        assert_eq!(envelope.upper, direct.values());
    }

    #[test]
    fn test_band_brackets_mean() {
        let model = model();
        let mut source = RandomVariateSource::seeded(4);
        let design = uniform_design(400, 2, &mut source).unwrap();
        let envelope = UncertaintyPropagator::default().propagate(&model, &design).unwrap();
        assert_eq!(envelope.sample_count, 400);
        for j in 0..envelope.times.len() {
            assert!(envelope.lower[j] <= envelope.mean[j] && envelope.mean[j] <= envelope.upper[j]);
            assert!(envelope.variance[j] >= 0.0);
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let model = model();
        let mut source = RandomVariateSource::seeded(12);
        let design = uniform_design(600, 2, &mut source).unwrap();
        let sequential = UncertaintyPropagator::default().propagate(&model, &design).unwrap();
        let parallel = UncertaintyPropagator::new(2.75, 97.5, Execution::Parallel)
            .unwrap()
            .propagate(&model, &design)
            .unwrap();
        assert_eq!(sequential.mean, parallel.mean);
        assert_eq!(sequential.variance, parallel.variance);
        assert_eq!(sequential.lower, parallel.lower);

        let moments = UncertaintyPropagator::new(2.75, 97.5, Execution::Parallel)
            .unwrap()
            .moments(&model, &design)
            .unwrap();
        assert_eq!(moments.mean(), sequential.mean);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let model = model();
        let design = DesignMatrix::from_rows(&[vec![0.1, 0.2, 0.3]]).unwrap();
        assert_eq!(
            UncertaintyPropagator::default().propagate(&model, &design).unwrap_err(),
            UqError::DimensionMismatch { design: 3, model: 2 }
        );
    }

    #[test]
    fn test_failed_sample_is_not_dropped() {
        let model = model();
        let design = DesignMatrix::from_rows(&[vec![0.1, 0.2], vec![0.5, 1.5], vec![0.3, 0.3]]).unwrap();
        let err = UncertaintyPropagator::default().propagate(&model, &design).unwrap_err();
        assert!(matches!(err, UqError::SampleEvaluation { index: 1, .. }));
    }

    #[test]
    fn test_invalid_percentiles_rejected() {
        assert!(UncertaintyPropagator::new(97.5, 2.75, Execution::Sequential).is_err());
    }
}
