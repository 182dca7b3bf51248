// src/analysis/convergence.rs

use log::debug;
use rayon::prelude::*;
use serde::{Serialize, Deserialize};

use super::moments::TrajectoryMoments;
use super::propagation::{check_dimension, for_each_trajectory, percentile, Execution};
use crate::error::{ensure_percentiles, Result, UqError};
use crate::model::ResponseModel;
use crate::sampling::{generate, DesignKind, RandomVariateSource};

/// How the LHS study obtains a design for each tested sample count.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LhsStrategy {
    /// Growing prefix of one design of the largest size. Cheap, but the
    /// intermediate prefixes are not Latin hypercubes.
    Prefix,
    /// A new design of exactly n points for every n. Quadratic cost.
    Fresh,
}

impl Default for LhsStrategy {
    fn default() -> Self {
        LhsStrategy::Prefix
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SamplingMethod {
    MonteCarlo,
    LatinHypercube(LhsStrategy),
}

impl SamplingMethod {
    pub fn design_kind(&self) -> DesignKind {
        match self {
            SamplingMethod::MonteCarlo => DesignKind::Uniform,
            SamplingMethod::LatinHypercube(_) => DesignKind::LatinHypercube,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SamplingMethod::MonteCarlo => "monte_carlo",
            SamplingMethod::LatinHypercube(LhsStrategy::Prefix) => "lhs_prefix",
            SamplingMethod::LatinHypercube(LhsStrategy::Fresh) => "lhs_fresh",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorPoint {
    pub sample_count: usize,
    pub error: f64,
}

/// Estimation error against a known reference, one point per tested sample count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorTrajectory {
    points: Vec<ErrorPoint>,
}

impl ErrorTrajectory {
    pub fn new(points: Vec<ErrorPoint>) -> Self {
        Self { points }
    }

    pub fn points(&self) -> &[ErrorPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn sample_counts(&self) -> Vec<usize> {
        self.points.iter().map(|p| p.sample_count).collect()
    }

    pub fn errors(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.error).collect()
    }

    pub fn final_error(&self) -> Option<f64> {
        self.points.last().map(|p| p.error)
    }
}

/// Euclidean norm of `estimate - truth` over the time grid.
pub fn root_sum_squared_error(estimate: &[f64], truth: &[f64]) -> Result<f64> {
    if estimate.len() != truth.len() {
        return Err(UqError::LengthMismatch { expected: truth.len(), got: estimate.len() });
    }
    Ok(distance(estimate, truth))
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt()
}

/// Cross-replicate statistics of the error at each tested sample count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicateSummary {
    pub sample_counts: Vec<usize>,
    pub mean: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower_percentile: f64,
    pub upper_percentile: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicateSet {
    pub method: SamplingMethod,
    pub trajectories: Vec<ErrorTrajectory>,
    pub summary: ReplicateSummary,
}

impl ReplicateSet {
    fn new(method: SamplingMethod, trajectories: Vec<ErrorTrajectory>, lower: f64, upper: f64) -> Result<Self> {
        let summary = summarize(&trajectories, lower, upper)?;
        Ok(Self { method, trajectories, summary })
    }

    pub fn replicates(&self) -> usize {
        self.trajectories.len()
    }

    /// Recomputes the band for a different percentile pair.
    pub fn summary(&self, lower: f64, upper: f64) -> Result<ReplicateSummary> {
        summarize(&self.trajectories, lower, upper)
    }
}

fn summarize(trajectories: &[ErrorTrajectory], lower: f64, upper: f64) -> Result<ReplicateSummary> {
    ensure_percentiles(lower, upper)?;
    let sample_counts = trajectories.first().map(ErrorTrajectory::sample_counts).unwrap_or_default();

    let mut mean = Vec::with_capacity(sample_counts.len());
    let mut lower_band = Vec::with_capacity(sample_counts.len());
    let mut upper_band = Vec::with_capacity(sample_counts.len());
    let mut column = Vec::with_capacity(trajectories.len());
    for j in 0..sample_counts.len() {
        column.clear();
        column.extend(trajectories.iter().map(|tr| tr.points[j].error));
        column.sort_by(|a, b| a.total_cmp(b));
        mean.push(column.iter().sum::<f64>() / column.len() as f64);
        lower_band.push(percentile(&column, lower));
        upper_band.push(percentile(&column, upper));
    }

    Ok(ReplicateSummary {
        sample_counts,
        mean,
        lower: lower_band,
        upper: upper_band,
        lower_percentile: lower,
        upper_percentile: upper,
    })
}

pub(crate) fn validate_counts(counts: &[usize]) -> Result<()> {
    match counts.first() {
        None => return Err(UqError::InvalidSampleCount(0)),
        Some(&first) if first < 1 => return Err(UqError::InvalidSampleCount(first)),
        _ => {}
    }
    if let Some(w) = counts.windows(2).find(|w| w[1] <= w[0]) {
        return Err(UqError::invalid_parameter(
            "sample_counts",
            format!("must be strictly increasing, found {} then {}", w[0], w[1]),
        ));
    }
    Ok(())
}

/// Tracks how fast the sampled variance trajectory of a model approaches a
/// known ground truth.
#[derive(Debug)]
pub struct ConvergenceAnalyzer<'a, M> {
    model: &'a M,
    execution: Execution,
    lower_percentile: f64,
    upper_percentile: f64,
}

impl<M> Clone for ConvergenceAnalyzer<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for ConvergenceAnalyzer<'_, M> {}

impl<'a, M> ConvergenceAnalyzer<'a, M>
where
    M: ResponseModel + Sync,
{
    pub fn new(model: &'a M) -> Self {
        Self {
            model,
            execution: Execution::Sequential,
            lower_percentile: 2.5,
            upper_percentile: 97.5,
        }
    }

    pub fn with_execution(mut self, execution: Execution) -> Self {
        self.execution = execution;
        self
    }

    pub fn with_band(mut self, lower: f64, upper: f64) -> Result<Self> {
        ensure_percentiles(lower, upper)?;
        self.lower_percentile = lower;
        self.upper_percentile = upper;
        Ok(self)
    }

    /// Error of the running variance estimate for every n in `1..=max_samples`.
    pub fn error_trajectory<G>(
        &self,
        method: SamplingMethod,
        max_samples: usize,
        ground_truth_variance: G,
        source: &mut RandomVariateSource,
    ) -> Result<ErrorTrajectory>
    where
        G: Fn(f64) -> f64,
    {
        if max_samples < 1 {
            return Err(UqError::InvalidSampleCount(max_samples));
        }
        let counts: Vec<usize> = (1..=max_samples).collect();
        self.error_trajectory_at(method, &counts, ground_truth_variance, source)
    }

    /// Same as [`error_trajectory`](Self::error_trajectory) on an explicit,
    /// strictly increasing schedule of sample counts.
    pub fn error_trajectory_at<G>(
        &self,
        method: SamplingMethod,
        sample_counts: &[usize],
        ground_truth_variance: G,
        source: &mut RandomVariateSource,
    ) -> Result<ErrorTrajectory>
    where
        G: Fn(f64) -> f64,
    {
        validate_counts(sample_counts)?;
        let truth = self.model.time_grid().map(ground_truth_variance);

        match method {
            SamplingMethod::MonteCarlo | SamplingMethod::LatinHypercube(LhsStrategy::Prefix) => {
                self.prefix_errors(method.design_kind(), sample_counts, &truth, source)
            }
            SamplingMethod::LatinHypercube(LhsStrategy::Fresh) => {
                self.fresh_errors(method.design_kind(), sample_counts, &truth, source)
            }
        }
    }

    // One design at the largest count; the error is read off whenever the
    // running count reaches the next scheduled n.
    fn prefix_errors(
        &self,
        kind: DesignKind,
        sample_counts: &[usize],
        truth: &[f64],
        source: &mut RandomVariateSource,
    ) -> Result<ErrorTrajectory> {
        let max_samples = sample_counts[sample_counts.len() - 1];
        let design = generate(kind, max_samples, self.model.input_dimension(), source)?;
        check_dimension(self.model, &design)?;

        let mut moments = TrajectoryMoments::new(truth.len());
        let mut points = Vec::with_capacity(sample_counts.len());
        let mut scheduled = sample_counts.iter().peekable();
        for_each_trajectory(self.model, &design, max_samples, self.execution, |_, trajectory| {
            moments.push(trajectory.values());
            if scheduled.next_if(|&&n| n == moments.count()).is_some() {
                let error = distance(&moments.variance(), truth);
                points.push(ErrorPoint { sample_count: moments.count(), error });
            }
        })?;
        Ok(ErrorTrajectory::new(points))
    }

    fn fresh_errors(
        &self,
        kind: DesignKind,
        sample_counts: &[usize],
        truth: &[f64],
        source: &mut RandomVariateSource,
    ) -> Result<ErrorTrajectory> {
        let points = sample_counts
            .iter()
            .map(|&n| {
                let design = generate(kind, n, self.model.input_dimension(), source)?;
                check_dimension(self.model, &design)?;
                let mut moments = TrajectoryMoments::new(truth.len());
                for_each_trajectory(self.model, &design, n, self.execution, |_, trajectory| {
                    moments.push(trajectory.values());
                })?;
                let error = distance(&moments.variance(), truth);
                Ok(ErrorPoint { sample_count: n, error })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ErrorTrajectory::new(points))
    }

    pub fn replicate_study<G>(
        &self,
        method: SamplingMethod,
        max_samples: usize,
        replicates: usize,
        ground_truth_variance: G,
        source: &mut RandomVariateSource,
    ) -> Result<ReplicateSet>
    where
        G: Fn(f64) -> f64 + Sync,
    {
        if max_samples < 1 {
            return Err(UqError::InvalidSampleCount(max_samples));
        }
        let counts: Vec<usize> = (1..=max_samples).collect();
        self.replicate_study_at(method, &counts, replicates, ground_truth_variance, source)
    }

    /// Independent repetitions of [`error_trajectory_at`](Self::error_trajectory_at),
    /// each on its own child random stream.
    pub fn replicate_study_at<G>(
        &self,
        method: SamplingMethod,
        sample_counts: &[usize],
        replicates: usize,
        ground_truth_variance: G,
        source: &mut RandomVariateSource,
    ) -> Result<ReplicateSet>
    where
        G: Fn(f64) -> f64 + Sync,
    {
        if replicates < 1 {
            return Err(UqError::InvalidReplicateCount(replicates));
        }
        validate_counts(sample_counts)?;

        // Seeds are drawn up front so the outcome does not depend on scheduling.
        let seeds: Vec<u64> = (0..replicates).map(|_| source.next_seed()).collect();
        let run = |analyzer: &Self, (replicate, &seed): (usize, &u64)| {
            debug!("{} replicate {} of {}", method.label(), replicate + 1, replicates);
            let mut child = RandomVariateSource::seeded(seed);
            analyzer.error_trajectory_at(method, sample_counts, &ground_truth_variance, &mut child)
        };

        let trajectories = match self.execution {
            Execution::Sequential => seeds.iter().enumerate().map(|r| run(self, r)).collect::<Result<Vec<_>>>()?,
            Execution::Parallel => {
                // replicates already saturate the pool
                let inner = self.with_execution(Execution::Sequential);
                seeds.par_iter().enumerate().map(|r| run(&inner, r)).collect::<Result<Vec<_>>>()?
            }
        };

        ReplicateSet::new(method, trajectories, self.lower_percentile, self.upper_percentile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DecayModel, DecayParameters, TimeGrid};
    use approx::assert_relative_eq;

    fn model() -> DecayModel {
        DecayModel::new(TimeGrid::uniform(10.0, 11).unwrap(), DecayParameters::default()).unwrap()
    }

    #[test]
    fn test_rse() {
        assert_relative_eq!(root_sum_squared_error(&[1.0, 2.0], &[4.0, 6.0]).unwrap(), 5.0);
        assert!(root_sum_squared_error(&[1.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_single_sample_error_is_defined() {
        let model = model();
        let truth = model.ground_truth();
        let analyzer = ConvergenceAnalyzer::new(&model);
        let mut source = RandomVariateSource::seeded(2);
        for method in [
            SamplingMethod::MonteCarlo,
            SamplingMethod::LatinHypercube(LhsStrategy::Prefix),
            SamplingMethod::LatinHypercube(LhsStrategy::Fresh),
        ] {
            let errors = analyzer.error_trajectory(method, 1, |t| truth.variance(t), &mut source).unwrap();
            assert_eq!(errors.len(), 1);
            let error = errors.final_error().unwrap();
            assert!(error.is_finite() && error > 0.0);
            // variance of one sample is 0, so the error is the norm of the truth
            let norm = root_sum_squared_error(&vec![0.0; 11], &truth.variance_trajectory(model.time_grid())).unwrap();
            assert_relative_eq!(error, norm);
        }
    }

    #[test]
    fn test_errors_are_non_negative() {
        let model = model();
        let truth = model.ground_truth();
        let analyzer = ConvergenceAnalyzer::new(&model);
        let mut source = RandomVariateSource::seeded(8);
        let errors = analyzer
            .error_trajectory(SamplingMethod::LatinHypercube(LhsStrategy::Prefix), 60, |t| truth.variance(t), &mut source)
            .unwrap();
        assert_eq!(errors.sample_counts(), (1..=60).collect::<Vec<_>>());
        assert!(errors.errors().iter().all(|&e| e >= 0.0 && e.is_finite()));
    }

    #[test]
    fn test_usage_errors() {
        let model = model();
        let analyzer = ConvergenceAnalyzer::new(&model);
        let mut source = RandomVariateSource::seeded(1);
        assert_eq!(
            analyzer.error_trajectory(SamplingMethod::MonteCarlo, 0, |_| 0.0, &mut source).unwrap_err(),
            UqError::InvalidSampleCount(0)
        );
        assert_eq!(
            analyzer.replicate_study(SamplingMethod::MonteCarlo, 5, 0, |_| 0.0, &mut source).unwrap_err(),
            UqError::InvalidReplicateCount(0)
        );
        assert!(analyzer.error_trajectory_at(SamplingMethod::MonteCarlo, &[5, 3], |_| 0.0, &mut source).is_err());
        assert!(analyzer.with_band(90.0, 10.0).is_err());
    }

    #[test]
    fn test_scheduled_counts() {
        let model = model();
        let truth = model.ground_truth();
        let analyzer = ConvergenceAnalyzer::new(&model);
        let mut source = RandomVariateSource::seeded(6);
        let errors = analyzer
            .error_trajectory_at(SamplingMethod::MonteCarlo, &[3, 10, 40], |t| truth.variance(t), &mut source)
            .unwrap();
        assert_eq!(errors.sample_counts(), vec![3, 10, 40]);
    }

    #[test]
    fn test_replicate_summary() {
        let model = model();
        let truth = model.ground_truth();
        let analyzer = ConvergenceAnalyzer::new(&model);
        let mut source = RandomVariateSource::seeded(10);
        let set = analyzer
            .replicate_study(SamplingMethod::MonteCarlo, 20, 8, |t| truth.variance(t), &mut source)
            .unwrap();
        assert_eq!(set.replicates(), 8);
        assert_eq!(set.summary.sample_counts.len(), 20);
        for j in 0..20 {
            assert!(set.summary.lower[j] <= set.summary.upper[j]);
            assert!(set.summary.mean[j] >= 0.0);
        }
        let narrow = set.summary(25.0, 75.0).unwrap();
        assert!(narrow.upper[19] - narrow.lower[19] <= set.summary.upper[19] - set.summary.lower[19]);
    }

    #[test]
    fn test_parallel_replicates_match_sequential() {
        let model = model();
        let truth = model.ground_truth();
        let sequential = ConvergenceAnalyzer::new(&model)
            .replicate_study(SamplingMethod::LatinHypercube(LhsStrategy::Prefix), 15, 4, |t| truth.variance(t), &mut RandomVariateSource::seeded(77))
            .unwrap();
        let parallel = ConvergenceAnalyzer::new(&model)
            .with_execution(Execution::Parallel)
            .replicate_study(SamplingMethod::LatinHypercube(LhsStrategy::Prefix), 15, 4, |t| truth.variance(t), &mut RandomVariateSource::seeded(77))
            .unwrap();
        assert_eq!(sequential.trajectories, parallel.trajectories);
    }
}
