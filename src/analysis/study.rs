// src/analysis/study.rs

use log::{debug, info};
use serde::{Serialize, Deserialize};

use super::convergence::{
    root_sum_squared_error, ConvergenceAnalyzer, ErrorTrajectory, LhsStrategy, ReplicateSummary, SamplingMethod,
};
use super::importance::{ImportanceEstimate, ProposalKind, TailProblem};
use super::propagation::{EmpiricalEnvelope, UncertaintyPropagator};
use crate::config::{ConvergenceSettings, StudyConfig, StudyMethod};
use crate::error::Result;
use crate::model::{DecayModel, ResponseModel};
use crate::sampling::{generate, RandomVariateSource};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailResult {
    pub threshold: f64,
    pub reference: f64,
    pub proposal: ProposalKind,
    pub estimate: ImportanceEstimate,
    pub nominal: Option<ImportanceEstimate>,
    /// `|I_n - reference|` along a separate run of the same estimator.
    pub convergence: ErrorTrajectory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodResult {
    pub method: SamplingMethod,
    pub envelope: EmpiricalEnvelope,
    pub true_mean: Vec<f64>,
    pub true_variance: Vec<f64>,
    pub mean_error: f64,
    pub variance_error: f64,
    pub convergence: Option<ReplicateSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyReport {
    pub name: String,
    pub timestamp: String,
    pub seed: Option<u64>,
    pub tail: Option<TailResult>,
    pub monte_carlo: Option<MethodResult>,
    pub latin_hypercube: Option<MethodResult>,
}

impl StudyReport {
    pub fn method_results(&self) -> impl Iterator<Item = &MethodResult> {
        self.monte_carlo.iter().chain(self.latin_hypercube.iter())
    }
}

pub fn run_study(config: &StudyConfig) -> Result<StudyReport> {
    config.validate()?;

    let mut source = RandomVariateSource::from_seed_option(config.seed);
    let model = DecayModel::new(config.model.time_grid()?, config.model.parameters)?;

    let mut report = StudyReport {
        name: config.name.clone(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        seed: config.seed,
        tail: None,
        monte_carlo: None,
        latin_hypercube: None,
    };

    // one child seed per method kind, drawn in a fixed order, so enabling or
    // reordering methods leaves the other methods' streams unchanged
    let seeds = MethodSeeds::draw(&mut source);

    for &method in &config.methods {
        let mut method_source = RandomVariateSource::seeded(seeds.for_method(method));
        match method {
            StudyMethod::ImportanceSampling => {
                report.tail = Some(run_tail(config, &mut method_source)?);
            }
            StudyMethod::MonteCarlo => {
                report.monte_carlo = Some(run_method(config, &model, SamplingMethod::MonteCarlo, &mut method_source)?);
            }
            StudyMethod::LatinHypercube => {
                let strategy = config
                    .convergence
                    .as_ref()
                    .map_or(LhsStrategy::Prefix, |c| c.lhs_strategy);
                report.latin_hypercube = Some(run_method(
                    config,
                    &model,
                    SamplingMethod::LatinHypercube(strategy),
                    &mut method_source,
                )?);
            }
        }
    }

    info!("study `{}` finished", report.name);
    Ok(report)
}

struct MethodSeeds {
    importance_sampling: u64,
    monte_carlo: u64,
    latin_hypercube: u64,
}

impl MethodSeeds {
    fn draw(source: &mut RandomVariateSource) -> Self {
        Self {
            importance_sampling: source.next_seed(),
            monte_carlo: source.next_seed(),
            latin_hypercube: source.next_seed(),
        }
    }

    fn for_method(&self, method: StudyMethod) -> u64 {
        match method {
            StudyMethod::ImportanceSampling => self.importance_sampling,
            StudyMethod::MonteCarlo => self.monte_carlo,
            StudyMethod::LatinHypercube => self.latin_hypercube,
        }
    }
}

fn run_tail(config: &StudyConfig, source: &mut RandomVariateSource) -> Result<TailResult> {
    let settings = &config.tail;
    let problem = TailProblem::new(settings.threshold)?;
    let reference = problem.reference_probability();

    let estimate = problem.estimator(settings.proposal, settings.budget)?.run(source);
    let nominal = if settings.compare_nominal && settings.proposal != ProposalKind::Nominal {
        Some(problem.estimator(ProposalKind::Nominal, settings.budget)?.run(source))
    } else {
        None
    };
    let convergence = problem
        .estimator(settings.proposal, settings.budget)?
        .running_error_trajectory(source, reference);

    info!(
        "P[X > {}] ~ {:.4e} (reference {:.4e}, standard error {:.2e}, {:?} proposal)",
        settings.threshold,
        estimate.mean,
        reference,
        estimate.standard_error(),
        settings.proposal
    );
    if let Some(nominal) = &nominal {
        info!("plain Monte Carlo with the same budget gives {:.4e}", nominal.mean);
    }

    Ok(TailResult {
        threshold: settings.threshold,
        reference,
        proposal: settings.proposal,
        estimate,
        nominal,
        convergence,
    })
}

fn run_method(
    config: &StudyConfig,
    model: &DecayModel,
    method: SamplingMethod,
    source: &mut RandomVariateSource,
) -> Result<MethodResult> {
    let settings = &config.propagation;
    let propagator = UncertaintyPropagator::new(
        settings.lower_percentile,
        settings.upper_percentile,
        settings.execution,
    )?;

    let design = generate(method.design_kind(), settings.samples, model.input_dimension(), source)?;
    let envelope = propagator.propagate(model, &design)?;

    let truth = model.ground_truth();
    let true_mean = truth.mean_trajectory(model.time_grid());
    let true_variance = truth.variance_trajectory(model.time_grid());
    let mean_error = root_sum_squared_error(&envelope.mean, &true_mean)?;
    let variance_error = root_sum_squared_error(&envelope.variance, &true_variance)?;
    info!(
        "{}: {} samples, mean RSE {:.4e}, variance RSE {:.4e}",
        method.label(),
        envelope.sample_count,
        mean_error,
        variance_error
    );

    let convergence = match &config.convergence {
        Some(convergence) => Some(run_convergence(config, convergence, model, method, source)?),
        None => None,
    };

    Ok(MethodResult {
        method,
        envelope,
        true_mean,
        true_variance,
        mean_error,
        variance_error,
        convergence,
    })
}

fn run_convergence(
    config: &StudyConfig,
    settings: &ConvergenceSettings,
    model: &DecayModel,
    method: SamplingMethod,
    source: &mut RandomVariateSource,
) -> Result<ReplicateSummary> {
    let truth = model.ground_truth();
    let analyzer = ConvergenceAnalyzer::new(model)
        .with_execution(config.propagation.execution)
        .with_band(settings.lower_percentile, settings.upper_percentile)?;

    let counts = settings.sample_counts();
    debug!("{}: {} replicates over {} sample counts", method.label(), settings.replicates, counts.len());
    let set = analyzer.replicate_study_at(method, &counts, settings.replicates, |t| truth.variance(t), source)?;

    if let (Some(&n), Some(&error)) = (set.summary.sample_counts.last(), set.summary.mean.last()) {
        info!("{}: mean variance RSE at n = {} over {} replicates is {:.4e}", method.label(), n, set.replicates(), error);
    }
    Ok(set.summary)
}
