// src/model/decay.rs

use serde::{Serialize, Deserialize};

use super::{DormandPrince, IvpSolver, ResponseModel, TimeGrid, Trajectory};
use crate::error::{Result, UqError};

/// Affine map from the unit square to the decay ODE coefficients:
/// `rate = rate_scale * x1`, `y0 = initial_offset + initial_span * x2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayParameters {
    pub rate_scale: f64,
    pub initial_offset: f64,
    pub initial_span: f64,
}

impl Default for DecayParameters {
    fn default() -> Self {
        Self {
            rate_scale: 0.1,
            initial_offset: 8.0,
            initial_span: 2.0,
        }
    }
}

impl DecayParameters {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("rate_scale", self.rate_scale),
            ("initial_offset", self.initial_offset),
            ("initial_span", self.initial_span),
        ] {
            if !value.is_finite() {
                return Err(UqError::invalid_parameter(name, format!("must be finite, got {value}")));
            }
        }
        Ok(())
    }

    pub fn rate(&self, x: f64) -> f64 {
        self.rate_scale * x
    }

    pub fn initial_value(&self, x: f64) -> f64 {
        self.initial_offset + self.initial_span * x
    }
}

/// `dy/dt = -rate * y`, `y(0) = y0`, with (rate, y0) drawn from the unit square.
#[derive(Debug, Clone)]
pub struct DecayModel<S = DormandPrince> {
    grid: TimeGrid,
    parameters: DecayParameters,
    solver: S,
}

impl DecayModel<DormandPrince> {
    pub fn new(grid: TimeGrid, parameters: DecayParameters) -> Result<Self> {
        Self::with_solver(grid, parameters, DormandPrince::default())
    }
}

impl<S: IvpSolver> DecayModel<S> {
    pub fn with_solver(grid: TimeGrid, parameters: DecayParameters, solver: S) -> Result<Self> {
        parameters.validate()?;
        Ok(Self { grid, parameters, solver })
    }

    pub fn parameters(&self) -> &DecayParameters {
        &self.parameters
    }

    pub fn ground_truth(&self) -> DecayGroundTruth {
        DecayGroundTruth::new(self.parameters)
    }

    /// Evaluates without the unit-cube check; the affine map is simply
    /// extrapolated.
    pub fn evaluate_unchecked(&self, input: &[f64]) -> Result<Trajectory> {
        if input.len() != 2 {
            return Err(UqError::DimensionMismatch { design: input.len(), model: 2 });
        }
        let rate = self.parameters.rate(input[0]);
        let y0 = self.parameters.initial_value(input[1]);

        let states = self.solver.solve(
            |y, _t, params, dydt| dydt[0] = -params[0] * y[0],
            &[y0],
            self.grid.points(),
            &[rate],
        )?;
        Trajectory::new(self.grid.clone(), states.into_iter().map(|state| state[0]).collect())
    }
}

impl<S: IvpSolver> ResponseModel for DecayModel<S> {
    fn input_dimension(&self) -> usize {
        2
    }

    fn time_grid(&self) -> &TimeGrid {
        &self.grid
    }

    fn evaluate(&self, input: &[f64]) -> Result<Trajectory> {
        if input.len() != 2 {
            return Err(UqError::DimensionMismatch { design: input.len(), model: 2 });
        }
        if let Some((index, &value)) = input.iter().enumerate().find(|(_, x)| !(0.0..=1.0).contains(*x)) {
            return Err(UqError::OutOfDesignInput { index, value });
        }
        self.evaluate_unchecked(input)
    }
}

/// Closed-form output moments for uniformly distributed inputs.
///
/// With `k ~ U(0, a)` and `y0 ~ U(b, b + c)` independent,
/// `E[y(t)] = E[y0] (1 - e^{-at}) / (at)` and
/// `E[y(t)^2] = E[y0^2] (1 - e^{-2at}) / (2at)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayGroundTruth {
    parameters: DecayParameters,
}

impl DecayGroundTruth {
    pub fn new(parameters: DecayParameters) -> Self {
        Self { parameters }
    }

    fn initial_mean(&self) -> f64 {
        self.parameters.initial_offset + 0.5 * self.parameters.initial_span
    }

    fn initial_second_moment(&self) -> f64 {
        let b = self.parameters.initial_offset;
        let c = self.parameters.initial_span;
        b * b + b * c + c * c / 3.0
    }

    pub fn mean(&self, t: f64) -> f64 {
        self.initial_mean() * decay_average(self.parameters.rate_scale * t)
    }

    pub fn second_moment(&self, t: f64) -> f64 {
        self.initial_second_moment() * decay_average(2.0 * self.parameters.rate_scale * t)
    }

    pub fn variance(&self, t: f64) -> f64 {
        let mean = self.mean(t);
        self.second_moment(t) - mean * mean
    }

    pub fn mean_trajectory(&self, grid: &TimeGrid) -> Vec<f64> {
        grid.map(|t| self.mean(t))
    }

    pub fn variance_trajectory(&self, grid: &TimeGrid) -> Vec<f64> {
        grid.map(|t| self.variance(t))
    }
}

// (1 - e^{-z}) / z, i.e. E[e^{-Uz}] for U ~ U(0, 1); equals 1 at z = 0.
fn decay_average(z: f64) -> f64 {
    if z == 0.0 {
        1.0
    } else {
        -(-z).exp_m1() / z
    }
}
