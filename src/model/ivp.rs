// src/model/ivp.rs

use serde::{Serialize, Deserialize};

use crate::error::{Result, UqError};

/// Initial value problem solver.
///
/// `rhs(y, t, params, dydt)` writes the derivative into `dydt`. The result
/// holds one state vector per requested output time, the first being `y0`
/// at `times[0]`. Implementations must be deterministic.
pub trait IvpSolver {
    fn solve<F>(&self, rhs: F, y0: &[f64], times: &[f64], params: &[f64]) -> Result<Vec<Vec<f64>>>
    where
        F: Fn(&[f64], f64, &[f64], &mut [f64]);
}

/// Adaptive Dormand–Prince 5(4) with step clamping onto the output times.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DormandPrince {
    pub rtol: f64,
    pub atol: f64,
    pub max_steps: usize,
}

impl Default for DormandPrince {
    fn default() -> Self {
        Self {
            rtol: 1e-8,
            atol: 1e-10,
            max_steps: 100_000,
        }
    }
}

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 5.0;

const C: [f64; 7] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0];
const A: [[f64; 6]; 7] = [
    [0.0; 6],
    [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0, 0.0],
    [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0, 0.0, 0.0, 0.0],
    [19372.0 / 6561.0, -25360.0 / 2187.0, 64448.0 / 6561.0, -212.0 / 729.0, 0.0, 0.0],
    [9017.0 / 3168.0, -355.0 / 33.0, 46732.0 / 5247.0, 49.0 / 176.0, -5103.0 / 18656.0, 0.0],
    [35.0 / 384.0, 0.0, 500.0 / 1113.0, 125.0 / 192.0, -2187.0 / 6784.0, 11.0 / 84.0],
];
// Difference between the 5th and embedded 4th order weights.
const E: [f64; 7] = [
    71.0 / 57600.0,
    0.0,
    -71.0 / 16695.0,
    71.0 / 1920.0,
    -17253.0 / 339200.0,
    22.0 / 525.0,
    -1.0 / 40.0,
];

struct Workspace {
    k: [Vec<f64>; 7],
    stage: Vec<f64>,
    y_new: Vec<f64>,
}

impl Workspace {
    fn new(dim: usize) -> Self {
        Self {
            k: std::array::from_fn(|_| vec![0.0; dim]),
            stage: vec![0.0; dim],
            y_new: vec![0.0; dim],
        }
    }
}

pub(crate) fn validate_times(times: &[f64]) -> Result<()> {
    if times.is_empty() {
        return Err(UqError::MalformedTimeGrid("no output times".to_string()));
    }
    if let Some(t) = times.iter().find(|t| !t.is_finite()) {
        return Err(UqError::MalformedTimeGrid(format!("non-finite time {t}")));
    }
    if let Some(w) = times.windows(2).find(|w| w[1] <= w[0]) {
        return Err(UqError::MalformedTimeGrid(format!(
            "times must be strictly increasing, found {} then {}",
            w[0], w[1]
        )));
    }
    Ok(())
}

impl DormandPrince {
    /// One trial step of size `h`; leaves the 5th order solution in
    /// `work.y_new` and returns the scaled RMS error estimate.
    fn attempt<F>(&self, rhs: &F, t: f64, y: &[f64], h: f64, params: &[f64], work: &mut Workspace) -> f64
    where
        F: Fn(&[f64], f64, &[f64], &mut [f64]),
    {
        for s in 0..7 {
            for i in 0..y.len() {
                let increment: f64 = (0..s).map(|j| A[s][j] * work.k[j][i]).sum();
                work.stage[i] = y[i] + h * increment;
            }
            if s == 6 {
                work.y_new.copy_from_slice(&work.stage);
            }
            rhs(&work.stage, t + C[s] * h, params, &mut work.k[s]);
        }

        let sum_sq: f64 = (0..y.len())
            .map(|i| {
                let err: f64 = h * (0..7).map(|j| E[j] * work.k[j][i]).sum::<f64>();
                let scale = self.atol + self.rtol * y[i].abs().max(work.y_new[i].abs());
                (err / scale).powi(2)
            })
            .sum();
        (sum_sq / y.len().max(1) as f64).sqrt()
    }
}

impl IvpSolver for DormandPrince {
    fn solve<F>(&self, rhs: F, y0: &[f64], times: &[f64], params: &[f64]) -> Result<Vec<Vec<f64>>>
    where
        F: Fn(&[f64], f64, &[f64], &mut [f64]),
    {
        validate_times(times)?;

        let mut work = Workspace::new(y0.len());
        let mut y = y0.to_vec();
        let mut t = times[0];
        let mut h = (times[times.len() - 1] - t) / 100.0;
        let mut steps = 0;

        let mut output = Vec::with_capacity(times.len());
        output.push(y.clone());

        for &t_out in &times[1..] {
            while t < t_out {
                if steps >= self.max_steps {
                    return Err(UqError::Solver {
                        time: t,
                        reason: format!("step budget of {} exhausted", self.max_steps),
                    });
                }
                steps += 1;

                let remaining = t_out - t;
                let lands = h >= remaining;
                let step = if lands { remaining } else { h };

                let err = self.attempt(&rhs, t, &y, step, params, &mut work);
                if !err.is_finite() || work.y_new.iter().any(|v| !v.is_finite()) {
                    return Err(UqError::Solver { time: t, reason: "non-finite state".to_string() });
                }

                let factor = if err == 0.0 {
                    MAX_FACTOR
                } else {
                    (SAFETY * err.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
                };

                if err <= 1.0 {
                    t = if lands { t_out } else { t + step };
                    y.copy_from_slice(&work.y_new);
                    // a step shortened to land on t_out says nothing about the usable step size
                    h = if lands { h.max(step * factor) } else { step * factor };
                } else {
                    h = step * factor;
                }

                if h <= f64::EPSILON * t.abs().max(1.0) {
                    return Err(UqError::Solver { time: t, reason: format!("step size underflow (h = {h:e})") });
                }
            }
            output.push(y.clone());
        }

        Ok(output)
    }
}
