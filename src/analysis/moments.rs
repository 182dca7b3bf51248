// src/analysis/moments.rs

use serde::{Serialize, Deserialize};

/// Raw power sums of a stream of scalars.
///
/// Variance is the population form `S2/n - mean^2`. The raw sums stay
/// public through accessors so callers can inspect instability themselves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningMoments {
    count: usize,
    sum: f64,
    sum_squares: f64,
}

impl RunningMoments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.sum_squares += value * value;
    }

    pub fn merge(&mut self, other: &RunningMoments) {
        self.count += other.count;
        self.sum += other.sum;
        self.sum_squares += other.sum_squares;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn sum_squares(&self) -> f64 {
        self.sum_squares
    }

    /// NaN when empty.
    pub fn mean(&self) -> f64 {
        self.sum / self.count as f64
    }

    pub fn second_moment(&self) -> f64 {
        self.sum_squares / self.count as f64
    }

    pub fn variance(&self) -> f64 {
        let mean = self.mean();
        self.second_moment() - mean * mean
    }
}

/// Per-time-index power sums over a batch of equally long trajectories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryMoments {
    count: usize,
    sum: Vec<f64>,
    sum_squares: Vec<f64>,
}

impl TrajectoryMoments {
    pub fn new(len: usize) -> Self {
        Self {
            count: 0,
            sum: vec![0.0; len],
            sum_squares: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.sum.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sum.is_empty()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Panics if `values` does not match the accumulator length.
    pub fn push(&mut self, values: &[f64]) {
        assert_eq!(values.len(), self.sum.len(), "trajectory length mismatch");
        self.count += 1;
        for ((s1, s2), &y) in self.sum.iter_mut().zip(self.sum_squares.iter_mut()).zip(values) {
            *s1 += y;
            *s2 += y * y;
        }
    }

    pub fn sum(&self) -> &[f64] {
        &self.sum
    }

    pub fn sum_squares(&self) -> &[f64] {
        &self.sum_squares
    }

    pub fn mean(&self) -> Vec<f64> {
        let n = self.count as f64;
        self.sum.iter().map(|s| s / n).collect()
    }

    pub fn variance(&self) -> Vec<f64> {
        let n = self.count as f64;
        self.sum
            .iter()
            .zip(&self.sum_squares)
            .map(|(s1, s2)| {
                let mean = s1 / n;
                s2 / n - mean * mean
            })
            .collect()
    }
}
