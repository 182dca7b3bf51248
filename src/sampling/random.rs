// src/sampling/random.rs

use rand::prelude::*;
use rand_distr::{Exp1, StandardNormal};

/// Seedable stream of independent draws from the named univariate distributions.
///
/// Every estimator in the crate takes `&mut RandomVariateSource`, so the only
/// mutable state is the stream position of the wrapped generator.
#[derive(Debug, Clone)]
pub struct RandomVariateSource {
    rng: StdRng,
}

impl RandomVariateSource {
    pub fn seeded(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    pub fn from_entropy() -> Self {
        Self { rng: StdRng::from_entropy() }
    }

    pub fn from_seed_option(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }

    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Seed for an independent child stream, e.g. one per replicate worker.
    pub fn next_seed(&mut self) -> u64 {
        self.rng.gen()
    }

    pub fn sample_normal(&mut self) -> f64 {
        StandardNormal.sample(&mut self.rng)
    }

    pub fn sample_exponential(&mut self) -> f64 {
        Exp1.sample(&mut self.rng)
    }

    /// Uniform on [0, 1).
    pub fn sample_uniform(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    pub fn sample_uniform_vector(&mut self, d: usize) -> Vec<f64> {
        (0..d).map(|_| self.sample_uniform()).collect()
    }

    /// Exponential(1) shifted to start at `shift`, i.e. the exponential
    /// density left-truncated at `shift`.
    pub fn sample_shifted_truncated_exponential(&mut self, shift: f64) -> f64 {
        shift + self.sample_exponential()
    }

    /// Uniformly random permutation of `0..n`.
    pub fn permutation(&mut self, n: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut self.rng);
        indices
    }
}
