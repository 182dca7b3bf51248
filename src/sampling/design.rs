// src/sampling/design.rs

use serde::{Serialize, Deserialize};

use super::RandomVariateSource;
use crate::error::{Result, UqError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DesignKind {
    Uniform,
    LatinHypercube,
    /// Latin hypercube with every point at its stratum midpoint.
    CenteredLatinHypercube,
}

impl Default for DesignKind {
    fn default() -> Self {
        DesignKind::Uniform
    }
}

/// n points in the d-dimensional unit hypercube, stored row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDesign")]
pub struct DesignMatrix {
    n_samples: usize,
    dimension: usize,
    values: Vec<f64>,
}

impl DesignMatrix {
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        validate_shape(rows.len(), rows.first().map_or(0, Vec::len))?;
        let dimension = rows[0].len();
        if let Some(bad) = rows.iter().find(|r| r.len() != dimension) {
            return Err(UqError::DimensionMismatch { design: bad.len(), model: dimension });
        }
        Ok(Self {
            n_samples: rows.len(),
            dimension,
            values: rows.concat(),
        })
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.dimension..(i + 1) * self.dimension]
    }

    pub fn get(&self, i: usize, k: usize) -> f64 {
        self.values[i * self.dimension + k]
    }

    pub fn rows(&self) -> impl ExactSizeIterator<Item = &[f64]> + '_ {
        self.values.chunks_exact(self.dimension)
    }

    /// First `m` rows. For a Latin hypercube this is generally NOT a Latin
    /// hypercube of size `m`.
    pub fn prefix(&self, m: usize) -> Result<Self> {
        if m < 1 || m > self.n_samples {
            return Err(UqError::InvalidSampleCount(m));
        }
        Ok(Self {
            n_samples: m,
            dimension: self.dimension,
            values: self.values[..m * self.dimension].to_vec(),
        })
    }

    /// Checks that every dimension occupies each of the n strata exactly once.
    pub fn is_latin_hypercube(&self) -> bool {
        let n = self.n_samples;
        (0..self.dimension).all(|k| {
            let mut occupied = vec![false; n];
            self.rows().all(|row| {
                let x = row[k];
                if !(0.0..1.0).contains(&x) {
                    return false;
                }
                let stratum = ((x * n as f64).floor() as usize).min(n - 1);
                !std::mem::replace(&mut occupied[stratum], true)
            })
        })
    }
}

// Unchecked serde image of a design; shape is verified before it becomes a DesignMatrix.
#[derive(Deserialize)]
struct RawDesign {
    n_samples: usize,
    dimension: usize,
    values: Vec<f64>,
}

impl TryFrom<RawDesign> for DesignMatrix {
    type Error = UqError;

    fn try_from(raw: RawDesign) -> Result<Self> {
        validate_shape(raw.n_samples, raw.dimension)?;
        let expected = raw.n_samples * raw.dimension;
        if raw.values.len() != expected {
            return Err(UqError::LengthMismatch { expected, got: raw.values.len() });
        }
        Ok(Self {
            n_samples: raw.n_samples,
            dimension: raw.dimension,
            values: raw.values,
        })
    }
}

fn validate_shape(n: usize, d: usize) -> Result<()> {
    if n < 1 {
        return Err(UqError::InvalidSampleCount(n));
    }
    if d < 1 {
        return Err(UqError::InvalidDimension(d));
    }
    Ok(())
}

pub fn generate(kind: DesignKind, n: usize, d: usize, source: &mut RandomVariateSource) -> Result<DesignMatrix> {
    match kind {
        DesignKind::Uniform => uniform_design(n, d, source),
        DesignKind::LatinHypercube => latin_hypercube_design(n, d, source),
        DesignKind::CenteredLatinHypercube => centered_latin_hypercube_design(n, d, source),
    }
}

pub fn uniform_design(n: usize, d: usize, source: &mut RandomVariateSource) -> Result<DesignMatrix> {
    validate_shape(n, d)?;
    let values = (0..n).flat_map(|_| source.sample_uniform_vector(d)).collect();
    Ok(DesignMatrix { n_samples: n, dimension: d, values })
}

pub fn latin_hypercube_design(n: usize, d: usize, source: &mut RandomVariateSource) -> Result<DesignMatrix> {
    stratified_design(n, d, source, |source| source.sample_uniform())
}

pub fn centered_latin_hypercube_design(n: usize, d: usize, source: &mut RandomVariateSource) -> Result<DesignMatrix> {
    stratified_design(n, d, source, |_| 0.5)
}

// One independent permutation per dimension; `offset` places the point inside its stratum.
fn stratified_design<F>(n: usize, d: usize, source: &mut RandomVariateSource, mut offset: F) -> Result<DesignMatrix>
where
    F: FnMut(&mut RandomVariateSource) -> f64,
{
    validate_shape(n, d)?;
    let mut values = vec![0.0; n * d];
    for k in 0..d {
        let permutation = source.permutation(n);
        for (i, stratum) in permutation.into_iter().enumerate() {
            let x = (stratum as f64 + offset(source)) / n as f64;
            // (s + u) / n can round up to the next stratum boundary when u is close to 1
            values[i * d + k] = x.min(next_down((stratum + 1) as f64 / n as f64));
        }
    }
    Ok(DesignMatrix { n_samples: n, dimension: d, values })
}

fn next_down(x: f64) -> f64 {
    f64::from_bits(x.to_bits() - 1)
}
