//! Representative cells at chosen percentiles of the reference slope.
use serde::{Deserialize, Serialize};

use crate::error::{Result, SlopeError};

pub const DEFAULT_QUANTILES: [f64; 5] = [5.0, 25.0, 50.0, 75.0, 95.0];
/// Reference magnitudes at or below this (degrees) are treated as flat.
pub const DEFAULT_THRESHOLD: f64 = 0.01;

/// Linear-interpolated percentile `q` ∈ [0, 100] of ascending `sorted`.
///
/// Position `q/100 · (n − 1)` is interpolated between its neighbours.
/// Panics on an empty slice.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    let pos = q / 100.0 * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let t = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * t
}

/// One representative cell and both estimators' values there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub label: String,
    /// Flattened row-major index into the reference field.
    pub index: usize,
    pub reference: f64,
    pub horn: f64,
    pub zeven: f64,
    /// `horn − reference`
    pub horn_error: f64,
    /// `zeven − reference`
    pub zeven_error: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantileSampler {
    /// Percentiles in [0, 100].
    pub quantiles: Vec<f64>,
    /// Cells with `|reference| <= threshold` are never sampled.
    pub threshold: f64,
}

impl Default for QuantileSampler {
    fn default() -> Self {
        Self {
            quantiles: DEFAULT_QUANTILES.to_vec(),
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

fn label_for(q: f64) -> String {
    format!("p{q}")
}

impl QuantileSampler {
    pub fn new(quantiles: Vec<f64>, threshold: f64) -> Result<Self> {
        let sampler = Self {
            quantiles,
            threshold,
        };
        sampler.validate()?;
        Ok(sampler)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.threshold.is_finite() && self.threshold >= 0.0) {
            return Err(SlopeError::InvalidThreshold(self.threshold));
        }
        if let Some(&q) = self
            .quantiles
            .iter()
            .find(|q| !(0.0..=100.0).contains(*q))
        {
            return Err(SlopeError::InvalidQuantile(q));
        }
        Ok(())
    }

    /// One sample per requested percentile.
    ///
    /// Candidates are cells where the reference exceeds the threshold in
    /// magnitude and all three fields are valid. For each percentile the
    /// candidate whose magnitude is closest to the target wins; ties go to
    /// the lowest flattened index.
    pub fn sample(&self, reference: &[f64], horn: &[f64], zeven: &[f64]) -> Result<Vec<Sample>> {
        self.validate()?;
        if horn.len() != reference.len() || zeven.len() != reference.len() {
            return Err(SlopeError::ShapeMismatch {
                expected: (1, reference.len()),
                actual: (1, horn.len().min(zeven.len())),
            });
        }

        let candidates: Vec<usize> = (0..reference.len())
            .filter(|&i| {
                let r = reference[i];
                !r.is_nan() && !horn[i].is_nan() && !zeven[i].is_nan() && r.abs() > self.threshold
            })
            .collect();
        if candidates.is_empty() {
            return Err(SlopeError::NoValidCells(format!(
                "quantile sampling (threshold {})",
                self.threshold
            )));
        }

        let mut magnitudes: Vec<f64> = candidates.iter().map(|&i| reference[i].abs()).collect();
        magnitudes.sort_by(f64::total_cmp);

        let samples = self
            .quantiles
            .iter()
            .map(|&q| {
                let target = percentile(&magnitudes, q);
                let mut best = candidates[0];
                let mut best_dist = (reference[best].abs() - target).abs();
                for &i in &candidates[1..] {
                    let dist = (reference[i].abs() - target).abs();
                    if dist < best_dist {
                        best = i;
                        best_dist = dist;
                    }
                }
                let r = reference[best];
                Sample {
                    label: label_for(q),
                    index: best,
                    reference: r,
                    horn: horn[best],
                    zeven: zeven[best],
                    horn_error: horn[best] - r,
                    zeven_error: zeven[best] - r,
                }
            })
            .collect();
        Ok(samples)
    }
}
