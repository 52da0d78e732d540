//! Synthetic "normal" training data.
//!
//! Samples are drawn at half the reference standard deviation and then
//! normalized against the full one, so the training population is tighter
//! than what the normalizer assumes at inference time. Reconstruction
//! thresholds are calibrated against this.

use rand::Rng;
use std::f64::consts::PI;

use crate::analysis::features::{FeatureVector, FEATURE_COUNT};
use crate::analysis::stats::{normalize, FEATURE_STATS};
use crate::detect::DetectError;

/// Fraction of the reference standard deviation used when sampling.
pub const BASELINE_SPREAD: f64 = 0.5;

/// Standard normal draw via the Box-Muller transform.
pub fn gaussian<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // (0, 1] keeps ln() finite
    let u1 = 1.0 - rng.gen::<f64>();
    let u2 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Draw one raw observation around the reference means.
pub fn sample_raw<R: Rng + ?Sized>(rng: &mut R) -> FeatureVector {
    let mut raw = [0.0; FEATURE_COUNT];
    for (slot, stats) in raw.iter_mut().zip(FEATURE_STATS.iter()) {
        *slot = stats.mean + gaussian(rng) * stats.std_dev * BASELINE_SPREAD;
    }
    FeatureVector::from_array(raw)
}

/// Generate `samples` normalized baseline vectors.
pub fn generate_baseline<R: Rng + ?Sized>(
    rng: &mut R,
    samples: usize,
) -> Result<Vec<[f64; FEATURE_COUNT]>, DetectError> {
    let mut data = Vec::new();
    data.try_reserve_exact(samples)
        .map_err(|_| DetectError::ResourceExhausted {
            what: "baseline samples",
            requested: samples,
        })?;

    for _ in 0..samples {
        data.push(normalize(&sample_raw(rng)));
    }
    Ok(data)
}
