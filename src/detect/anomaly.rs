use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::features::{FeatureName, FeatureVector, FEATURE_COUNT};
use crate::analysis::stats::abs_z_scores;
use crate::detect::{classify, Classification};

/// RMS reconstruction error above which an observation is anomalous.
pub const RECONSTRUCTION_THRESHOLD: f64 = 0.35;

/// Mean |z| above which the statistical path flags an observation.
pub const STATISTICAL_THRESHOLD: f64 = 2.0;

/// Which scorer produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringPath {
    Reconstruction,
    Statistical,
}

/// Outcome of scoring a single observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyResult {
    /// 0 to 100.
    pub score: f64,
    pub is_anomaly: bool,
    /// 0 to 1.
    pub confidence: f64,
    /// RMS reconstruction error, or mean |z| on the statistical path.
    pub reconstruction_error: f64,
    /// Share of the total per-feature error, summing to 1.
    pub feature_contributions: BTreeMap<FeatureName, f64>,
    pub timestamp: DateTime<Utc>,
    pub classification: Classification,
    pub scoring_path: ScoringPath,
}

impl AnomalyResult {
    /// Feature carrying the largest share of the error.
    pub fn top_contributor(&self) -> Option<(FeatureName, f64)> {
        self.feature_contributions
            .iter()
            .map(|(name, weight)| (*name, *weight))
            .max_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// Normalize per-feature errors into weights. A zero total spreads the
/// weight evenly so the map still sums to 1.
fn contributions(errors: &[f64; FEATURE_COUNT]) -> BTreeMap<FeatureName, f64> {
    let total: f64 = errors.iter().sum();
    FeatureName::ALL
        .iter()
        .map(|feature| {
            let weight = if total > 0.0 {
                errors[feature.index()] / total
            } else {
                1.0 / FEATURE_COUNT as f64
            };
            (*feature, weight)
        })
        .collect()
}

/// Score a normalized observation against the model's reconstruction of it.
pub fn score_reconstruction(
    normalized: &[f64; FEATURE_COUNT],
    reconstruction: &[f64; FEATURE_COUNT],
) -> AnomalyResult {
    let mut errors = [0.0; FEATURE_COUNT];
    for (i, err) in errors.iter_mut().enumerate() {
        *err = (normalized[i] - reconstruction[i]).abs();
    }
    let rms = (errors.iter().map(|e| e * e).sum::<f64>() / FEATURE_COUNT as f64).sqrt();

    let score = (rms / RECONSTRUCTION_THRESHOLD * 50.0).min(100.0);

    AnomalyResult {
        score,
        is_anomaly: rms > RECONSTRUCTION_THRESHOLD,
        confidence: (0.5 + rms * 0.5).min(0.99),
        reconstruction_error: rms,
        feature_contributions: contributions(&errors),
        timestamp: Utc::now(),
        classification: classify(score),
        scoring_path: ScoringPath::Reconstruction,
    }
}

/// Score a raw observation by its z-scores alone. Needs no training.
pub fn score_statistical(features: &FeatureVector) -> AnomalyResult {
    let z = abs_z_scores(features);
    let aggregate = z.iter().sum::<f64>() / FEATURE_COUNT as f64;

    let score = (aggregate * 25.0).min(100.0);

    AnomalyResult {
        score,
        is_anomaly: aggregate > STATISTICAL_THRESHOLD,
        confidence: (0.3 + aggregate * 0.15).min(0.8),
        reconstruction_error: aggregate,
        feature_contributions: contributions(&z),
        timestamp: Utc::now(),
        classification: classify(score),
        scoring_path: ScoringPath::Statistical,
    }
}
