use serde::{Deserialize, Serialize};

use crate::analysis::features::{FeatureName, FeatureVector, FEATURE_COUNT};

/// Reference distribution of one feature under normal operation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub mean: f64,
    pub std_dev: f64,
}

impl Baseline {
    const fn new(mean: f64, std_dev: f64) -> Self {
        Self { mean, std_dev }
    }

    /// Standard deviation used as a divisor. Never below 1.
    pub fn spread(&self) -> f64 {
        self.std_dev.max(1.0)
    }

    /// Z = (value - mean) / max(std_dev, 1)
    pub fn z_score(&self, value: f64) -> f64 {
        (value - self.mean) / self.spread()
    }
}

/// Fixed reference statistics, indexed in [`FeatureName`] order.
pub const FEATURE_STATS: [Baseline; FEATURE_COUNT] = [
    Baseline::new(500.0, 200.0),      // packetRate
    Baseline::new(50_000.0, 20_000.0), // byteVolume
    Baseline::new(25.0, 10.0),        // uniqueDestinations
    Baseline::new(2.5, 0.5),          // protocolEntropy
    Baseline::new(0.5, 0.25),         // timeOfDayFactor
    Baseline::new(30.0, 15.0),        // connectionDuration
];

pub fn baseline_for(feature: FeatureName) -> &'static Baseline {
    &FEATURE_STATS[feature.index()]
}

/// The vector whose every feature sits exactly on its reference mean.
pub fn reference_means() -> FeatureVector {
    let mut values = [0.0; FEATURE_COUNT];
    for (slot, stats) in values.iter_mut().zip(FEATURE_STATS.iter()) {
        *slot = stats.mean;
    }
    FeatureVector::from_array(values)
}

/// Standardize a raw observation against the reference table, for the
/// learned model.
pub fn normalize(features: &FeatureVector) -> [f64; FEATURE_COUNT] {
    let raw = features.to_array();
    let mut norm = [0.0; FEATURE_COUNT];
    for (i, stats) in FEATURE_STATS.iter().enumerate() {
        norm[i] = (raw[i] - stats.mean) / stats.spread();
    }
    norm
}

/// Absolute z-score of every feature, computed directly from the raw values.
pub fn abs_z_scores(features: &FeatureVector) -> [f64; FEATURE_COUNT] {
    let mut z = [0.0; FEATURE_COUNT];
    for feature in FeatureName::ALL {
        z[feature.index()] = baseline_for(feature).z_score(features.get(feature)).abs();
    }
    z
}
