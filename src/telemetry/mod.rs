//! Synthetic traffic telemetry for exercising the detector.

pub mod patterns;

use chrono::{Local, NaiveTime, Timelike};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::analysis::features::FeatureVector;

pub use patterns::AttackPattern;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Fraction of the day elapsed at `time`, in [0, 1).
pub fn time_of_day_factor(time: NaiveTime) -> f64 {
    time.num_seconds_from_midnight() as f64 / SECONDS_PER_DAY
}

/// Produces normal or attack-shaped feature vectors.
#[derive(Debug, Clone)]
pub struct TelemetryGenerator<R = StdRng> {
    rng: R,
}

impl TelemetryGenerator<StdRng> {
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    /// Reproducible stream of observations.
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> TelemetryGenerator<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// One observation stamped with the current local time of day. With
    /// `inject_anomaly`, a uniformly chosen attack archetype.
    pub fn generate(&mut self, inject_anomaly: bool) -> FeatureVector {
        self.generate_labeled(inject_anomaly).0
    }

    /// Like [`generate`](Self::generate), also reporting which archetype was
    /// injected, if any.
    pub fn generate_labeled(
        &mut self,
        inject_anomaly: bool,
    ) -> (FeatureVector, Option<AttackPattern>) {
        self.generate_labeled_at(inject_anomaly, Local::now().time())
    }

    pub fn generate_labeled_at(
        &mut self,
        inject_anomaly: bool,
        time: NaiveTime,
    ) -> (FeatureVector, Option<AttackPattern>) {
        if inject_anomaly {
            let pattern = AttackPattern::random(&mut self.rng);
            (self.generate_pattern_at(pattern, time), Some(pattern))
        } else {
            (self.generate_normal_at(time), None)
        }
    }

    pub fn generate_normal_at(&mut self, time: NaiveTime) -> FeatureVector {
        patterns::jittered_means(&mut self.rng, time_of_day_factor(time))
    }

    pub fn generate_pattern_at(
        &mut self,
        pattern: AttackPattern,
        time: NaiveTime,
    ) -> FeatureVector {
        pattern.sample(&mut self.rng, time_of_day_factor(time))
    }
}

/// One-shot observation using the thread-local RNG.
pub fn generate_telemetry(inject_anomaly: bool) -> FeatureVector {
    TelemetryGenerator::new(rand::thread_rng()).generate(inject_anomaly)
}
