use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::analysis::features::{FeatureName, FeatureVector, FEATURE_COUNT};
use crate::analysis::stats::baseline_for;

/// Named attack archetypes the generator can inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackPattern {
    /// DDoS-style flood: very high packet and byte rate, few targets.
    VolumetricFlood,
    /// Bulk transfer to a handful of hosts over long-lived connections.
    Exfiltration,
    /// Port/host scanning: many destinations, tiny payloads.
    Reconnaissance,
    /// Periodic C2 check-ins: low, regular traffic to a single host.
    Beaconing,
}

impl AttackPattern {
    pub const ALL: [AttackPattern; 4] = [
        AttackPattern::VolumetricFlood,
        AttackPattern::Exfiltration,
        AttackPattern::Reconnaissance,
        AttackPattern::Beaconing,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AttackPattern::VolumetricFlood => "volumetric_flood",
            AttackPattern::Exfiltration => "exfiltration",
            AttackPattern::Reconnaissance => "reconnaissance",
            AttackPattern::Beaconing => "beaconing",
        }
    }

    /// Uniform choice among the archetypes.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    /// Draw one observation of this archetype.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, time_of_day_factor: f64) -> FeatureVector {
        let mut fv = jittered_means(rng, time_of_day_factor);
        match self {
            AttackPattern::VolumetricFlood => {
                fv.packet_rate = rng.gen_range(5_000.0..15_000.0);
                fv.byte_volume = rng.gen_range(500_000.0..1_500_000.0);
                fv.unique_destinations = rng.gen_range(2..=5) as f64;
                fv.protocol_entropy = rng.gen_range(0.2..0.5);
                fv.connection_duration = rng.gen_range(1.0..4.0);
            }
            AttackPattern::Exfiltration => {
                fv.packet_rate = rng.gen_range(100.0..300.0);
                fv.byte_volume = rng.gen_range(500_000.0..2_500_000.0);
                fv.unique_destinations = rng.gen_range(1..=3) as f64;
                fv.connection_duration = rng.gen_range(300.0..900.0);
            }
            AttackPattern::Reconnaissance => {
                fv.packet_rate = rng.gen_range(2_000.0..5_000.0);
                fv.byte_volume = rng.gen_range(5_000.0..15_000.0);
                fv.unique_destinations = rng.gen_range(100..=500) as f64;
                fv.connection_duration = rng.gen_range(0.5..2.5);
            }
            AttackPattern::Beaconing => {
                fv.packet_rate = rng.gen_range(10.0..30.0);
                fv.byte_volume = rng.gen_range(1_000.0..1_500.0);
                fv.unique_destinations = 1.0;
                fv.protocol_entropy = 0.1;
                fv.connection_duration = rng.gen_range(5.0..7.0);
            }
        }
        fv
    }
}

impl fmt::Display for AttackPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Every feature at its reference mean scaled by jitter in [0.8, 1.2],
/// except time of day, which is taken as given.
pub fn jittered_means<R: Rng + ?Sized>(rng: &mut R, time_of_day_factor: f64) -> FeatureVector {
    let mut values = [0.0; FEATURE_COUNT];
    for feature in FeatureName::ALL {
        values[feature.index()] = baseline_for(feature).mean * rng.gen_range(0.8..=1.2);
    }
    let mut fv = FeatureVector::from_array(values);
    fv.time_of_day_factor = time_of_day_factor;
    fv
}
