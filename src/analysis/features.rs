use serde::{Deserialize, Serialize};
use std::fmt;

use crate::detect::DetectError;

/// Number of measurements in one observation window.
pub const FEATURE_COUNT: usize = 6;

/// The monitored measurements, in the stable order used by every vector
/// representation in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeatureName {
    PacketRate,
    ByteVolume,
    UniqueDestinations,
    ProtocolEntropy,
    TimeOfDayFactor,
    ConnectionDuration,
}

impl FeatureName {
    pub const ALL: [FeatureName; FEATURE_COUNT] = [
        FeatureName::PacketRate,
        FeatureName::ByteVolume,
        FeatureName::UniqueDestinations,
        FeatureName::ProtocolEntropy,
        FeatureName::TimeOfDayFactor,
        FeatureName::ConnectionDuration,
    ];

    /// Wire name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureName::PacketRate => "packetRate",
            FeatureName::ByteVolume => "byteVolume",
            FeatureName::UniqueDestinations => "uniqueDestinations",
            FeatureName::ProtocolEntropy => "protocolEntropy",
            FeatureName::TimeOfDayFactor => "timeOfDayFactor",
            FeatureName::ConnectionDuration => "connectionDuration",
        }
    }

    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for FeatureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// One observation window of traffic statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVector {
    /// Packets per second.
    pub packet_rate: f64,
    /// Bytes per second.
    pub byte_volume: f64,
    /// Count of distinct destination addresses.
    pub unique_destinations: f64,
    /// Shannon entropy of the protocol distribution.
    pub protocol_entropy: f64,
    /// Position within the day, 0.0 (midnight) to 1.0.
    pub time_of_day_factor: f64,
    /// Average connection duration in seconds.
    pub connection_duration: f64,
}

impl FeatureVector {
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [
            self.packet_rate,
            self.byte_volume,
            self.unique_destinations,
            self.protocol_entropy,
            self.time_of_day_factor,
            self.connection_duration,
        ]
    }

    pub fn from_array(values: [f64; FEATURE_COUNT]) -> Self {
        Self {
            packet_rate: values[0],
            byte_volume: values[1],
            unique_destinations: values[2],
            protocol_entropy: values[3],
            time_of_day_factor: values[4],
            connection_duration: values[5],
        }
    }

    pub fn get(&self, feature: FeatureName) -> f64 {
        self.to_array()[feature.index()]
    }

    /// Check that every measurement is finite and inside its domain.
    ///
    /// Detection itself never rejects input; this is for the edges that
    /// accept vectors from outside (CLI, ingestion).
    pub fn validate(&self) -> Result<(), DetectError> {
        for feature in FeatureName::ALL {
            let value = self.get(feature);
            if !value.is_finite() {
                return Err(DetectError::InvalidFeature {
                    feature,
                    value,
                    reason: "must be finite",
                });
            }
            if value < 0.0 {
                return Err(DetectError::InvalidFeature {
                    feature,
                    value,
                    reason: "must be non-negative",
                });
            }
        }
        if self.time_of_day_factor > 1.0 {
            return Err(DetectError::InvalidFeature {
                feature: FeatureName::TimeOfDayFactor,
                value: self.time_of_day_factor,
                reason: "must be within [0, 1]",
            });
        }
        Ok(())
    }
}
