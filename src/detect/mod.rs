//! Anomaly scoring, classification, and the detector lifecycle.

pub mod anomaly;
pub mod engine;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analysis::features::FeatureName;

pub use anomaly::AnomalyResult;
pub use engine::{Detector, DetectorState, ModelMetrics, SharedDetector};

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("resource exhausted: could not allocate {requested} entries for {what}")]
    ResourceExhausted { what: &'static str, requested: usize },

    #[error("training already in progress")]
    TrainingInProgress,

    #[error("training task aborted: {0}")]
    TrainingAborted(String),

    #[error("invalid {feature} value {value}: {reason}")]
    InvalidFeature {
        feature: FeatureName,
        value: f64,
        reason: &'static str,
    },
}

/// Severity band of an anomaly score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Normal,
    Suspicious,
    Anomalous,
    Critical,
}

impl Classification {
    pub const ALL: [Classification; 4] = [
        Classification::Normal,
        Classification::Suspicious,
        Classification::Anomalous,
        Classification::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Normal => "NORMAL",
            Classification::Suspicious => "SUSPICIOUS",
            Classification::Anomalous => "ANOMALOUS",
            Classification::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Map a 0-100 score to its band. Lower bounds are inclusive.
pub fn classify(score: f64) -> Classification {
    if score >= 80.0 {
        Classification::Critical
    } else if score >= 50.0 {
        Classification::Anomalous
    } else if score >= 25.0 {
        Classification::Suspicious
    } else {
        Classification::Normal
    }
}
