//! Traffic Sentinel -- network-traffic anomaly detection engine.
//!
//! This crate provides a self-supervised reconstruction model trained on a
//! synthetic baseline of normal traffic, a statistical z-score fallback used
//! whenever the model is unavailable, and a synthetic telemetry generator for
//! exercising both.

pub mod analysis;
pub mod config;
pub mod detect;
pub mod telemetry;

pub use analysis::features::{FeatureName, FeatureVector};
pub use config::EngineConfig;
pub use detect::{
    classify, AnomalyResult, Classification, DetectError, Detector, DetectorState, ModelMetrics,
    SharedDetector,
};
pub use telemetry::{generate_telemetry, AttackPattern, TelemetryGenerator};
