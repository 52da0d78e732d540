//! TOML configuration for the detection engine.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration. The reference statistics and the reconstruction
//! threshold are not configurable.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analysis::model::TrainingParams;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "TRAFFIC_SENTINEL_CONFIG";

/// System-wide config location, checked after [`CONFIG_ENV`].
pub const SYSTEM_CONFIG_PATH: &str = "/etc/traffic-sentinel/config.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded engine configuration");
        Ok(config)
    }

    /// Try, in order: the file named by `TRAFFIC_SENTINEL_CONFIG`, the system
    /// config file, then compiled-in defaults.
    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "{} set but file could not be loaded, trying fallback",
                        CONFIG_ENV
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Training
// ---------------------------------------------------------------------------

/// Learned-model training settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Passes over the synthetic baseline.
    pub epochs: usize,
    /// Synthetic baseline vectors generated per training run.
    pub samples: usize,
    /// Mini-batch size.
    pub batch_size: usize,
    /// Adam step size.
    pub learning_rate: f64,
    /// Fixed RNG seed. Unset means a fresh entropy seed per detector.
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            samples: 500,
            batch_size: 32,
            learning_rate: 0.01,
            seed: None,
        }
    }
}

impl TrainingConfig {
    pub fn params(&self, epochs: usize) -> TrainingParams {
        TrainingParams {
            epochs,
            batch_size: self.batch_size,
            learning_rate: self.learning_rate,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.training.epochs, 50);
        assert_eq!(cfg.training.samples, 500);
        assert_eq!(cfg.training.batch_size, 32);
        assert_eq!(cfg.training.learning_rate, 0.01);
        assert!(cfg.training.seed.is_none());
        assert_eq!(cfg.logging.level, "info");
        assert!(!cfg.logging.json);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_str = r#"
[training]
epochs = 10
seed = 99
"#;
        let cfg: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.training.epochs, 10);
        assert_eq!(cfg.training.seed, Some(99));
        assert_eq!(cfg.training.samples, 500);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_empty_toml_uses_all_defaults() {
        let cfg: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.training.batch_size, 32);
        assert!(!cfg.logging.json);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[training]
samples = 64
learning_rate = 0.005

[logging]
level = "debug"
json = true
"#,
        )
        .unwrap();

        let cfg = EngineConfig::load(&path).unwrap();
        assert_eq!(cfg.training.samples, 64);
        assert_eq!(cfg.training.learning_rate, 0.005);
        assert_eq!(cfg.logging.level, "debug");
        assert!(cfg.logging.json);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let result = EngineConfig::load(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_params_carry_optimizer_settings() {
        let cfg = TrainingConfig {
            batch_size: 16,
            learning_rate: 0.02,
            ..Default::default()
        };
        let params = cfg.params(7);
        assert_eq!(params.epochs, 7);
        assert_eq!(params.batch_size, 16);
        assert_eq!(params.learning_rate, 0.02);
    }
}
