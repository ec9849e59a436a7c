//! Layered configuration loading utilities.

use std::path::{Path, PathBuf};

use anyhow::Result;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Validation failures reported before anything is spawned.
#[derive(Debug, Error)]
pub enum ConfigValidationError {
    #[error("must have at least one scanner configured")]
    NoScanners,
    #[error("must have at least one strategy configured")]
    NoStrategies,
    #[error("session.consumer_ratio must be at least 1")]
    InvalidConsumerRatio,
    #[error("session.max_symbols must be at least 1")]
    InvalidMaxSymbols,
    #[error("session.queue_depth must be at least 1")]
    InvalidQueueDepth,
    #[error("invalid scanner configuration: {0}")]
    InvalidScanner(String),
}

/// Root application configuration deserialized from layered sources.
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_path: Option<PathBuf>,
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
    /// Skip market-schedule gating entirely; the session starts immediately.
    #[serde(default)]
    pub bypass_market_schedule: bool,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub scanners: Vec<ScannerSpec>,
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
}

/// Parameters consumed by the orchestration pipeline.
#[derive(Clone, Debug, Deserialize)]
pub struct SessionConfig {
    /// Symbols-per-shard target; shard count is `ceil(universe / ratio)`.
    #[serde(default = "default_consumer_ratio")]
    pub consumer_ratio: usize,
    /// Hard cap on how many symbols are prefetched and traded.
    #[serde(default = "default_max_symbols")]
    pub max_symbols: usize,
    /// Bound on each shard's inbound event queue.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// Minutes of bar history prefetched per symbol.
    #[serde(default = "default_history_lookback")]
    pub history_lookback: usize,
    /// Grace period before in-flight tasks are aborted on interrupt.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            consumer_ratio: default_consumer_ratio(),
            max_symbols: default_max_symbols(),
            queue_depth: default_queue_depth(),
            history_lookback: default_history_lookback(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

/// Whether a scanner resolves to a built-in implementation or one registered
/// by the embedding application.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScannerKind {
    #[default]
    Builtin,
    Custom,
}

/// One configured scanner, run in configuration order.
#[derive(Clone, Debug, Deserialize)]
pub struct ScannerSpec {
    pub name: String,
    #[serde(default)]
    pub kind: ScannerKind,
    /// Re-run the scanner periodically during the session.
    #[serde(default)]
    pub recurrence: bool,
    /// Scanner-specific key/value parameters.
    #[serde(default, flatten)]
    pub params: Value,
}

/// One configured strategy; evaluation itself lives behind the consumer seam.
#[derive(Clone, Debug, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    #[serde(default, flatten)]
    pub params: Value,
}

impl AppConfig {
    /// Reject configurations that must never reach the pipeline.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.scanners.is_empty() {
            return Err(ConfigValidationError::NoScanners);
        }
        if self.strategies.is_empty() {
            return Err(ConfigValidationError::NoStrategies);
        }
        for scanner in &self.scanners {
            if scanner.name.trim().is_empty() {
                return Err(ConfigValidationError::InvalidScanner(
                    "scanner name must not be empty".into(),
                ));
            }
        }
        if self.session.consumer_ratio == 0 {
            return Err(ConfigValidationError::InvalidConsumerRatio);
        }
        if self.session.max_symbols == 0 {
            return Err(ConfigValidationError::InvalidMaxSymbols);
        }
        if self.session.queue_depth == 0 {
            return Err(ConfigValidationError::InvalidQueueDepth);
        }
        Ok(())
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_addr() -> String {
    "127.0.0.1:9100".into()
}

fn default_consumer_ratio() -> usize {
    30
}

fn default_max_symbols() -> usize {
    440
}

fn default_queue_depth() -> usize {
    1024
}

fn default_history_lookback() -> usize {
    390
}

fn default_shutdown_grace_secs() -> u64 {
    2
}

/// Loads configuration by merging files and environment variables.
///
/// Sources (lowest to highest precedence):
/// 1. `config/default.toml`
/// 2. `config/{environment}.toml` (if `environment` is Some)
/// 3. `config/local.toml` (optional, ignored in git)
/// 4. Environment variables prefixed with `TRELLIS_`
pub fn load_config(env: Option<&str>) -> Result<AppConfig> {
    let base_path = Path::new("config");

    let mut builder =
        Config::builder().add_source(File::from(base_path.join("default.toml")).required(true));
    if let Some(env_name) = env {
        builder = builder
            .add_source(File::from(base_path.join(format!("{env_name}.toml"))).required(false));
    }

    builder = builder.add_source(File::from(base_path.join("local.toml")).required(false));

    builder = builder.add_source(
        Environment::with_prefix("TRELLIS")
            .separator("__")
            .ignore_empty(true),
    );

    let config = builder.build()?;
    config
        .try_deserialize()
        .map_err(|err: ConfigError| err.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> AppConfig {
        let value: toml::Value = toml::from_str(toml_src).unwrap();
        let json = serde_json::to_value(value).unwrap();
        serde_json::from_value(json).unwrap()
    }

    const MINIMAL: &str = r#"
        [[scanners]]
        name = "momentum"
        min_share_price = 2.0
        max_share_price = 20.0

        [[strategies]]
        name = "momentum-long"
    "#;

    #[test]
    fn minimal_config_passes_validation() {
        let cfg = parse(MINIMAL);
        cfg.validate().unwrap();
        assert_eq!(cfg.session.consumer_ratio, 30);
        assert_eq!(cfg.session.max_symbols, 440);
        assert!(!cfg.bypass_market_schedule);
        assert_eq!(cfg.scanners[0].kind, ScannerKind::Builtin);
        assert!(!cfg.scanners[0].recurrence);
        assert!(cfg.scanners[0].params.get("min_share_price").is_some());
    }

    #[test]
    fn missing_scanners_is_rejected() {
        let cfg = parse(
            r#"
            [[strategies]]
            name = "momentum-long"
        "#,
        );
        assert!(matches!(
            cfg.validate(),
            Err(ConfigValidationError::NoScanners)
        ));
    }

    #[test]
    fn missing_strategies_is_rejected() {
        let cfg = parse(
            r#"
            [[scanners]]
            name = "momentum"
        "#,
        );
        assert!(matches!(
            cfg.validate(),
            Err(ConfigValidationError::NoStrategies)
        ));
    }

    #[test]
    fn zero_ratio_is_rejected() {
        let mut cfg = parse(MINIMAL);
        cfg.session.consumer_ratio = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigValidationError::InvalidConsumerRatio)
        ));
    }

    #[test]
    fn custom_kind_parses() {
        let cfg = parse(
            r#"
            [[scanners]]
            name = "overnight-gappers"
            kind = "custom"
            recurrence = true

            [[strategies]]
            name = "momentum-long"
        "#,
        );
        assert_eq!(cfg.scanners[0].kind, ScannerKind::Custom);
        assert!(cfg.scanners[0].recurrence);
    }
}
