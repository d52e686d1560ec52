use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ForecastError;
use crate::model::MIN_MODEL_HISTORY;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub decomposer: DecomposerConfig,
    pub predictor: PredictorConfig,
    pub ensemble: EnsembleConfig,
    pub fallback: FallbackConfig,
    pub sentiment: SentimentConfig,
    pub orchestrator: OrchestratorConfig,
    pub registry: RegistryConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DecomposerConfig {
    /// Oscillatory modes emitted, highest frequency first.
    pub modes: usize,
    /// Bandwidth penalty.
    pub alpha: f64,
    /// Dual ascent step; 0 lets the modes absorb noise.
    pub tau: f64,
    /// Relative squared update below which iteration stops.
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for DecomposerConfig {
    fn default() -> Self {
        Self {
            modes: 4,
            alpha: 2000.0,
            tau: 0.0,
            tolerance: 1e-6,
            max_iterations: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PredictorConfig {
    pub min_history: usize,
    /// Bars requested from the price source per forecast.
    pub lookback: usize,
    pub high_context: usize,
    pub mid_context: usize,
    pub low_context: usize,
    pub low_lags: usize,
    pub hidden_size: usize,
    pub conv_filters: usize,
    pub ridge: f64,
    pub trees: usize,
    pub tree_depth: usize,
    pub learning_rate: f64,
    pub min_leaf: usize,
    pub seed: u64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            min_history: MIN_MODEL_HISTORY,
            lookback: 260,
            high_context: 30,
            mid_context: 40,
            low_context: 20,
            low_lags: 8,
            hidden_size: 12,
            conv_filters: 6,
            ridge: 1e-3,
            trees: 60,
            tree_depth: 3,
            learning_rate: 0.1,
            min_leaf: 4,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// Per-role error samples needed before weights leave the equal split.
    pub min_error_samples: usize,
    pub history_limit: usize,
    /// Pseudo-observations backing the pooled-variance prior.
    pub prior_strength: f64,
    pub shrink_k: f64,
    pub z_score: f64,
    pub min_relative_std: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            min_error_samples: 30,
            history_limit: 250,
            prior_strength: 4.0,
            shrink_k: 40.0,
            z_score: 1.96,
            min_relative_std: 1e-3,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub window: usize,
    pub z_score: f64,
    pub min_relative_std: f64,
    pub version_label: String,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            window: 7,
            z_score: 1.96,
            min_relative_std: 1e-3,
            version_label: "ma-baseline-v1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SentimentConfig {
    pub enabled: bool,
    pub max_adjustment: f64,
    pub window_days: u32,
}

impl Default for SentimentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_adjustment: 0.02,
            window_days: 7,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub fetch_timeout_ms: u64,
    pub registry_timeout_ms: u64,
    pub sentiment_timeout_ms: u64,
    pub band_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 5_000,
            registry_timeout_ms: 2_000,
            sentiment_timeout_ms: 2_000,
            band_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub path: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/model_registry.sqlite"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn config_path() -> PathBuf {
    std::env::var("BANDCAST_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config/default.toml"))
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = Self::load_from_path(&config_path())?;
        if let Ok(path) = std::env::var("BANDCAST_REGISTRY_PATH") {
            if !path.trim().is_empty() {
                config.registry.path = PathBuf::from(path);
            }
        }
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("{} is invalid", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ForecastError> {
        let d = &self.decomposer;
        if d.modes == 0 || d.modes > 10 {
            return Err(cfg_err(format!(
                "decomposer.modes must be within 1..=10, got {}",
                d.modes
            )));
        }
        if !(d.alpha.is_finite() && d.alpha > 0.0) {
            return Err(cfg_err("decomposer.alpha must be > 0"));
        }
        if !(d.tau.is_finite() && d.tau >= 0.0) {
            return Err(cfg_err("decomposer.tau must be >= 0"));
        }
        if !(d.tolerance.is_finite() && d.tolerance > 0.0) {
            return Err(cfg_err("decomposer.tolerance must be > 0"));
        }
        if d.max_iterations == 0 {
            return Err(cfg_err("decomposer.max_iterations must be > 0"));
        }

        let p = &self.predictor;
        if p.min_history < MIN_MODEL_HISTORY {
            return Err(cfg_err(format!(
                "predictor.min_history must be >= {}",
                MIN_MODEL_HISTORY
            )));
        }
        if p.lookback < p.min_history {
            return Err(cfg_err("predictor.lookback must be >= predictor.min_history"));
        }
        for (name, ctx) in [
            ("high_context", p.high_context),
            ("mid_context", p.mid_context),
            ("low_context", p.low_context),
        ] {
            if ctx < 4 || ctx > p.min_history {
                return Err(cfg_err(format!(
                    "predictor.{} must be within 4..={}",
                    name, p.min_history
                )));
            }
        }
        if p.low_lags == 0 || p.low_lags >= p.low_context {
            return Err(cfg_err("predictor.low_lags must be within 1..low_context"));
        }
        if p.hidden_size == 0 || p.conv_filters == 0 || p.trees == 0 || p.tree_depth == 0 {
            return Err(cfg_err(
                "predictor.hidden_size, conv_filters, trees and tree_depth must be > 0",
            ));
        }
        if !(p.learning_rate > 0.0 && p.learning_rate <= 1.0) {
            return Err(cfg_err("predictor.learning_rate must be within (0, 1]"));
        }
        if !(p.ridge.is_finite() && p.ridge >= 0.0) {
            return Err(cfg_err("predictor.ridge must be >= 0"));
        }

        let e = &self.ensemble;
        if e.min_error_samples < 2 {
            return Err(cfg_err("ensemble.min_error_samples must be >= 2"));
        }
        if e.history_limit < e.min_error_samples {
            return Err(cfg_err(
                "ensemble.history_limit must be >= ensemble.min_error_samples",
            ));
        }
        if !(e.prior_strength.is_finite() && e.prior_strength > 0.0) {
            return Err(cfg_err("ensemble.prior_strength must be > 0"));
        }
        if !(e.shrink_k.is_finite() && e.shrink_k >= 0.0) {
            return Err(cfg_err("ensemble.shrink_k must be >= 0"));
        }
        if !(e.z_score.is_finite() && e.z_score > 0.0) {
            return Err(cfg_err("ensemble.z_score must be > 0"));
        }
        if !(e.min_relative_std.is_finite() && e.min_relative_std > 0.0) {
            return Err(cfg_err("ensemble.min_relative_std must be > 0"));
        }

        let f = &self.fallback;
        if f.window == 0 {
            return Err(cfg_err("fallback.window must be > 0"));
        }
        if !(f.z_score.is_finite() && f.z_score > 0.0) {
            return Err(cfg_err("fallback.z_score must be > 0"));
        }
        if !(f.min_relative_std.is_finite() && f.min_relative_std > 0.0) {
            return Err(cfg_err("fallback.min_relative_std must be > 0"));
        }

        let s = &self.sentiment;
        if !(s.max_adjustment > 0.0 && s.max_adjustment <= 0.02) {
            return Err(cfg_err("sentiment.max_adjustment must be within (0, 0.02]"));
        }

        let o = &self.orchestrator;
        if o.fetch_timeout_ms == 0
            || o.registry_timeout_ms == 0
            || o.sentiment_timeout_ms == 0
            || o.band_timeout_ms == 0
        {
            return Err(cfg_err("orchestrator timeouts must be > 0"));
        }
        Ok(())
    }
}

fn cfg_err(msg: impl Into<String>) -> ForecastError {
    ForecastError::Configuration(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_default_toml() {
        let toml_str = r#"
[decomposer]
modes = 3
alpha = 1500.0
tolerance = 1e-5
max_iterations = 300

[predictor]
lookback = 200
hidden_size = 8

[ensemble]
min_error_samples = 20

[fallback]
window = 5

[sentiment]
max_adjustment = 0.02

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.decomposer.modes, 3);
        assert!((config.decomposer.alpha - 1500.0).abs() < f64::EPSILON);
        assert_eq!(config.decomposer.tau, 0.0);
        assert_eq!(config.predictor.lookback, 200);
        assert_eq!(config.predictor.high_context, 30);
        assert_eq!(config.ensemble.min_error_samples, 20);
        assert_eq!(config.fallback.window, 5);
        assert_eq!(config.logging.level, "debug");
        config.validate().unwrap();
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.decomposer.modes, 4);
        assert_eq!(config.orchestrator.fetch_timeout_ms, 5_000);
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = Config::default();
        config.decomposer.modes = 0;
        assert!(matches!(
            config.validate(),
            Err(ForecastError::Configuration(_))
        ));

        let mut config = Config::default();
        config.predictor.high_context = 90;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.sentiment.max_adjustment = 0.9;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.ensemble.z_score = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.fallback.window = 0;
        assert!(config.validate().is_err());
    }
}
