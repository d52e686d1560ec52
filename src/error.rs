use thiserror::Error;

use crate::model::{Horizon, Role};

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("insufficient data: {have} observations, need {need}")]
    InsufficientData { have: usize, need: usize },

    #[error("decomposition unavailable: {0}")]
    DecompositionUnavailable(String),

    #[error("model unavailable for {role}/{horizon}: {reason}")]
    ModelUnavailable {
        role: Role,
        horizon: Horizon,
        reason: String,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("registry error: {0}")]
    Registry(String),

    #[error("error history unavailable: {0}")]
    History(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ForecastError {
    pub fn model_unavailable(role: Role, horizon: Horizon, reason: impl Into<String>) -> Self {
        Self::ModelUnavailable {
            role,
            horizon,
            reason: reason.into(),
        }
    }

    /// Errors that send the whole request to the statistical baseline.
    pub fn is_request_fallback(&self) -> bool {
        matches!(
            self,
            Self::InsufficientData { .. } | Self::DecompositionUnavailable(_)
        )
    }

    /// Errors that degrade a single band to its baseline contribution.
    pub fn is_band_fallback(&self) -> bool {
        matches!(
            self,
            Self::ModelUnavailable { .. } | Self::Registry(_) | Self::Json(_)
        )
    }
}

pub type ForecastResult<T> = std::result::Result<T, ForecastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_request_and_band_fallbacks() {
        let short = ForecastError::InsufficientData { have: 12, need: 60 };
        assert!(short.is_request_fallback());
        assert!(!short.is_band_fallback());

        let vmd = ForecastError::DecompositionUnavailable("no convergence".to_string());
        assert!(vmd.is_request_fallback());

        let missing = ForecastError::model_unavailable(Role::LowFreq, Horizon::OneDay, "none");
        assert!(missing.is_band_fallback());
        assert!(!missing.is_request_fallback());

        let cfg = ForecastError::Configuration("modes must be > 0".to_string());
        assert!(!cfg.is_band_fallback());
        assert!(!cfg.is_request_fallback());
    }

    #[test]
    fn display_includes_role_and_horizon() {
        let err = ForecastError::model_unavailable(Role::HighFreq, Horizon::SevenDays, "untrained");
        assert_eq!(
            err.to_string(),
            "model unavailable for high_freq/7d: untrained"
        );
    }
}
