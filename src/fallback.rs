use tracing::debug;

use crate::config::FallbackConfig;
use crate::error::{ForecastError, ForecastResult};
use crate::model::{BandPrediction, BandSource, Horizon, Role};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineForecast {
    pub point: f64,
    pub std: f64,
    pub lower: f64,
    pub upper: f64,
    pub points_used: usize,
}

/// Flat moving-average projection over the most recent observations.
#[derive(Debug, Clone)]
pub struct FallbackEngine {
    cfg: FallbackConfig,
}

impl FallbackEngine {
    pub fn new(cfg: FallbackConfig) -> Self {
        Self { cfg }
    }

    pub fn version_label(&self) -> &str {
        &self.cfg.version_label
    }

    pub fn baseline(&self, closes: &[f64], horizon: Horizon) -> ForecastResult<BaselineForecast> {
        let finite: Vec<f64> = closes.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return Err(ForecastError::InsufficientData { have: 0, need: 1 });
        }
        let window = self.cfg.window.max(1);
        let recent = &finite[finite.len().saturating_sub(window)..];
        let n = recent.len();
        let mean = recent.iter().sum::<f64>() / n as f64;
        let sample_std = if n > 1 {
            (recent.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64).sqrt()
        } else {
            0.0
        };
        let mut std = sample_std * (horizon.days() as f64).sqrt();
        if n < window {
            std *= (window as f64 / n as f64).sqrt();
        }
        let floor = (self.cfg.min_relative_std * mean.abs()).max(1e-9);
        let std = std.max(floor);
        let half = self.cfg.z_score * std;
        debug!(points = n, mean, std, %horizon, "moving-average baseline");
        Ok(BaselineForecast {
            point: mean,
            std,
            lower: mean - half,
            upper: mean + half,
            points_used: n,
        })
    }

    /// The baseline standing in for one role.
    pub fn band_prediction(
        &self,
        role: Role,
        closes: &[f64],
        horizon: Horizon,
    ) -> ForecastResult<BandPrediction> {
        let base = self.baseline(closes, horizon)?;
        Ok(BandPrediction {
            role,
            horizon,
            point_value: base.point,
            residual_std: base.std,
            source: BandSource::Fallback,
        })
    }
}
