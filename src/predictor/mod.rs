pub mod attention;
pub mod conv;
pub mod readout;
pub mod recurrent;
pub mod trees;

use serde::{Deserialize, Serialize};

use crate::config::PredictorConfig;
use crate::error::{ForecastError, ForecastResult};
use crate::model::{Horizon, Role};

pub use attention::AttentionModel;
pub use conv::ConvLstmModel;
pub use trees::BoostedTrees;

/// Component-level forecast from one band model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandForecast {
    pub point_value: f64,
    pub residual_std: f64,
}

/// A supervised pair in window-normalized units.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub window: Vec<f64>,
    pub target: f64,
}

/// Per-window min-max scaling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalizer {
    pub min: f64,
    pub range: f64,
}

impl Normalizer {
    /// `None` for a flat window.
    pub fn fit(window: &[f64]) -> Option<Self> {
        let min = window.iter().copied().fold(f64::INFINITY, f64::min);
        let max = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;
        if !range.is_finite() || range <= 1e-12 * min.abs().max(max.abs()).max(1.0) {
            return None;
        }
        Some(Self { min, range })
    }

    pub fn scale(&self, v: f64) -> f64 {
        (v - self.min) / self.range
    }

    pub fn unscale(&self, v: f64) -> f64 {
        v * self.range + self.min
    }
}

/// Sliding windows of `context` values with the value `horizon_days` past
/// each window as target. Flat windows are skipped.
pub fn supervised_windows(series: &[f64], context: usize, horizon_days: usize) -> Vec<Sample> {
    if context == 0 || series.len() < context + horizon_days {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(series.len() - context - horizon_days + 1);
    for end in context..=series.len() - horizon_days {
        let raw = &series[end - context..end];
        let Some(norm) = Normalizer::fit(raw) else {
            continue;
        };
        out.push(Sample {
            window: raw.iter().map(|v| norm.scale(*v)).collect(),
            target: norm.scale(series[end + horizon_days - 1]),
        });
    }
    out
}

pub trait Predictor {
    fn role(&self) -> Role;
    fn horizon(&self) -> Horizon;
    fn context_len(&self) -> usize;
    /// In window-normalized units.
    fn residual_std(&self) -> f64;
    /// Normalized forecast from a normalized window of `context_len` values.
    fn infer(&self, normalized: &[f64]) -> f64;

    fn predict(&self, window: &[f64], horizon: Horizon) -> ForecastResult<BandForecast> {
        if horizon != self.horizon() {
            return Err(ForecastError::model_unavailable(
                self.role(),
                horizon,
                format!("parameters were fit for {}", self.horizon()),
            ));
        }
        let context = self.context_len();
        if window.len() < context {
            return Err(ForecastError::model_unavailable(
                self.role(),
                horizon,
                format!("window of {} is shorter than context {}", window.len(), context),
            ));
        }
        let recent = &window[window.len() - context..];
        let last = recent.last().copied().unwrap_or(0.0);
        let Some(norm) = Normalizer::fit(recent) else {
            return Ok(BandForecast {
                point_value: last,
                residual_std: 0.0,
            });
        };
        let scaled: Vec<f64> = recent.iter().map(|v| norm.scale(*v)).collect();
        let y = self.infer(&scaled);
        if !y.is_finite() {
            return Err(ForecastError::model_unavailable(
                self.role(),
                horizon,
                "non-finite model output",
            ));
        }
        Ok(BandForecast {
            point_value: norm.unscale(y),
            residual_std: self.residual_std() * norm.range,
        })
    }
}

pub(crate) fn residual_std_of<P: Predictor + ?Sized>(model: &P, samples: &[Sample]) -> f64 {
    let errors: Vec<f64> = samples
        .iter()
        .map(|s| s.target - model.infer(&s.window))
        .filter(|e| e.is_finite())
        .collect();
    rms(&errors)
}

pub(crate) fn rms(errors: &[f64]) -> f64 {
    if errors.is_empty() {
        return 0.0;
    }
    (errors.iter().map(|e| e * e).sum::<f64>() / errors.len() as f64).sqrt()
}

/// The three band models behind one interface. Serialized form is what the
/// registry stores as a version's parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "architecture", rename_all = "kebab-case")]
pub enum BandPredictor {
    LstmAttention(AttentionModel),
    ConvLstm(ConvLstmModel),
    BoostedTrees(BoostedTrees),
}

pub type ModelParams = BandPredictor;

impl BandPredictor {
    pub fn fit(
        role: Role,
        samples: &[Sample],
        horizon: Horizon,
        cfg: &PredictorConfig,
    ) -> ForecastResult<Self> {
        match role {
            Role::HighFreq => Ok(Self::LstmAttention(AttentionModel::fit(samples, horizon, cfg)?)),
            Role::MidFreq => Ok(Self::ConvLstm(ConvLstmModel::fit(samples, horizon, cfg)?)),
            Role::LowFreq => Ok(Self::BoostedTrees(BoostedTrees::fit(samples, horizon, cfg)?)),
        }
    }

    pub fn context_for(role: Role, cfg: &PredictorConfig) -> usize {
        match role {
            Role::HighFreq => cfg.high_context,
            Role::MidFreq => cfg.mid_context,
            Role::LowFreq => cfg.low_context,
        }
    }

    pub fn set_residual_std(&mut self, residual_std: f64) {
        match self {
            Self::LstmAttention(m) => m.residual_std = residual_std,
            Self::ConvLstm(m) => m.residual_std = residual_std,
            Self::BoostedTrees(m) => m.residual_std = residual_std,
        }
    }

    pub fn to_json(&self) -> ForecastResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> ForecastResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

impl Predictor for BandPredictor {
    fn role(&self) -> Role {
        match self {
            Self::LstmAttention(m) => m.role(),
            Self::ConvLstm(m) => m.role(),
            Self::BoostedTrees(m) => m.role(),
        }
    }

    fn horizon(&self) -> Horizon {
        match self {
            Self::LstmAttention(m) => m.horizon(),
            Self::ConvLstm(m) => m.horizon(),
            Self::BoostedTrees(m) => m.horizon(),
        }
    }

    fn context_len(&self) -> usize {
        match self {
            Self::LstmAttention(m) => m.context_len(),
            Self::ConvLstm(m) => m.context_len(),
            Self::BoostedTrees(m) => m.context_len(),
        }
    }

    fn residual_std(&self) -> f64 {
        match self {
            Self::LstmAttention(m) => m.residual_std(),
            Self::ConvLstm(m) => m.residual_std(),
            Self::BoostedTrees(m) => m.residual_std(),
        }
    }

    fn infer(&self, normalized: &[f64]) -> f64 {
        match self {
            Self::LstmAttention(m) => m.infer(normalized),
            Self::ConvLstm(m) => m.infer(normalized),
            Self::BoostedTrees(m) => m.infer(normalized),
        }
    }
}
