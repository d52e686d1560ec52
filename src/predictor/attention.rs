use serde::{Deserialize, Serialize};

use crate::config::PredictorConfig;
use crate::error::ForecastResult;
use crate::model::{Horizon, Role};

use super::readout::{apply, fit_ridge};
use super::recurrent::{dot, LstmCell};
use super::{residual_std_of, Predictor, Sample};

/// High-frequency band: LSTM over the window, scaled dot-product attention
/// with the last hidden state as the query, ridge readout on
/// `[context, last_hidden, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionModel {
    pub horizon: Horizon,
    pub context: usize,
    pub residual_std: f64,
    cell: LstmCell,
    readout: Vec<f64>,
}

impl AttentionModel {
    pub fn fit(samples: &[Sample], horizon: Horizon, cfg: &PredictorConfig) -> ForecastResult<Self> {
        let cell = LstmCell::seeded(1, cfg.hidden_size, cfg.seed);
        let features: Vec<Vec<f64>> = samples.iter().map(|s| features(&cell, &s.window)).collect();
        let targets: Vec<f64> = samples.iter().map(|s| s.target).collect();
        let readout = fit_ridge(&features, &targets, cfg.ridge)?;
        let mut model = Self {
            horizon,
            context: cfg.high_context,
            residual_std: 0.0,
            cell,
            readout,
        };
        model.residual_std = residual_std_of(&model, samples);
        Ok(model)
    }
}

fn features(cell: &LstmCell, window: &[f64]) -> Vec<f64> {
    let inputs: Vec<Vec<f64>> = window.iter().map(|v| vec![*v]).collect();
    let states = cell.run(&inputs);
    let hs = cell.hidden_size;
    let last = states.last().cloned().unwrap_or_else(|| vec![0.0; hs]);

    let scale = (hs as f64).sqrt();
    let scores: Vec<f64> = states.iter().map(|h| dot(h, &last) / scale).collect();
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exp.iter().sum();

    let mut context = vec![0.0; hs];
    if total > 0.0 {
        for (h, e) in states.iter().zip(&exp) {
            let a = e / total;
            for (c, v) in context.iter_mut().zip(h) {
                *c += a * v;
            }
        }
    }

    let mut out = context;
    out.extend_from_slice(&last);
    out.push(1.0);
    out
}

impl Predictor for AttentionModel {
    fn role(&self) -> Role {
        Role::HighFreq
    }

    fn horizon(&self) -> Horizon {
        self.horizon
    }

    fn context_len(&self) -> usize {
        self.context
    }

    fn residual_std(&self) -> f64 {
        self.residual_std
    }

    fn infer(&self, normalized: &[f64]) -> f64 {
        apply(&self.readout, &features(&self.cell, normalized))
    }
}
