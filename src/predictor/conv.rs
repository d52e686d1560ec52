use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::PredictorConfig;
use crate::error::ForecastResult;
use crate::model::{Horizon, Role};

use super::readout::{apply, fit_ridge};
use super::recurrent::LstmCell;
use super::{residual_std_of, Predictor, Sample};

pub const KERNEL: usize = 3;

/// Mid-frequency band: a bank of kernel-3 ReLU filters, max-pooling by two,
/// then an LSTM whose last hidden state feeds a ridge readout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvLstmModel {
    pub horizon: Horizon,
    pub context: usize,
    pub residual_std: f64,
    filters: Vec<[f64; KERNEL]>,
    filter_bias: Vec<f64>,
    cell: LstmCell,
    readout: Vec<f64>,
}

impl ConvLstmModel {
    pub fn fit(samples: &[Sample], horizon: Horizon, cfg: &PredictorConfig) -> ForecastResult<Self> {
        let mut rng = StdRng::seed_from_u64(cfg.seed.wrapping_add(1));
        let filters: Vec<[f64; KERNEL]> = (0..cfg.conv_filters)
            .map(|_| {
                [
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                ]
            })
            .collect();
        let filter_bias: Vec<f64> = (0..cfg.conv_filters)
            .map(|_| rng.gen_range(-0.1..0.1))
            .collect();
        let cell = LstmCell::seeded(cfg.conv_filters, cfg.hidden_size, cfg.seed.wrapping_add(2));

        let mut model = Self {
            horizon,
            context: cfg.mid_context,
            residual_std: 0.0,
            filters,
            filter_bias,
            cell,
            readout: Vec::new(),
        };
        let features: Vec<Vec<f64>> = samples.iter().map(|s| model.features(&s.window)).collect();
        let targets: Vec<f64> = samples.iter().map(|s| s.target).collect();
        model.readout = fit_ridge(&features, &targets, cfg.ridge)?;
        model.residual_std = residual_std_of(&model, samples);
        Ok(model)
    }

    fn convolve(&self, window: &[f64]) -> Vec<Vec<f64>> {
        if window.len() < KERNEL {
            return Vec::new();
        }
        window
            .windows(KERNEL)
            .map(|w| {
                self.filters
                    .iter()
                    .zip(&self.filter_bias)
                    .map(|(k, b)| (k[0] * w[0] + k[1] * w[1] + k[2] * w[2] + b).max(0.0))
                    .collect()
            })
            .collect()
    }

    fn features(&self, window: &[f64]) -> Vec<f64> {
        let conv = self.convolve(window);
        let pooled: Vec<Vec<f64>> = conv
            .chunks(2)
            .map(|pair| {
                let mut out = pair[0].clone();
                if let Some(second) = pair.get(1) {
                    for (o, v) in out.iter_mut().zip(second) {
                        *o = o.max(*v);
                    }
                }
                out
            })
            .collect();
        let states = self.cell.run(&pooled);
        let mut out = states
            .last()
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.cell.hidden_size]);
        out.push(1.0);
        out
    }
}

impl Predictor for ConvLstmModel {
    fn role(&self) -> Role {
        Role::MidFreq
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
        apply(&self.readout, &self.features(normalized))
    }
}
