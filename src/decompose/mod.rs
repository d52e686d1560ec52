mod vmd;

use serde::Serialize;
use tracing::debug;

use crate::config::DecomposerConfig;
use crate::error::{ForecastError, ForecastResult};
use crate::model::{Role, MIN_MODEL_HISTORY};

use self::vmd::{vmd, VmdParams};

/// One oscillatory component aligned to the input series.
#[derive(Debug, Clone, Serialize)]
pub struct Mode {
    pub values: Vec<f64>,
    /// Cycles per sample.
    pub center_frequency: f64,
    pub zero_crossing_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecomposedSignal {
    /// Highest center frequency first.
    pub modes: Vec<Mode>,
    pub residual: Vec<f64>,
    pub iterations: usize,
}

impl DecomposedSignal {
    pub fn len(&self) -> usize {
        self.residual.len()
    }

    pub fn is_empty(&self) -> bool {
        self.residual.is_empty()
    }

    pub fn mode_count(&self) -> usize {
        self.modes.len()
    }

    pub fn reconstruct(&self) -> Vec<f64> {
        let mut out = self.residual.clone();
        for mode in &self.modes {
            for (acc, v) in out.iter_mut().zip(&mode.values) {
                *acc += v;
            }
        }
        out
    }

    /// The component series routed to `role`: the highest mode, the sum of
    /// the remaining modes, or the residual trend. `None` when the
    /// decomposition has too few modes to feed the role.
    pub fn band_component(&self, role: Role) -> Option<Vec<f64>> {
        match role {
            Role::HighFreq => self.modes.first().map(|m| m.values.clone()),
            Role::MidFreq => {
                if self.modes.len() < 2 {
                    return None;
                }
                let mut out = vec![0.0; self.len()];
                for mode in &self.modes[1..] {
                    for (acc, v) in out.iter_mut().zip(&mode.values) {
                        *acc += v;
                    }
                }
                Some(out)
            }
            Role::LowFreq => Some(self.residual.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Decomposer {
    cfg: DecomposerConfig,
    min_length: usize,
}

impl Decomposer {
    pub fn new(cfg: DecomposerConfig) -> ForecastResult<Self> {
        if cfg.modes == 0 {
            return Err(ForecastError::Configuration(
                "decomposer.modes must be > 0".to_string(),
            ));
        }
        if cfg.max_iterations == 0 {
            return Err(ForecastError::Configuration(
                "decomposer.max_iterations must be > 0".to_string(),
            ));
        }
        Ok(Self {
            cfg,
            min_length: MIN_MODEL_HISTORY,
        })
    }

    pub fn config(&self) -> &DecomposerConfig {
        &self.cfg
    }

    pub fn decompose(&self, series: &[f64]) -> ForecastResult<DecomposedSignal> {
        let n = series.len();
        if n < self.min_length {
            return Err(ForecastError::DecompositionUnavailable(format!(
                "series has {} points, need {}",
                n, self.min_length
            )));
        }
        if series.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::DecompositionUnavailable(
                "series contains non-finite values".to_string(),
            ));
        }

        let mean = series.iter().sum::<f64>() / n as f64;
        let var = series.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        let std = var.sqrt();
        if std <= 1e-12 * mean.abs().max(1.0) {
            debug!(points = n, "flat series, emitting zero modes");
            return Ok(DecomposedSignal {
                modes: (0..self.cfg.modes)
                    .map(|_| Mode {
                        values: vec![0.0; n],
                        center_frequency: 0.0,
                        zero_crossing_rate: 0.0,
                    })
                    .collect(),
                residual: series.to_vec(),
                iterations: 0,
            });
        }

        let standardized: Vec<f64> = series.iter().map(|v| (v - mean) / std).collect();
        let out = vmd(
            &standardized,
            &VmdParams {
                modes: self.cfg.modes + 1,
                alpha: self.cfg.alpha,
                tau: self.cfg.tau,
                tolerance: self.cfg.tolerance,
                max_iterations: self.cfg.max_iterations,
            },
        );
        if !out.converged {
            return Err(ForecastError::DecompositionUnavailable(format!(
                "no convergence after {} iterations (last update {:.3e})",
                out.iterations, out.last_update
            )));
        }

        let mut order: Vec<usize> = (0..out.modes.len()).collect();
        order.sort_by(|a, b| {
            out.center_frequencies[*b].total_cmp(&out.center_frequencies[*a])
        });
        // The lowest-frequency mode is the trend and stays in the residual.
        order.truncate(self.cfg.modes);

        let modes: Vec<Mode> = order
            .iter()
            .map(|idx| {
                let values: Vec<f64> = out.modes[*idx].iter().map(|v| v * std).collect();
                Mode {
                    zero_crossing_rate: zero_crossing_rate(&values),
                    center_frequency: out.center_frequencies[*idx],
                    values,
                }
            })
            .collect();

        let mut residual = series.to_vec();
        for mode in &modes {
            for (r, v) in residual.iter_mut().zip(&mode.values) {
                *r -= v;
            }
        }

        debug!(
            points = n,
            iterations = out.iterations,
            modes = modes.len(),
            "decomposition converged"
        );
        Ok(DecomposedSignal {
            modes,
            residual,
            iterations: out.iterations,
        })
    }
}

/// Sign changes per sample, halved (a pure tone at `f` cycles/sample scores `f`).
pub fn zero_crossing_rate(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let crossings = values
        .windows(2)
        .filter(|w| (w[0] < 0.0 && w[1] >= 0.0) || (w[0] >= 0.0 && w[1] < 0.0))
        .count();
    crossings as f64 / (2.0 * values.len() as f64)
}
