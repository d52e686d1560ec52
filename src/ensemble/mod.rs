pub mod ledger;

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::EnsembleConfig;
use crate::error::{ForecastError, ForecastResult};
use crate::model::{BandPrediction, EnsembleWeights, Role};

pub use ledger::{ErrorHistory, ErrorLedger};

#[derive(Debug, Clone, PartialEq)]
pub struct CombinedForecast {
    pub point: f64,
    pub std: f64,
    pub lower: f64,
    pub upper: f64,
    pub weights: EnsembleWeights,
}

#[derive(Debug, Clone)]
pub struct EnsembleCombiner {
    cfg: EnsembleConfig,
}

impl EnsembleCombiner {
    pub fn new(cfg: EnsembleConfig) -> Self {
        Self { cfg }
    }

    /// Precision weights from recent errors, shrunk toward the equal split.
    /// Equal split unless every role has `min_error_samples` errors.
    pub fn weights(&self, roles: &[Role], errors: &BTreeMap<Role, Vec<f64>>) -> EnsembleWeights {
        if roles.len() < 2 {
            return EnsembleWeights::equal(roles);
        }
        let mut windows = Vec::with_capacity(roles.len());
        for role in roles {
            let recent = errors.get(role).map(Vec::as_slice).unwrap_or(&[]);
            let recent: Vec<f64> = recent.iter().copied().filter(|e| e.is_finite()).collect();
            if recent.len() < self.cfg.min_error_samples {
                return EnsembleWeights::equal(roles);
            }
            let start = recent.len().saturating_sub(self.cfg.history_limit);
            windows.push((*role, recent[start..].to_vec()));
        }

        let total_n: usize = windows.iter().map(|(_, e)| e.len()).sum();
        let total_sq: f64 = windows
            .iter()
            .flat_map(|(_, e)| e.iter())
            .map(|e| e * e)
            .sum();
        let pooled_var = total_sq / total_n.max(1) as f64;
        if !(pooled_var.is_finite() && pooled_var > f64::EPSILON) {
            return EnsembleWeights::equal(roles);
        }

        let a0 = self.cfg.prior_strength;
        let b0 = a0 * pooled_var;
        let precisions: Vec<(Role, f64, usize)> = windows
            .iter()
            .map(|(role, e)| {
                let n = e.len();
                let sq: f64 = e.iter().map(|v| v * v).sum();
                (*role, (a0 + n as f64 / 2.0) / (b0 + sq / 2.0), n)
            })
            .collect();
        let total_precision: f64 = precisions.iter().map(|(_, p, _)| p).sum();
        let n_eff = precisions.iter().map(|(_, _, n)| *n).min().unwrap_or(0) as f64;
        let alpha = n_eff / (n_eff + self.cfg.shrink_k.max(1e-9));
        let equal = 1.0 / roles.len() as f64;

        let scores: Vec<(Role, f64)> = precisions
            .iter()
            .map(|(role, p, _)| (*role, alpha * p / total_precision + (1.0 - alpha) * equal))
            .collect();
        let weights = EnsembleWeights::from_scores(&scores);
        debug!(
            pooled_var,
            n_eff,
            shrink = alpha,
            weights = ?weights.iter().collect::<Vec<_>>(),
            "ensemble weights optimized"
        );
        weights
    }

    pub fn combine(
        &self,
        bands: &[BandPrediction],
        errors: &BTreeMap<Role, Vec<f64>>,
    ) -> ForecastResult<CombinedForecast> {
        if bands.is_empty() {
            return Err(ForecastError::InsufficientData { have: 0, need: 1 });
        }
        let roles: Vec<Role> = bands.iter().map(|b| b.role).collect();
        let weights = self.weights(&roles, errors);

        let point: f64 = bands
            .iter()
            .map(|b| weights.get(b.role) * b.point_value)
            .sum();
        let own: f64 = bands
            .iter()
            .map(|b| {
                let w = weights.get(b.role);
                w * w * b.residual_std.max(0.0).powi(2)
            })
            .sum();
        let spread: f64 = bands
            .iter()
            .map(|b| weights.get(b.role) * (b.point_value - point).powi(2))
            .sum();
        let floor = (self.cfg.min_relative_std * point.abs()).max(1e-9);
        let std = (own + spread).sqrt().max(floor);
        let half = self.cfg.z_score * std;
        Ok(CombinedForecast {
            point,
            std,
            lower: point - half,
            upper: point + half,
            weights,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BandSource, Horizon};

    fn band(role: Role, point: f64, std: f64) -> BandPrediction {
        BandPrediction {
            role,
            horizon: Horizon::OneDay,
            point_value: point,
            residual_std: std,
            source: BandSource::Fallback,
        }
    }

    fn alternating(n: usize, scale: f64) -> Vec<f64> {
        (0..n).map(|i| if i % 2 == 0 { scale } else { -scale }).collect()
    }

    #[test]
    fn too_few_errors_gives_equal_split() {
        let combiner = EnsembleCombiner::new(EnsembleConfig::default());
        let mut errors = BTreeMap::new();
        errors.insert(Role::HighFreq, alternating(100, 1.0));
        errors.insert(Role::LowFreq, alternating(5, 1.0));
        let w = combiner.weights(&[Role::HighFreq, Role::LowFreq], &errors);
        assert!(!w.is_optimized());
        assert!((w.get(Role::HighFreq) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn lower_error_variance_earns_more_weight() {
        let combiner = EnsembleCombiner::new(EnsembleConfig::default());
        let mut errors = BTreeMap::new();
        errors.insert(Role::HighFreq, alternating(200, 2.0));
        errors.insert(Role::MidFreq, alternating(200, 1.0));
        errors.insert(Role::LowFreq, alternating(200, 0.5));
        let w = combiner.weights(&Role::ALL, &errors);
        assert!(w.is_optimized());
        assert!(w.get(Role::LowFreq) > w.get(Role::MidFreq));
        assert!(w.get(Role::MidFreq) > w.get(Role::HighFreq));
        assert!((w.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn interval_contains_point_and_reflects_spread() {
        let combiner = EnsembleCombiner::new(EnsembleConfig::default());
        let out = combiner
            .combine(
                &[band(Role::HighFreq, 70.0, 0.5), band(Role::LowFreq, 72.0, 0.5)],
                &BTreeMap::new(),
            )
            .unwrap();
        assert!((out.point - 71.0).abs() < 1e-12);
        assert!(out.lower < out.point && out.point < out.upper);
        // var = 2 * 0.25 * 0.25 + 0.5 * 1 + 0.5 * 1
        let expected = 1.96 * (0.125f64 + 1.0).sqrt();
        assert!((out.upper - out.point - expected).abs() < 1e-9);
    }

    #[test]
    fn identical_bands_still_have_width() {
        let combiner = EnsembleCombiner::new(EnsembleConfig::default());
        let out = combiner
            .combine(
                &[band(Role::HighFreq, 50.0, 0.0), band(Role::MidFreq, 50.0, 0.0)],
                &BTreeMap::new(),
            )
            .unwrap();
        assert!(out.upper - out.lower > 0.0);
    }

    #[test]
    fn empty_input_is_rejected() {
        let combiner = EnsembleCombiner::new(EnsembleConfig::default());
        assert!(combiner.combine(&[], &BTreeMap::new()).is_err());
    }
}
