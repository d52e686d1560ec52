use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Horizon, Role};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BandSource {
    Model { version: String },
    Fallback,
}

impl BandSource {
    pub fn is_fallback(&self) -> bool {
        matches!(self, BandSource::Fallback)
    }
}

/// One role's price-level forecast for a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandPrediction {
    pub role: Role,
    pub horizon: Horizon,
    pub point_value: f64,
    pub residual_std: f64,
    pub source: BandSource,
}

/// Non-negative per-role weights summing to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    weights: BTreeMap<Role, f64>,
    optimized: bool,
}

impl EnsembleWeights {
    pub fn equal(roles: &[Role]) -> Self {
        let mut weights = BTreeMap::new();
        if !roles.is_empty() {
            let w = 1.0 / roles.len() as f64;
            for role in roles {
                weights.insert(*role, w);
            }
        }
        Self {
            weights,
            optimized: false,
        }
    }

    /// Normalize raw scores into weights. Negative or non-finite scores count
    /// as zero; if nothing positive remains the split is equal.
    pub fn from_scores(scores: &[(Role, f64)]) -> Self {
        let cleaned: Vec<(Role, f64)> = scores
            .iter()
            .map(|(r, s)| (*r, if s.is_finite() { s.max(0.0) } else { 0.0 }))
            .collect();
        let total: f64 = cleaned.iter().map(|(_, s)| s).sum();
        if total <= f64::EPSILON {
            let roles: Vec<Role> = scores.iter().map(|(r, _)| *r).collect();
            return Self::equal(&roles);
        }
        Self {
            weights: cleaned.into_iter().map(|(r, s)| (r, s / total)).collect(),
            optimized: true,
        }
    }

    pub fn get(&self, role: Role) -> f64 {
        self.weights.get(&role).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Role, f64)> + '_ {
        self.weights.iter().map(|(r, w)| (*r, *w))
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.weights.values().sum()
    }

    /// True when the weights came from historical errors rather than the
    /// equal-split default.
    pub fn is_optimized(&self) -> bool {
        self.optimized
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub symbol: String,
    pub horizon: Horizon,
    pub predicted_price: f64,
    pub confidence_lower: f64,
    pub confidence_upper: f64,
    pub model_version: String,
    pub fallback_used: bool,
    pub sentiment_adjusted: bool,
    pub sentiment_score: Option<f64>,
    pub prediction_for: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub weights: EnsembleWeights,
    pub bands: Vec<BandPrediction>,
}

impl PredictionResult {
    pub fn interval_width(&self) -> f64 {
        self.confidence_upper - self.confidence_lower
    }

    pub fn is_well_formed(&self) -> bool {
        self.predicted_price.is_finite()
            && self.confidence_lower.is_finite()
            && self.confidence_upper.is_finite()
            && self.confidence_lower <= self.predicted_price
            && self.predicted_price <= self.confidence_upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_weights_sum_to_one() {
        let w = EnsembleWeights::equal(&Role::ALL);
        assert_eq!(w.len(), 3);
        assert!((w.sum() - 1.0).abs() < 1e-12);
        assert!(!w.is_optimized());
        assert!((w.get(Role::MidFreq) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn from_scores_clamps_and_normalizes() {
        let w = EnsembleWeights::from_scores(&[
            (Role::HighFreq, 3.0),
            (Role::MidFreq, -1.0),
            (Role::LowFreq, 1.0),
        ]);
        assert!((w.get(Role::HighFreq) - 0.75).abs() < 1e-12);
        assert_eq!(w.get(Role::MidFreq), 0.0);
        assert!((w.sum() - 1.0).abs() < 1e-12);
        assert!(w.is_optimized());
    }

    #[test]
    fn from_scores_without_signal_is_equal_split() {
        let w = EnsembleWeights::from_scores(&[(Role::HighFreq, 0.0), (Role::LowFreq, f64::NAN)]);
        assert!((w.get(Role::HighFreq) - 0.5).abs() < 1e-12);
        assert!(!w.is_optimized());
    }
}
