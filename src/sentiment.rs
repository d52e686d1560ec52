use serde::{Deserialize, Serialize};

use crate::config::SentimentConfig;

/// One scored news item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentRecord {
    pub score: f64,
    #[serde(default = "full_credibility")]
    pub credibility: f64,
}

fn full_credibility() -> f64 {
    1.0
}

/// Mean of `score * credibility`, clamped to [-1, 1]. `None` without usable records.
pub fn aggregate_sentiment(records: &[SentimentRecord]) -> Option<f64> {
    let products: Vec<f64> = records
        .iter()
        .filter(|r| r.score.is_finite() && r.credibility.is_finite())
        .map(|r| r.score.clamp(-1.0, 1.0) * r.credibility.clamp(0.0, 1.0))
        .collect();
    if products.is_empty() {
        return None;
    }
    Some((products.iter().sum::<f64>() / products.len() as f64).clamp(-1.0, 1.0))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentAdjustment {
    pub point: f64,
    pub lower: f64,
    pub upper: f64,
    /// Absolute shift applied to all three values.
    pub shift: f64,
    pub score: Option<f64>,
}

impl SentimentAdjustment {
    pub fn applied(&self) -> bool {
        self.score.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct SentimentAdjuster {
    cfg: SentimentConfig,
}

impl SentimentAdjuster {
    pub fn new(cfg: SentimentConfig) -> Self {
        Self { cfg }
    }

    pub fn enabled(&self) -> bool {
        self.cfg.enabled
    }

    /// Nudge `point` by `point * max_adjustment * score` and move both bounds
    /// by the same amount. Missing, non-finite or disabled scores leave the
    /// values untouched.
    pub fn adjust(&self, point: f64, lower: f64, upper: f64, score: Option<f64>) -> SentimentAdjustment {
        let unchanged = SentimentAdjustment {
            point,
            lower,
            upper,
            shift: 0.0,
            score: None,
        };
        if !self.cfg.enabled {
            return unchanged;
        }
        let Some(score) = score.filter(|s| s.is_finite()) else {
            return unchanged;
        };
        let score = score.clamp(-1.0, 1.0);
        let shift = point * self.cfg.max_adjustment * score;
        SentimentAdjustment {
            point: point + shift,
            lower: lower + shift,
            upper: upper + shift,
            shift,
            score: Some(score),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adjuster() -> SentimentAdjuster {
        SentimentAdjuster::new(SentimentConfig::default())
    }

    #[test]
    fn full_positive_score_adds_two_percent() {
        let out = adjuster().adjust(100.0, 95.0, 105.0, Some(1.0));
        assert!((out.point - 102.0).abs() < 1e-12);
        assert!((out.lower - 97.0).abs() < 1e-12);
        assert!((out.upper - 107.0).abs() < 1e-12);
        assert!(out.applied());
    }

    #[test]
    fn out_of_range_score_is_clamped() {
        let out = adjuster().adjust(100.0, 99.0, 101.0, Some(-5.0));
        assert!((out.point - 98.0).abs() < 1e-12);
        assert_eq!(out.score, Some(-1.0));
    }

    #[test]
    fn absent_or_nan_score_is_noop() {
        let a = adjuster().adjust(100.0, 99.0, 101.0, None);
        let b = adjuster().adjust(100.0, 99.0, 101.0, Some(f64::NAN));
        for out in [a, b] {
            assert_eq!(out.point, 100.0);
            assert!(!out.applied());
        }
    }

    #[test]
    fn disabled_adjuster_is_noop() {
        let adj = SentimentAdjuster::new(SentimentConfig {
            enabled: false,
            ..SentimentConfig::default()
        });
        assert!(!adj.adjust(100.0, 99.0, 101.0, Some(0.7)).applied());
    }

    #[test]
    fn aggregate_weights_by_credibility() {
        let records = [
            SentimentRecord { score: 0.8, credibility: 1.0 },
            SentimentRecord { score: -0.4, credibility: 0.5 },
            SentimentRecord { score: f64::NAN, credibility: 1.0 },
        ];
        let s = aggregate_sentiment(&records).unwrap();
        assert!((s - 0.3).abs() < 1e-12);
        assert!(aggregate_sentiment(&[]).is_none());
    }
}
