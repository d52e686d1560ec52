use serde::{Deserialize, Serialize};

use crate::config::PredictorConfig;
use crate::error::{ForecastError, ForecastResult};
use crate::model::{Horizon, Role};

use super::{residual_std_of, Predictor, Sample};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum TreeNode {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    pub fn predict(&self, x: &[f64]) -> f64 {
        match self {
            TreeNode::Leaf { value } => *value,
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if x.get(*feature).copied().unwrap_or(0.0) <= *threshold {
                    left.predict(x)
                } else {
                    right.predict(x)
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

/// Trend band: boosted regression trees on lagged differences of the
/// window, predicting the change from the last value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedTrees {
    pub horizon: Horizon,
    pub context: usize,
    pub lags: usize,
    pub residual_std: f64,
    base: f64,
    learning_rate: f64,
    trees: Vec<TreeNode>,
}

impl BoostedTrees {
    pub fn fit(samples: &[Sample], horizon: Horizon, cfg: &PredictorConfig) -> ForecastResult<Self> {
        if samples.is_empty() {
            return Err(ForecastError::InsufficientData { have: 0, need: 1 });
        }
        let rows: Vec<Vec<f64>> = samples
            .iter()
            .map(|s| lag_features(&s.window, cfg.low_lags))
            .collect();
        let targets: Vec<f64> = samples
            .iter()
            .map(|s| s.target - s.window.last().copied().unwrap_or(0.0))
            .collect();

        let base = targets.iter().sum::<f64>() / targets.len() as f64;
        let mut fitted = vec![base; targets.len()];
        let mut trees = Vec::with_capacity(cfg.trees);
        let all: Vec<usize> = (0..rows.len()).collect();
        for _ in 0..cfg.trees {
            let residuals: Vec<f64> = targets.iter().zip(&fitted).map(|(y, f)| y - f).collect();
            let tree = grow(&rows, &residuals, &all, cfg.tree_depth, cfg.min_leaf.max(1));
            for (f, row) in fitted.iter_mut().zip(&rows) {
                *f += cfg.learning_rate * tree.predict(row);
            }
            trees.push(tree);
        }

        let mut model = Self {
            horizon,
            context: cfg.low_context,
            lags: cfg.low_lags,
            residual_std: 0.0,
            base,
            learning_rate: cfg.learning_rate,
            trees,
        };
        model.residual_std = residual_std_of(&model, samples);
        Ok(model)
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn max_depth(&self) -> usize {
        self.trees.iter().map(TreeNode::depth).max().unwrap_or(0)
    }
}

/// `[x_t - x_{t-i} for i in 1..=lags, slope, level]`.
pub fn lag_features(window: &[f64], lags: usize) -> Vec<f64> {
    let n = window.len();
    let last = window.last().copied().unwrap_or(0.0);
    let mut out = Vec::with_capacity(lags + 2);
    for i in 1..=lags {
        let prev = if i < n { window[n - 1 - i] } else { window[0] };
        out.push(last - prev);
    }
    out.push(slope(window));
    out.push(last);
    out
}

fn slope(window: &[f64]) -> f64 {
    let n = window.len();
    if n < 2 {
        return 0.0;
    }
    let mean_t = (n - 1) as f64 / 2.0;
    let mean_y = window.iter().sum::<f64>() / n as f64;
    let mut num = 0.0;
    let mut den = 0.0;
    for (t, y) in window.iter().enumerate() {
        let dt = t as f64 - mean_t;
        num += dt * (y - mean_y);
        den += dt * dt;
    }
    num / den
}

fn mean_of(targets: &[f64], idx: &[usize]) -> f64 {
    if idx.is_empty() {
        return 0.0;
    }
    idx.iter().map(|i| targets[*i]).sum::<f64>() / idx.len() as f64
}

fn grow(rows: &[Vec<f64>], targets: &[f64], idx: &[usize], depth: usize, min_leaf: usize) -> TreeNode {
    let value = mean_of(targets, idx);
    if depth == 0 || idx.len() < 2 * min_leaf {
        return TreeNode::Leaf { value };
    }
    let Some((feature, threshold)) = best_split(rows, targets, idx, min_leaf) else {
        return TreeNode::Leaf { value };
    };
    let (left, right): (Vec<usize>, Vec<usize>) =
        idx.iter().partition(|i| rows[**i][feature] <= threshold);
    TreeNode::Split {
        feature,
        threshold,
        left: Box::new(grow(rows, targets, &left, depth - 1, min_leaf)),
        right: Box::new(grow(rows, targets, &right, depth - 1, min_leaf)),
    }
}

/// Exhaustive search over every feature and every boundary between distinct
/// sorted values; ties keep the first candidate found.
fn best_split(
    rows: &[Vec<f64>],
    targets: &[f64],
    idx: &[usize],
    min_leaf: usize,
) -> Option<(usize, f64)> {
    let n_features = rows.get(*idx.first()?)?.len();
    let total_sum: f64 = idx.iter().map(|i| targets[*i]).sum();
    let total_sq: f64 = idx.iter().map(|i| targets[*i] * targets[*i]).sum();
    let n = idx.len() as f64;
    let parent_sse = total_sq - total_sum * total_sum / n;

    let mut best: Option<(usize, f64)> = None;
    let mut best_sse = parent_sse - 1e-12;
    for feature in 0..n_features {
        let mut order = idx.to_vec();
        order.sort_by(|a, b| rows[*a][feature].total_cmp(&rows[*b][feature]));
        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for k in 0..order.len() - 1 {
            let y = targets[order[k]];
            left_sum += y;
            left_sq += y * y;
            let left_n = (k + 1) as f64;
            let right_n = n - left_n;
            if k + 1 < min_leaf || order.len() - (k + 1) < min_leaf {
                continue;
            }
            let here = rows[order[k]][feature];
            let next = rows[order[k + 1]][feature];
            if next <= here {
                continue;
            }
            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / left_n)
                + (right_sq - right_sum * right_sum / right_n);
            if sse < best_sse {
                best_sse = sse;
                best = Some((feature, here + (next - here) / 2.0));
            }
        }
    }
    best
}

impl Predictor for BoostedTrees {
    fn role(&self) -> Role {
        Role::LowFreq
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
        let x = lag_features(normalized, self.lags);
        let last = normalized.last().copied().unwrap_or(0.0);
        let boost: f64 = self.trees.iter().map(|t| t.predict(&x)).sum();
        last + self.base + self.learning_rate * boost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::supervised_windows;

    #[test]
    fn lag_features_layout() {
        let f = lag_features(&[1.0, 2.0, 4.0, 7.0], 2);
        assert_eq!(f.len(), 4);
        assert!((f[0] - 3.0).abs() < f64::EPSILON);
        assert!((f[1] - 5.0).abs() < f64::EPSILON);
        assert!((f[3] - 7.0).abs() < f64::EPSILON);
        assert!(f[2] > 0.0);
    }

    #[test]
    fn single_tree_finds_the_obvious_split() {
        let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64]).collect();
        let targets: Vec<f64> = (0..20).map(|i| if i < 10 { -1.0 } else { 1.0 }).collect();
        let idx: Vec<usize> = (0..20).collect();
        let tree = grow(&rows, &targets, &idx, 1, 2);
        match &tree {
            TreeNode::Split { feature, threshold, .. } => {
                assert_eq!(*feature, 0);
                assert!((threshold - 9.5).abs() < f64::EPSILON);
            }
            TreeNode::Leaf { .. } => panic!("expected a split"),
        }
        assert!((tree.predict(&[3.0]) + 1.0).abs() < f64::EPSILON);
        assert!((tree.predict(&[15.0]) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn trees_respect_depth_limit_and_fit_trend() {
        let series: Vec<f64> = (0..150).map(|t| 50.0 + 0.2 * t as f64).collect();
        let cfg = PredictorConfig::default();
        let samples = supervised_windows(&series, cfg.low_context, 7);
        let model = BoostedTrees::fit(&samples, Horizon::SevenDays, &cfg).unwrap();
        assert_eq!(model.tree_count(), cfg.trees);
        assert!(model.max_depth() <= cfg.tree_depth);
        let forecast = model.predict(&series, Horizon::SevenDays).unwrap();
        let last = *series.last().unwrap();
        assert!(forecast.point_value > last, "{} <= {}", forecast.point_value, last);
    }
}
