//! Closed-form ridge readout over fixed feature extractors.

use crate::error::{ForecastError, ForecastResult};

use super::recurrent::dot;

/// Solve `(XᵀX + λI) w = Xᵀy`.
pub fn fit_ridge(features: &[Vec<f64>], targets: &[f64], ridge: f64) -> ForecastResult<Vec<f64>> {
    let dim = match features.first() {
        Some(row) if !row.is_empty() => row.len(),
        _ => {
            return Err(ForecastError::InsufficientData {
                have: features.len(),
                need: 1,
            })
        }
    };
    let lambda = ridge.max(1e-9);
    let mut a = vec![vec![0.0; dim]; dim];
    let mut b = vec![0.0; dim];
    for (row, y) in features.iter().zip(targets) {
        for i in 0..dim {
            b[i] += row[i] * y;
            for j in i..dim {
                a[i][j] += row[i] * row[j];
            }
        }
    }
    for i in 0..dim {
        for j in 0..i {
            a[i][j] = a[j][i];
        }
        a[i][i] += lambda;
    }
    solve(a, b)
}

pub fn apply(weights: &[f64], features: &[f64]) -> f64 {
    dot(weights, features)
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> ForecastResult<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|x, y| a[*x][col].abs().total_cmp(&a[*y][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-15 {
            return Err(ForecastError::Configuration(
                "ridge system is singular".to_string(),
            ));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_linear_relationship() {
        let features: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![i as f64 / 10.0, ((i * 7) % 5) as f64, 1.0])
            .collect();
        let targets: Vec<f64> = features
            .iter()
            .map(|f| 2.0 * f[0] - 0.5 * f[1] + 3.0)
            .collect();
        let w = fit_ridge(&features, &targets, 1e-9).unwrap();
        assert!((w[0] - 2.0).abs() < 1e-5);
        assert!((w[1] + 0.5).abs() < 1e-5);
        assert!((w[2] - 3.0).abs() < 1e-5);
        assert!((apply(&w, &[1.0, 2.0, 1.0]) - 4.0).abs() < 1e-5);
    }

    #[test]
    fn ridge_shrinks_weights() {
        let features: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64 / 20.0]).collect();
        let targets: Vec<f64> = features.iter().map(|f| 4.0 * f[0]).collect();
        let loose = fit_ridge(&features, &targets, 1e-9).unwrap();
        let tight = fit_ridge(&features, &targets, 10.0).unwrap();
        assert!(tight[0].abs() < loose[0].abs());
    }

    #[test]
    fn empty_features_are_rejected() {
        assert!(fit_ridge(&[], &[], 1.0).is_err());
    }
}
