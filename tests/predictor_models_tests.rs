use bandcast::config::PredictorConfig;
use bandcast::error::ForecastError;
use bandcast::model::{Horizon, Role};
use bandcast::predictor::{supervised_windows, BandPredictor, Predictor};
use bandcast::trainer::fit_role;

fn band(n: usize, period: f64) -> Vec<f64> {
    (0..n)
        .map(|t| 80.0 + 3.0 * (2.0 * std::f64::consts::PI * t as f64 / period).sin())
        .collect()
}

fn within_window_envelope(window: &[f64], value: f64) -> bool {
    let lo = window.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = window.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = hi - lo;
    value.is_finite() && value >= lo - range && value <= hi + range
}

#[test]
fn supervised_windows_align_targets_with_horizon() {
    let series: Vec<f64> = (0..50).map(|i| i as f64).collect();
    let samples = supervised_windows(&series, 10, 7);
    assert_eq!(samples.len(), 50 - 10 - 7 + 1);
    // min-max scaled: window 0..=9, target 16 -> (16 - 0) / 9
    assert!((samples[0].target - 16.0 / 9.0).abs() < 1e-12);
    assert!((samples[0].window[9] - 1.0).abs() < 1e-12);
}

#[test]
fn each_role_fits_its_architecture() {
    let cfg = PredictorConfig::default();
    let series = band(200, 9.0);
    for role in Role::ALL {
        let fitted = fit_role(role, &series, Horizon::OneDay, &cfg).unwrap();
        assert_eq!(fitted.params.role(), role);
        assert_eq!(fitted.params.horizon(), Horizon::OneDay);
        assert_eq!(
            fitted.params.context_len(),
            BandPredictor::context_for(role, &cfg)
        );
        assert!(fitted.metrics.rmse.is_finite());
        assert!(fitted.metrics.holdout_samples >= 1);

        let window = &series[series.len() - fitted.params.context_len()..];
        let out = fitted.params.predict(&series, Horizon::OneDay).unwrap();
        assert!(
            within_window_envelope(window, out.point_value),
            "{role}: {}",
            out.point_value
        );
        assert!(out.residual_std >= 0.0);
    }
}

#[test]
fn predict_rejects_other_horizon_and_short_window() {
    let cfg = PredictorConfig::default();
    let series = band(150, 12.0);
    let fitted = fit_role(Role::LowFreq, &series, Horizon::SevenDays, &cfg).unwrap();

    let err = fitted.params.predict(&series, Horizon::OneDay).unwrap_err();
    assert!(matches!(
        err,
        ForecastError::ModelUnavailable {
            role: Role::LowFreq,
            ..
        }
    ));

    let err = fitted.params.predict(&series[..5], Horizon::SevenDays).unwrap_err();
    assert!(err.is_band_fallback());
}

#[test]
fn flat_window_predicts_last_value() {
    let cfg = PredictorConfig::default();
    let fitted = fit_role(Role::HighFreq, &band(150, 7.0), Horizon::OneDay, &cfg).unwrap();
    let flat = vec![42.5; 60];
    let out = fitted.params.predict(&flat, Horizon::OneDay).unwrap();
    assert_eq!(out.point_value, 42.5);
    assert_eq!(out.residual_std, 0.0);
}

/// Stored parameters reproduce the same forecast after a JSON trip.
#[test]
fn parameters_survive_json_storage() {
    let cfg = PredictorConfig::default();
    let series = band(180, 15.0);
    let fitted = fit_role(Role::MidFreq, &series, Horizon::OneDay, &cfg).unwrap();
    let raw = fitted.params.to_json().unwrap();
    assert!(raw.contains("\"architecture\":\"conv-lstm\""));
    let restored = BandPredictor::from_json(&raw).unwrap();
    let a = fitted.params.predict(&series, Horizon::OneDay).unwrap();
    let b = restored.predict(&series, Horizon::OneDay).unwrap();
    assert!((a.point_value - b.point_value).abs() < 1e-9);
}

#[test]
fn fitting_is_deterministic_for_fixed_seed() {
    let cfg = PredictorConfig::default();
    let series = band(160, 10.0);
    let a = fit_role(Role::HighFreq, &series, Horizon::OneDay, &cfg).unwrap();
    let b = fit_role(Role::HighFreq, &series, Horizon::OneDay, &cfg).unwrap();
    assert_eq!(a.params, b.params);
}
