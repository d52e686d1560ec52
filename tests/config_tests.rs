use bandcast::config::Config;
use bandcast::error::ForecastError;
use bandcast::model::{parse_horizon, Horizon};

#[test]
fn parse_default_toml() {
    let toml_str = r#"
[decomposer]
modes = 5
alpha = 1500.0
tau = 0.0
tolerance = 1e-7
max_iterations = 800

[predictor]
min_history = 60
lookback = 300
high_context = 24
mid_context = 36
low_context = 20
low_lags = 6
trees = 40

[ensemble]
min_error_samples = 20
shrink_k = 25.0

[fallback]
window = 10
version_label = "ma-baseline-v2"

[sentiment]
enabled = false
max_adjustment = 0.01

[orchestrator]
band_timeout_ms = 15000

[registry]
path = "/tmp/bandcast/registry.sqlite"

[logging]
level = "debug"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.decomposer.modes, 5);
    assert!((config.decomposer.alpha - 1500.0).abs() < f64::EPSILON);
    assert_eq!(config.decomposer.max_iterations, 800);
    assert_eq!(config.predictor.lookback, 300);
    assert_eq!(config.predictor.high_context, 24);
    assert_eq!(config.predictor.low_lags, 6);
    assert_eq!(config.predictor.trees, 40);
    // omitted keys keep their defaults
    assert_eq!(config.predictor.hidden_size, 12);
    assert_eq!(config.ensemble.min_error_samples, 20);
    assert!((config.ensemble.shrink_k - 25.0).abs() < f64::EPSILON);
    assert!((config.ensemble.z_score - 1.96).abs() < f64::EPSILON);
    assert_eq!(config.fallback.window, 10);
    assert_eq!(config.fallback.version_label, "ma-baseline-v2");
    assert!(!config.sentiment.enabled);
    assert_eq!(config.orchestrator.band_timeout_ms, 15000);
    assert_eq!(config.orchestrator.fetch_timeout_ms, 5000);
    assert_eq!(
        config.registry.path.to_string_lossy(),
        "/tmp/bandcast/registry.sqlite"
    );
    assert_eq!(config.logging.level, "debug");
    config.validate().unwrap();
}

#[test]
fn empty_toml_yields_valid_defaults() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config.decomposer.modes, 4);
    assert_eq!(config.fallback.window, 7);
    assert_eq!(config.ensemble.min_error_samples, 30);
    assert!((config.sentiment.max_adjustment - 0.02).abs() < f64::EPSILON);
    config.validate().unwrap();
}

#[test]
fn shipped_config_file_loads() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config/default.toml");
    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.fallback.version_label, "ma-baseline-v1");
}

fn assert_rejected(field: &str, mutate: impl FnOnce(&mut Config)) {
    let mut config = Config::default();
    mutate(&mut config);
    match config.validate() {
        Err(ForecastError::Configuration(msg)) => assert!(msg.contains(field), "{field}: {msg}"),
        other => panic!("{field}: expected configuration error, got {other:?}"),
    }
}

/// Every rejected field surfaces as a configuration error naming the field.
#[test]
fn validate_rejects_out_of_range_fields() {
    assert_rejected("decomposer.modes", |c| c.decomposer.modes = 0);
    assert_rejected("decomposer.modes", |c| c.decomposer.modes = 11);
    assert_rejected("decomposer.alpha", |c| c.decomposer.alpha = -1.0);
    assert_rejected("decomposer.tolerance", |c| c.decomposer.tolerance = 0.0);
    assert_rejected("decomposer.max_iterations", |c| c.decomposer.max_iterations = 0);
    assert_rejected("fallback.window", |c| c.fallback.window = 0);
    assert_rejected("fallback.z_score", |c| c.fallback.z_score = 0.0);
    assert_rejected("ensemble.z_score", |c| c.ensemble.z_score = f64::NAN);
    assert_rejected("sentiment.max_adjustment", |c| c.sentiment.max_adjustment = 0.6);
    assert_rejected("sentiment.max_adjustment", |c| c.sentiment.max_adjustment = 0.03);
    assert_rejected("predictor.min_history", |c| c.predictor.min_history = 30);
}

#[test]
fn validate_rejects_zero_timeouts() {
    let mut config = Config::default();
    config.orchestrator.registry_timeout_ms = 0;
    assert!(matches!(
        config.validate(),
        Err(ForecastError::Configuration(_))
    ));
}

#[test]
fn load_from_path_reports_invalid_file() {
    let dir = std::env::temp_dir().join(format!("bandcast-config-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("bad.toml");
    std::fs::write(&path, "[decomposer]\nmodes = 0\n").unwrap();
    let err = Config::load_from_path(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("decomposer.modes"));
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn parse_horizon_labels() {
    assert_eq!(parse_horizon("1d").unwrap(), Horizon::OneDay);
    assert_eq!(parse_horizon("7d").unwrap(), Horizon::SevenDays);
    assert_eq!(parse_horizon("30d").unwrap(), Horizon::ThirtyDays);
    assert!(parse_horizon("14d").is_err());
    assert!(parse_horizon("1h").is_err());
}
