use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::config::{Config, PredictorConfig};
use crate::decompose::Decomposer;
use crate::error::{ForecastError, ForecastResult};
use crate::model::{Horizon, Role};
use crate::predictor::{rms, supervised_windows, BandPredictor, Predictor};
use crate::registry::{ModelMetadata, ModelRegistry, TrainingMetrics};

/// Fewest supervised windows a role is fit on.
pub const MIN_TRAINING_SAMPLES: usize = 10;

#[derive(Debug, Clone)]
pub struct FittedModel {
    pub params: BandPredictor,
    pub metrics: TrainingMetrics,
    pub hyperparameters: serde_json::Value,
}

/// Fit one role on its component series with a chronological 80/20 split.
/// Metrics are in window-normalized units; the holdout RMSE becomes the
/// model's residual std.
pub fn fit_role(
    role: Role,
    component: &[f64],
    horizon: Horizon,
    cfg: &PredictorConfig,
) -> ForecastResult<FittedModel> {
    let context = BandPredictor::context_for(role, cfg);
    let samples = supervised_windows(component, context, horizon.days());
    if samples.len() < MIN_TRAINING_SAMPLES {
        return Err(ForecastError::InsufficientData {
            have: samples.len(),
            need: MIN_TRAINING_SAMPLES,
        });
    }
    let split = (samples.len() * 4 / 5).clamp(1, samples.len() - 1);
    let (train, holdout) = samples.split_at(split);

    let mut params = BandPredictor::fit(role, train, horizon, cfg)?;
    let errors: Vec<f64> = holdout
        .iter()
        .map(|s| s.target - params.infer(&s.window))
        .filter(|e| e.is_finite())
        .collect();
    let rmse = if errors.is_empty() {
        params.residual_std()
    } else {
        rms(&errors)
    };
    let mae = if errors.is_empty() {
        rmse
    } else {
        errors.iter().map(|e| e.abs()).sum::<f64>() / errors.len() as f64
    };
    params.set_residual_std(rmse);

    Ok(FittedModel {
        params,
        metrics: TrainingMetrics {
            rmse,
            mae,
            residual_std: rmse,
            train_samples: train.len(),
            holdout_samples: holdout.len(),
        },
        hyperparameters: hyperparameters(role, cfg),
    })
}

fn hyperparameters(role: Role, cfg: &PredictorConfig) -> serde_json::Value {
    match role {
        Role::HighFreq => json!({
            "context": cfg.high_context,
            "hidden_size": cfg.hidden_size,
            "ridge": cfg.ridge,
            "seed": cfg.seed,
        }),
        Role::MidFreq => json!({
            "context": cfg.mid_context,
            "conv_filters": cfg.conv_filters,
            "kernel": crate::predictor::conv::KERNEL,
            "hidden_size": cfg.hidden_size,
            "ridge": cfg.ridge,
            "seed": cfg.seed,
        }),
        Role::LowFreq => json!({
            "context": cfg.low_context,
            "lags": cfg.low_lags,
            "trees": cfg.trees,
            "tree_depth": cfg.tree_depth,
            "learning_rate": cfg.learning_rate,
            "min_leaf": cfg.min_leaf,
        }),
    }
}

/// Decompose `closes`, fit every role that has enough data, then register
/// and activate each fitted version. Returns the activated metadata.
pub fn train_all(
    closes: &[f64],
    horizon: Horizon,
    cfg: &Config,
    registry: &ModelRegistry,
) -> ForecastResult<Vec<ModelMetadata>> {
    cfg.validate()?;
    let signal = Decomposer::new(cfg.decomposer.clone())?.decompose(closes)?;
    let mut activated = Vec::new();
    for role in Role::ALL {
        let Some(component) = signal.band_component(role) else {
            warn!(%role, %horizon, "no component to train on");
            continue;
        };
        let fitted = match fit_role(role, &component, horizon, &cfg.predictor) {
            Ok(fitted) => fitted,
            Err(e) => {
                warn!(%role, %horizon, error = %e, "role not trained");
                continue;
            }
        };
        let version = ModelRegistry::new_version_id(role, horizon);
        let metadata = ModelMetadata {
            role,
            horizon,
            version: version.clone(),
            architecture: role.architecture().to_string(),
            trained_at: Utc::now(),
            training_metrics: fitted.metrics,
            hyperparameters: fitted.hyperparameters,
            is_active: false,
        };
        registry.register(metadata.clone(), fitted.params)?;
        registry.activate(role, horizon, &version)?;
        info!(
            %role,
            %horizon,
            %version,
            rmse = metadata.training_metrics.rmse,
            train_samples = metadata.training_metrics.train_samples,
            "role trained"
        );
        activated.push(ModelMetadata {
            is_active: true,
            ..metadata
        });
    }
    Ok(activated)
}
