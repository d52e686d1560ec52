use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::decompose::{DecomposedSignal, Decomposer};
use crate::ensemble::{EnsembleCombiner, ErrorHistory};
use crate::error::{ForecastError, ForecastResult};
use crate::fallback::FallbackEngine;
use crate::model::{
    BandPrediction, BandSource, EnsembleWeights, Horizon, PredictionResult, PriceSeries, Role,
};
use crate::predictor::Predictor;
use crate::registry::ModelRegistry;
use crate::sentiment::SentimentAdjuster;
use crate::source::{PriceSource, SentimentSource};

/// Runs `f` on the blocking pool, bounded by `timeout_ms`. The task is not
/// cancelled when the bound is exceeded; its result is dropped.
async fn run_blocking<T, F>(timeout_ms: u64, f: F) -> Result<T, String>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    match tokio::time::timeout(
        Duration::from_millis(timeout_ms),
        tokio::task::spawn_blocking(f),
    )
    .await
    {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("task failed: {}", e)),
        Err(_) => Err(format!("timed out after {} ms", timeout_ms)),
    }
}

/// Request pipeline: fetch, decompose, per-band dispatch with per-band
/// fallback, ensemble, sentiment.
pub struct ForecastOrchestrator {
    cfg: Config,
    decomposer: Decomposer,
    combiner: EnsembleCombiner,
    fallback: FallbackEngine,
    sentiment: SentimentAdjuster,
    registry: Arc<ModelRegistry>,
    prices: Arc<dyn PriceSource>,
    sentiment_source: Option<Arc<dyn SentimentSource>>,
    errors: Arc<dyn ErrorHistory>,
}

impl ForecastOrchestrator {
    pub fn new(
        cfg: Config,
        registry: Arc<ModelRegistry>,
        prices: Arc<dyn PriceSource>,
        errors: Arc<dyn ErrorHistory>,
    ) -> ForecastResult<Self> {
        cfg.validate()?;
        Ok(Self {
            decomposer: Decomposer::new(cfg.decomposer.clone())?,
            combiner: EnsembleCombiner::new(cfg.ensemble.clone()),
            fallback: FallbackEngine::new(cfg.fallback.clone()),
            sentiment: SentimentAdjuster::new(cfg.sentiment.clone()),
            cfg,
            registry,
            prices,
            sentiment_source: None,
            errors,
        })
    }

    pub fn with_sentiment_source(mut self, source: Arc<dyn SentimentSource>) -> Self {
        self.sentiment_source = Some(source);
        self
    }

    pub async fn forecast(&self, symbol: &str, horizon: Horizon) -> ForecastResult<PredictionResult> {
        self.forecast_with_sentiment(symbol, horizon, None).await
    }

    /// Like [`forecast`](Self::forecast), with an explicit score taking the
    /// place of the sentiment source.
    pub async fn forecast_with_sentiment(
        &self,
        symbol: &str,
        horizon: Horizon,
        sentiment_score: Option<f64>,
    ) -> ForecastResult<PredictionResult> {
        let symbol = symbol.trim().to_ascii_uppercase();
        if symbol.is_empty() {
            return Err(ForecastError::Configuration(
                "symbol must not be empty".to_string(),
            ));
        }

        let series = self.fetch_series(&symbol).await?;
        let closes = series.closes();
        let (last_close, last_ts) = match series.last() {
            Some(bar) => (bar.close, bar.timestamp),
            None => {
                return Err(ForecastError::InsufficientData {
                    have: 0,
                    need: 1,
                })
            }
        };
        let prediction_for = last_ts + chrono::Duration::days(horizon.days() as i64);
        let score = match sentiment_score {
            Some(s) => Some(s),
            None => self.fetch_sentiment(&symbol).await,
        };

        let min_history = self.cfg.predictor.min_history;
        if closes.len() < min_history {
            warn!(
                symbol = %symbol,
                %horizon,
                points = closes.len(),
                need = min_history,
                "short history, using moving-average baseline"
            );
            return self.full_fallback(&symbol, horizon, &closes, prediction_for, score);
        }

        let signal = match self.decompose(closes.clone()).await {
            Ok(signal) => signal,
            Err(e) if e.is_request_fallback() => {
                warn!(symbol = %symbol, %horizon, error = %e, "decomposition failed, using moving-average baseline");
                return self.full_fallback(&symbol, horizon, &closes, prediction_for, score);
            }
            Err(e) => return Err(e),
        };

        let bands = self
            .dispatch_bands(&symbol, horizon, &signal, last_close, &closes)
            .await?;
        let versions: Vec<&str> = bands
            .iter()
            .filter_map(|b| match &b.source {
                BandSource::Model { version } => Some(version.as_str()),
                BandSource::Fallback => None,
            })
            .collect();
        if versions.is_empty() {
            warn!(symbol = %symbol, %horizon, "no band model available, using moving-average baseline");
            return self.full_fallback(&symbol, horizon, &closes, prediction_for, score);
        }
        let degraded = bands.iter().any(|b| b.source.is_fallback());
        let mut model_version = versions.join("+");
        if degraded {
            model_version.push('+');
            model_version.push_str(self.fallback.version_label());
        }

        let roles: Vec<Role> = bands.iter().map(|b| b.role).collect();
        let errors = self.recent_errors(&symbol, horizon, &roles);
        let combined = self.combiner.combine(&bands, &errors)?;
        let adjusted = self
            .sentiment
            .adjust(combined.point, combined.lower, combined.upper, score);

        let result = PredictionResult {
            symbol,
            horizon,
            predicted_price: adjusted.point,
            confidence_lower: adjusted.lower,
            confidence_upper: adjusted.upper,
            model_version,
            fallback_used: degraded,
            sentiment_adjusted: adjusted.applied(),
            sentiment_score: adjusted.score,
            prediction_for,
            created_at: Utc::now(),
            weights: combined.weights,
            bands,
        };
        info!(
            symbol = %result.symbol,
            horizon = %result.horizon,
            predicted = result.predicted_price,
            fallback_used = result.fallback_used,
            model_version = %result.model_version,
            "forecast ready"
        );
        Ok(result)
    }

    /// Record `actual_price - point_value` for every band of `result`.
    /// Returns how many errors were recorded.
    pub fn record_outcome(&self, result: &PredictionResult, actual_price: f64) -> ForecastResult<usize> {
        if !actual_price.is_finite() {
            return Err(ForecastError::Configuration(
                "actual price must be finite".to_string(),
            ));
        }
        for band in &result.bands {
            self.errors
                .record_error(
                    &result.symbol,
                    result.horizon,
                    band.role,
                    actual_price - band.point_value,
                )
                .map_err(|e| ForecastError::History(format!("{:#}", e)))?;
        }
        Ok(result.bands.len())
    }

    async fn fetch_series(&self, symbol: &str) -> ForecastResult<PriceSeries> {
        let prices = Arc::clone(&self.prices);
        let owned = symbol.to_string();
        let lookback = self.cfg.predictor.lookback;
        match run_blocking(self.cfg.orchestrator.fetch_timeout_ms, move || {
            prices.fetch_series(&owned, lookback)
        })
        .await
        {
            Ok(Ok(series)) => Ok(series),
            Ok(Err(e)) => {
                let reason = format!("{:#}", e);
                warn!(symbol = %symbol, error = %reason, "price fetch failed");
                Err(ForecastError::InsufficientData { have: 0, need: 1 })
            }
            Err(reason) => {
                warn!(symbol = %symbol, error = %reason, "price fetch failed");
                Err(ForecastError::InsufficientData { have: 0, need: 1 })
            }
        }
    }

    async fn fetch_sentiment(&self, symbol: &str) -> Option<f64> {
        if !self.sentiment.enabled() {
            return None;
        }
        let source = Arc::clone(self.sentiment_source.as_ref()?);
        let owned = symbol.to_string();
        let window = self.cfg.sentiment.window_days;
        match run_blocking(self.cfg.orchestrator.sentiment_timeout_ms, move || {
            source.sentiment(&owned, window)
        })
        .await
        {
            Ok(Ok(score)) => score,
            Ok(Err(e)) => {
                let reason = format!("{:#}", e);
                warn!(symbol = %symbol, error = %reason, "sentiment unavailable");
                None
            }
            Err(reason) => {
                warn!(symbol = %symbol, error = %reason, "sentiment unavailable");
                None
            }
        }
    }

    async fn decompose(&self, closes: Vec<f64>) -> ForecastResult<DecomposedSignal> {
        let decomposer = self.decomposer.clone();
        run_blocking(self.cfg.orchestrator.band_timeout_ms, move || {
            decomposer.decompose(&closes)
        })
        .await
        .map_err(ForecastError::DecompositionUnavailable)?
    }

    async fn dispatch_bands(
        &self,
        symbol: &str,
        horizon: Horizon,
        signal: &DecomposedSignal,
        last_close: f64,
        closes: &[f64],
    ) -> ForecastResult<Vec<BandPrediction>> {
        let mut set = JoinSet::new();
        for role in Role::ALL {
            let component = signal.band_component(role);
            let registry = Arc::clone(&self.registry);
            let registry_ms = self.cfg.orchestrator.registry_timeout_ms;
            let band_ms = self.cfg.orchestrator.band_timeout_ms;
            set.spawn(async move {
                let outcome = predict_band(
                    registry,
                    role,
                    horizon,
                    component,
                    last_close,
                    registry_ms,
                    band_ms,
                )
                .await;
                (role, outcome)
            });
        }

        let mut out: BTreeMap<Role, BandPrediction> = BTreeMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((role, Ok(band))) => {
                    debug!(symbol = %symbol, %role, point = band.point_value, "band predicted");
                    out.insert(role, band);
                }
                Ok((role, Err(e))) if e.is_band_fallback() => {
                    warn!(symbol = %symbol, %role, %horizon, error = %e, "band degraded to baseline");
                }
                Ok((_, Err(e))) => return Err(e),
                Err(e) => {
                    warn!(symbol = %symbol, %horizon, error = %e, "band task failed");
                }
            }
        }
        for role in Role::ALL {
            if !out.contains_key(&role) {
                let band = self.fallback.band_prediction(role, closes, horizon)?;
                out.insert(role, band);
            }
        }
        Ok(out.into_values().collect())
    }

    fn full_fallback(
        &self,
        symbol: &str,
        horizon: Horizon,
        closes: &[f64],
        prediction_for: DateTime<Utc>,
        score: Option<f64>,
    ) -> ForecastResult<PredictionResult> {
        let base = self.fallback.baseline(closes, horizon)?;
        let adjusted = self.sentiment.adjust(base.point, base.lower, base.upper, score);
        Ok(PredictionResult {
            symbol: symbol.to_string(),
            horizon,
            predicted_price: adjusted.point,
            confidence_lower: adjusted.lower,
            confidence_upper: adjusted.upper,
            model_version: self.fallback.version_label().to_string(),
            fallback_used: true,
            sentiment_adjusted: adjusted.applied(),
            sentiment_score: adjusted.score,
            prediction_for,
            created_at: Utc::now(),
            weights: EnsembleWeights::equal(&[]),
            bands: Vec::new(),
        })
    }

    fn recent_errors(&self, symbol: &str, horizon: Horizon, roles: &[Role]) -> BTreeMap<Role, Vec<f64>> {
        let mut out = BTreeMap::new();
        for role in roles {
            match self.errors.recent_errors(symbol, horizon, *role) {
                Ok(errors) => {
                    out.insert(*role, errors);
                }
                Err(e) => {
                    let reason = format!("{:#}", e);
                    warn!(symbol = %symbol, %role, error = %reason, "error history unavailable");
                }
            }
        }
        out
    }
}

/// Registry lookup and inference for one band, as a price-level prediction:
/// the last close moved by the component's forecast change.
async fn predict_band(
    registry: Arc<ModelRegistry>,
    role: Role,
    horizon: Horizon,
    component: Option<Vec<f64>>,
    last_close: f64,
    registry_ms: u64,
    band_ms: u64,
) -> ForecastResult<BandPrediction> {
    let component = component.ok_or_else(|| {
        ForecastError::model_unavailable(role, horizon, "no component for this band")
    })?;
    let active = run_blocking(registry_ms, move || registry.get_active(role, horizon))
        .await
        .map_err(|reason| ForecastError::model_unavailable(role, horizon, format!("registry {}", reason)))??;
    let version = active.metadata.version.clone();
    let params = Arc::clone(&active.params);
    let component_last = component.last().copied().unwrap_or(0.0);
    let forecast = run_blocking(band_ms, move || params.predict(&component, horizon))
        .await
        .map_err(|reason| ForecastError::model_unavailable(role, horizon, reason))??;

    let point_value = last_close + (forecast.point_value - component_last);
    if !point_value.is_finite() || !forecast.residual_std.is_finite() {
        return Err(ForecastError::model_unavailable(
            role,
            horizon,
            "non-finite band prediction",
        ));
    }
    Ok(BandPrediction {
        role,
        horizon,
        point_value,
        residual_std: forecast.residual_std.max(0.0),
        source: BandSource::Model { version },
    })
}
