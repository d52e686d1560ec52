pub mod store;

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ForecastError, ForecastResult};
use crate::model::{Horizon, Role};
use crate::predictor::{BandPredictor, Predictor};

pub use store::{RegistryStore, SqliteRegistryStore, StoredRegistry};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub rmse: f64,
    pub mae: f64,
    /// Window-normalized units.
    pub residual_std: f64,
    pub train_samples: usize,
    pub holdout_samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub role: Role,
    pub horizon: Horizon,
    pub version: String,
    pub architecture: String,
    pub trained_at: DateTime<Utc>,
    pub training_metrics: TrainingMetrics,
    pub hyperparameters: serde_json::Value,
    pub is_active: bool,
}

impl ModelMetadata {
    pub fn new(role: Role, horizon: Horizon, version: impl Into<String>) -> Self {
        Self {
            role,
            horizon,
            version: version.into(),
            architecture: role.architecture().to_string(),
            trained_at: Utc::now(),
            training_metrics: TrainingMetrics::default(),
            hyperparameters: serde_json::Value::Object(Default::default()),
            is_active: false,
        }
    }
}

/// Snapshot handed to readers; a newer activation never mutates it.
#[derive(Debug, Clone)]
pub struct ActiveModel {
    pub metadata: ModelMetadata,
    pub params: Arc<BandPredictor>,
}

#[derive(Debug, Clone)]
struct VersionRecord {
    metadata: ModelMetadata,
    params: Arc<BandPredictor>,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// Append-only, registration order.
    versions: Vec<VersionRecord>,
    active: HashMap<(Role, Horizon), Arc<ActiveModel>>,
}

impl RegistryState {
    fn find(&self, version: &str) -> Option<usize> {
        self.versions
            .iter()
            .position(|r| r.metadata.version == version)
    }

    fn snapshot(&self, idx: usize) -> Arc<ActiveModel> {
        let record = &self.versions[idx];
        let mut metadata = record.metadata.clone();
        metadata.is_active = true;
        Arc::new(ActiveModel {
            metadata,
            params: Arc::clone(&record.params),
        })
    }
}

/// Per (role, horizon) versions with exactly one active pointer, swapped
/// under a single write lock.
pub struct ModelRegistry {
    state: RwLock<RegistryState>,
    store: Option<Box<dyn RegistryStore>>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry {
    /// In-memory registry without durability.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            store: None,
        }
    }

    /// Restore versions and active pointers from `store`, and write every
    /// later change through to it.
    pub fn open(store: Box<dyn RegistryStore>) -> anyhow::Result<Self> {
        let stored = store.load()?;
        let mut state = RegistryState::default();
        for (mut metadata, params) in stored.versions {
            metadata.is_active = false;
            state.versions.push(VersionRecord {
                metadata,
                params: Arc::new(params),
            });
        }
        for (role, horizon, version) in stored.active {
            match state.find(&version) {
                Some(idx) => {
                    let snapshot = state.snapshot(idx);
                    state.active.insert((role, horizon), snapshot);
                }
                None => {
                    warn!(%role, %horizon, %version, "active pointer names an unknown version");
                }
            }
        }
        info!(
            versions = state.versions.len(),
            active = state.active.len(),
            "model registry restored"
        );
        Ok(Self {
            state: RwLock::new(state),
            store: Some(store),
        })
    }

    pub fn new_version_id(role: Role, horizon: Horizon) -> String {
        let id = uuid::Uuid::new_v4().simple().to_string();
        format!("{}-{}-{}", role, horizon, &id[..8])
    }

    fn read(&self) -> ForecastResult<RwLockReadGuard<'_, RegistryState>> {
        self.state
            .read()
            .map_err(|_| ForecastError::Registry("registry lock poisoned".to_string()))
    }

    fn write(&self) -> ForecastResult<RwLockWriteGuard<'_, RegistryState>> {
        self.state
            .write()
            .map_err(|_| ForecastError::Registry("registry lock poisoned".to_string()))
    }

    /// Add an inactive version.
    pub fn register(&self, metadata: ModelMetadata, params: BandPredictor) -> ForecastResult<()> {
        if params.role() != metadata.role || params.horizon() != metadata.horizon {
            return Err(ForecastError::Registry(format!(
                "parameters for {}/{} do not match metadata {}/{}",
                params.role(),
                params.horizon(),
                metadata.role,
                metadata.horizon
            )));
        }
        let mut state = self.write()?;
        if state.find(&metadata.version).is_some() {
            return Err(ForecastError::Registry(format!(
                "version {} already registered",
                metadata.version
            )));
        }
        let mut metadata = metadata;
        metadata.is_active = false;
        if let Some(store) = &self.store {
            store
                .insert_version(&metadata, &params)
                .map_err(|e| ForecastError::Registry(format!("{:#}", e)))?;
        }
        state.versions.push(VersionRecord {
            metadata,
            params: Arc::new(params),
        });
        Ok(())
    }

    /// Make `version` the single active one for (role, horizon).
    pub fn activate(&self, role: Role, horizon: Horizon, version: &str) -> ForecastResult<()> {
        let mut state = self.write()?;
        let idx = state
            .find(version)
            .ok_or_else(|| ForecastError::Registry(format!("unknown version {}", version)))?;
        let meta = &state.versions[idx].metadata;
        if meta.role != role || meta.horizon != horizon {
            return Err(ForecastError::Registry(format!(
                "version {} belongs to {}/{}, not {}/{}",
                version, meta.role, meta.horizon, role, horizon
            )));
        }
        self.swap_active(&mut state, role, horizon, idx)
    }

    /// Point (role, horizon) at `versions[idx]` in the store and in memory.
    /// Callers hold the write lock across lookup and swap.
    fn swap_active(
        &self,
        state: &mut RegistryState,
        role: Role,
        horizon: Horizon,
        idx: usize,
    ) -> ForecastResult<()> {
        let version = state.versions[idx].metadata.version.clone();
        if let Some(store) = &self.store {
            store
                .activate(role, horizon, &version)
                .map_err(|e| ForecastError::Registry(format!("{:#}", e)))?;
        }
        let snapshot = state.snapshot(idx);
        let previous = state.active.insert((role, horizon), snapshot);
        info!(
            %role,
            %horizon,
            %version,
            previous = previous.as_ref().map(|p| p.metadata.version.as_str()).unwrap_or("none"),
            "model version activated"
        );
        Ok(())
    }

    pub fn record_metrics(&self, version: &str, metrics: TrainingMetrics) -> ForecastResult<()> {
        let mut state = self.write()?;
        let idx = state
            .find(version)
            .ok_or_else(|| ForecastError::Registry(format!("unknown version {}", version)))?;
        if let Some(store) = &self.store {
            store
                .update_metrics(version, &metrics)
                .map_err(|e| ForecastError::Registry(format!("{:#}", e)))?;
        }
        state.versions[idx].metadata.training_metrics = metrics;
        let key = (
            state.versions[idx].metadata.role,
            state.versions[idx].metadata.horizon,
        );
        let is_active = state
            .active
            .get(&key)
            .map(|a| a.metadata.version == version)
            .unwrap_or(false);
        if is_active {
            let snapshot = state.snapshot(idx);
            state.active.insert(key, snapshot);
        }
        Ok(())
    }

    pub fn get_active(&self, role: Role, horizon: Horizon) -> ForecastResult<Arc<ActiveModel>> {
        let state = self.read()?;
        state
            .active
            .get(&(role, horizon))
            .cloned()
            .ok_or_else(|| ForecastError::model_unavailable(role, horizon, "no active version"))
    }

    /// Every version for (role, horizon), oldest first.
    pub fn history(&self, role: Role, horizon: Horizon) -> ForecastResult<Vec<ModelMetadata>> {
        let state = self.read()?;
        let active = state
            .active
            .get(&(role, horizon))
            .map(|a| a.metadata.version.clone());
        Ok(state
            .versions
            .iter()
            .filter(|r| r.metadata.role == role && r.metadata.horizon == horizon)
            .map(|r| {
                let mut m = r.metadata.clone();
                m.is_active = active.as_deref() == Some(m.version.as_str());
                m
            })
            .collect())
    }

    /// Re-activate the version registered just before the active one.
    /// Lookup and swap happen under one write lock.
    pub fn rollback(&self, role: Role, horizon: Horizon) -> ForecastResult<String> {
        let mut state = self.write()?;
        let active = state
            .active
            .get(&(role, horizon))
            .map(|a| a.metadata.version.clone())
            .ok_or_else(|| {
                ForecastError::Registry(format!("no active version for {}/{}", role, horizon))
            })?;
        let candidates: Vec<usize> = state
            .versions
            .iter()
            .enumerate()
            .filter(|(_, r)| r.metadata.role == role && r.metadata.horizon == horizon)
            .map(|(idx, _)| idx)
            .collect();
        let pos = candidates
            .iter()
            .position(|&idx| state.versions[idx].metadata.version == active)
            .ok_or_else(|| ForecastError::Registry(format!("active version {} is not registered", active)))?;
        if pos == 0 {
            return Err(ForecastError::Registry(format!(
                "no earlier version for {}/{}",
                role, horizon
            )));
        }
        let target = candidates[pos - 1];
        self.swap_active(&mut state, role, horizon, target)?;
        Ok(state.versions[target].metadata.version.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PredictorConfig;
    use crate::predictor::supervised_windows;

    fn params(role: Role, horizon: Horizon) -> BandPredictor {
        let series: Vec<f64> = (0..120).map(|t| (t as f64 * 0.3).sin() + t as f64 * 0.01).collect();
        let cfg = PredictorConfig::default();
        let samples = supervised_windows(&series, BandPredictor::context_for(role, &cfg), horizon.days());
        BandPredictor::fit(role, &samples, horizon, &cfg).unwrap()
    }

    fn register(reg: &ModelRegistry, role: Role, horizon: Horizon) -> String {
        let version = ModelRegistry::new_version_id(role, horizon);
        reg.register(ModelMetadata::new(role, horizon, &version), params(role, horizon))
            .unwrap();
        version
    }

    #[test]
    fn version_ids_are_prefixed_and_unique() {
        let a = ModelRegistry::new_version_id(Role::LowFreq, Horizon::SevenDays);
        let b = ModelRegistry::new_version_id(Role::LowFreq, Horizon::SevenDays);
        assert!(a.starts_with("low_freq-7d-"));
        assert_eq!(a.len(), "low_freq-7d-".len() + 8);
        assert_ne!(a, b);
    }

    #[test]
    fn nothing_is_active_until_activated() {
        let reg = ModelRegistry::new();
        let v = register(&reg, Role::LowFreq, Horizon::OneDay);
        assert!(reg.get_active(Role::LowFreq, Horizon::OneDay).is_err());
        reg.activate(Role::LowFreq, Horizon::OneDay, &v).unwrap();
        let active = reg.get_active(Role::LowFreq, Horizon::OneDay).unwrap();
        assert_eq!(active.metadata.version, v);
        assert!(active.metadata.is_active);
    }

    #[test]
    fn activation_rejects_mismatched_key() {
        let reg = ModelRegistry::new();
        let v = register(&reg, Role::LowFreq, Horizon::OneDay);
        assert!(reg.activate(Role::HighFreq, Horizon::OneDay, &v).is_err());
        assert!(reg.activate(Role::LowFreq, Horizon::OneDay, "missing").is_err());
    }

    #[test]
    fn duplicate_version_is_rejected() {
        let reg = ModelRegistry::new();
        let v = register(&reg, Role::HighFreq, Horizon::OneDay);
        let dup = reg.register(
            ModelMetadata::new(Role::HighFreq, Horizon::OneDay, &v),
            params(Role::HighFreq, Horizon::OneDay),
        );
        assert!(matches!(dup, Err(ForecastError::Registry(_))));
    }

    #[test]
    fn params_must_match_metadata() {
        let reg = ModelRegistry::new();
        let res = reg.register(
            ModelMetadata::new(Role::MidFreq, Horizon::OneDay, "x"),
            params(Role::LowFreq, Horizon::OneDay),
        );
        assert!(res.is_err());
    }

    #[test]
    fn rollback_targets_predecessor_of_current_active() {
        let reg = ModelRegistry::new();
        let (role, horizon) = (Role::LowFreq, Horizon::OneDay);
        let v1 = register(&reg, role, horizon);
        let v2 = register(&reg, role, horizon);
        let v3 = register(&reg, role, horizon);
        let other = register(&reg, role, Horizon::SevenDays);
        reg.activate(role, Horizon::SevenDays, &other).unwrap();

        reg.activate(role, horizon, &v3).unwrap();
        reg.activate(role, horizon, &v1).unwrap();
        reg.activate(role, horizon, &v3).unwrap();
        assert_eq!(reg.rollback(role, horizon).unwrap(), v2);
        assert_eq!(reg.get_active(role, horizon).unwrap().metadata.version, v2);
        assert_eq!(reg.rollback(role, horizon).unwrap(), v1);
        assert!(matches!(
            reg.rollback(role, horizon),
            Err(ForecastError::Registry(_))
        ));
        assert!(reg.rollback(Role::HighFreq, horizon).is_err());
        // other horizons are untouched
        assert_eq!(
            reg.get_active(role, Horizon::SevenDays).unwrap().metadata.version,
            other
        );
    }

    #[test]
    fn record_metrics_refreshes_active_snapshot() {
        let reg = ModelRegistry::new();
        let v = register(&reg, Role::LowFreq, Horizon::OneDay);
        reg.activate(Role::LowFreq, Horizon::OneDay, &v).unwrap();
        let before = reg.get_active(Role::LowFreq, Horizon::OneDay).unwrap();
        reg.record_metrics(
            &v,
            TrainingMetrics {
                rmse: 0.5,
                ..TrainingMetrics::default()
            },
        )
        .unwrap();
        let after = reg.get_active(Role::LowFreq, Horizon::OneDay).unwrap();
        assert_eq!(before.metadata.training_metrics.rmse, 0.0);
        assert!((after.metadata.training_metrics.rmse - 0.5).abs() < f64::EPSILON);
    }
}
