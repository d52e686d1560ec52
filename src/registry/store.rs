use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::model::{parse_horizon, Horizon, Role};
use crate::predictor::BandPredictor;

use super::{ModelMetadata, TrainingMetrics};

/// Everything a registry needs to rebuild itself.
#[derive(Debug, Default)]
pub struct StoredRegistry {
    /// Registration order.
    pub versions: Vec<(ModelMetadata, BandPredictor)>,
    pub active: Vec<(Role, Horizon, String)>,
}

pub trait RegistryStore: Send + Sync {
    fn load(&self) -> Result<StoredRegistry>;
    fn insert_version(&self, metadata: &ModelMetadata, params: &BandPredictor) -> Result<()>;
    /// Point (role, horizon) at `version` and flag siblings inactive, atomically.
    fn activate(&self, role: Role, horizon: Horizon, version: &str) -> Result<()>;
    fn update_metrics(&self, version: &str, metrics: &TrainingMetrics) -> Result<()>;
}

pub struct SqliteRegistryStore {
    conn: Mutex<Connection>,
}

impl SqliteRegistryStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open registry {}", path.display()))?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS model_versions (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                version TEXT NOT NULL UNIQUE,
                role TEXT NOT NULL,
                horizon TEXT NOT NULL,
                architecture TEXT NOT NULL,
                trained_at TEXT NOT NULL,
                training_metrics TEXT NOT NULL,
                hyperparameters TEXT NOT NULL,
                params TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS model_active (
                role TEXT NOT NULL,
                horizon TEXT NOT NULL,
                version TEXT NOT NULL,
                activated_at TEXT NOT NULL,
                PRIMARY KEY(role, horizon)
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("registry connection lock poisoned"))
    }
}

impl RegistryStore for SqliteRegistryStore {
    fn load(&self) -> Result<StoredRegistry> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT version, role, horizon, architecture, trained_at,
                   training_metrics, hyperparameters, params, is_active
            FROM model_versions
            ORDER BY seq ASC
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, i64>(8)?,
            ))
        })?;

        let mut out = StoredRegistry::default();
        for row in rows {
            let (version, role, horizon, architecture, trained_at, metrics, hyper, params, active) =
                row?;
            let role = Role::parse(&role).ok_or_else(|| anyhow!("unknown role '{}'", role))?;
            let horizon = parse_horizon(&horizon)?;
            let trained_at = DateTime::parse_from_rfc3339(&trained_at)
                .with_context(|| format!("bad trained_at for {}", version))?
                .with_timezone(&Utc);
            let metadata = ModelMetadata {
                role,
                horizon,
                version: version.clone(),
                architecture,
                trained_at,
                training_metrics: serde_json::from_str(&metrics)
                    .with_context(|| format!("bad training_metrics for {}", version))?,
                hyperparameters: serde_json::from_str(&hyper)
                    .with_context(|| format!("bad hyperparameters for {}", version))?,
                is_active: active != 0,
            };
            let params = BandPredictor::from_json(&params)
                .with_context(|| format!("bad params for {}", version))?;
            out.versions.push((metadata, params));
        }

        let mut stmt = conn.prepare("SELECT role, horizon, version FROM model_active")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for row in rows {
            let (role, horizon, version) = row?;
            let role = Role::parse(&role).ok_or_else(|| anyhow!("unknown role '{}'", role))?;
            out.active.push((role, parse_horizon(&horizon)?, version));
        }
        Ok(out)
    }

    fn insert_version(&self, metadata: &ModelMetadata, params: &BandPredictor) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO model_versions (
                version, role, horizon, architecture, trained_at,
                training_metrics, hyperparameters, params, is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)
            "#,
            params![
                metadata.version,
                metadata.role.as_str(),
                metadata.horizon.as_str(),
                metadata.architecture,
                metadata.trained_at.to_rfc3339(),
                serde_json::to_string(&metadata.training_metrics)?,
                metadata.hyperparameters.to_string(),
                params.to_json()?,
            ],
        )
        .with_context(|| format!("failed to insert version {}", metadata.version))?;
        Ok(())
    }

    fn activate(&self, role: Role, horizon: Horizon, version: &str) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE model_versions SET is_active = (version = ?3) WHERE role = ?1 AND horizon = ?2",
            params![role.as_str(), horizon.as_str(), version],
        )?;
        tx.execute(
            r#"
            INSERT INTO model_active (role, horizon, version, activated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(role, horizon) DO UPDATE SET
                version = excluded.version,
                activated_at = excluded.activated_at
            "#,
            params![
                role.as_str(),
                horizon.as_str(),
                version,
                Utc::now().to_rfc3339()
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn update_metrics(&self, version: &str, metrics: &TrainingMetrics) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE model_versions SET training_metrics = ?2 WHERE version = ?1",
            params![version, serde_json::to_string(metrics)?],
        )?;
        if changed == 0 {
            return Err(anyhow!("unknown version {}", version));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PredictorConfig;
    use crate::predictor::supervised_windows;

    fn trees(horizon: Horizon) -> BandPredictor {
        let series: Vec<f64> = (0..100).map(|t| 20.0 + (t as f64 * 0.2).sin()).collect();
        let cfg = PredictorConfig::default();
        let samples = supervised_windows(&series, cfg.low_context, horizon.days());
        BandPredictor::fit(Role::LowFreq, &samples, horizon, &cfg).unwrap()
    }

    #[test]
    fn activation_flags_exactly_one_row() {
        let store = SqliteRegistryStore::in_memory().unwrap();
        for v in ["low_freq-1d-a", "low_freq-1d-b"] {
            store
                .insert_version(
                    &ModelMetadata::new(Role::LowFreq, Horizon::OneDay, v),
                    &trees(Horizon::OneDay),
                )
                .unwrap();
        }
        store.activate(Role::LowFreq, Horizon::OneDay, "low_freq-1d-a").unwrap();
        store.activate(Role::LowFreq, Horizon::OneDay, "low_freq-1d-b").unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.versions.len(), 2);
        let flags: Vec<bool> = loaded.versions.iter().map(|(m, _)| m.is_active).collect();
        assert_eq!(flags, vec![false, true]);
        assert_eq!(
            loaded.active,
            vec![(Role::LowFreq, Horizon::OneDay, "low_freq-1d-b".to_string())]
        );
    }

    #[test]
    fn metrics_update_requires_known_version() {
        let store = SqliteRegistryStore::in_memory().unwrap();
        assert!(store
            .update_metrics("nope", &TrainingMetrics::default())
            .is_err());
    }
}
