use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, Result};

use crate::model::{Horizon, Role};

/// Recent prediction errors (actual minus predicted) per symbol, horizon and role.
pub trait ErrorHistory: Send + Sync {
    /// Oldest first, at most the configured window.
    fn recent_errors(&self, symbol: &str, horizon: Horizon, role: Role) -> Result<Vec<f64>>;
    fn record_error(&self, symbol: &str, horizon: Horizon, role: Role, error: f64) -> Result<()>;
}

type LedgerKey = (String, Horizon, Role);

/// Bounded in-memory error window per key.
#[derive(Debug)]
pub struct ErrorLedger {
    window: usize,
    errors: Mutex<HashMap<LedgerKey, VecDeque<f64>>>,
}

impl Default for ErrorLedger {
    fn default() -> Self {
        Self::with_window(250)
    }
}

impl ErrorLedger {
    pub fn with_window(window: usize) -> Self {
        Self {
            window: window.max(2),
            errors: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    fn with_errors<T>(
        &self,
        f: impl FnOnce(&mut HashMap<LedgerKey, VecDeque<f64>>) -> T,
    ) -> Result<T> {
        let mut guard = self
            .errors
            .lock()
            .map_err(|_| anyhow!("error ledger lock poisoned"))?;
        Ok(f(&mut guard))
    }

    pub fn sample_count(&self, symbol: &str, horizon: Horizon, role: Role) -> usize {
        self.recent_errors(symbol, horizon, role)
            .map(|e| e.len())
            .unwrap_or(0)
    }

    pub fn mae(&self, symbol: &str, horizon: Horizon, role: Role) -> Option<f64> {
        let errors = self.recent_errors(symbol, horizon, role).ok()?;
        if errors.is_empty() {
            return None;
        }
        Some(errors.iter().map(|e| e.abs()).sum::<f64>() / errors.len() as f64)
    }

    pub fn rmse(&self, symbol: &str, horizon: Horizon, role: Role) -> Option<f64> {
        let errors = self.recent_errors(symbol, horizon, role).ok()?;
        if errors.is_empty() {
            return None;
        }
        Some((errors.iter().map(|e| e * e).sum::<f64>() / errors.len() as f64).sqrt())
    }
}

impl ErrorHistory for ErrorLedger {
    fn recent_errors(&self, symbol: &str, horizon: Horizon, role: Role) -> Result<Vec<f64>> {
        let key = (symbol.to_ascii_uppercase(), horizon, role);
        self.with_errors(|map| {
            map.get(&key)
                .map(|q| q.iter().copied().collect())
                .unwrap_or_default()
        })
    }

    fn record_error(&self, symbol: &str, horizon: Horizon, role: Role, error: f64) -> Result<()> {
        if !error.is_finite() {
            return Ok(());
        }
        let key = (symbol.to_ascii_uppercase(), horizon, role);
        let window = self.window;
        self.with_errors(|map| {
            let q = map
                .entry(key)
                .or_insert_with(|| VecDeque::with_capacity(window));
            q.push_back(error);
            if q.len() > window {
                let _ = q.pop_front();
            }
        })
    }
}
