use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use anyhow::{anyhow, bail, Context, Result};

use crate::model::{PriceBar, PriceSeries};
use crate::sentiment::{aggregate_sentiment, SentimentRecord};

/// Price history collaborator.
pub trait PriceSource: Send + Sync {
    /// Up to `lookback` most recent bars for `symbol`.
    fn fetch_series(&self, symbol: &str, lookback: usize) -> Result<PriceSeries>;
}

/// News sentiment collaborator. `Ok(None)` means no score for the window.
pub trait SentimentSource: Send + Sync {
    fn sentiment(&self, symbol: &str, window_days: u32) -> Result<Option<f64>>;
}

#[derive(Debug, Default)]
pub struct InMemoryPriceSource {
    series: RwLock<HashMap<String, PriceSeries>>,
}

impl InMemoryPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, series: PriceSeries) -> Result<()> {
        let mut map = self
            .series
            .write()
            .map_err(|_| anyhow!("price source lock poisoned"))?;
        map.insert(series.symbol().to_string(), series);
        Ok(())
    }
}

impl PriceSource for InMemoryPriceSource {
    fn fetch_series(&self, symbol: &str, lookback: usize) -> Result<PriceSeries> {
        let map = self
            .series
            .read()
            .map_err(|_| anyhow!("price source lock poisoned"))?;
        let key = symbol.trim().to_ascii_uppercase();
        match map.get(&key) {
            Some(series) => Ok(series.tail(lookback)),
            None => bail!("no price history for {}", key),
        }
    }
}

/// Scored news items per symbol, aggregated on request.
#[derive(Debug, Default)]
pub struct InMemorySentimentSource {
    records: HashMap<String, Vec<SentimentRecord>>,
}

impl InMemorySentimentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(mut self, symbol: &str, records: Vec<SentimentRecord>) -> Self {
        self.records
            .insert(symbol.trim().to_ascii_uppercase(), records);
        self
    }
}

impl SentimentSource for InMemorySentimentSource {
    fn sentiment(&self, symbol: &str, _window_days: u32) -> Result<Option<f64>> {
        Ok(self
            .records
            .get(&symbol.trim().to_ascii_uppercase())
            .and_then(|r| aggregate_sentiment(r)))
    }
}

/// Bars from a JSON array of `{timestamp, open, high, low, close, volume}`.
pub fn read_bars_json(path: &Path) -> Result<Vec<PriceBar>> {
    let payload = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let bars: Vec<PriceBar> = serde_json::from_str(&payload)
        .with_context(|| format!("failed to parse price bars from {}", path.display()))?;
    Ok(bars)
}
