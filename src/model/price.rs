use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl PriceBar {
    /// Flat bar where every price field equals `close`.
    pub fn from_close(timestamp: DateTime<Utc>, close: f64) -> Self {
        Self {
            timestamp,
            open: close,
            high: close,
            low: close,
            close,
            volume: 0.0,
        }
    }
}

/// Validated, strictly time-ordered bars for one symbol.
#[derive(Debug, Clone, Serialize)]
pub struct PriceSeries {
    symbol: String,
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, bars: Vec<PriceBar>) -> Result<Self> {
        let symbol = symbol.into().trim().to_ascii_uppercase();
        if symbol.is_empty() {
            bail!("price series symbol must not be empty");
        }
        for (i, bar) in bars.iter().enumerate() {
            if !bar.close.is_finite() {
                bail!("{}: non-finite close at index {}", symbol, i);
            }
            if i > 0 && bar.timestamp <= bars[i - 1].timestamp {
                bail!(
                    "{}: timestamps must be strictly increasing (index {} at {})",
                    symbol,
                    i,
                    bar.timestamp
                );
            }
        }
        Ok(Self { symbol, bars })
    }

    /// Daily bars from consecutive closes, ending at `end`.
    pub fn from_closes(
        symbol: impl Into<String>,
        end: DateTime<Utc>,
        closes: &[f64],
    ) -> Result<Self> {
        let n = closes.len() as i64;
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, c)| PriceBar::from_close(end - chrono::Duration::days(n - 1 - i as i64), *c))
            .collect();
        Self::new(symbol, bars)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn last(&self) -> Option<&PriceBar> {
        self.bars.last()
    }

    /// The most recent `n` bars (or all of them).
    pub fn tail(&self, n: usize) -> PriceSeries {
        let start = self.bars.len().saturating_sub(n);
        PriceSeries {
            symbol: self.symbol.clone(),
            bars: self.bars[start..].to_vec(),
        }
    }
}
