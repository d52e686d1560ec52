use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ForecastError;

/// Forecast distance. Closed set: anything else is rejected at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Horizon {
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "30d")]
    ThirtyDays,
}

impl Horizon {
    pub const ALL: [Horizon; 3] = [Horizon::OneDay, Horizon::SevenDays, Horizon::ThirtyDays];

    pub fn days(self) -> usize {
        match self {
            Horizon::OneDay => 1,
            Horizon::SevenDays => 7,
            Horizon::ThirtyDays => 30,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Horizon::OneDay => "1d",
            Horizon::SevenDays => "7d",
            Horizon::ThirtyDays => "30d",
        }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Horizon {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_horizon(s)
    }
}

/// Parse a horizon label ("1d", "7d", "30d").
pub fn parse_horizon(s: &str) -> Result<Horizon, ForecastError> {
    let trimmed = s.trim().to_ascii_lowercase();
    if trimmed.len() < 2 {
        return Err(ForecastError::Configuration(format!(
            "invalid horizon '{}': expected format like '7d'",
            s
        )));
    }
    let (num_str, suffix) = trimmed.split_at(trimmed.len() - 1);
    if suffix != "d" {
        return Err(ForecastError::Configuration(format!(
            "invalid horizon '{}': unsupported suffix '{}', expected 'd'",
            s, suffix
        )));
    }
    let days: usize = num_str.parse().map_err(|_| {
        ForecastError::Configuration(format!(
            "invalid horizon '{}': quantity must be a positive integer",
            s
        ))
    })?;
    Horizon::ALL
        .into_iter()
        .find(|h| h.days() == days)
        .ok_or_else(|| {
            ForecastError::Configuration(format!(
                "unsupported horizon '{}': expected one of 1d/7d/30d",
                s
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_horizon_valid() {
        assert_eq!(parse_horizon("1d").unwrap(), Horizon::OneDay);
        assert_eq!(parse_horizon(" 7D ").unwrap(), Horizon::SevenDays);
        assert_eq!("30d".parse::<Horizon>().unwrap(), Horizon::ThirtyDays);
    }

    #[test]
    fn parse_horizon_rejects_invalid_inputs() {
        for bad in ["", "d", "0d", "14d", "1w", "xd"] {
            let err = parse_horizon(bad).unwrap_err();
            assert!(matches!(err, ForecastError::Configuration(_)), "{bad}");
        }
    }

    #[test]
    fn serde_uses_labels() {
        let json = serde_json::to_string(&Horizon::SevenDays).unwrap();
        assert_eq!(json, "\"7d\"");
        let back: Horizon = serde_json::from_str("\"30d\"").unwrap();
        assert_eq!(back, Horizon::ThirtyDays);
    }
}
