use std::fmt;

use serde::{Deserialize, Serialize};

/// Predictor specialization, one per frequency band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    HighFreq,
    MidFreq,
    LowFreq,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::HighFreq, Role::MidFreq, Role::LowFreq];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::HighFreq => "high_freq",
            Role::MidFreq => "mid_freq",
            Role::LowFreq => "low_freq",
        }
    }

    pub fn architecture(self) -> &'static str {
        match self {
            Role::HighFreq => "lstm-attention",
            Role::MidFreq => "conv-lstm",
            Role::LowFreq => "boosted-trees",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high_freq" | "high" => Some(Role::HighFreq),
            "mid_freq" | "mid" => Some(Role::MidFreq),
            "low_freq" | "low" => Some(Role::LowFreq),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_labels() {
        for role in Role::ALL {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse(" HIGH "), Some(Role::HighFreq));
        assert_eq!(Role::parse("ultra"), None);
    }
}
