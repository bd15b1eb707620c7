use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// The sampling frequency of a price series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
}

impl Frequency {
    /// The one-letter code used by the market-data API and in cache file names.
    pub fn code(&self) -> &'static str {
        match self {
            Frequency::Daily => "D",
            Frequency::Weekly => "W",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Frequency::Daily => "Daily",
            Frequency::Weekly => "Weekly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Frequency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "d" | "daily" => Ok(Frequency::Daily),
            "w" | "weekly" => Ok(Frequency::Weekly),
            other => Err(CoreError::InvalidInput("frequency".to_string(), other.to_string())),
        }
    }
}

/// Number of discrete market states.
pub const STATE_COUNT: usize = 6;

/// The fixed six-level taxonomy of a single period's return.
///
/// The ordinal (0..=5) is what indexes transition matrices. Going through this
/// enum instead of raw integers keeps first- and second-order row indices from
/// being mixed up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MarketState {
    BigDown,
    MidDown,
    SmallDown,
    SmallUp,
    MidUp,
    BigUp,
}

impl MarketState {
    pub const ALL: [MarketState; STATE_COUNT] = [
        MarketState::BigDown,
        MarketState::MidDown,
        MarketState::SmallDown,
        MarketState::SmallUp,
        MarketState::MidUp,
        MarketState::BigUp,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Converts an ordinal back into a state. Returns `None` outside `0..=5`.
    pub fn from_index(index: i64) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn label(self) -> &'static str {
        match self {
            MarketState::BigDown => "Big down",
            MarketState::MidDown => "Mid down",
            MarketState::SmallDown => "Small down",
            MarketState::SmallUp => "Small up",
            MarketState::MidUp => "Mid up",
            MarketState::BigUp => "Big up",
        }
    }

    pub fn is_up(self) -> bool {
        self >= MarketState::SmallUp
    }
}

impl fmt::Display for MarketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How surprising today's realised state was under yesterday's transition matrices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    None,
    Normal,
    Strong,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::None => "none",
            AlertLevel::Normal => "normal",
            AlertLevel::Strong => "strong",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of the swing a Fibonacci level set is drawn against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Up => f.write_str("up"),
            Trend::Down => f.write_str("down"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_ordinals_round_trip_through_index() {
        for (i, state) in MarketState::ALL.iter().enumerate() {
            assert_eq!(state.index(), i);
            assert_eq!(MarketState::from_index(i as i64), Some(*state));
        }
    }

    #[test]
    fn out_of_range_ordinals_are_rejected() {
        assert_eq!(MarketState::from_index(-1), None);
        assert_eq!(MarketState::from_index(6), None);
    }

    #[test]
    fn up_side_starts_at_small_up() {
        assert!(!MarketState::SmallDown.is_up());
        assert!(MarketState::SmallUp.is_up());
    }

    #[test]
    fn frequency_parses_codes_and_names() {
        assert_eq!("D".parse::<Frequency>().unwrap(), Frequency::Daily);
        assert_eq!("weekly".parse::<Frequency>().unwrap(), Frequency::Weekly);
        assert!("M".parse::<Frequency>().is_err());
    }

    #[test]
    fn alert_level_serializes_lowercase() {
        let json = serde_json::to_string(&AlertLevel::Strong).unwrap();
        assert_eq!(json, "\"strong\"");
    }
}
