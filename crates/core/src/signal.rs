//! Signal instance types consumed by the fact-check pipeline.
//!
//! Signals are produced by external analyzers and treated as read-only
//! input here; the pipeline only scores them after the fact.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::timeframe::Timeframe;

/// Predicted direction of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    Buy,
    Sell,
}

impl SignalType {
    /// Uppercase label used in persistence.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            other => anyhow::bail!("unknown signal type: {other}"),
        }
    }
}

/// Strength bucket assigned by the detecting analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStrength {
    Weak,
    Moderate,
    Strong,
    VeryStrong,
}

impl SignalStrength {
    /// Uppercase label used in persistence.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Weak => "WEAK",
            Self::Moderate => "MODERATE",
            Self::Strong => "STRONG",
            Self::VeryStrong => "VERY_STRONG",
        }
    }
}

impl fmt::Display for SignalStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignalStrength {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WEAK" => Ok(Self::Weak),
            "MODERATE" => Ok(Self::Moderate),
            "STRONG" => Ok(Self::Strong),
            "VERY_STRONG" => Ok(Self::VeryStrong),
            other => anyhow::bail!("unknown signal strength: {other}"),
        }
    }
}

/// A detected signal awaiting (or consumed by) a fact-check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalInstance {
    /// Row id in `live_signals`; used only as a deterministic ordering tiebreak.
    pub id: i64,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub signal_name: String,
    pub signal_type: SignalType,
    pub strength: SignalStrength,
    /// Analyzer-assigned confidence in `[0, 100]`.
    pub confidence: f64,
    /// Raw indicator value at detection, when the analyzer reports one.
    pub signal_value: Option<Decimal>,
    pub price: Decimal,
    pub detected_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_type_round_trips() {
        assert_eq!("BUY".parse::<SignalType>().unwrap(), SignalType::Buy);
        assert_eq!(SignalType::Sell.as_str(), "SELL");
        assert!("HOLD".parse::<SignalType>().is_err());
    }

    #[test]
    fn strength_round_trips() {
        assert_eq!(
            "VERY_STRONG".parse::<SignalStrength>().unwrap(),
            SignalStrength::VeryStrong
        );
        assert_eq!(SignalStrength::Moderate.as_str(), "MODERATE");
        assert!("EXTREME".parse::<SignalStrength>().is_err());
    }

    #[test]
    fn strength_ordering_is_weak_to_very_strong() {
        assert!(SignalStrength::Weak < SignalStrength::Moderate);
        assert!(SignalStrength::Moderate < SignalStrength::Strong);
        assert!(SignalStrength::Strong < SignalStrength::VeryStrong);
    }

    #[test]
    fn serde_strength_uses_screaming_snake_case() {
        let json = serde_json::to_string(&SignalStrength::VeryStrong).unwrap();
        assert_eq!(json, "\"VERY_STRONG\"");
    }
}
