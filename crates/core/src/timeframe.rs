//! Candle interval definitions.
//!
//! The set of supported timeframes is closed; every venue client maps these
//! onto its own interval strings, and the fact-check pipeline uses the fixed
//! minute counts to compute forward windows.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A candle interval drawn from the closed set supported by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "3m")]
    M3,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "2h")]
    H2,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "6h")]
    H6,
    #[serde(rename = "8h")]
    H8,
    #[serde(rename = "12h")]
    H12,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "3d")]
    D3,
    #[serde(rename = "1w")]
    W1,
}

impl Timeframe {
    /// Every supported timeframe, shortest first.
    pub const ALL: [Self; 14] = [
        Self::M1,
        Self::M3,
        Self::M5,
        Self::M15,
        Self::M30,
        Self::H1,
        Self::H2,
        Self::H4,
        Self::H6,
        Self::H8,
        Self::H12,
        Self::D1,
        Self::D3,
        Self::W1,
    ];

    /// Fixed interval length in minutes.
    #[must_use]
    pub const fn minutes(self) -> i64 {
        match self {
            Self::M1 => 1,
            Self::M3 => 3,
            Self::M5 => 5,
            Self::M15 => 15,
            Self::M30 => 30,
            Self::H1 => 60,
            Self::H2 => 120,
            Self::H4 => 240,
            Self::H6 => 360,
            Self::H8 => 480,
            Self::H12 => 720,
            Self::D1 => 1440,
            Self::D3 => 4320,
            Self::W1 => 10_080,
        }
    }

    /// Interval length in seconds.
    #[must_use]
    pub const fn seconds(self) -> i64 {
        self.minutes() * 60
    }

    /// Interval length as a chrono duration.
    #[must_use]
    pub fn duration(self) -> chrono::Duration {
        chrono::Duration::minutes(self.minutes())
    }

    /// Canonical string form (e.g. `1h`), also used as the database encoding.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::M1 => "1m",
            Self::M3 => "3m",
            Self::M5 => "5m",
            Self::M15 => "15m",
            Self::M30 => "30m",
            Self::H1 => "1h",
            Self::H2 => "2h",
            Self::H4 => "4h",
            Self::H6 => "6h",
            Self::H8 => "8h",
            Self::H12 => "12h",
            Self::D1 => "1d",
            Self::D3 => "3d",
            Self::W1 => "1w",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tf = match s {
            "1m" => Self::M1,
            "3m" => Self::M3,
            "5m" => Self::M5,
            "15m" => Self::M15,
            "30m" => Self::M30,
            "1h" => Self::H1,
            "2h" => Self::H2,
            "4h" => Self::H4,
            "6h" => Self::H6,
            "8h" => Self::H8,
            "12h" => Self::H12,
            "1d" => Self::D1,
            "3d" => Self::D3,
            "1w" => Self::W1,
            other => anyhow::bail!("unknown timeframe: {other}"),
        };
        Ok(tf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minute_counts_match_labels() {
        assert_eq!(Timeframe::M1.minutes(), 1);
        assert_eq!(Timeframe::M30.minutes(), 30);
        assert_eq!(Timeframe::H1.minutes(), 60);
        assert_eq!(Timeframe::H12.minutes(), 720);
        assert_eq!(Timeframe::D1.minutes(), 1440);
        assert_eq!(Timeframe::W1.minutes(), 10_080);
    }

    #[test]
    fn round_trips_through_str() {
        for tf in Timeframe::ALL {
            let parsed: Timeframe = tf.as_str().parse().unwrap();
            assert_eq!(parsed, tf);
        }
    }

    #[test]
    fn rejects_unknown_labels() {
        assert!("45m".parse::<Timeframe>().is_err());
        assert!("".parse::<Timeframe>().is_err());
        assert!("1H".parse::<Timeframe>().is_err());
    }

    #[test]
    fn serde_uses_canonical_labels() {
        let json = serde_json::to_string(&Timeframe::H4).unwrap();
        assert_eq!(json, "\"4h\"");
        let back: Timeframe = serde_json::from_str("\"1w\"").unwrap();
        assert_eq!(back, Timeframe::W1);
    }

    #[test]
    fn all_covers_every_variant_once() {
        let mut seen = std::collections::HashSet::new();
        for tf in Timeframe::ALL {
            assert!(seen.insert(tf.as_str()));
        }
        assert_eq!(seen.len(), 14);
    }
}
