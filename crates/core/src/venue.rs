//! Exchange venue identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A supported exchange venue.
///
/// The variant set is closed; the aggregator's priority list, rate windows,
/// and the symbol-availability cache are all keyed by this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Binance,
    KuCoin,
    Bybit,
    Okx,
    Coinbase,
    Kraken,
    GateIo,
    Tabdeal,
    Nobitex,
}

impl Venue {
    /// Every known venue, in the default priority order.
    pub const ALL: [Self; 9] = [
        Self::Binance,
        Self::KuCoin,
        Self::Bybit,
        Self::Okx,
        Self::Coinbase,
        Self::Kraken,
        Self::GateIo,
        Self::Tabdeal,
        Self::Nobitex,
    ];

    /// Lowercase identifier used in logs, config keys, and persistence.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::KuCoin => "kucoin",
            Self::Bybit => "bybit",
            Self::Okx => "okx",
            Self::Coinbase => "coinbase",
            Self::Kraken => "kraken",
            Self::GateIo => "gateio",
            Self::Tabdeal => "tabdeal",
            Self::Nobitex => "nobitex",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Venue {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let venue = match s {
            "binance" => Self::Binance,
            "kucoin" => Self::KuCoin,
            "bybit" => Self::Bybit,
            "okx" => Self::Okx,
            "coinbase" => Self::Coinbase,
            "kraken" => Self::Kraken,
            "gateio" => Self::GateIo,
            "tabdeal" => Self::Tabdeal,
            "nobitex" => Self::Nobitex,
            other => anyhow::bail!("unknown venue: {other}"),
        };
        Ok(venue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_str() {
        for venue in Venue::ALL {
            let parsed: Venue = venue.as_str().parse().unwrap();
            assert_eq!(parsed, venue);
        }
    }

    #[test]
    fn serde_uses_lowercase() {
        assert_eq!(serde_json::to_string(&Venue::GateIo).unwrap(), "\"gateio\"");
        let back: Venue = serde_json::from_str("\"kucoin\"").unwrap();
        assert_eq!(back, Venue::KuCoin);
    }

    #[test]
    fn rejects_unknown_venue() {
        assert!("ftx".parse::<Venue>().is_err());
    }
}
