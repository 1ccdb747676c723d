//! Canonical OHLCV candle types and fetch request shapes.
//!
//! Every venue response is normalized into [`Candle`] sequences sorted
//! ascending by timestamp before leaving the exchange layer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::timeframe::Timeframe;

/// One OHLCV candle in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Candle {
    /// Checks the OHLCV invariants: `low <= open,close <= high` and a
    /// non-negative volume.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.low <= self.open
            && self.low <= self.close
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.high
            && self.volume >= Decimal::ZERO
    }
}

/// Canonical candle fetch request handed to venue clients.
///
/// `start_time` / `end_time` are Unix seconds; venues that work in
/// milliseconds convert internally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandleRequest {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub limit: usize,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

impl CandleRequest {
    /// Creates a request without a time window.
    #[must_use]
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, limit: usize) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            limit,
            start_time: None,
            end_time: None,
        }
    }

    /// Restricts the request to `[start, end]` Unix seconds.
    #[must_use]
    pub fn with_window(mut self, start: i64, end: i64) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    /// Deduplication key shared by the aggregator and the candle cache.
    #[must_use]
    pub fn flight_key(&self) -> String {
        format!("{}|{}", self.symbol, self.timeframe)
    }
}

/// A spot price observation from a single venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// 24-hour rolling statistics for a symbol on a single venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    pub last_price: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub volume: Decimal,
    /// Percent change over the trailing 24 hours.
    pub change_pct: f64,
}
