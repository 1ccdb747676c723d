use anyhow::Result;
use async_trait::async_trait;

use crate::candle::{Candle, CandleRequest, DailyStats, PriceQuote};
use crate::venue::Venue;

/// A single exchange venue adapter.
///
/// Each implementation owns its URL construction, symbol-pair formatting,
/// timeframe-string mapping, and response decoding. Candle sequences are
/// returned sorted ascending by timestamp.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// The venue this client talks to.
    fn venue(&self) -> Venue;

    /// Fetches OHLCV candles; unsupported timeframes and venue failures
    /// surface as errors that the aggregator classifies.
    async fn fetch_candles(&self, request: &CandleRequest) -> Result<Vec<Candle>>;

    /// Current spot price for a symbol.
    async fn current_price(&self, symbol: &str) -> Result<PriceQuote>;

    /// 24-hour rolling statistics for a symbol.
    async fn daily_stats(&self, symbol: &str) -> Result<DailyStats>;

    /// All symbols listed on this venue (base asset form, e.g. `BTC`).
    async fn list_symbols(&self) -> Result<Vec<String>>;
}
