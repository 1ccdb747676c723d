//! Venue HTTP adapters.
//!
//! Each client owns its pair formatting, timeframe-string mapping, and
//! response decoding, and normalizes everything to canonical ascending
//! [`Candle`] sequences. Decode functions are plain functions over
//! `serde_json::Value` so they can be exercised without a network.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use rust_decimal::Decimal;
use serde_json::Value;
use sigval_core::{Candle, CandleRequest, ExchangeClient, ExchangesConfig, Venue};

use crate::error::{ExchangeError, Result};

pub mod binance;
pub mod bybit;
pub mod coinbase;
pub mod gateio;
pub mod kraken;
pub mod kucoin;
pub mod nobitex;
pub mod okx;
pub mod tabdeal;

pub use binance::BinanceClient;
pub use bybit::BybitClient;
pub use coinbase::CoinbaseClient;
pub use gateio::GateIoClient;
pub use kraken::KrakenClient;
pub use kucoin::KuCoinClient;
pub use nobitex::NobitexClient;
pub use okx::OkxClient;
pub use tabdeal::TabdealClient;

pub(crate) type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Builds the per-client governor limiter from a requests-per-minute limit.
///
/// # Panics
/// Panics if the quota cannot be created (limit is clamped to at least 1).
pub(crate) fn per_minute_limiter(requests_per_minute: u32) -> Arc<DirectRateLimiter> {
    let quota = Quota::per_minute(NonZeroU32::new(requests_per_minute.max(1)).unwrap());
    Arc::new(RateLimiter::direct(quota))
}

/// Shared GET helper: paces through the limiter, bounds the request with the
/// per-venue timeout, and maps non-success statuses to [`ExchangeError::Api`].
pub(crate) async fn get_json(
    http: &reqwest::Client,
    limiter: &DirectRateLimiter,
    url: &str,
    timeout: Duration,
) -> Result<Value> {
    limiter.until_ready().await;
    let response = http.get(url).timeout(timeout).send().await?;
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ExchangeError::api(status.as_u16(), message));
    }
    Ok(response.json().await?)
}

/// Parses a JSON value that venues serialize as either a number or a string
/// into a `Decimal`.
pub(crate) fn decimal_value(value: &Value) -> Result<Decimal> {
    match value {
        Value::String(s) => s
            .parse()
            .map_err(|_| ExchangeError::invalid(format!("bad decimal: {s}"))),
        Value::Number(n) => n
            .to_string()
            .parse()
            .map_err(|_| ExchangeError::invalid(format!("bad decimal: {n}"))),
        other => Err(ExchangeError::invalid(format!("expected decimal, got {other}"))),
    }
}

/// Parses a JSON value holding a float (number or string) into `f64`.
pub(crate) fn f64_value(value: &Value) -> Result<f64> {
    match value {
        Value::String(s) => s
            .parse()
            .map_err(|_| ExchangeError::invalid(format!("bad float: {s}"))),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ExchangeError::invalid(format!("bad float: {n}"))),
        other => Err(ExchangeError::invalid(format!("expected float, got {other}"))),
    }
}

/// Parses a JSON value holding an integer timestamp (number or string).
pub(crate) fn int_value(value: &Value) -> Result<i64> {
    match value {
        Value::String(s) => s
            .parse()
            .map_err(|_| ExchangeError::invalid(format!("bad integer: {s}"))),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| ExchangeError::invalid(format!("bad integer: {n}"))),
        other => Err(ExchangeError::invalid(format!("expected integer, got {other}"))),
    }
}

/// Converts Unix seconds to a UTC instant.
pub(crate) fn ts_from_secs(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| ExchangeError::invalid(format!("timestamp out of range: {secs}s")))
}

/// Converts Unix milliseconds to a UTC instant.
pub(crate) fn ts_from_millis(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| ExchangeError::invalid(format!("timestamp out of range: {millis}ms")))
}

/// Final normalization step shared by every decoder.
pub(crate) fn finish_candles(mut candles: Vec<Candle>, symbol: &str) -> Result<Vec<Candle>> {
    if candles.is_empty() {
        return Err(ExchangeError::EmptyResult(symbol.to_string()));
    }
    candles.sort_by_key(|c| c.timestamp);
    Ok(candles)
}

/// Builds one client per venue in the configured priority list.
#[must_use]
pub fn build_clients(config: &ExchangesConfig) -> Vec<Arc<dyn ExchangeClient>> {
    let timeout = Duration::from_secs(config.request_timeout_secs);
    config
        .priority
        .iter()
        .map(|&venue| {
            let base_url = config.base_urls.get(&venue).cloned();
            let limit = config.limit_for(venue);
            let client: Arc<dyn ExchangeClient> = match venue {
                Venue::Binance => Arc::new(BinanceClient::new(base_url, timeout, limit)),
                Venue::KuCoin => Arc::new(KuCoinClient::new(base_url, timeout, limit)),
                Venue::Bybit => Arc::new(BybitClient::new(base_url, timeout, limit)),
                Venue::Okx => Arc::new(OkxClient::new(base_url, timeout, limit)),
                Venue::Coinbase => Arc::new(CoinbaseClient::new(base_url, timeout, limit)),
                Venue::Kraken => Arc::new(KrakenClient::new(base_url, timeout, limit)),
                Venue::GateIo => Arc::new(GateIoClient::new(base_url, timeout, limit)),
                Venue::Tabdeal => Arc::new(TabdealClient::new(base_url, timeout, limit)),
                Venue::Nobitex => Arc::new(NobitexClient::new(base_url, timeout, limit)),
            };
            client
        })
        .collect()
}

/// Clamps the candle count a request asks for to a venue's page limit.
pub(crate) fn clamp_limit(request: &CandleRequest, venue_max: usize) -> usize {
    request.limit.min(venue_max).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decimal_value_accepts_strings_and_numbers() {
        assert_eq!(
            decimal_value(&json!("50000.25")).unwrap().to_string(),
            "50000.25"
        );
        assert_eq!(decimal_value(&json!(42)).unwrap().to_string(), "42");
        assert!(decimal_value(&json!(null)).is_err());
        assert!(decimal_value(&json!("abc")).is_err());
    }

    #[test]
    fn int_value_accepts_strings_and_numbers() {
        assert_eq!(int_value(&json!("1700000000")).unwrap(), 1_700_000_000);
        assert_eq!(int_value(&json!(1_700_000_000i64)).unwrap(), 1_700_000_000);
        assert!(int_value(&json!([])).is_err());
    }

    #[test]
    fn finish_candles_rejects_empty() {
        assert!(matches!(
            finish_candles(Vec::new(), "BTC"),
            Err(ExchangeError::EmptyResult(_))
        ));
    }

    #[test]
    fn build_clients_follows_priority_order() {
        let config = ExchangesConfig::default();
        let clients = build_clients(&config);
        assert_eq!(clients.len(), config.priority.len());
        for (client, venue) in clients.iter().zip(config.priority.iter()) {
            assert_eq!(client.venue(), *venue);
        }
    }

    #[test]
    fn clamp_limit_respects_venue_page_size() {
        let request = CandleRequest::new("BTC", sigval_core::Timeframe::H1, 5_000);
        assert_eq!(clamp_limit(&request, 1_000), 1_000);
        let request = CandleRequest::new("BTC", sigval_core::Timeframe::H1, 0);
        assert_eq!(clamp_limit(&request, 1_000), 1);
    }
}
