//! Binance spot adapter.
//!
//! Pair format `<SYM>USDT`, millisecond timestamps, klines as
//! `[ts, open, high, low, close, volume, ...]`. Binance interval strings
//! match the canonical timeframe labels one-to-one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sigval_core::{
    Candle, CandleRequest, DailyStats, ExchangeClient, PriceQuote, Timeframe, Venue,
};

use crate::error::{ExchangeError, Result};

use super::{
    clamp_limit, decimal_value, f64_value, finish_candles, get_json, int_value,
    per_minute_limiter, ts_from_millis, DirectRateLimiter,
};

const DEFAULT_BASE_URL: &str = "https://api.binance.com";
const MAX_LIMIT: usize = 1_000;

pub struct BinanceClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    limiter: Arc<DirectRateLimiter>,
}

impl BinanceClient {
    /// Creates a new Binance client.
    ///
    /// # Panics
    /// Panics if the rate limiter quota cannot be created.
    #[must_use]
    pub fn new(base_url: Option<String>, timeout: Duration, requests_per_minute: u32) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout,
            limiter: per_minute_limiter(requests_per_minute),
        }
    }

    fn pair(symbol: &str) -> String {
        format!("{}USDT", symbol.to_uppercase())
    }

    fn interval(timeframe: Timeframe) -> &'static str {
        // Binance uses the canonical labels directly.
        timeframe.as_str()
    }

    /// Decodes a `/api/v3/klines` body.
    fn parse_klines(value: &Value) -> Result<Vec<Candle>> {
        let rows = value
            .as_array()
            .ok_or_else(|| ExchangeError::invalid("klines: expected array"))?;
        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            let fields = row
                .as_array()
                .filter(|f| f.len() >= 6)
                .ok_or_else(|| ExchangeError::invalid("klines: short row"))?;
            candles.push(Candle {
                timestamp: ts_from_millis(int_value(&fields[0])?)?,
                open: decimal_value(&fields[1])?,
                high: decimal_value(&fields[2])?,
                low: decimal_value(&fields[3])?,
                close: decimal_value(&fields[4])?,
                volume: decimal_value(&fields[5])?,
            });
        }
        Ok(candles)
    }

    async fn fetch_chunk(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
        start: Option<i64>,
        end: Option<i64>,
    ) -> Result<Vec<Candle>> {
        let mut url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            Self::pair(symbol),
            Self::interval(timeframe),
            limit.min(MAX_LIMIT).max(1),
        );
        if let Some(start) = start {
            url.push_str(&format!("&startTime={}", start * 1_000));
        }
        if let Some(end) = end {
            url.push_str(&format!("&endTime={}", end * 1_000));
        }
        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        Self::parse_klines(&body)
    }
}

#[async_trait]
impl ExchangeClient for BinanceClient {
    fn venue(&self) -> Venue {
        Venue::Binance
    }

    async fn fetch_candles(&self, request: &CandleRequest) -> anyhow::Result<Vec<Candle>> {
        // A window wider than one page gets paginated backward from the end,
        // deduplicated by timestamp.
        if let (Some(start), Some(end)) = (request.start_time, request.end_time) {
            let span = ((end - start) / request.timeframe.seconds()).max(0) as usize;
            if span > MAX_LIMIT {
                let pages = span.div_ceil(MAX_LIMIT);
                tracing::debug!(
                    "paginating {span} candles for {} over {pages} requests",
                    request.symbol
                );
                let mut by_timestamp = HashMap::new();
                let mut current_end = end;
                for _ in 0..pages {
                    let chunk_start =
                        (current_end - request.timeframe.seconds() * MAX_LIMIT as i64).max(start);
                    let chunk = self
                        .fetch_chunk(
                            &request.symbol,
                            request.timeframe,
                            MAX_LIMIT,
                            Some(chunk_start),
                            Some(current_end),
                        )
                        .await?;
                    for candle in chunk {
                        by_timestamp.insert(candle.timestamp, candle);
                    }
                    current_end = chunk_start;
                    if current_end <= start {
                        break;
                    }
                }
                let candles: Vec<Candle> = by_timestamp.into_values().collect();
                return Ok(finish_candles(candles, &request.symbol)?);
            }
        }

        let candles = self
            .fetch_chunk(
                &request.symbol,
                request.timeframe,
                clamp_limit(request, MAX_LIMIT),
                request.start_time,
                request.end_time,
            )
            .await?;
        Ok(finish_candles(candles, &request.symbol)?)
    }

    async fn current_price(&self, symbol: &str) -> anyhow::Result<PriceQuote> {
        let url = format!(
            "{}/api/v3/ticker/price?symbol={}",
            self.base_url,
            Self::pair(symbol)
        );
        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        Ok(PriceQuote {
            price: decimal_value(&body["price"])?,
            timestamp: Utc::now(),
        })
    }

    async fn daily_stats(&self, symbol: &str) -> anyhow::Result<DailyStats> {
        let url = format!(
            "{}/api/v3/ticker/24hr?symbol={}",
            self.base_url,
            Self::pair(symbol)
        );
        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        Ok(DailyStats {
            last_price: decimal_value(&body["lastPrice"])?,
            high: decimal_value(&body["highPrice"])?,
            low: decimal_value(&body["lowPrice"])?,
            volume: decimal_value(&body["volume"])?,
            change_pct: f64_value(&body["priceChangePercent"])?,
        })
    }

    async fn list_symbols(&self) -> anyhow::Result<Vec<String>> {
        let url = format!("{}/api/v3/exchangeInfo", self.base_url);
        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let symbols = body["symbols"]
            .as_array()
            .ok_or_else(|| ExchangeError::invalid("exchangeInfo: expected symbols array"))?
            .iter()
            .filter_map(|entry| {
                let quote = entry["quoteAsset"].as_str()?;
                if quote == "USDT" {
                    entry["baseAsset"].as_str().map(str::to_string)
                } else {
                    None
                }
            })
            .collect();
        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn pair_appends_usdt() {
        assert_eq!(BinanceClient::pair("btc"), "BTCUSDT");
    }

    #[test]
    fn every_timeframe_has_an_interval() {
        for tf in Timeframe::ALL {
            assert_eq!(BinanceClient::interval(tf), tf.as_str());
        }
    }

    #[test]
    fn parse_klines_maps_ohlcv_order() {
        let body = json!([
            [1_700_003_600_000i64, "101.0", "103.0", "100.5", "102.0", "9.5", 0, "x", 1, "y", "z", "0"],
            [1_700_000_000_000i64, "100.0", "102.0", "99.0", "101.0", "10.0", 0, "x", 1, "y", "z", "0"]
        ]);
        let candles = BinanceClient::parse_klines(&body).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open, dec!(101.0));
        assert_eq!(candles[0].high, dec!(103.0));
        assert_eq!(candles[0].low, dec!(100.5));
        assert_eq!(candles[0].close, dec!(102.0));
        assert_eq!(candles[0].volume, dec!(9.5));
        // Sorting happens in finish_candles, not here.
        let sorted = finish_candles(candles, "BTC").unwrap();
        assert!(sorted[0].timestamp < sorted[1].timestamp);
    }

    #[test]
    fn parse_klines_rejects_short_rows() {
        let body = json!([[1_700_000_000_000i64, "100.0"]]);
        assert!(BinanceClient::parse_klines(&body).is_err());
    }

    #[test]
    fn wide_windows_split_into_backward_pages() {
        // 2500 hourly candles: three pages of at most 1000, walked backward.
        let tf = Timeframe::H1;
        let start = 1_700_000_000i64;
        let end = start + tf.seconds() * 2_500;

        let span = ((end - start) / tf.seconds()) as usize;
        assert_eq!(span, 2_500);
        let pages = span.div_ceil(1_000);
        assert_eq!(pages, 3);

        let mut bounds = Vec::new();
        let mut current_end = end;
        for _ in 0..pages {
            let chunk_start = (current_end - tf.seconds() * 1_000).max(start);
            bounds.push((chunk_start, current_end));
            current_end = chunk_start;
            if current_end <= start {
                break;
            }
        }
        assert_eq!(bounds.len(), 3);
        assert_eq!(bounds[0].1, end);
        assert_eq!(bounds[2].0, start);
        // Pages tile the window without gaps.
        assert_eq!(bounds[0].0, bounds[1].1);
        assert_eq!(bounds[1].0, bounds[2].1);
    }
}
