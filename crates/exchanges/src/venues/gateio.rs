//! Gate.io spot adapter.
//!
//! Pair format `<SYM>_USDT`, second timestamps, candlesticks as
//! `[ts, quote_volume, close, high, low, open, base_volume]`. The V-C-H-L-O
//! order is unique to this venue. Rows arrive ascending.

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
    per_minute_limiter, ts_from_secs, DirectRateLimiter,
};

const DEFAULT_BASE_URL: &str = "https://api.gateio.ws";
const MAX_LIMIT: usize = 1_000;

pub struct GateIoClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    limiter: Arc<DirectRateLimiter>,
}

impl GateIoClient {
    /// Creates a new Gate.io client.
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
        format!("{}_USDT", symbol.to_uppercase())
    }

    fn interval(timeframe: Timeframe) -> Result<&'static str> {
        let interval = match timeframe {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::H8 => "8h",
            Timeframe::D1 => "1d",
            Timeframe::W1 => "7d",
            _ => {
                return Err(ExchangeError::UnsupportedTimeframe {
                    venue: "gateio",
                    timeframe: timeframe.to_string(),
                })
            }
        };
        Ok(interval)
    }

    /// Decodes candlestick rows; Gate.io order is ts, quote volume, close,
    /// high, low, open, with base volume trailing when present.
    fn parse_candlesticks(value: &Value) -> Result<Vec<Candle>> {
        let rows = value
            .as_array()
            .ok_or_else(|| ExchangeError::invalid("candlesticks: expected array"))?;
        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            let fields = row
                .as_array()
                .filter(|f| f.len() >= 6)
                .ok_or_else(|| ExchangeError::invalid("candlesticks: short row"))?;
            candles.push(Candle {
                timestamp: ts_from_secs(int_value(&fields[0])?)?,
                volume: decimal_value(&fields[1])?,
                close: decimal_value(&fields[2])?,
                high: decimal_value(&fields[3])?,
                low: decimal_value(&fields[4])?,
                open: decimal_value(&fields[5])?,
            });
        }
        Ok(candles)
    }
}

#[async_trait]
impl ExchangeClient for GateIoClient {
    fn venue(&self) -> Venue {
        Venue::GateIo
    }

    async fn fetch_candles(&self, request: &CandleRequest) -> anyhow::Result<Vec<Candle>> {
        let mut url = format!(
            "{}/api/v4/spot/candlesticks?currency_pair={}&interval={}",
            self.base_url,
            Self::pair(&request.symbol),
            Self::interval(request.timeframe)?,
        );
        // Gate.io rejects limit combined with a from/to window.
        if let (Some(start), Some(end)) = (request.start_time, request.end_time) {
            url.push_str(&format!("&from={start}&to={end}"));
        } else {
            url.push_str(&format!("&limit={}", clamp_limit(request, MAX_LIMIT)));
        }

        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let candles = Self::parse_candlesticks(&body)?;
        Ok(finish_candles(candles, &request.symbol)?)
    }

    async fn current_price(&self, symbol: &str) -> anyhow::Result<PriceQuote> {
        let url = format!(
            "{}/api/v4/spot/tickers?currency_pair={}",
            self.base_url,
            Self::pair(symbol)
        );
        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let ticker = body
            .as_array()
            .and_then(|list| list.first())
            .ok_or_else(|| ExchangeError::invalid("tickers: empty list"))?;
        Ok(PriceQuote {
            price: decimal_value(&ticker["last"])?,
            timestamp: Utc::now(),
        })
    }

    async fn daily_stats(&self, symbol: &str) -> anyhow::Result<DailyStats> {
        let url = format!(
            "{}/api/v4/spot/tickers?currency_pair={}",
            self.base_url,
            Self::pair(symbol)
        );
        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let ticker = body
            .as_array()
            .and_then(|list| list.first())
            .ok_or_else(|| ExchangeError::invalid("tickers: empty list"))?;
        Ok(DailyStats {
            last_price: decimal_value(&ticker["last"])?,
            high: decimal_value(&ticker["high_24h"])?,
            low: decimal_value(&ticker["low_24h"])?,
            volume: decimal_value(&ticker["base_volume"])?,
            change_pct: f64_value(&ticker["change_percentage"])?,
        })
    }

    async fn list_symbols(&self) -> anyhow::Result<Vec<String>> {
        let url = format!("{}/api/v4/spot/currency_pairs", self.base_url);
        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let symbols = body
            .as_array()
            .ok_or_else(|| ExchangeError::invalid("currency_pairs: expected array"))?
            .iter()
            .filter_map(|entry| {
                if entry["quote"].as_str()? == "USDT" {
                    entry["base"].as_str().map(str::to_string)
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
    fn pair_uses_underscore_separator() {
        assert_eq!(GateIoClient::pair("btc"), "BTC_USDT");
    }

    #[test]
    fn interval_mapping_has_gaps() {
        assert_eq!(GateIoClient::interval(Timeframe::H8).unwrap(), "8h");
        assert_eq!(GateIoClient::interval(Timeframe::W1).unwrap(), "7d");
        assert!(GateIoClient::interval(Timeframe::M3).is_err());
        assert!(GateIoClient::interval(Timeframe::H2).is_err());
    }

    #[test]
    fn parse_candlesticks_maps_vchlo_order() {
        let body = json!([
            ["1700000000", "1000.5", "101.0", "102.0", "99.0", "100.0", "10.0"],
            ["1700003600", "950.2", "102.0", "103.0", "100.5", "101.0", "9.5"]
        ]);
        let candles = GateIoClient::parse_candlesticks(&body).unwrap();
        assert_eq!(candles[0].volume, dec!(1000.5));
        assert_eq!(candles[0].close, dec!(101.0));
        assert_eq!(candles[0].high, dec!(102.0));
        assert_eq!(candles[0].low, dec!(99.0));
        assert_eq!(candles[0].open, dec!(100.0));
        assert!(candles[0].is_well_formed());
    }
}
