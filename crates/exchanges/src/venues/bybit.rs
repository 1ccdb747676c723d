//! Bybit spot adapter.
//!
//! Pair format `<SYM>USDT`, millisecond timestamps, klines as
//! `[ts, open, high, low, close, volume, turnover]` under
//! `result.list`, newest first.

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

const DEFAULT_BASE_URL: &str = "https://api.bybit.com";
const MAX_LIMIT: usize = 1_000;

pub struct BybitClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    limiter: Arc<DirectRateLimiter>,
}

impl BybitClient {
    /// Creates a new Bybit client.
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

    fn interval(timeframe: Timeframe) -> Result<&'static str> {
        let interval = match timeframe {
            Timeframe::M1 => "1",
            Timeframe::M3 => "3",
            Timeframe::M5 => "5",
            Timeframe::M15 => "15",
            Timeframe::M30 => "30",
            Timeframe::H1 => "60",
            Timeframe::H2 => "120",
            Timeframe::H4 => "240",
            Timeframe::H6 => "360",
            Timeframe::H12 => "720",
            Timeframe::D1 => "D",
            Timeframe::W1 => "W",
            Timeframe::H8 | Timeframe::D3 => {
                return Err(ExchangeError::UnsupportedTimeframe {
                    venue: "bybit",
                    timeframe: timeframe.to_string(),
                })
            }
        };
        Ok(interval)
    }

    /// Unwraps the `{ retCode, result }` envelope.
    fn unwrap_envelope(body: &Value) -> Result<&Value> {
        let code = body["retCode"].as_i64().unwrap_or(-1);
        if code != 0 {
            let message = body["retMsg"].as_str().unwrap_or("unknown error");
            return Err(ExchangeError::invalid(format!("bybit {code}: {message}")));
        }
        Ok(&body["result"])
    }

    /// Decodes `result.list` kline rows.
    fn parse_klines(result: &Value) -> Result<Vec<Candle>> {
        let rows = result["list"]
            .as_array()
            .ok_or_else(|| ExchangeError::invalid("kline: expected result.list array"))?;
        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            let fields = row
                .as_array()
                .filter(|f| f.len() >= 6)
                .ok_or_else(|| ExchangeError::invalid("kline: short row"))?;
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
}

#[async_trait]
impl ExchangeClient for BybitClient {
    fn venue(&self) -> Venue {
        Venue::Bybit
    }

    async fn fetch_candles(&self, request: &CandleRequest) -> anyhow::Result<Vec<Candle>> {
        let mut url = format!(
            "{}/v5/market/kline?category=spot&symbol={}&interval={}&limit={}",
            self.base_url,
            Self::pair(&request.symbol),
            Self::interval(request.timeframe)?,
            clamp_limit(request, MAX_LIMIT),
        );
        if let Some(start) = request.start_time {
            url.push_str(&format!("&start={}", start * 1_000));
        }
        if let Some(end) = request.end_time {
            url.push_str(&format!("&end={}", end * 1_000));
        }

        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let result = Self::unwrap_envelope(&body)?;
        let candles = Self::parse_klines(result)?;
        Ok(finish_candles(candles, &request.symbol)?)
    }

    async fn current_price(&self, symbol: &str) -> anyhow::Result<PriceQuote> {
        let url = format!(
            "{}/v5/market/tickers?category=spot&symbol={}",
            self.base_url,
            Self::pair(symbol)
        );
        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let result = Self::unwrap_envelope(&body)?;
        let ticker = result["list"]
            .as_array()
            .and_then(|list| list.first())
            .ok_or_else(|| ExchangeError::invalid("tickers: empty list"))?;
        Ok(PriceQuote {
            price: decimal_value(&ticker["lastPrice"])?,
            timestamp: Utc::now(),
        })
    }

    async fn daily_stats(&self, symbol: &str) -> anyhow::Result<DailyStats> {
        let url = format!(
            "{}/v5/market/tickers?category=spot&symbol={}",
            self.base_url,
            Self::pair(symbol)
        );
        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let result = Self::unwrap_envelope(&body)?;
        let ticker = result["list"]
            .as_array()
            .and_then(|list| list.first())
            .ok_or_else(|| ExchangeError::invalid("tickers: empty list"))?;
        Ok(DailyStats {
            last_price: decimal_value(&ticker["lastPrice"])?,
            high: decimal_value(&ticker["highPrice24h"])?,
            low: decimal_value(&ticker["lowPrice24h"])?,
            volume: decimal_value(&ticker["volume24h"])?,
            // price24hPcnt is a fraction.
            change_pct: f64_value(&ticker["price24hPcnt"])? * 100.0,
        })
    }

    async fn list_symbols(&self) -> anyhow::Result<Vec<String>> {
        let url = format!(
            "{}/v5/market/instruments-info?category=spot",
            self.base_url
        );
        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let result = Self::unwrap_envelope(&body)?;
        let symbols = result["list"]
            .as_array()
            .ok_or_else(|| ExchangeError::invalid("instruments-info: expected list"))?
            .iter()
            .filter_map(|entry| {
                if entry["quoteCoin"].as_str()? == "USDT" {
                    entry["baseCoin"].as_str().map(str::to_string)
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
    fn pair_is_concatenated() {
        assert_eq!(BybitClient::pair("sol"), "SOLUSDT");
    }

    #[test]
    fn interval_mapping_uses_minute_codes() {
        assert_eq!(BybitClient::interval(Timeframe::H4).unwrap(), "240");
        assert_eq!(BybitClient::interval(Timeframe::D1).unwrap(), "D");
        assert!(BybitClient::interval(Timeframe::H8).is_err());
        assert!(BybitClient::interval(Timeframe::D3).is_err());
    }

    #[test]
    fn parse_klines_reads_result_list() {
        let result = json!({
            "list": [
                ["1700003600000", "101.0", "103.0", "100.5", "102.0", "9.5", "950"],
                ["1700000000000", "100.0", "102.0", "99.0", "101.0", "10.0", "1000"]
            ]
        });
        let candles = BybitClient::parse_klines(&result).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[1].close, dec!(101.0));
        let sorted = finish_candles(candles, "BTC").unwrap();
        assert!(sorted[0].timestamp < sorted[1].timestamp);
    }

    #[test]
    fn envelope_rejects_nonzero_ret_code() {
        let body = json!({ "retCode": 10001, "retMsg": "Not supported symbols" });
        let err = BybitClient::unwrap_envelope(&body).unwrap_err();
        assert!(err.is_symbol_not_supported());
    }
}
