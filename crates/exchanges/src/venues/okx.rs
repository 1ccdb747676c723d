//! OKX spot adapter.
//!
//! Pair format `<SYM>-USDT`, millisecond timestamps, candles as
//! `[ts, open, high, low, close, volume, ...]` under `data`, newest first.

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
    clamp_limit, decimal_value, finish_candles, get_json, int_value, per_minute_limiter,
    ts_from_millis, DirectRateLimiter,
};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

const DEFAULT_BASE_URL: &str = "https://www.okx.com";
const MAX_LIMIT: usize = 300;

pub struct OkxClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    limiter: Arc<DirectRateLimiter>,
}

impl OkxClient {
    /// Creates a new OKX client.
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
        format!("{}-USDT", symbol.to_uppercase())
    }

    fn interval(timeframe: Timeframe) -> Result<&'static str> {
        let interval = match timeframe {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1H",
            Timeframe::H2 => "2H",
            Timeframe::H4 => "4H",
            Timeframe::H6 => "6H",
            Timeframe::H12 => "12H",
            Timeframe::D1 => "1D",
            Timeframe::D3 => "3D",
            Timeframe::W1 => "1W",
            Timeframe::H8 => {
                return Err(ExchangeError::UnsupportedTimeframe {
                    venue: "okx",
                    timeframe: timeframe.to_string(),
                })
            }
        };
        Ok(interval)
    }

    /// Unwraps the `{ code, data }` envelope.
    fn unwrap_envelope(body: &Value) -> Result<&Value> {
        let code = body["code"].as_str().unwrap_or_default();
        if code != "0" {
            let message = body["msg"].as_str().unwrap_or("unknown error");
            return Err(ExchangeError::invalid(format!("okx {code}: {message}")));
        }
        Ok(&body["data"])
    }

    /// Decodes candle rows from the `data` array.
    fn parse_candles(data: &Value) -> Result<Vec<Candle>> {
        let rows = data
            .as_array()
            .ok_or_else(|| ExchangeError::invalid("candles: expected array"))?;
        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            let fields = row
                .as_array()
                .filter(|f| f.len() >= 6)
                .ok_or_else(|| ExchangeError::invalid("candles: short row"))?;
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
impl ExchangeClient for OkxClient {
    fn venue(&self) -> Venue {
        Venue::Okx
    }

    async fn fetch_candles(&self, request: &CandleRequest) -> anyhow::Result<Vec<Candle>> {
        let mut url = format!(
            "{}/api/v5/market/candles?instId={}&bar={}&limit={}",
            self.base_url,
            Self::pair(&request.symbol),
            Self::interval(request.timeframe)?,
            clamp_limit(request, MAX_LIMIT),
        );
        // OKX paginates backward: `after` returns rows older than the cursor.
        if let Some(end) = request.end_time {
            url.push_str(&format!("&after={}", end * 1_000));
        }
        if let Some(start) = request.start_time {
            url.push_str(&format!("&before={}", start * 1_000 - 1));
        }

        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let data = Self::unwrap_envelope(&body)?;
        let candles = Self::parse_candles(data)?;
        Ok(finish_candles(candles, &request.symbol)?)
    }

    async fn current_price(&self, symbol: &str) -> anyhow::Result<PriceQuote> {
        let url = format!(
            "{}/api/v5/market/ticker?instId={}",
            self.base_url,
            Self::pair(symbol)
        );
        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let data = Self::unwrap_envelope(&body)?;
        let ticker = data
            .as_array()
            .and_then(|list| list.first())
            .ok_or_else(|| ExchangeError::invalid("ticker: empty data"))?;
        Ok(PriceQuote {
            price: decimal_value(&ticker["last"])?,
            timestamp: Utc::now(),
        })
    }

    async fn daily_stats(&self, symbol: &str) -> anyhow::Result<DailyStats> {
        let url = format!(
            "{}/api/v5/market/ticker?instId={}",
            self.base_url,
            Self::pair(symbol)
        );
        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let data = Self::unwrap_envelope(&body)?;
        let ticker = data
            .as_array()
            .and_then(|list| list.first())
            .ok_or_else(|| ExchangeError::invalid("ticker: empty data"))?;
        let last = decimal_value(&ticker["last"])?;
        let open = decimal_value(&ticker["open24h"])?;
        let change_pct = if open.is_zero() {
            0.0
        } else {
            ((last - open) / open * Decimal::ONE_HUNDRED)
                .to_f64()
                .unwrap_or(0.0)
        };
        Ok(DailyStats {
            last_price: last,
            high: decimal_value(&ticker["high24h"])?,
            low: decimal_value(&ticker["low24h"])?,
            volume: decimal_value(&ticker["vol24h"])?,
            change_pct,
        })
    }

    async fn list_symbols(&self) -> anyhow::Result<Vec<String>> {
        let url = format!(
            "{}/api/v5/public/instruments?instType=SPOT",
            self.base_url
        );
        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let data = Self::unwrap_envelope(&body)?;
        let symbols = data
            .as_array()
            .ok_or_else(|| ExchangeError::invalid("instruments: expected array"))?
            .iter()
            .filter_map(|entry| {
                if entry["quoteCcy"].as_str()? == "USDT" {
                    entry["baseCcy"].as_str().map(str::to_string)
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
    fn pair_uses_dash_separator() {
        assert_eq!(OkxClient::pair("btc"), "BTC-USDT");
    }

    #[test]
    fn interval_uses_uppercase_hours() {
        assert_eq!(OkxClient::interval(Timeframe::H1).unwrap(), "1H");
        assert_eq!(OkxClient::interval(Timeframe::D3).unwrap(), "3D");
        assert!(OkxClient::interval(Timeframe::H8).is_err());
    }

    #[test]
    fn parse_candles_maps_fields() {
        let data = json!([
            ["1700003600000", "101.0", "103.0", "100.5", "102.0", "9.5", "959", "97000", "1"],
            ["1700000000000", "100.0", "102.0", "99.0", "101.0", "10.0", "1010", "101000", "1"]
        ]);
        let candles = OkxClient::parse_candles(&data).unwrap();
        assert_eq!(candles[0].high, dec!(103.0));
        assert!(candles.iter().all(Candle::is_well_formed));
    }

    #[test]
    fn envelope_rejects_error_codes() {
        let body = json!({ "code": "51001", "msg": "Instrument ID does not exist" });
        let err = OkxClient::unwrap_envelope(&body).unwrap_err();
        assert!(err.is_symbol_not_supported());
    }
}
