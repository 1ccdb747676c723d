//! KuCoin spot adapter.
//!
//! Pair format `<SYM>-USDT`, second timestamps, klines as
//! `[ts, open, close, high, low, volume, turnover]`. Note the OC-HL field
//! order, which differs from the usual OHLC. Rows arrive newest first.

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
    decimal_value, f64_value, finish_candles, get_json, int_value, per_minute_limiter,
    ts_from_secs, DirectRateLimiter,
};

const DEFAULT_BASE_URL: &str = "https://api.kucoin.com";

pub struct KuCoinClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    limiter: Arc<DirectRateLimiter>,
}

impl KuCoinClient {
    /// Creates a new KuCoin client.
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
            Timeframe::M1 => "1min",
            Timeframe::M3 => "3min",
            Timeframe::M5 => "5min",
            Timeframe::M15 => "15min",
            Timeframe::M30 => "30min",
            Timeframe::H1 => "1hour",
            Timeframe::H2 => "2hour",
            Timeframe::H4 => "4hour",
            Timeframe::H6 => "6hour",
            Timeframe::H8 => "8hour",
            Timeframe::H12 => "12hour",
            Timeframe::D1 => "1day",
            Timeframe::W1 => "1week",
            Timeframe::D3 => {
                return Err(ExchangeError::UnsupportedTimeframe {
                    venue: "kucoin",
                    timeframe: timeframe.to_string(),
                })
            }
        };
        Ok(interval)
    }

    /// Unwraps the `{ code, data }` envelope, rejecting non-success codes.
    fn unwrap_envelope(body: &Value) -> Result<&Value> {
        let code = body["code"].as_str().unwrap_or_default();
        if code != "200000" {
            let message = body["msg"].as_str().unwrap_or("unknown error");
            return Err(ExchangeError::invalid(format!("kucoin {code}: {message}")));
        }
        Ok(&body["data"])
    }

    /// Decodes the candle rows inside the envelope's `data` array.
    fn parse_klines(data: &Value) -> Result<Vec<Candle>> {
        let rows = data
            .as_array()
            .ok_or_else(|| ExchangeError::invalid("candles: expected array"))?;
        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            let fields = row
                .as_array()
                .filter(|f| f.len() >= 6)
                .ok_or_else(|| ExchangeError::invalid("candles: short row"))?;
            // KuCoin order: [ts, open, close, high, low, volume]
            candles.push(Candle {
                timestamp: ts_from_secs(int_value(&fields[0])?)?,
                open: decimal_value(&fields[1])?,
                close: decimal_value(&fields[2])?,
                high: decimal_value(&fields[3])?,
                low: decimal_value(&fields[4])?,
                volume: decimal_value(&fields[5])?,
            });
        }
        Ok(candles)
    }
}

#[async_trait]
impl ExchangeClient for KuCoinClient {
    fn venue(&self) -> Venue {
        Venue::KuCoin
    }

    async fn fetch_candles(&self, request: &CandleRequest) -> anyhow::Result<Vec<Candle>> {
        let mut url = format!(
            "{}/api/v1/market/candles?symbol={}&type={}",
            self.base_url,
            Self::pair(&request.symbol),
            Self::interval(request.timeframe)?,
        );
        if let Some(start) = request.start_time {
            url.push_str(&format!("&startAt={start}"));
        }
        if let Some(end) = request.end_time {
            url.push_str(&format!("&endAt={end}"));
        }

        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let data = Self::unwrap_envelope(&body)?;
        let mut candles = Self::parse_klines(data)?;
        // KuCoin has no limit parameter; trim to the newest `limit` rows.
        candles.sort_by_key(|c| c.timestamp);
        if candles.len() > request.limit {
            candles = candles.split_off(candles.len() - request.limit);
        }
        Ok(finish_candles(candles, &request.symbol)?)
    }

    async fn current_price(&self, symbol: &str) -> anyhow::Result<PriceQuote> {
        let url = format!(
            "{}/api/v1/market/orderbook/level1?symbol={}",
            self.base_url,
            Self::pair(symbol)
        );
        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let data = Self::unwrap_envelope(&body)?;
        Ok(PriceQuote {
            price: decimal_value(&data["price"])?,
            timestamp: Utc::now(),
        })
    }

    async fn daily_stats(&self, symbol: &str) -> anyhow::Result<DailyStats> {
        let url = format!(
            "{}/api/v1/market/stats?symbol={}",
            self.base_url,
            Self::pair(symbol)
        );
        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let data = Self::unwrap_envelope(&body)?;
        Ok(DailyStats {
            last_price: decimal_value(&data["last"])?,
            high: decimal_value(&data["high"])?,
            low: decimal_value(&data["low"])?,
            volume: decimal_value(&data["vol"])?,
            // changeRate is a fraction (0.0123), not a percent.
            change_pct: f64_value(&data["changeRate"])? * 100.0,
        })
    }

    async fn list_symbols(&self) -> anyhow::Result<Vec<String>> {
        let url = format!("{}/api/v1/symbols", self.base_url);
        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let data = Self::unwrap_envelope(&body)?;
        let symbols = data
            .as_array()
            .ok_or_else(|| ExchangeError::invalid("symbols: expected array"))?
            .iter()
            .filter_map(|entry| {
                if entry["quoteCurrency"].as_str()? == "USDT" {
                    entry["baseCurrency"].as_str().map(str::to_string)
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
        assert_eq!(KuCoinClient::pair("eth"), "ETH-USDT");
    }

    #[test]
    fn three_day_timeframe_is_unsupported() {
        assert!(KuCoinClient::interval(Timeframe::D3).is_err());
        assert_eq!(KuCoinClient::interval(Timeframe::H1).unwrap(), "1hour");
        assert_eq!(KuCoinClient::interval(Timeframe::W1).unwrap(), "1week");
    }

    #[test]
    fn parse_klines_handles_oc_hl_order() {
        let data = json!([
            ["1700003600", "101.0", "102.0", "103.0", "100.5", "9.5", "950"],
            ["1700000000", "100.0", "101.0", "102.0", "99.0", "10.0", "1000"]
        ]);
        let candles = KuCoinClient::parse_klines(&data).unwrap();
        assert_eq!(candles[0].open, dec!(101.0));
        assert_eq!(candles[0].close, dec!(102.0));
        assert_eq!(candles[0].high, dec!(103.0));
        assert_eq!(candles[0].low, dec!(100.5));
        assert!(candles[0].is_well_formed());
    }

    #[test]
    fn envelope_rejects_error_codes() {
        let body = json!({ "code": "400100", "msg": "Invalid symbol" });
        let err = KuCoinClient::unwrap_envelope(&body).unwrap_err();
        assert!(err.is_symbol_not_supported());
    }

    #[test]
    fn envelope_accepts_success() {
        let body = json!({ "code": "200000", "data": [] });
        assert!(KuCoinClient::unwrap_envelope(&body).is_ok());
    }
}
