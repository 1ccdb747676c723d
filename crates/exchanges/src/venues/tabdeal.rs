//! Tabdeal adapter (Iranian market, IRT quote).
//!
//! Pair format `<SYM>IRT`, second timestamps, klines returned as an array of
//! objects rather than positional tuples.

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

const DEFAULT_BASE_URL: &str = "https://api.tabdeal.org";
const MAX_LIMIT: usize = 500;

pub struct TabdealClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    limiter: Arc<DirectRateLimiter>,
}

impl TabdealClient {
    /// Creates a new Tabdeal client.
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
        format!("{}IRT", symbol.to_uppercase())
    }

    fn interval(timeframe: Timeframe) -> Result<&'static str> {
        let interval = match timeframe {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
            Timeframe::W1 => "1w",
            _ => {
                return Err(ExchangeError::UnsupportedTimeframe {
                    venue: "tabdeal",
                    timeframe: timeframe.to_string(),
                })
            }
        };
        Ok(interval)
    }

    /// Decodes the object-form kline rows.
    fn parse_klines(value: &Value) -> Result<Vec<Candle>> {
        let rows = value
            .as_array()
            .ok_or_else(|| ExchangeError::invalid("klines: expected array"))?;
        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            if !row.is_object() {
                return Err(ExchangeError::invalid("klines: expected object rows"));
            }
            candles.push(Candle {
                timestamp: ts_from_secs(int_value(&row["time"])?)?,
                open: decimal_value(&row["open"])?,
                high: decimal_value(&row["high"])?,
                low: decimal_value(&row["low"])?,
                close: decimal_value(&row["close"])?,
                volume: decimal_value(&row["volume"])?,
            });
        }
        Ok(candles)
    }
}

#[async_trait]
impl ExchangeClient for TabdealClient {
    fn venue(&self) -> Venue {
        Venue::Tabdeal
    }

    async fn fetch_candles(&self, request: &CandleRequest) -> anyhow::Result<Vec<Candle>> {
        let mut url = format!(
            "{}/api/v1/market/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            Self::pair(&request.symbol),
            Self::interval(request.timeframe)?,
            clamp_limit(request, MAX_LIMIT),
        );
        if let Some(start) = request.start_time {
            url.push_str(&format!("&startTime={start}"));
        }
        if let Some(end) = request.end_time {
            url.push_str(&format!("&endTime={end}"));
        }

        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let candles = Self::parse_klines(&body)?;
        Ok(finish_candles(candles, &request.symbol)?)
    }

    async fn current_price(&self, symbol: &str) -> anyhow::Result<PriceQuote> {
        let url = format!(
            "{}/api/v1/market/ticker?symbol={}",
            self.base_url,
            Self::pair(symbol)
        );
        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        Ok(PriceQuote {
            price: decimal_value(&body["lastPrice"])?,
            timestamp: Utc::now(),
        })
    }

    async fn daily_stats(&self, symbol: &str) -> anyhow::Result<DailyStats> {
        let url = format!(
            "{}/api/v1/market/ticker?symbol={}",
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
        let url = format!("{}/api/v1/market/symbols", self.base_url);
        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let symbols = body
            .as_array()
            .ok_or_else(|| ExchangeError::invalid("symbols: expected array"))?
            .iter()
            .filter_map(|entry| {
                let name = entry["symbol"].as_str()?;
                name.strip_suffix("IRT").map(str::to_string)
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
    fn pair_quotes_in_irt() {
        assert_eq!(TabdealClient::pair("btc"), "BTCIRT");
    }

    #[test]
    fn interval_mapping_has_gaps() {
        assert_eq!(TabdealClient::interval(Timeframe::H1).unwrap(), "1h");
        assert!(TabdealClient::interval(Timeframe::H2).is_err());
        assert!(TabdealClient::interval(Timeframe::H12).is_err());
    }

    #[test]
    fn parse_klines_reads_object_rows() {
        let body = json!([
            { "time": 1_700_000_000i64, "open": "5000000000", "high": "5100000000",
              "low": "4950000000", "close": "5050000000", "volume": "2.5" },
            { "time": 1_700_003_600i64, "open": "5050000000", "high": "5150000000",
              "low": "5000000000", "close": "5100000000", "volume": "1.8" }
        ]);
        let candles = TabdealClient::parse_klines(&body).unwrap();
        assert_eq!(candles[0].open, dec!(5000000000));
        assert!(candles.iter().all(Candle::is_well_formed));
    }

    #[test]
    fn parse_klines_rejects_tuple_rows() {
        let body = json!([[1_700_000_000i64, "1", "2", "0.5", "1.5", "10"]]);
        assert!(TabdealClient::parse_klines(&body).is_err());
    }
}
