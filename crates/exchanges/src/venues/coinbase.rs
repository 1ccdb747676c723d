//! Coinbase Exchange adapter.
//!
//! Pair format `<SYM>-USD`, second timestamps, candles as
//! `[ts, low, high, open, close, volume]`, newest first. Only six
//! granularities exist; everything else is unsupported.

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
    decimal_value, finish_candles, get_json, int_value, per_minute_limiter, ts_from_secs,
    DirectRateLimiter,
};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

const DEFAULT_BASE_URL: &str = "https://api.exchange.coinbase.com";

pub struct CoinbaseClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    limiter: Arc<DirectRateLimiter>,
}

impl CoinbaseClient {
    /// Creates a new Coinbase client.
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
        format!("{}-USD", symbol.to_uppercase())
    }

    /// Granularity in seconds; Coinbase supports exactly six.
    fn granularity(timeframe: Timeframe) -> Result<i64> {
        let secs = match timeframe {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::H1 => 3_600,
            Timeframe::H6 => 21_600,
            Timeframe::D1 => 86_400,
            _ => {
                return Err(ExchangeError::UnsupportedTimeframe {
                    venue: "coinbase",
                    timeframe: timeframe.to_string(),
                })
            }
        };
        Ok(secs)
    }

    /// Decodes the top-level candle array; Coinbase order is L-H-O-C.
    fn parse_candles(value: &Value) -> Result<Vec<Candle>> {
        let rows = value
            .as_array()
            .ok_or_else(|| ExchangeError::invalid("candles: expected array"))?;
        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            let fields = row
                .as_array()
                .filter(|f| f.len() >= 6)
                .ok_or_else(|| ExchangeError::invalid("candles: short row"))?;
            candles.push(Candle {
                timestamp: ts_from_secs(int_value(&fields[0])?)?,
                low: decimal_value(&fields[1])?,
                high: decimal_value(&fields[2])?,
                open: decimal_value(&fields[3])?,
                close: decimal_value(&fields[4])?,
                volume: decimal_value(&fields[5])?,
            });
        }
        Ok(candles)
    }
}

#[async_trait]
impl ExchangeClient for CoinbaseClient {
    fn venue(&self) -> Venue {
        Venue::Coinbase
    }

    async fn fetch_candles(&self, request: &CandleRequest) -> anyhow::Result<Vec<Candle>> {
        let granularity = Self::granularity(request.timeframe)?;
        let mut url = format!(
            "{}/products/{}/candles?granularity={}",
            self.base_url,
            Self::pair(&request.symbol),
            granularity,
        );
        if let (Some(start), Some(end)) = (request.start_time, request.end_time) {
            url.push_str(&format!("&start={start}&end={end}"));
        }

        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let mut candles = Self::parse_candles(&body)?;
        candles.sort_by_key(|c| c.timestamp);
        if candles.len() > request.limit {
            candles = candles.split_off(candles.len() - request.limit);
        }
        Ok(finish_candles(candles, &request.symbol)?)
    }

    async fn current_price(&self, symbol: &str) -> anyhow::Result<PriceQuote> {
        let url = format!(
            "{}/products/{}/ticker",
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
            "{}/products/{}/stats",
            self.base_url,
            Self::pair(symbol)
        );
        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let last = decimal_value(&body["last"])?;
        let open = decimal_value(&body["open"])?;
        let change_pct = if open.is_zero() {
            0.0
        } else {
            ((last - open) / open * Decimal::ONE_HUNDRED)
                .to_f64()
                .unwrap_or(0.0)
        };
        Ok(DailyStats {
            last_price: last,
            high: decimal_value(&body["high"])?,
            low: decimal_value(&body["low"])?,
            volume: decimal_value(&body["volume"])?,
            change_pct,
        })
    }

    async fn list_symbols(&self) -> anyhow::Result<Vec<String>> {
        let url = format!("{}/products", self.base_url);
        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let symbols = body
            .as_array()
            .ok_or_else(|| ExchangeError::invalid("products: expected array"))?
            .iter()
            .filter_map(|entry| {
                if entry["quote_currency"].as_str()? == "USD" {
                    entry["base_currency"].as_str().map(str::to_string)
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
    fn pair_quotes_in_usd() {
        assert_eq!(CoinbaseClient::pair("btc"), "BTC-USD");
    }

    #[test]
    fn only_six_granularities_supported() {
        assert_eq!(CoinbaseClient::granularity(Timeframe::H1).unwrap(), 3_600);
        assert_eq!(CoinbaseClient::granularity(Timeframe::H6).unwrap(), 21_600);
        assert!(CoinbaseClient::granularity(Timeframe::M3).is_err());
        assert!(CoinbaseClient::granularity(Timeframe::H4).is_err());
        assert!(CoinbaseClient::granularity(Timeframe::W1).is_err());
    }

    #[test]
    fn parse_candles_maps_lhoc_order() {
        let body = json!([
            [1_700_003_600i64, 100.5, 103.0, 101.0, 102.0, 9.5],
            [1_700_000_000i64, 99.0, 102.0, 100.0, 101.0, 10.0]
        ]);
        let candles = CoinbaseClient::parse_candles(&body).unwrap();
        assert_eq!(candles[0].low, dec!(100.5));
        assert_eq!(candles[0].high, dec!(103.0));
        assert_eq!(candles[0].open, dec!(101.0));
        assert_eq!(candles[0].close, dec!(102.0));
        assert!(candles[0].is_well_formed());
    }
}
