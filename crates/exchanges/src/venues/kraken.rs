//! Kraken adapter.
//!
//! Kraken uses its own asset codes (`XBT` for BTC), second timestamps, and
//! OHLC rows of `[ts, open, high, low, close, vwap, volume, count]` keyed by
//! pair name inside `result`. Rows arrive ascending.

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

const DEFAULT_BASE_URL: &str = "https://api.kraken.com";

pub struct KrakenClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    limiter: Arc<DirectRateLimiter>,
}

impl KrakenClient {
    /// Creates a new Kraken client.
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

    /// Kraken pair name: its own asset codes against USD.
    fn pair(symbol: &str) -> String {
        let base = match symbol.to_uppercase().as_str() {
            "BTC" => "XBT".to_string(),
            "DOGE" => "XDG".to_string(),
            other => other.to_string(),
        };
        format!("{base}USD")
    }

    /// Interval in minutes; Kraken accepts a fixed set.
    fn interval(timeframe: Timeframe) -> Result<i64> {
        let minutes = match timeframe {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1_440,
            Timeframe::W1 => 10_080,
            _ => {
                return Err(ExchangeError::UnsupportedTimeframe {
                    venue: "kraken",
                    timeframe: timeframe.to_string(),
                })
            }
        };
        Ok(minutes)
    }

    /// Unwraps Kraken's `{ error: [], result: {...} }` envelope.
    fn unwrap_envelope(body: &Value) -> Result<&Value> {
        if let Some(errors) = body["error"].as_array() {
            if !errors.is_empty() {
                let joined = errors
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join("; ");
                // EQuery:Unknown asset pair is Kraken's not-found shape.
                if joined.contains("Unknown asset pair") {
                    return Err(ExchangeError::SymbolNotSupported(joined));
                }
                return Err(ExchangeError::invalid(format!("kraken: {joined}")));
            }
        }
        Ok(&body["result"])
    }

    /// Decodes OHLC rows from the first pair-keyed array inside `result`,
    /// dropping the vwap column.
    fn parse_ohlc(result: &Value) -> Result<Vec<Candle>> {
        let rows = result
            .as_object()
            .and_then(|map| {
                map.iter()
                    .find(|(key, _)| key.as_str() != "last")
                    .map(|(_, v)| v)
            })
            .and_then(Value::as_array)
            .ok_or_else(|| ExchangeError::invalid("OHLC: no pair data"))?;
        let mut candles = Vec::with_capacity(rows.len());
        for row in rows {
            let fields = row
                .as_array()
                .filter(|f| f.len() >= 7)
                .ok_or_else(|| ExchangeError::invalid("OHLC: short row"))?;
            candles.push(Candle {
                timestamp: ts_from_secs(int_value(&fields[0])?)?,
                open: decimal_value(&fields[1])?,
                high: decimal_value(&fields[2])?,
                low: decimal_value(&fields[3])?,
                close: decimal_value(&fields[4])?,
                // fields[5] is vwap; volume is the seventh column.
                volume: decimal_value(&fields[6])?,
            });
        }
        Ok(candles)
    }
}

#[async_trait]
impl ExchangeClient for KrakenClient {
    fn venue(&self) -> Venue {
        Venue::Kraken
    }

    async fn fetch_candles(&self, request: &CandleRequest) -> anyhow::Result<Vec<Candle>> {
        let mut url = format!(
            "{}/0/public/OHLC?pair={}&interval={}",
            self.base_url,
            Self::pair(&request.symbol),
            Self::interval(request.timeframe)?,
        );
        if let Some(start) = request.start_time {
            url.push_str(&format!("&since={start}"));
        }

        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let result = Self::unwrap_envelope(&body)?;
        let mut candles = Self::parse_ohlc(result)?;
        if let Some(end) = request.end_time {
            candles.retain(|c| c.timestamp.timestamp() <= end);
        }
        candles.sort_by_key(|c| c.timestamp);
        if candles.len() > request.limit {
            candles = candles.split_off(candles.len() - request.limit);
        }
        Ok(finish_candles(candles, &request.symbol)?)
    }

    async fn current_price(&self, symbol: &str) -> anyhow::Result<PriceQuote> {
        let url = format!(
            "{}/0/public/Ticker?pair={}",
            self.base_url,
            Self::pair(symbol)
        );
        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let result = Self::unwrap_envelope(&body)?;
        let ticker = result
            .as_object()
            .and_then(|map| map.values().next())
            .ok_or_else(|| ExchangeError::invalid("Ticker: no pair data"))?;
        let last = ticker["c"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| ExchangeError::invalid("Ticker: missing close"))?;
        Ok(PriceQuote {
            price: decimal_value(last)?,
            timestamp: Utc::now(),
        })
    }

    async fn daily_stats(&self, symbol: &str) -> anyhow::Result<DailyStats> {
        let url = format!(
            "{}/0/public/Ticker?pair={}",
            self.base_url,
            Self::pair(symbol)
        );
        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let result = Self::unwrap_envelope(&body)?;
        let ticker = result
            .as_object()
            .and_then(|map| map.values().next())
            .ok_or_else(|| ExchangeError::invalid("Ticker: no pair data"))?;

        let field = |key: &str, index: usize| -> Result<Decimal> {
            let value = ticker[key]
                .as_array()
                .and_then(|a| a.get(index))
                .ok_or_else(|| ExchangeError::invalid(format!("Ticker: missing {key}")))?;
            decimal_value(value)
        };

        let last = field("c", 0)?;
        let open = decimal_value(&ticker["o"]).or_else(|_| field("o", 0))?;
        let change_pct = if open.is_zero() {
            0.0
        } else {
            ((last - open) / open * Decimal::ONE_HUNDRED)
                .to_f64()
                .unwrap_or(0.0)
        };
        Ok(DailyStats {
            last_price: last,
            high: field("h", 1)?,
            low: field("l", 1)?,
            volume: field("v", 1)?,
            change_pct,
        })
    }

    async fn list_symbols(&self) -> anyhow::Result<Vec<String>> {
        let url = format!("{}/0/public/AssetPairs", self.base_url);
        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let result = Self::unwrap_envelope(&body)?;
        let symbols = result
            .as_object()
            .ok_or_else(|| ExchangeError::invalid("AssetPairs: expected object"))?
            .values()
            .filter_map(|entry| {
                let wsname = entry["wsname"].as_str()?;
                let (base, quote) = wsname.split_once('/')?;
                if quote == "USD" {
                    // Map Kraken codes back to canonical symbols.
                    let symbol = match base {
                        "XBT" => "BTC",
                        "XDG" => "DOGE",
                        other => other,
                    };
                    Some(symbol.to_string())
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
    fn pair_maps_btc_to_xbt() {
        assert_eq!(KrakenClient::pair("btc"), "XBTUSD");
        assert_eq!(KrakenClient::pair("ETH"), "ETHUSD");
    }

    #[test]
    fn interval_supports_kraken_set_only() {
        assert_eq!(KrakenClient::interval(Timeframe::H1).unwrap(), 60);
        assert_eq!(KrakenClient::interval(Timeframe::W1).unwrap(), 10_080);
        assert!(KrakenClient::interval(Timeframe::M3).is_err());
        assert!(KrakenClient::interval(Timeframe::H2).is_err());
    }

    #[test]
    fn parse_ohlc_skips_vwap_column() {
        let result = json!({
            "XBTUSD": [
                [1_700_000_000i64, "100.0", "102.0", "99.0", "101.0", "100.4", "10.0", 42],
                [1_700_003_600i64, "101.0", "103.0", "100.5", "102.0", "101.7", "9.5", 40]
            ],
            "last": 1_700_003_600i64
        });
        let candles = KrakenClient::parse_ohlc(&result).unwrap();
        assert_eq!(candles[0].volume, dec!(10.0));
        assert_eq!(candles[1].close, dec!(102.0));
        assert!(candles.iter().all(Candle::is_well_formed));
    }

    #[test]
    fn envelope_classifies_unknown_pair() {
        let body = json!({ "error": ["EQuery:Unknown asset pair"] });
        let err = KrakenClient::unwrap_envelope(&body).unwrap_err();
        assert!(err.is_symbol_not_supported());
    }
}
