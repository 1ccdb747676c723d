//! Nobitex adapter (Iranian market, RLS quote).
//!
//! Pair format `<SYM>RLS`, second timestamps, TradingView-style UDF history:
//! parallel arrays `t`/`o`/`h`/`l`/`c`/`v` plus a status field.

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

const DEFAULT_BASE_URL: &str = "https://api.nobitex.ir";

pub struct NobitexClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
    limiter: Arc<DirectRateLimiter>,
}

impl NobitexClient {
    /// Creates a new Nobitex client.
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
        format!("{}RLS", symbol.to_uppercase())
    }

    /// TradingView resolution codes: minutes as numbers, days/weeks as letters.
    fn resolution(timeframe: Timeframe) -> Result<&'static str> {
        let resolution = match timeframe {
            Timeframe::M1 => "1",
            Timeframe::M5 => "5",
            Timeframe::M15 => "15",
            Timeframe::M30 => "30",
            Timeframe::H1 => "60",
            Timeframe::H4 => "240",
            Timeframe::H6 => "360",
            Timeframe::H12 => "720",
            Timeframe::D1 => "D",
            Timeframe::D3 => "3D",
            Timeframe::W1 => "W",
            _ => {
                return Err(ExchangeError::UnsupportedTimeframe {
                    venue: "nobitex",
                    timeframe: timeframe.to_string(),
                })
            }
        };
        Ok(resolution)
    }

    /// Decodes the UDF parallel-array body, zipping t/o/h/l/c/v by index.
    fn parse_history(body: &Value) -> Result<Vec<Candle>> {
        let status = body["s"].as_str().unwrap_or_default();
        if status != "ok" {
            return Err(ExchangeError::invalid(format!(
                "history status {status}: symbol not supported or no data"
            )));
        }
        let series = |key: &str| -> Result<&Vec<Value>> {
            body[key]
                .as_array()
                .ok_or_else(|| ExchangeError::invalid(format!("history: missing series {key}")))
        };
        let times = series("t")?;
        let opens = series("o")?;
        let highs = series("h")?;
        let lows = series("l")?;
        let closes = series("c")?;
        let volumes = series("v")?;
        let len = times.len();
        if [opens, highs, lows, closes, volumes]
            .iter()
            .any(|s| s.len() != len)
        {
            return Err(ExchangeError::invalid("history: ragged series lengths"));
        }

        let mut candles = Vec::with_capacity(len);
        for i in 0..len {
            candles.push(Candle {
                timestamp: ts_from_secs(int_value(&times[i])?)?,
                open: decimal_value(&opens[i])?,
                high: decimal_value(&highs[i])?,
                low: decimal_value(&lows[i])?,
                close: decimal_value(&closes[i])?,
                volume: decimal_value(&volumes[i])?,
            });
        }
        Ok(candles)
    }
}

#[async_trait]
impl ExchangeClient for NobitexClient {
    fn venue(&self) -> Venue {
        Venue::Nobitex
    }

    async fn fetch_candles(&self, request: &CandleRequest) -> anyhow::Result<Vec<Candle>> {
        let now = Utc::now().timestamp();
        let end = request.end_time.unwrap_or(now);
        let start = request.start_time.unwrap_or_else(|| {
            end - request.timeframe.seconds() * request.limit as i64
        });
        let url = format!(
            "{}/market/udf/history?symbol={}&resolution={}&from={}&to={}",
            self.base_url,
            Self::pair(&request.symbol),
            Self::resolution(request.timeframe)?,
            start,
            end,
        );

        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let mut candles = Self::parse_history(&body)?;
        candles.sort_by_key(|c| c.timestamp);
        if candles.len() > request.limit {
            candles = candles.split_off(candles.len() - request.limit);
        }
        Ok(finish_candles(candles, &request.symbol)?)
    }

    async fn current_price(&self, symbol: &str) -> anyhow::Result<PriceQuote> {
        let url = format!(
            "{}/v2/orderbook/{}",
            self.base_url,
            Self::pair(symbol)
        );
        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        Ok(PriceQuote {
            price: decimal_value(&body["lastTradePrice"])?,
            timestamp: Utc::now(),
        })
    }

    async fn daily_stats(&self, symbol: &str) -> anyhow::Result<DailyStats> {
        let url = format!(
            "{}/market/stats?srcCurrency={}&dstCurrency=rls",
            self.base_url,
            symbol.to_lowercase()
        );
        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let key = format!("{}-rls", symbol.to_lowercase());
        let stats = &body["stats"][&key];
        if stats.is_null() {
            return Err(
                ExchangeError::SymbolNotSupported(format!("{symbol} not on nobitex")).into(),
            );
        }
        Ok(DailyStats {
            last_price: decimal_value(&stats["latest"])?,
            high: decimal_value(&stats["dayHigh"])?,
            low: decimal_value(&stats["dayLow"])?,
            volume: decimal_value(&stats["volumeSrc"])?,
            change_pct: f64_value(&stats["dayChange"])?,
        })
    }

    async fn list_symbols(&self) -> anyhow::Result<Vec<String>> {
        let url = format!("{}/market/stats", self.base_url);
        let body = get_json(&self.http, &self.limiter, &url, self.timeout).await?;
        let symbols = body["stats"]
            .as_object()
            .ok_or_else(|| ExchangeError::invalid("stats: expected object"))?
            .keys()
            .filter_map(|key| {
                let (base, quote) = key.split_once('-')?;
                if quote == "rls" {
                    Some(base.to_uppercase())
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
    fn pair_quotes_in_rls() {
        assert_eq!(NobitexClient::pair("btc"), "BTCRLS");
    }

    #[test]
    fn resolution_uses_tradingview_codes() {
        assert_eq!(NobitexClient::resolution(Timeframe::H1).unwrap(), "60");
        assert_eq!(NobitexClient::resolution(Timeframe::D1).unwrap(), "D");
        assert!(NobitexClient::resolution(Timeframe::M3).is_err());
        assert!(NobitexClient::resolution(Timeframe::H8).is_err());
    }

    #[test]
    fn parse_history_zips_parallel_arrays() {
        let body = json!({
            "s": "ok",
            "t": [1_700_000_000i64, 1_700_003_600i64],
            "o": [100.0, 101.0],
            "h": [102.0, 103.0],
            "l": [99.0, 100.5],
            "c": [101.0, 102.0],
            "v": [10.0, 9.5]
        });
        let candles = NobitexClient::parse_history(&body).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[1].low, dec!(100.5));
        assert!(candles.iter().all(Candle::is_well_formed));
    }

    #[test]
    fn parse_history_rejects_error_status() {
        let body = json!({ "s": "no_data" });
        assert!(NobitexClient::parse_history(&body).is_err());
    }

    #[test]
    fn parse_history_rejects_ragged_series() {
        let body = json!({
            "s": "ok",
            "t": [1_700_000_000i64, 1_700_003_600i64],
            "o": [100.0],
            "h": [102.0, 103.0],
            "l": [99.0, 100.5],
            "c": [101.0, 102.0],
            "v": [10.0, 9.5]
        });
        assert!(NobitexClient::parse_history(&body).is_err());
    }
}
