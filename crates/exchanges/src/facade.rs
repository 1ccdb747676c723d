//! Price-data facade for forward candle journeys.
//!
//! Given (symbol, anchor instant, timeframe, horizon), returns the candle
//! sequence covering `[anchor, anchor + (horizon + buffer) × timeframe]` by
//! delegating to the aggregator with an explicit start/end window. Anchors
//! older than a year are rejected outright; anything past ninety days gets a
//! warning since venue history that deep is often spotty.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sigval_core::{CacheConfig, Candle, CandleRequest, Timeframe};

use crate::aggregator::ExchangeAggregator;
use crate::candle_cache::CandleCache;

/// Extra candles fetched past the horizon.
const JOURNEY_BUFFER: usize = 5;
const MAX_ANCHOR_AGE_DAYS: i64 = 365;
const WARN_ANCHOR_AGE_DAYS: i64 = 90;
const BATCH_CHUNK: usize = 10;
const INTER_CHUNK_DELAY: Duration = Duration::from_secs(1);

/// One entry of a batch journey request.
#[derive(Debug, Clone)]
pub struct JourneyRequest {
    pub symbol: String,
    pub anchor: DateTime<Utc>,
    pub timeframe: Timeframe,
    pub horizon: usize,
}

/// Facade over the aggregator for fact-check candle journeys and cached
/// latest-candle reads.
pub struct PriceDataFacade {
    aggregator: Arc<ExchangeAggregator>,
    cache: Arc<CandleCache>,
}

impl PriceDataFacade {
    #[must_use]
    pub fn new(aggregator: Arc<ExchangeAggregator>) -> Self {
        Self::with_cache_config(aggregator, &CacheConfig::default())
    }

    #[must_use]
    pub fn with_cache_config(aggregator: Arc<ExchangeAggregator>, config: &CacheConfig) -> Self {
        Self {
            aggregator,
            cache: Arc::new(CandleCache::from_config(config)),
        }
    }

    /// Spawns the candle-cache eviction task.
    pub fn spawn_background_tasks(&self) -> Vec<tokio::task::JoinHandle<()>> {
        vec![Arc::clone(&self.cache).spawn_evictor()]
    }

    /// The trailing `limit` candles for (symbol, timeframe), served from the
    /// candle cache. A miss fills the cache with the full window through the
    /// aggregator; concurrent identical reads share one fill.
    ///
    /// Journeys bypass this cache: their explicit start/end windows do not
    /// fit the trailing-window model.
    pub async fn latest_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Option<Vec<Candle>> {
        self.cache
            .get(symbol, timeframe, limit, |tf, max_limit| async move {
                self.aggregator
                    .fetch_with_fallback(&CandleRequest::new(symbol, tf, max_limit))
                    .await
            })
            .await
    }

    /// Fetches the forward candle journey for a signal anchor.
    ///
    /// Returns `None` when the anchor is older than a year, when no venue
    /// can serve the window, or when fewer than two candles come back.
    pub async fn candle_journey(
        &self,
        symbol: &str,
        anchor: DateTime<Utc>,
        timeframe: Timeframe,
        horizon: usize,
    ) -> Option<Vec<Candle>> {
        let age = Utc::now() - anchor;
        if age > chrono::Duration::days(MAX_ANCHOR_AGE_DAYS) {
            tracing::warn!(
                "rejecting journey for {symbol}: anchor {anchor} older than {MAX_ANCHOR_AGE_DAYS} days"
            );
            return None;
        }
        if age > chrono::Duration::days(WARN_ANCHOR_AGE_DAYS) {
            tracing::warn!(
                "journey anchor for {symbol} is {} days old; venue history may be incomplete",
                age.num_days()
            );
        }

        let total = horizon + JOURNEY_BUFFER;
        let start = anchor.timestamp();
        let end = (anchor + timeframe.duration() * total as i32).timestamp();
        let request = CandleRequest::new(symbol, timeframe, total).with_window(start, end);

        let candles = self.aggregator.fetch_with_fallback(&request).await?;
        if candles.len() < 2 {
            tracing::debug!(
                "journey for {symbol}@{anchor} returned {} candles, need at least 2",
                candles.len()
            );
            return None;
        }
        Some(candles)
    }

    /// Batch variant: processes requests in chunks of ten with a one-second
    /// pause between chunks, returning results in input order.
    pub async fn candle_journeys(&self, requests: &[JourneyRequest]) -> Vec<Option<Vec<Candle>>> {
        let mut results = Vec::with_capacity(requests.len());
        for (index, chunk) in requests.chunks(BATCH_CHUNK).enumerate() {
            if index > 0 {
                tokio::time::sleep(INTER_CHUNK_DELAY).await;
            }
            let chunk_results = futures::future::join_all(chunk.iter().map(|r| {
                self.candle_journey(&r.symbol, r.anchor, r.timeframe, r.horizon)
            }))
            .await;
            results.extend(chunk_results);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use sigval_core::{
        DailyStats, ExchangeClient, ExchangesConfig, PriceQuote, Venue,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::availability::SymbolAvailabilityCache;

    struct WindowEchoClient {
        calls: Arc<AtomicUsize>,
        candles_to_return: usize,
    }

    #[async_trait]
    impl ExchangeClient for WindowEchoClient {
        fn venue(&self) -> Venue {
            Venue::Binance
        }

        async fn fetch_candles(&self, request: &CandleRequest) -> anyhow::Result<Vec<Candle>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let start = request.start_time.unwrap_or(0);
            let step = request.timeframe.seconds();
            Ok((0..self.candles_to_return)
                .map(|i| Candle {
                    timestamp: DateTime::from_timestamp(start + step * i as i64, 0).unwrap(),
                    open: dec!(100),
                    high: dec!(101),
                    low: dec!(99),
                    close: dec!(100.5),
                    volume: dec!(1),
                })
                .collect())
        }

        async fn current_price(&self, _symbol: &str) -> anyhow::Result<PriceQuote> {
            anyhow::bail!("unused")
        }

        async fn daily_stats(&self, _symbol: &str) -> anyhow::Result<DailyStats> {
            anyhow::bail!("unused")
        }

        async fn list_symbols(&self) -> anyhow::Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    fn facade_with(candles_to_return: usize) -> (PriceDataFacade, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let client: Arc<dyn ExchangeClient> = Arc::new(WindowEchoClient {
            calls: Arc::clone(&calls),
            candles_to_return,
        });
        let config = ExchangesConfig {
            priority: vec![Venue::Binance],
            ..ExchangesConfig::default()
        };
        let aggregator = Arc::new(ExchangeAggregator::new(
            vec![client],
            &config,
            Arc::new(SymbolAvailabilityCache::new(86_400)),
        ));
        (PriceDataFacade::new(aggregator), calls)
    }

    #[tokio::test]
    async fn journey_adds_buffer_to_horizon() {
        let (facade, _) = facade_with(17);
        let anchor = Utc::now() - chrono::Duration::days(10);
        let candles = facade
            .candle_journey("BTC", anchor, Timeframe::H1, 12)
            .await
            .unwrap();
        // horizon 12 + buffer 5
        assert_eq!(candles.len(), 17);
    }

    #[tokio::test]
    async fn journey_rejects_anchor_older_than_a_year() {
        let (facade, calls) = facade_with(17);
        let anchor = Utc::now() - chrono::Duration::days(400);
        let result = facade.candle_journey("BTC", anchor, Timeframe::H1, 12).await;
        assert!(result.is_none());
        // No fetch was attempted.
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn journey_accepts_anchor_just_inside_a_year() {
        let (facade, _) = facade_with(17);
        let anchor = Utc::now() - chrono::Duration::days(364);
        assert!(facade
            .candle_journey("BTC", anchor, Timeframe::H1, 12)
            .await
            .is_some());
    }

    #[tokio::test]
    async fn journey_requires_at_least_two_candles() {
        // The venue returns a single candle, which the aggregator already
        // treats as short of the requested limit.
        let (facade, _) = facade_with(1);
        let anchor = Utc::now() - chrono::Duration::days(10);
        assert!(facade
            .candle_journey("BTC", anchor, Timeframe::H1, 12)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn journey_window_starts_at_anchor() {
        let (facade, _) = facade_with(17);
        let anchor = Utc.with_ymd_and_hms(2026, 7, 1, 0, 0, 0).unwrap();
        let candles = facade
            .candle_journey("BTC", anchor, Timeframe::H1, 12)
            .await
            .unwrap();
        assert_eq!(candles[0].timestamp, anchor);
    }

    #[tokio::test]
    async fn latest_candles_fills_once_and_serves_hits() {
        let (facade, calls) = facade_with(1_000);
        let first = facade
            .latest_candles("BTC", Timeframe::H1, 50)
            .await
            .unwrap();
        assert_eq!(first.len(), 50);

        let second = facade
            .latest_candles("BTC", Timeframe::H1, 20)
            .await
            .unwrap();
        assert_eq!(second.len(), 20);
        // Both reads were served by one cache fill.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn batch_preserves_input_order() {
        let (facade, _) = facade_with(17);
        let fresh = Utc::now() - chrono::Duration::days(5);
        let ancient = Utc::now() - chrono::Duration::days(400);
        let requests = vec![
            JourneyRequest {
                symbol: "BTC".to_string(),
                anchor: ancient,
                timeframe: Timeframe::H1,
                horizon: 12,
            },
            JourneyRequest {
                symbol: "ETH".to_string(),
                anchor: fresh,
                timeframe: Timeframe::H1,
                horizon: 12,
            },
        ];
        let results = facade.candle_journeys(&requests).await;
        assert_eq!(results.len(), 2);
        assert!(results[0].is_none());
        assert!(results[1].is_some());
    }
}
