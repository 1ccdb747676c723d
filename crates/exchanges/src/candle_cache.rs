//! In-memory candle cache with single-flight fill.
//!
//! Keyed by (symbol, timeframe) with a 10-minute default TTL. A miss runs
//! the supplied fetch function once for the full window (default 1000
//! candles) regardless of how many concurrent callers ask, then every caller
//! gets the trailing `limit` slice. A background task evicts expired
//! entries once a minute.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sigval_core::{Candle, CacheConfig, Timeframe};
use tokio::sync::RwLock;

use crate::single_flight::SingleFlight;

const EVICT_INTERVAL: Duration = Duration::from_secs(60);
const FLIGHT_MAX_AGE: Duration = Duration::from_secs(30);

struct CacheEntry {
    candles: Vec<Candle>,
    inserted_at: Instant,
}

/// TTL cache of full candle windows keyed by (symbol, timeframe).
pub struct CandleCache {
    entries: RwLock<HashMap<(String, Timeframe), CacheEntry>>,
    flight: Arc<SingleFlight<Option<Vec<Candle>>>>,
    ttl: Duration,
    max_fetch_limit: usize,
}

impl CandleCache {
    /// Creates a cache from the configured TTL and fill window.
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            Duration::from_secs(config.candle_ttl_secs),
            config.max_fetch_limit,
        )
    }

    /// Creates a cache with an explicit TTL and fill window.
    #[must_use]
    pub fn new(ttl: Duration, max_fetch_limit: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            flight: Arc::new(SingleFlight::new(FLIGHT_MAX_AGE)),
            ttl,
            max_fetch_limit,
        }
    }

    /// Returns the trailing `limit` candles for (symbol, timeframe), filling
    /// the cache through `fetch` on a miss.
    ///
    /// `fetch` receives the timeframe and the full window size; concurrent
    /// callers on the same key share a single invocation.
    pub async fn get<F, Fut>(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
        fetch: F,
    ) -> Option<Vec<Candle>>
    where
        F: FnOnce(Timeframe, usize) -> Fut,
        Fut: std::future::Future<Output = Option<Vec<Candle>>>,
    {
        if let Some(hit) = self.lookup(symbol, timeframe, limit).await {
            return Some(hit);
        }

        let key = format!("{symbol}|{timeframe}");
        let max_fetch_limit = self.max_fetch_limit;
        let filled = self
            .flight
            .run(&key, || async move {
                let candles = fetch(timeframe, max_fetch_limit).await?;
                self.store(symbol, timeframe, candles.clone()).await;
                Some(candles)
            })
            .await?;

        Some(tail(&filled, limit))
    }

    /// Optional derived-timeframe read: serves `target` candles by
    /// aggregating consecutive candles of the finer `base` timeframe.
    ///
    /// This is the `CacheConfig::derive_from_base` path, which ships
    /// disabled; no production caller invokes it while the flag is off. The
    /// target's minute count must be a whole multiple of the base's.
    pub async fn get_derived<F, Fut>(
        &self,
        symbol: &str,
        base: Timeframe,
        target: Timeframe,
        limit: usize,
        fetch: F,
    ) -> Option<Vec<Candle>>
    where
        F: FnOnce(Timeframe, usize) -> Fut,
        Fut: std::future::Future<Output = Option<Vec<Candle>>>,
    {
        if target.minutes() % base.minutes() != 0 || target.minutes() <= base.minutes() {
            tracing::debug!("{target} cannot be derived from {base}");
            return None;
        }
        let multiplier = (target.minutes() / base.minutes()) as usize;
        let needed = limit.saturating_mul(multiplier);

        let base_candles = self.get(symbol, base, needed, fetch).await?;
        let derived = aggregate_base_candles(&base_candles, multiplier);
        if derived.is_empty() {
            return None;
        }
        Some(tail(&derived, limit))
    }

    /// Fresh-entry lookup returning the trailing slice.
    async fn lookup(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Option<Vec<Candle>> {
        let entries = self.entries.read().await;
        let entry = entries.get(&(symbol.to_string(), timeframe))?;
        if entry.inserted_at.elapsed() >= self.ttl {
            return None;
        }
        Some(tail(&entry.candles, limit))
    }

    async fn store(&self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) {
        let mut entries = self.entries.write().await;
        entries.insert(
            (symbol.to_string(), timeframe),
            CacheEntry {
                candles,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Number of cached keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True when nothing is cached.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drops expired entries.
    pub async fn evict_expired(&self) {
        let mut entries = self.entries.write().await;
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);
    }

    /// Spawns the periodic eviction task (every minute).
    pub fn spawn_evictor(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(EVICT_INTERVAL);
            loop {
                interval.tick().await;
                self.evict_expired().await;
            }
        })
    }
}

fn tail(candles: &[Candle], limit: usize) -> Vec<Candle> {
    let start = candles.len().saturating_sub(limit);
    candles[start..].to_vec()
}

/// Aggregates `multiplier` consecutive base candles into one coarser candle:
/// open of the first, close of the last, max high, min low, summed volume,
/// stamped at the first candle's time. A trailing incomplete group is
/// dropped.
///
/// This backs the optional derived-timeframe path behind
/// `CacheConfig::derive_from_base`, which is disabled by default: when
/// enabled, a requested timeframe whose venue mapping is missing could be
/// produced from a finer base timeframe instead of failing over. No caller
/// wires it up while the flag is off.
#[must_use]
pub fn aggregate_base_candles(base: &[Candle], multiplier: usize) -> Vec<Candle> {
    if multiplier == 0 {
        return Vec::new();
    }
    base.chunks_exact(multiplier)
        .map(|group| {
            let mut high = group[0].high;
            let mut low = group[0].low;
            let mut volume = group[0].volume;
            for candle in &group[1..] {
                high = high.max(candle.high);
                low = low.min(candle.low);
                volume += candle.volume;
            }
            Candle {
                timestamp: group[0].timestamp,
                open: group[0].open,
                high,
                low,
                close: group[group.len() - 1].close,
                volume,
            }
        })
        .collect()
}
