//! Per-signal summary cache.
//!
//! Mining runs repeatedly look at the same per-signal baselines; this keyed
//! TTL cache (default one hour) keeps {accuracy, sample size, profit factor}
//! per `signalName|timeframe` so repeated runs skip the history scan.
//!
//! Time is injected via `_at` suffixed methods for deterministic testing.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Cached per-signal baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalSummary {
    pub accuracy: f64,
    pub sample_size: usize,
    pub profit_factor: f64,
}

struct Entry {
    summary: SignalSummary,
    inserted_at: Instant,
}

/// TTL cache keyed by `signalName|timeframe`.
pub struct SignalSummaryCache {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl SignalSummaryCache {
    /// Creates a cache with the given TTL in seconds.
    #[must_use]
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    /// Cache key for a (signal, timeframe) pair.
    #[must_use]
    pub fn key(signal_name: &str, timeframe: &str) -> String {
        format!("{signal_name}|{timeframe}")
    }

    /// Fresh summary for a key, if present.
    pub async fn get(&self, key: &str) -> Option<SignalSummary> {
        self.get_at(key, Instant::now()).await
    }

    /// `get` with an explicit instant.
    pub async fn get_at(&self, key: &str, now: Instant) -> Option<SignalSummary> {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|entry| now.duration_since(entry.inserted_at) < self.ttl)
            .map(|entry| entry.summary)
    }

    /// Stores a summary under the key.
    pub async fn insert(&self, key: &str, summary: SignalSummary) {
        self.insert_at(key, summary, Instant::now()).await;
    }

    /// `insert` with an explicit instant.
    pub async fn insert_at(&self, key: &str, summary: SignalSummary, now: Instant) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                summary,
                inserted_at: now,
            },
        );
    }

    /// Number of cached keys, fresh or stale.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// True when nothing is cached.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Drops stale entries.
    pub async fn evict_expired(&self) {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let ttl = self.ttl;
        entries.retain(|_, entry| now.duration_since(entry.inserted_at) < ttl);
    }
}
