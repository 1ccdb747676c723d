//! Symbol-availability cache.
//!
//! Remembers, per symbol, which venues are known to list it and which have
//! rejected it, with a 24-hour TTL. The aggregator consults it to narrow its
//! candidate list and to skip venues that already said "unknown symbol".
//! The whole cache round-trips through a JSON snapshot on disk so restarts
//! keep the learned map.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sigval_core::Venue;
use tokio::sync::RwLock;

/// Which venues are known to carry (or reject) one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityEntry {
    pub available: HashSet<Venue>,
    pub unavailable: HashSet<Venue>,
    pub last_checked: DateTime<Utc>,
}

impl AvailabilityEntry {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            available: HashSet::new(),
            unavailable: HashSet::new(),
            last_checked: now,
        }
    }
}

/// TTL-bounded availability map keyed by symbol.
pub struct SymbolAvailabilityCache {
    entries: RwLock<HashMap<String, AvailabilityEntry>>,
    ttl: Duration,
}

impl SymbolAvailabilityCache {
    /// Creates an empty cache with the given TTL in seconds.
    #[must_use]
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Duration::seconds(ttl_secs as i64),
        }
    }

    /// Marks a venue as listing the symbol, clearing any unavailable mark.
    pub async fn mark_available(&self, symbol: &str, venue: Venue) {
        self.mark_available_at(symbol, venue, Utc::now()).await;
    }

    /// `mark_available` with an explicit timestamp.
    pub async fn mark_available_at(&self, symbol: &str, venue: Venue, now: DateTime<Utc>) {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(symbol.to_string())
            .or_insert_with(|| AvailabilityEntry::new(now));
        entry.available.insert(venue);
        entry.unavailable.remove(&venue);
        entry.last_checked = now;
    }

    /// Marks a venue as rejecting the symbol, clearing any available mark.
    pub async fn mark_unavailable(&self, symbol: &str, venue: Venue) {
        self.mark_unavailable_at(symbol, venue, Utc::now()).await;
    }

    /// `mark_unavailable` with an explicit timestamp.
    pub async fn mark_unavailable_at(&self, symbol: &str, venue: Venue, now: DateTime<Utc>) {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(symbol.to_string())
            .or_insert_with(|| AvailabilityEntry::new(now));
        entry.unavailable.insert(venue);
        entry.available.remove(&venue);
        entry.last_checked = now;
    }

    /// Venues known to list the symbol, or `None` when nothing fresh is
    /// known (empty set or expired entry).
    pub async fn known_available(&self, symbol: &str) -> Option<HashSet<Venue>> {
        self.known_available_at(symbol, Utc::now()).await
    }

    /// `known_available` with an explicit timestamp.
    pub async fn known_available_at(
        &self,
        symbol: &str,
        now: DateTime<Utc>,
    ) -> Option<HashSet<Venue>> {
        let entries = self.entries.read().await;
        let entry = entries.get(symbol)?;
        if now - entry.last_checked > self.ttl || entry.available.is_empty() {
            return None;
        }
        Some(entry.available.clone())
    }

    /// True when the venue is freshly known to reject the symbol.
    pub async fn is_unavailable(&self, symbol: &str, venue: Venue) -> bool {
        self.is_unavailable_at(symbol, venue, Utc::now()).await
    }

    /// `is_unavailable` with an explicit timestamp.
    pub async fn is_unavailable_at(
        &self,
        symbol: &str,
        venue: Venue,
        now: DateTime<Utc>,
    ) -> bool {
        let entries = self.entries.read().await;
        entries
            .get(symbol)
            .filter(|entry| now - entry.last_checked <= self.ttl)
            .is_some_and(|entry| entry.unavailable.contains(&venue))
    }

    /// Number of tracked symbols.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True when no symbols are tracked.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Copies the full map out, for snapshots and monitoring dumps.
    pub async fn snapshot(&self) -> HashMap<String, AvailabilityEntry> {
        self.entries.read().await.clone()
    }

    /// Writes the cache to a JSON snapshot file.
    ///
    /// # Errors
    /// Returns an error if serialization or the file write fails.
    pub async fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<()> {
        let entries = self.snapshot().await;
        let json = serde_json::to_vec_pretty(&entries).context("serialize availability cache")?;
        if let Some(parent) = path.as_ref().parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("create snapshot directory")?;
        }
        tokio::fs::write(path.as_ref(), json)
            .await
            .context("write availability snapshot")?;
        Ok(())
    }

    /// Rehydrates the cache from a JSON snapshot file. A missing file is not
    /// an error; the cache just starts cold.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be parsed.
    pub async fn load_snapshot(&self, path: impl AsRef<Path>) -> Result<usize> {
        let bytes = match tokio::fs::read(path.as_ref()).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e).context("read availability snapshot"),
        };
        let loaded: HashMap<String, AvailabilityEntry> =
            serde_json::from_slice(&bytes).context("parse availability snapshot")?;
        let count = loaded.len();
        let mut entries = self.entries.write().await;
        *entries = loaded;
        Ok(count)
    }
}
