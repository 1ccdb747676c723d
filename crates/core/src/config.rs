use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::venue::Venue;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub exchanges: ExchangesConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub fact_check: FactCheckConfig,
    #[serde(default)]
    pub miner: MinerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Exchange aggregator knobs: venue priority, HTTP timeouts, per-venue
/// requests-per-minute limits, base URL overrides, and race parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangesConfig {
    /// Venues tried in order by fetch-with-fallback.
    pub priority: Vec<Venue>,
    /// Per-venue HTTP timeout in seconds.
    pub request_timeout_secs: u64,
    /// Requests-per-minute limit applied when no per-venue override exists.
    pub default_requests_per_minute: u32,
    /// Per-venue requests-per-minute overrides.
    #[serde(default)]
    pub requests_per_minute: HashMap<Venue, u32>,
    /// Per-venue base URL overrides (each client ships a default).
    #[serde(default)]
    pub base_urls: HashMap<Venue, String>,
    /// How many venues a fetch-race launches concurrently.
    pub race_venues: usize,
    /// Overall fetch-race deadline in seconds.
    pub race_deadline_secs: u64,
}

impl ExchangesConfig {
    /// Requests-per-minute limit for a venue.
    #[must_use]
    pub fn limit_for(&self, venue: Venue) -> u32 {
        self.requests_per_minute
            .get(&venue)
            .copied()
            .unwrap_or(self.default_requests_per_minute)
    }
}

impl Default for ExchangesConfig {
    fn default() -> Self {
        Self {
            priority: Venue::ALL.to_vec(),
            request_timeout_secs: 10,
            default_requests_per_minute: 60,
            requests_per_minute: HashMap::new(),
            base_urls: HashMap::new(),
            race_venues: 5,
            race_deadline_secs: 5,
        }
    }
}

/// TTLs and sizing for the candle cache, availability cache, and the miner's
/// per-signal summary cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Candle cache entry TTL in seconds.
    pub candle_ttl_secs: u64,
    /// Symbol-availability entry TTL in seconds.
    pub availability_ttl_secs: u64,
    /// Per-signal summary cache TTL in seconds.
    pub summary_ttl_secs: u64,
    /// Full-window size the candle cache fetches on a miss.
    pub max_fetch_limit: usize,
    /// Optional derived-timeframe path: produce a coarse timeframe by
    /// aggregating consecutive candles of a finer base timeframe. Disabled
    /// by default; see `CandleCache`.
    pub derive_from_base: bool,
    /// On-disk JSON snapshot of the availability cache.
    pub availability_snapshot_path: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            candle_ttl_secs: 600,
            availability_ttl_secs: 86_400,
            summary_ttl_secs: 3_600,
            max_fetch_limit: 1_000,
            derive_from_base: false,
            availability_snapshot_path: "data/availability_cache.json".to_string(),
        }
    }
}

/// Fact-check evaluator, filter, and orchestrator knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactCheckConfig {
    /// Concurrent evaluations per batch.
    pub max_workers: usize,
    /// Stop-loss distance in percent from the entry price.
    pub stop_loss_pct: Decimal,
    /// Minimum percent gain for a prediction to count as correct.
    pub min_profit_pct: Decimal,
    /// Forward candles to evaluate when the signal definition carries no
    /// validation window.
    pub default_validation_window: usize,
    /// Probability that the filter samples an otherwise-skipped signal.
    pub random_sample_rate: f64,
    /// Below this many existing fact-checks, the filter always checks.
    pub filter_min_samples: i64,
    /// Analyzer confidence at or above which the filter always checks.
    pub high_confidence_threshold: f64,
    /// Minimum combo accuracy for the winning-combo-member filter rule.
    pub winning_combo_min_accuracy: f64,
    /// Original confidence used when a signal has no configured value.
    pub default_confidence: f64,
    /// Per-signal original confidence overrides.
    #[serde(default)]
    pub signal_confidence: HashMap<String, f64>,
    /// Minimum sample count before accuracy statistics are reported.
    pub min_samples: usize,
}

impl FactCheckConfig {
    /// Configured original confidence for a signal name, falling back to the
    /// default of 70.
    #[must_use]
    pub fn original_confidence(&self, signal_name: &str) -> f64 {
        self.signal_confidence
            .get(signal_name)
            .copied()
            .unwrap_or(self.default_confidence)
    }
}

impl Default for FactCheckConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            stop_loss_pct: Decimal::new(5, 0),
            min_profit_pct: Decimal::new(1, 1),
            default_validation_window: 12,
            random_sample_rate: 0.30,
            filter_min_samples: 20,
            high_confidence_threshold: 75.0,
            winning_combo_min_accuracy: 60.0,
            default_confidence: 70.0,
            signal_confidence: HashMap::new(),
            min_samples: 20,
        }
    }
}

/// Combination miner knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinerConfig {
    /// Candidates processed per chunk between progress logs.
    pub batch_size: usize,
    /// Minimum co-occurrence count for a combo to qualify.
    pub min_samples: usize,
    /// Minimum empirical accuracy (percent) for a combo to persist.
    pub min_accuracy: f64,
    pub min_combo_size: usize,
    pub max_combo_size: usize,
    /// Early-termination cap on persisted combinations per run.
    pub max_combinations: Option<usize>,
    /// Cross-timeframe candidates must span this many distinct timeframes.
    pub min_timeframes: usize,
    pub max_timeframes: usize,
    /// Cross-timeframe correlation window in seconds.
    pub time_window_secs: i64,
    /// Base-pair occurrences scanned per cross-timeframe candidate.
    pub max_base_occurrences: i64,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            min_samples: 20,
            min_accuracy: 60.0,
            min_combo_size: 2,
            max_combo_size: 3,
            max_combinations: None,
            min_timeframes: 2,
            max_timeframes: 3,
            time_window_secs: 3_600,
            max_base_occurrences: 500,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "postgresql://localhost/sigval".to_string(),
                max_connections: 10,
            },
            exchanges: ExchangesConfig::default(),
            cache: CacheConfig::default(),
            fact_check: FactCheckConfig::default(),
            miner: MinerConfig::default(),
        }
    }
}
