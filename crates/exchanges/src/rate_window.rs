//! Sliding-window request accounting per venue.
//!
//! The aggregator uses this to *skip* venues near their limit, on top of the
//! per-client governor pacing. A venue counts as saturated once its trailing
//! 60-second request count reaches 90 percent of the configured limit.
//!
//! Time is injected via `_at` suffixed methods for deterministic testing;
//! production callers use the plain methods.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sigval_core::{ExchangesConfig, Venue};
use tokio::sync::Mutex;

const WINDOW: Duration = Duration::from_secs(60);
const SATURATION: f64 = 0.9;
const PRUNE_INTERVAL: Duration = Duration::from_secs(10);

/// Per-venue sliding 60-second request windows.
pub struct VenueRateWindow {
    limits: HashMap<Venue, u32>,
    windows: Mutex<HashMap<Venue, VecDeque<Instant>>>,
}

impl VenueRateWindow {
    /// Builds windows for every venue in the config's priority list.
    #[must_use]
    pub fn from_config(config: &ExchangesConfig) -> Self {
        let limits = config
            .priority
            .iter()
            .map(|&venue| (venue, config.limit_for(venue)))
            .collect();
        Self {
            limits,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Builds windows with a uniform limit (test helper and simple setups).
    #[must_use]
    pub fn with_uniform_limit(venues: &[Venue], limit: u32) -> Self {
        Self {
            limits: venues.iter().map(|&v| (v, limit)).collect(),
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Configured limit for a venue; unknown venues get a zero limit and are
    /// therefore always saturated.
    #[must_use]
    pub fn limit_for(&self, venue: Venue) -> u32 {
        self.limits.get(&venue).copied().unwrap_or(0)
    }

    /// Records one outbound request against the venue's window.
    pub async fn record(&self, venue: Venue) {
        self.record_at(venue, Instant::now()).await;
    }

    /// Records one outbound request with an explicit timestamp.
    pub async fn record_at(&self, venue: Venue, now: Instant) {
        let mut windows = self.windows.lock().await;
        windows.entry(venue).or_default().push_back(now);
    }

    /// Number of requests inside the trailing window.
    pub async fn count(&self, venue: Venue) -> usize {
        self.count_at(venue, Instant::now()).await
    }

    /// Number of requests inside the trailing window at an explicit instant.
    pub async fn count_at(&self, venue: Venue, now: Instant) -> usize {
        let windows = self.windows.lock().await;
        windows
            .get(&venue)
            .map(|w| {
                w.iter()
                    .filter(|&&ts| now.duration_since(ts) < WINDOW)
                    .count()
            })
            .unwrap_or(0)
    }

    /// True when the trailing count is at or past 90 percent of the limit.
    pub async fn is_saturated(&self, venue: Venue) -> bool {
        self.is_saturated_at(venue, Instant::now()).await
    }

    /// Saturation check at an explicit instant.
    pub async fn is_saturated_at(&self, venue: Venue, now: Instant) -> bool {
        let count = self.count_at(venue, now).await;
        count as f64 >= f64::from(self.limit_for(venue)) * SATURATION
    }

    /// Drops timestamps that have aged out of the window.
    pub async fn prune(&self) {
        self.prune_at(Instant::now()).await;
    }

    /// Prune with an explicit instant.
    pub async fn prune_at(&self, now: Instant) {
        let mut windows = self.windows.lock().await;
        for window in windows.values_mut() {
            while let Some(&front) = window.front() {
                if now.duration_since(front) >= WINDOW {
                    window.pop_front();
                } else {
                    break;
                }
            }
        }
        windows.retain(|_, w| !w.is_empty());
    }

    /// Spawns the periodic prune task (every 10 seconds).
    pub fn spawn_pruner(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(PRUNE_INTERVAL);
            loop {
                interval.tick().await;
                self.prune().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_for(venue: Venue, limit: u32) -> VenueRateWindow {
        VenueRateWindow::with_uniform_limit(&[venue], limit)
    }

    #[tokio::test]
    async fn empty_window_is_not_saturated() {
        let window = window_for(Venue::Binance, 10);
        assert!(!window.is_saturated(Venue::Binance).await);
        assert_eq!(window.count(Venue::Binance).await, 0);
    }

    #[tokio::test]
    async fn saturation_kicks_in_at_ninety_percent() {
        let window = window_for(Venue::Binance, 10);
        let now = Instant::now();
        for _ in 0..8 {
            window.record_at(Venue::Binance, now).await;
        }
        assert!(!window.is_saturated_at(Venue::Binance, now).await);
        window.record_at(Venue::Binance, now).await;
        // 9 of 10 is exactly 90 percent.
        assert!(window.is_saturated_at(Venue::Binance, now).await);
    }

    #[tokio::test]
    async fn old_requests_age_out_of_the_count() {
        let window = window_for(Venue::Kraken, 10);
        let start = Instant::now();
        for _ in 0..9 {
            window.record_at(Venue::Kraken, start).await;
        }
        let later = start + Duration::from_secs(61);
        assert_eq!(window.count_at(Venue::Kraken, later).await, 0);
        assert!(!window.is_saturated_at(Venue::Kraken, later).await);
    }

    #[tokio::test]
    async fn prune_drops_stale_timestamps_in_place() {
        let window = window_for(Venue::Bybit, 10);
        let start = Instant::now();
        window.record_at(Venue::Bybit, start).await;
        window.record_at(Venue::Bybit, start + Duration::from_secs(30)).await;

        window.prune_at(start + Duration::from_secs(70)).await;
        // The first timestamp aged out; the second is still inside.
        assert_eq!(
            window
                .count_at(Venue::Bybit, start + Duration::from_secs(70))
                .await,
            1
        );
    }

    #[tokio::test]
    async fn unknown_venue_is_always_saturated() {
        let window = window_for(Venue::Binance, 10);
        assert!(window.is_saturated(Venue::Tabdeal).await);
    }

    #[tokio::test]
    async fn venues_are_tracked_independently() {
        let window = VenueRateWindow::with_uniform_limit(&[Venue::Binance, Venue::Okx], 2);
        let now = Instant::now();
        window.record_at(Venue::Binance, now).await;
        window.record_at(Venue::Binance, now).await;
        assert!(window.is_saturated_at(Venue::Binance, now).await);
        assert!(!window.is_saturated_at(Venue::Okx, now).await);
    }
}
