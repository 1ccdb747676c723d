//! Multi-venue fetch aggregator.
//!
//! Given a canonical candle request, tries eligible venues in priority
//! order, honoring rate-window saturation and symbol-availability knowledge,
//! classifying failures, deduplicating concurrent identical fetches, and
//! keeping per-venue statistics. Besides the priority fallback it offers a
//! specific-venue fetch, a first-wins race, and an all-venues parallel fetch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sigval_core::{Candle, CandleRequest, ExchangeClient, ExchangesConfig, PriceQuote, Venue};
use tokio::sync::mpsc;

use crate::availability::SymbolAvailabilityCache;
use crate::error::{is_symbol_not_found, ExchangeError};
use crate::rate_window::VenueRateWindow;
use crate::single_flight::SingleFlight;

const FLIGHT_MAX_AGE: Duration = Duration::from_secs(30);

#[derive(Default)]
struct VenueCounters {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
}

struct Counters {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    symbol_not_found: AtomicU64,
    per_venue: HashMap<Venue, VenueCounters>,
}

impl Counters {
    fn new() -> Self {
        Self {
            attempts: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            symbol_not_found: AtomicU64::new(0),
            per_venue: Venue::ALL
                .iter()
                .map(|&v| (v, VenueCounters::default()))
                .collect(),
        }
    }

    fn record_attempt(&self, venue: Venue) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        if let Some(counters) = self.per_venue.get(&venue) {
            counters.attempts.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_success(&self, venue: Venue) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        if let Some(counters) = self.per_venue.get(&venue) {
            counters.successes.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_failure(&self, venue: Venue) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        if let Some(counters) = self.per_venue.get(&venue) {
            counters.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_not_found(&self) {
        self.symbol_not_found.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time monitoring snapshot of the aggregator.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatorStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub symbol_not_found: u64,
    pub per_venue: HashMap<Venue, VenueStats>,
}

/// Per-venue slice of [`AggregatorStats`].
#[derive(Debug, Clone, Serialize)]
pub struct VenueStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
}

/// Fan-out/fallback candle fetcher over the configured venue set.
pub struct ExchangeAggregator {
    clients: HashMap<Venue, Arc<dyn ExchangeClient>>,
    priority: Vec<Venue>,
    rate_window: Arc<VenueRateWindow>,
    availability: Arc<SymbolAvailabilityCache>,
    flight: Arc<SingleFlight<Option<Vec<Candle>>>>,
    counters: Arc<Counters>,
    race_venues: usize,
    race_deadline: Duration,
}

impl ExchangeAggregator {
    /// Creates an aggregator over the given clients.
    ///
    /// The availability cache is passed in so callers can rehydrate it from
    /// its JSON snapshot before wiring the aggregator.
    #[must_use]
    pub fn new(
        clients: Vec<Arc<dyn ExchangeClient>>,
        config: &ExchangesConfig,
        availability: Arc<SymbolAvailabilityCache>,
    ) -> Self {
        let clients: HashMap<Venue, Arc<dyn ExchangeClient>> =
            clients.into_iter().map(|c| (c.venue(), c)).collect();
        Self {
            clients,
            priority: config.priority.clone(),
            rate_window: Arc::new(VenueRateWindow::from_config(config)),
            availability,
            flight: Arc::new(SingleFlight::new(FLIGHT_MAX_AGE)),
            counters: Arc::new(Counters::new()),
            race_venues: config.race_venues,
            race_deadline: Duration::from_secs(config.race_deadline_secs),
        }
    }

    /// The availability cache backing this aggregator.
    #[must_use]
    pub fn availability(&self) -> &Arc<SymbolAvailabilityCache> {
        &self.availability
    }

    /// Spawns the rate-window pruner and the single-flight watchdog.
    pub fn spawn_background_tasks(&self) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            Arc::clone(&self.rate_window).spawn_pruner(),
            Arc::clone(&self.flight).spawn_watchdog(),
        ]
    }

    /// Venues to try for a symbol: the priority order, narrowed to the
    /// known-available set when one is fresh and non-empty.
    async fn candidates(&self, symbol: &str) -> Vec<Venue> {
        match self.availability.known_available(symbol).await {
            Some(available) if !available.is_empty() => self
                .priority
                .iter()
                .copied()
                .filter(|v| available.contains(v))
                .collect(),
            _ => self.priority.clone(),
        }
    }

    /// Fetches candles by trying eligible venues in priority order.
    ///
    /// Concurrent identical fetches (same `symbol|timeframe`) collapse into
    /// one traversal via the single-flight registry.
    pub async fn fetch_with_fallback(&self, request: &CandleRequest) -> Option<Vec<Candle>> {
        let key = request.flight_key();
        self.flight
            .run(&key, || self.fallback_fetch(request.clone()))
            .await
    }

    async fn fallback_fetch(&self, request: CandleRequest) -> Option<Vec<Candle>> {
        for venue in self.candidates(&request.symbol).await {
            if self.rate_window.is_saturated(venue).await {
                tracing::debug!("skipping {venue}: rate window saturated");
                continue;
            }
            if self
                .availability
                .is_unavailable(&request.symbol, venue)
                .await
            {
                tracing::debug!("skipping {venue}: {} known unavailable", request.symbol);
                continue;
            }
            let Some(client) = self.clients.get(&venue) else {
                continue;
            };
            if let Some(candles) = attempt_fetch(
                Arc::clone(client),
                request.clone(),
                Arc::clone(&self.rate_window),
                Arc::clone(&self.availability),
                Arc::clone(&self.counters),
            )
            .await
            {
                return Some(candles);
            }
        }
        tracing::debug!(
            "no venue satisfied {} {} x{}",
            request.symbol,
            request.timeframe,
            request.limit
        );
        None
    }

    /// Fetches from one specific venue, bypassing the priority traversal but
    /// still recording statistics and availability.
    pub async fn fetch_from(&self, venue: Venue, request: &CandleRequest) -> Option<Vec<Candle>> {
        let client = self.clients.get(&venue)?;
        attempt_fetch(
            Arc::clone(client),
            request.clone(),
            Arc::clone(&self.rate_window),
            Arc::clone(&self.availability),
            Arc::clone(&self.counters),
        )
        .await
    }

    /// Launches the first few eligible venues concurrently and returns the
    /// first satisfying result, giving up after the race deadline.
    ///
    /// Losing venue requests run to completion in the background; their
    /// statistics and availability marks still land.
    pub async fn fetch_race(&self, request: &CandleRequest) -> Option<Vec<Candle>> {
        let mut contenders = Vec::new();
        for venue in self.candidates(&request.symbol).await {
            if contenders.len() >= self.race_venues {
                break;
            }
            if self.rate_window.is_saturated(venue).await {
                continue;
            }
            if self
                .availability
                .is_unavailable(&request.symbol, venue)
                .await
            {
                continue;
            }
            if let Some(client) = self.clients.get(&venue) {
                contenders.push(Arc::clone(client));
            }
        }
        if contenders.is_empty() {
            return None;
        }

        let (tx, mut rx) = mpsc::channel(contenders.len());
        for client in contenders {
            let tx = tx.clone();
            let request = request.clone();
            let rate_window = Arc::clone(&self.rate_window);
            let availability = Arc::clone(&self.availability);
            let counters = Arc::clone(&self.counters);
            tokio::spawn(async move {
                let result =
                    attempt_fetch(client, request, rate_window, availability, counters).await;
                let _ = tx.send(result).await;
            });
        }
        drop(tx);

        let deadline = tokio::time::sleep(self.race_deadline);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                () = &mut deadline => {
                    tracing::debug!("fetch race deadline elapsed for {}", request.symbol);
                    return None;
                }
                received = rx.recv() => match received {
                    Some(Some(candles)) => return Some(candles),
                    Some(None) => {}
                    None => return None,
                }
            }
        }
    }

    /// Fetches from every priority venue concurrently and returns the full
    /// result map, including the misses.
    pub async fn fetch_parallel(
        &self,
        request: &CandleRequest,
    ) -> HashMap<Venue, Option<Vec<Candle>>> {
        let tasks = self.priority.iter().filter_map(|&venue| {
            let client = self.clients.get(&venue)?;
            let client = Arc::clone(client);
            let request = request.clone();
            let rate_window = Arc::clone(&self.rate_window);
            let availability = Arc::clone(&self.availability);
            let counters = Arc::clone(&self.counters);
            Some(async move {
                let result =
                    attempt_fetch(client, request, rate_window, availability, counters).await;
                (venue, result)
            })
        });
        futures::future::join_all(tasks).await.into_iter().collect()
    }

    /// Current price with priority fallback.
    pub async fn current_price_with_fallback(&self, symbol: &str) -> Option<PriceQuote> {
        for venue in self.candidates(symbol).await {
            if self.rate_window.is_saturated(venue).await {
                continue;
            }
            if self.availability.is_unavailable(symbol, venue).await {
                continue;
            }
            let Some(client) = self.clients.get(&venue) else {
                continue;
            };
            self.counters.record_attempt(venue);
            self.rate_window.record(venue).await;
            match client.current_price(symbol).await {
                Ok(quote) => {
                    self.counters.record_success(venue);
                    return Some(quote);
                }
                Err(error) => {
                    self.counters.record_failure(venue);
                    if is_symbol_not_found(&error) {
                        self.counters.record_not_found();
                        self.availability.mark_unavailable(symbol, venue).await;
                    }
                    tracing::debug!("{venue} price fetch failed for {symbol}: {error:#}");
                }
            }
        }
        None
    }

    /// Monitoring snapshot.
    #[must_use]
    pub fn stats(&self) -> AggregatorStats {
        AggregatorStats {
            attempts: self.counters.attempts.load(Ordering::Relaxed),
            successes: self.counters.successes.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            symbol_not_found: self.counters.symbol_not_found.load(Ordering::Relaxed),
            per_venue: self
                .counters
                .per_venue
                .iter()
                .map(|(&venue, c)| {
                    (
                        venue,
                        VenueStats {
                            attempts: c.attempts.load(Ordering::Relaxed),
                            successes: c.successes.load(Ordering::Relaxed),
                            failures: c.failures.load(Ordering::Relaxed),
                        },
                    )
                })
                .collect(),
        }
    }
}

/// One venue attempt: counts it, charges the rate window when a request was
/// actually made, classifies failures, and updates availability.
///
/// Success requires the venue to return at least the requested number of
/// candles; shorter results keep the traversal going.
async fn attempt_fetch(
    client: Arc<dyn ExchangeClient>,
    request: CandleRequest,
    rate_window: Arc<VenueRateWindow>,
    availability: Arc<SymbolAvailabilityCache>,
    counters: Arc<Counters>,
) -> Option<Vec<Candle>> {
    let venue = client.venue();
    counters.record_attempt(venue);

    let result = client.fetch_candles(&request).await;

    // Unsupported timeframes fail before any HTTP request, so they do not
    // charge the rate window.
    let request_was_made = !matches!(
        result
            .as_ref()
            .err()
            .and_then(|e| e.downcast_ref::<ExchangeError>()),
        Some(ExchangeError::UnsupportedTimeframe { .. })
    );
    if request_was_made {
        rate_window.record(venue).await;
    }

    match result {
        Ok(candles) if candles.len() >= request.limit => {
            counters.record_success(venue);
            availability.mark_available(&request.symbol, venue).await;
            Some(candles)
        }
        Ok(candles) => {
            counters.record_failure(venue);
            tracing::debug!(
                "{venue} returned {} of {} candles for {}",
                candles.len(),
                request.limit,
                request.symbol
            );
            None
        }
        Err(error) => {
            counters.record_failure(venue);
            if is_symbol_not_found(&error) {
                counters.record_not_found();
                availability
                    .mark_unavailable(&request.symbol, venue)
                    .await;
                tracing::debug!("{venue}: {} not listed ({error:#})", request.symbol);
            } else {
                tracing::warn!("{venue} fetch failed for {}: {error:#}", request.symbol);
            }
            None
        }
    }
}
