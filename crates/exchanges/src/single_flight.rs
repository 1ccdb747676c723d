//! Keyed single-flight coordination.
//!
//! Concurrent callers sharing a key collapse into one computation: the first
//! caller runs the work, the rest await its broadcast result. Entries are
//! removed on completion; a watchdog evicts in-flight entries older than the
//! configured age so a stuck leader cannot wedge a key forever (evicted
//! followers fall back to doing the work themselves).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, Mutex};

const WATCHDOG_INTERVAL: Duration = Duration::from_secs(10);

struct Flight<T> {
    tx: broadcast::Sender<T>,
    started_at: Instant,
}

/// Single-flight registry keyed by string.
pub struct SingleFlight<T> {
    inflight: Mutex<HashMap<String, Flight<T>>>,
    max_age: Duration,
}

enum Role<T> {
    Leader(broadcast::Sender<T>),
    Follower(broadcast::Receiver<T>),
}

impl<T: Clone + Send + 'static> SingleFlight<T> {
    /// Creates a registry whose watchdog evicts entries older than `max_age`.
    #[must_use]
    pub fn new(max_age: Duration) -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
            max_age,
        }
    }

    /// Runs `work` under the key, or awaits an identical in-flight call.
    ///
    /// Exactly one caller per key-interval executes `work`; every concurrent
    /// caller receives a clone of its result.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let role = {
            let mut map = self.inflight.lock().await;
            if let Some(flight) = map.get(key) {
                Role::Follower(flight.tx.subscribe())
            } else {
                let (tx, _rx) = broadcast::channel(1);
                map.insert(
                    key.to_string(),
                    Flight {
                        tx: tx.clone(),
                        started_at: Instant::now(),
                    },
                );
                Role::Leader(tx)
            }
        };

        match role {
            Role::Follower(mut rx) => match rx.recv().await {
                Ok(value) => value,
                // Leader was evicted by the watchdog; do the work ourselves.
                Err(_) => work().await,
            },
            Role::Leader(tx) => {
                let value = work().await;
                {
                    let mut map = self.inflight.lock().await;
                    map.remove(key);
                }
                let _ = tx.send(value.clone());
                value
            }
        }
    }

    /// Number of keys currently in flight.
    pub async fn len(&self) -> usize {
        self.inflight.lock().await.len()
    }

    /// True when nothing is in flight.
    pub async fn is_empty(&self) -> bool {
        self.inflight.lock().await.is_empty()
    }

    /// Drops entries older than the configured max age.
    pub async fn evict_stale(&self) {
        self.evict_stale_at(Instant::now()).await;
    }

    /// `evict_stale` with an explicit instant.
    pub async fn evict_stale_at(&self, now: Instant) {
        let mut map = self.inflight.lock().await;
        map.retain(|_, flight| now.duration_since(flight.started_at) < self.max_age);
    }

    /// Spawns the periodic watchdog task.
    pub fn spawn_watchdog(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(WATCHDOG_INTERVAL);
            loop {
                interval.tick().await;
                self.evict_stale().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let flight = Arc::new(SingleFlight::new(Duration::from_secs(30)));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flight = Arc::clone(&flight);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                flight
                    .run("BTC|1h", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        42u32
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(flight.is_empty().await);
    }

    #[tokio::test]
    async fn different_keys_run_independently() {
        let flight = Arc::new(SingleFlight::new(Duration::from_secs(30)));
        let calls = Arc::new(AtomicUsize::new(0));

        let a = {
            let flight = Arc::clone(&flight);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                flight
                    .run("BTC|1h", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        1u32
                    })
                    .await
            })
        };
        let b = {
            let flight = Arc::clone(&flight);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                flight
                    .run("ETH|1h", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        2u32
                    })
                    .await
            })
        };

        assert_eq!(a.await.unwrap(), 1);
        assert_eq!(b.await.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn entry_is_removed_after_completion() {
        let flight: SingleFlight<u32> = SingleFlight::new(Duration::from_secs(30));
        let value = flight.run("key", || async { 7 }).await;
        assert_eq!(value, 7);
        assert!(flight.is_empty().await);

        // A later call runs fresh work, not a stale result.
        let value = flight.run("key", || async { 8 }).await;
        assert_eq!(value, 8);
    }

    #[tokio::test]
    async fn watchdog_evicts_stuck_entries() {
        let flight: Arc<SingleFlight<u32>> = Arc::new(SingleFlight::new(Duration::from_secs(30)));

        // Simulate a stuck leader by inserting an old flight directly.
        {
            let mut map = flight.inflight.lock().await;
            let (tx, _rx) = broadcast::channel(1);
            map.insert(
                "stuck".to_string(),
                Flight {
                    tx,
                    started_at: Instant::now() - Duration::from_secs(31),
                },
            );
        }
        assert_eq!(flight.len().await, 1);
        flight.evict_stale().await;
        assert!(flight.is_empty().await);

        // The key is usable again after eviction.
        let value = flight.run("stuck", || async { 9 }).await;
        assert_eq!(value, 9);
    }
}
