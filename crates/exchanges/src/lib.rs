//! Multi-venue OHLCV fetch layer.
//!
//! This crate provides:
//! - Per-venue HTTP clients normalizing to canonical candles
//! - The fan-out/fallback aggregator with rate windows and availability
//! - Single-flight deduplication and the candle cache
//! - The price-data facade used by the fact-check pipeline

pub mod aggregator;
pub mod availability;
pub mod candle_cache;
pub mod error;
pub mod facade;
pub mod rate_window;
pub mod single_flight;
pub mod venues;

pub use aggregator::{AggregatorStats, ExchangeAggregator, VenueStats};
pub use availability::{AvailabilityEntry, SymbolAvailabilityCache};
pub use candle_cache::{aggregate_base_candles, CandleCache};
pub use error::{contains_not_found_marker, is_symbol_not_found, ExchangeError};
pub use facade::{JourneyRequest, PriceDataFacade};
pub use rate_window::VenueRateWindow;
pub use single_flight::SingleFlight;
pub use venues::{
    build_clients, BinanceClient, BybitClient, CoinbaseClient, GateIoClient, KrakenClient,
    KuCoinClient, NobitexClient, OkxClient, TabdealClient,
};
