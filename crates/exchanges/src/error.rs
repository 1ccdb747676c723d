//! Error types for venue adapters.
//!
//! The aggregator classifies these to decide whether a failure marks a
//! symbol unavailable on a venue or is merely transient.

use thiserror::Error;

/// Substrings that classify an error message as "symbol not supported",
/// matched case-insensitively against the rendered error chain.
pub const NOT_FOUND_MARKERS: [&str; 7] = [
    "404",
    "not found",
    "invalid symbol",
    "unknown symbol",
    "does not exist",
    "invalid response",
    "symbol not supported",
];

/// Errors produced by venue clients.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// API request returned a non-success status.
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Error body from the venue.
        message: String,
    },

    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// Request timeout.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// The venue has no interval string for this timeframe.
    #[error("timeframe {timeframe} not supported on {venue}")]
    UnsupportedTimeframe {
        /// Venue identifier.
        venue: &'static str,
        /// Canonical timeframe label.
        timeframe: String,
    },

    /// Response body did not match the venue's documented shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The venue reported the symbol as unknown.
    #[error("symbol not supported: {0}")]
    SymbolNotSupported(String),

    /// The venue answered successfully but returned no candles.
    #[error("empty result for {0}")]
    EmptyResult(String),
}

impl ExchangeError {
    /// Creates an API error from status code and message.
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }

    /// Creates an invalid-response error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Returns true when the failure means the symbol is not listed on the
    /// venue, so the availability cache should record it as unavailable.
    #[must_use]
    pub fn is_symbol_not_supported(&self) -> bool {
        match self {
            Self::SymbolNotSupported(_) => true,
            Self::Api {
                status_code: 404, ..
            } => true,
            Self::Api { message, .. } => contains_not_found_marker(message),
            Self::InvalidResponse(_) => true,
            _ => false,
        }
    }

    /// Returns true for failures worth retrying on another pass.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Api { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {err}"))
        } else if err.is_decode() {
            Self::InvalidResponse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Case-insensitive scan for the not-found marker substrings.
#[must_use]
pub fn contains_not_found_marker(text: &str) -> bool {
    let lowered = text.to_lowercase();
    NOT_FOUND_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Classifies an error from the trait boundary: a typed [`ExchangeError`]
/// answers directly, anything else falls back to the marker scan over the
/// rendered error chain.
#[must_use]
pub fn is_symbol_not_found(error: &anyhow::Error) -> bool {
    if let Some(exchange_error) = error.downcast_ref::<ExchangeError>() {
        return exchange_error.is_symbol_not_supported();
    }
    contains_not_found_marker(&format!("{error:#}"))
}

/// Result type alias for venue operations.
pub type Result<T> = std::result::Result<T, ExchangeError>;
