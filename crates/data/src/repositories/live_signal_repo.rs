//! Live-signal repository.
//!
//! Detected signals land here from the external analyzers; the bulk
//! orchestrator pulls the ones with no fact-check yet via an anti-join on
//! (signal name, timeframe, detection instant).

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::LiveSignalRecord;

/// Repository for `live_signals`.
#[derive(Debug, Clone)]
pub struct LiveSignalRepository {
    pool: PgPool,
}

impl LiveSignalRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts one detected signal, returning its row id.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert(&self, record: &LiveSignalRecord) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            r"
            INSERT INTO live_signals
            (signal_name, timeframe, symbol, signal_type, confidence, strength,
             signal_value, price, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            ",
        )
        .bind(&record.signal_name)
        .bind(&record.timeframe)
        .bind(&record.symbol)
        .bind(&record.signal_type)
        .bind(record.confidence)
        .bind(&record.strength)
        .bind(record.signal_value)
        .bind(record.price)
        .bind(record.timestamp)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert live signal")?;

        Ok(row.0)
    }

    /// Signals with no corresponding fact-check yet, oldest first with the
    /// row id as a deterministic tiebreak. Optionally narrowed to one symbol
    /// and capped.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_unchecked(
        &self,
        symbol: Option<&str>,
        limit: Option<i64>,
    ) -> Result<Vec<LiveSignalRecord>> {
        let records = sqlx::query_as::<_, LiveSignalRecord>(
            r"
            SELECT ls.id, ls.signal_name, ls.timeframe, ls.symbol, ls.signal_type,
                   ls.confidence, ls.strength, ls.signal_value, ls.price, ls.timestamp
            FROM live_signals ls
            LEFT JOIN signal_fact_checks fc
              ON fc.signal_name = ls.signal_name
             AND fc.timeframe = ls.timeframe
             AND fc.detected_at = ls.timestamp
            WHERE fc.signal_name IS NULL
              AND ($1::TEXT IS NULL OR ls.symbol = $1)
            ORDER BY ls.timestamp ASC, ls.id ASC
            LIMIT $2
            ",
        )
        .bind(symbol)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query unchecked signals")?;

        Ok(records)
    }

    /// Total detected signals, for monitoring.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM live_signals")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count live signals")?;
        Ok(row.0)
    }
}
