//! Fact-check repository.
//!
//! The outcome log is append-only: one row per (signal, timeframe,
//! detection instant), duplicates swallowed by the unique constraint. The
//! miner's queries (distinct names, full timeframe scans, recent-per-pair,
//! timestamp sets) all live here.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::FactCheckRecord;

/// Repository for `signal_fact_checks`.
#[derive(Debug, Clone)]
pub struct FactCheckRepository {
    pool: PgPool,
}

impl FactCheckRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Appends one outcome. Returns false when an identical identity already
    /// exists (expected on re-runs).
    ///
    /// # Errors
    /// Returns an error if the insert fails for any reason other than the
    /// unique constraint.
    pub async fn insert(&self, record: &FactCheckRecord) -> Result<bool> {
        let result = sqlx::query(
            r"
            INSERT INTO signal_fact_checks
            (signal_name, timeframe, detected_at, price_at_detection, actual_move,
             predicted_correctly, price_change_pct, exit_reason, candles_elapsed,
             validation_window, checked_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (signal_name, timeframe, detected_at) DO NOTHING
            ",
        )
        .bind(&record.signal_name)
        .bind(&record.timeframe)
        .bind(record.detected_at)
        .bind(record.price_at_detection)
        .bind(&record.actual_move)
        .bind(record.predicted_correctly)
        .bind(record.price_change_pct)
        .bind(&record.exit_reason)
        .bind(record.candles_elapsed)
        .bind(record.validation_window)
        .bind(record.checked_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert fact check")?;

        Ok(result.rows_affected() > 0)
    }

    /// All outcomes for one signal, optionally narrowed to a timeframe.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_for_signal(
        &self,
        signal_name: &str,
        timeframe: Option<&str>,
    ) -> Result<Vec<FactCheckRecord>> {
        let records = sqlx::query_as::<_, FactCheckRecord>(
            r"
            SELECT signal_name, timeframe, detected_at, price_at_detection, actual_move,
                   predicted_correctly, price_change_pct, exit_reason, candles_elapsed,
                   validation_window, checked_at
            FROM signal_fact_checks
            WHERE signal_name = $1
              AND ($2::TEXT IS NULL OR timeframe = $2)
            ORDER BY detected_at ASC
            ",
        )
        .bind(signal_name)
        .bind(timeframe)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query fact checks for signal")?;

        Ok(records)
    }

    /// Every outcome in one timeframe, ascending by detection time. Feeds
    /// the same-timeframe co-occurrence grouping.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_by_timeframe(&self, timeframe: &str) -> Result<Vec<FactCheckRecord>> {
        let records = sqlx::query_as::<_, FactCheckRecord>(
            r"
            SELECT signal_name, timeframe, detected_at, price_at_detection, actual_move,
                   predicted_correctly, price_change_pct, exit_reason, candles_elapsed,
                   validation_window, checked_at
            FROM signal_fact_checks
            WHERE timeframe = $1
            ORDER BY detected_at ASC
            ",
        )
        .bind(timeframe)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query fact checks by timeframe")?;

        Ok(records)
    }

    /// The most recent outcomes for one (signal, timeframe) pair, newest
    /// first. Feeds the cross-timeframe base-pair scan.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn recent_for_pair(
        &self,
        signal_name: &str,
        timeframe: &str,
        limit: i64,
    ) -> Result<Vec<FactCheckRecord>> {
        let records = sqlx::query_as::<_, FactCheckRecord>(
            r"
            SELECT signal_name, timeframe, detected_at, price_at_detection, actual_move,
                   predicted_correctly, price_change_pct, exit_reason, candles_elapsed,
                   validation_window, checked_at
            FROM signal_fact_checks
            WHERE signal_name = $1 AND timeframe = $2
            ORDER BY detected_at DESC
            LIMIT $3
            ",
        )
        .bind(signal_name)
        .bind(timeframe)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query recent fact checks")?;

        Ok(records)
    }

    /// Distinct signal names fact-checked in one timeframe, sorted.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn distinct_signal_names(&self, timeframe: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r"
            SELECT DISTINCT signal_name
            FROM signal_fact_checks
            WHERE timeframe = $1
            ORDER BY signal_name ASC
            ",
        )
        .bind(timeframe)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query distinct signal names")?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Distinct (signal name, timeframe) pairs across the whole log, sorted.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn distinct_pairs(&self) -> Result<Vec<(String, String)>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            r"
            SELECT DISTINCT signal_name, timeframe
            FROM signal_fact_checks
            ORDER BY signal_name ASC, timeframe ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to query distinct pairs")?;

        Ok(rows)
    }

    /// Sample counts grouped by (signal name, timeframe). Feeds the filter's
    /// insufficient-data rule without a per-signal round trip.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn sample_counts(&self) -> Result<Vec<(String, String, i64)>> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            r"
            SELECT signal_name, timeframe, COUNT(*)
            FROM signal_fact_checks
            GROUP BY signal_name, timeframe
            ",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to query sample counts")?;

        Ok(rows)
    }

    /// Detection timestamps for one (signal, timeframe) pair, ascending.
    /// Feeds the cross-timeframe window matcher.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn timestamps_for_pair(
        &self,
        signal_name: &str,
        timeframe: &str,
    ) -> Result<Vec<DateTime<Utc>>> {
        let rows: Vec<(DateTime<Utc>,)> = sqlx::query_as(
            r"
            SELECT detected_at
            FROM signal_fact_checks
            WHERE signal_name = $1 AND timeframe = $2
            ORDER BY detected_at ASC
            ",
        )
        .bind(signal_name)
        .bind(timeframe)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query fact check timestamps")?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Total outcome rows.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM signal_fact_checks")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count fact checks")?;
        Ok(row.0)
    }
}
