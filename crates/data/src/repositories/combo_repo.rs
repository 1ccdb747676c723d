//! Combination repositories.
//!
//! Both combo tables are append-only under unique-key constraints;
//! re-mining the same history hits the constraints and the duplicates are
//! silently ignored.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::{CrossTfComboRecord, TfComboRecord};

/// Repository for `tf_combos` and `cross_tf_combos`.
#[derive(Debug, Clone)]
pub struct ComboRepository {
    pool: PgPool,
}

impl ComboRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Appends a same-timeframe combo. Returns false when the
    /// (hash, timeframe) identity already exists.
    ///
    /// # Errors
    /// Returns an error if the insert fails for any reason other than the
    /// unique constraint.
    pub async fn insert_tf_combo(&self, record: &TfComboRecord) -> Result<bool> {
        let result = sqlx::query(
            r"
            INSERT INTO tf_combos
            (combo_hash, signal_names, timeframe, accuracy, sample_count,
             correct_predictions, avg_price_change, profit_factor, combo_size)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (combo_hash, timeframe) DO NOTHING
            ",
        )
        .bind(&record.combo_hash)
        .bind(&record.signal_names)
        .bind(&record.timeframe)
        .bind(record.accuracy)
        .bind(record.sample_count)
        .bind(record.correct_predictions)
        .bind(record.avg_price_change)
        .bind(record.profit_factor)
        .bind(record.combo_size)
        .execute(&self.pool)
        .await
        .context("Failed to insert tf combo")?;

        Ok(result.rows_affected() > 0)
    }

    /// Appends a cross-timeframe combo. Returns false when the signature
    /// hash already exists.
    ///
    /// # Errors
    /// Returns an error if the insert fails for any reason other than the
    /// unique constraint.
    pub async fn insert_cross_tf_combo(&self, record: &CrossTfComboRecord) -> Result<bool> {
        let result = sqlx::query(
            r"
            INSERT INTO cross_tf_combos
            (combo_hash, combo_signature, timeframes, signal_names, accuracy,
             sample_count, correct_predictions, avg_price_change, profit_factor,
             combo_size, num_timeframes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (combo_hash) DO NOTHING
            ",
        )
        .bind(&record.combo_hash)
        .bind(&record.combo_signature)
        .bind(&record.timeframes)
        .bind(&record.signal_names)
        .bind(record.accuracy)
        .bind(record.sample_count)
        .bind(record.correct_predictions)
        .bind(record.avg_price_change)
        .bind(record.profit_factor)
        .bind(record.combo_size)
        .bind(record.num_timeframes)
        .execute(&self.pool)
        .await
        .context("Failed to insert cross-tf combo")?;

        Ok(result.rows_affected() > 0)
    }

    /// Same-timeframe combos at or above an accuracy floor, across all
    /// timeframes. Feeds the filter's winning-combo-member rule.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn winning_tf_combos(&self, min_accuracy: f64) -> Result<Vec<TfComboRecord>> {
        let records = sqlx::query_as::<_, TfComboRecord>(
            r"
            SELECT combo_hash, signal_names, timeframe, accuracy, sample_count,
                   correct_predictions, avg_price_change, profit_factor, combo_size
            FROM tf_combos
            WHERE accuracy >= $1
            ORDER BY accuracy DESC
            ",
        )
        .bind(min_accuracy)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query winning tf combos")?;

        Ok(records)
    }

    /// All combos for one timeframe, best first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn tf_combos_for(&self, timeframe: &str) -> Result<Vec<TfComboRecord>> {
        let records = sqlx::query_as::<_, TfComboRecord>(
            r"
            SELECT combo_hash, signal_names, timeframe, accuracy, sample_count,
                   correct_predictions, avg_price_change, profit_factor, combo_size
            FROM tf_combos
            WHERE timeframe = $1
            ORDER BY accuracy DESC
            ",
        )
        .bind(timeframe)
        .fetch_all(&self.pool)
        .await
        .context("Failed to query tf combos")?;

        Ok(records)
    }

    /// All cross-timeframe combos, best first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn cross_tf_combos(&self) -> Result<Vec<CrossTfComboRecord>> {
        let records = sqlx::query_as::<_, CrossTfComboRecord>(
            r"
            SELECT combo_hash, combo_signature, timeframes, signal_names, accuracy,
                   sample_count, correct_predictions, avg_price_change, profit_factor,
                   combo_size, num_timeframes
            FROM cross_tf_combos
            ORDER BY accuracy DESC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to query cross-tf combos")?;

        Ok(records)
    }
}
