//! Confidence-adjustment repository: one upserted row per
//! (signal name, timeframe).

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::ConfidenceAdjustmentRecord;

/// Repository for `signal_confidence_adjustments`.
#[derive(Debug, Clone)]
pub struct ConfidenceRepository {
    pool: PgPool,
}

impl ConfidenceRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts or replaces the adjustment row for the pair.
    ///
    /// # Errors
    /// Returns an error if the upsert fails.
    pub async fn upsert(&self, record: &ConfidenceAdjustmentRecord) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO signal_confidence_adjustments
            (signal_name, timeframe, original_confidence, adjusted_confidence,
             accuracy_rate, sample_size, last_updated)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (signal_name, timeframe) DO UPDATE
            SET original_confidence = EXCLUDED.original_confidence,
                adjusted_confidence = EXCLUDED.adjusted_confidence,
                accuracy_rate = EXCLUDED.accuracy_rate,
                sample_size = EXCLUDED.sample_size,
                last_updated = EXCLUDED.last_updated
            ",
        )
        .bind(&record.signal_name)
        .bind(&record.timeframe)
        .bind(record.original_confidence)
        .bind(record.adjusted_confidence)
        .bind(record.accuracy_rate)
        .bind(record.sample_size)
        .bind(record.last_updated)
        .execute(&self.pool)
        .await
        .context("Failed to upsert confidence adjustment")?;

        Ok(())
    }

    /// The adjustment row for one pair, if present.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find(
        &self,
        signal_name: &str,
        timeframe: &str,
    ) -> Result<Option<ConfidenceAdjustmentRecord>> {
        let record = sqlx::query_as::<_, ConfidenceAdjustmentRecord>(
            r"
            SELECT signal_name, timeframe, original_confidence, adjusted_confidence,
                   accuracy_rate, sample_size, last_updated
            FROM signal_confidence_adjustments
            WHERE signal_name = $1 AND timeframe = $2
            ",
        )
        .bind(signal_name)
        .bind(timeframe)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query confidence adjustment")?;

        Ok(record)
    }

    /// Every adjustment row, for reporting.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_all(&self) -> Result<Vec<ConfidenceAdjustmentRecord>> {
        let records = sqlx::query_as::<_, ConfidenceAdjustmentRecord>(
            r"
            SELECT signal_name, timeframe, original_confidence, adjusted_confidence,
                   accuracy_rate, sample_size, last_updated
            FROM signal_confidence_adjustments
            ORDER BY signal_name ASC, timeframe ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to query confidence adjustments")?;

        Ok(records)
    }
}
