//! Signal-definition repository: validation windows and baseline accuracy
//! per (signal name, timeframe).

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::SignalDefinitionRecord;

/// Repository for `signals`.
#[derive(Debug, Clone)]
pub struct SignalDefinitionRepository {
    pool: PgPool,
}

impl SignalDefinitionRepository {
    /// Creates a new repository instance.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts or replaces a definition.
    ///
    /// # Errors
    /// Returns an error if the upsert fails.
    pub async fn upsert(&self, record: &SignalDefinitionRecord) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO signals
            (signal_name, timeframe, category, validation_window, base_accuracy,
             sample_size, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (signal_name, timeframe) DO UPDATE
            SET category = EXCLUDED.category,
                validation_window = EXCLUDED.validation_window,
                base_accuracy = EXCLUDED.base_accuracy,
                sample_size = EXCLUDED.sample_size,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(&record.signal_name)
        .bind(&record.timeframe)
        .bind(&record.category)
        .bind(record.validation_window)
        .bind(record.base_accuracy)
        .bind(record.sample_size)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to upsert signal definition")?;

        Ok(())
    }

    /// One definition, if present.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find(
        &self,
        signal_name: &str,
        timeframe: &str,
    ) -> Result<Option<SignalDefinitionRecord>> {
        let record = sqlx::query_as::<_, SignalDefinitionRecord>(
            r"
            SELECT signal_name, timeframe, category, validation_window, base_accuracy,
                   sample_size, updated_at
            FROM signals
            WHERE signal_name = $1 AND timeframe = $2
            ",
        )
        .bind(signal_name)
        .bind(timeframe)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to query signal definition")?;

        Ok(record)
    }

    /// All definitions. The orchestrator preloads these to resolve
    /// validation windows without per-signal round trips.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn find_all(&self) -> Result<Vec<SignalDefinitionRecord>> {
        let records = sqlx::query_as::<_, SignalDefinitionRecord>(
            r"
            SELECT signal_name, timeframe, category, validation_window, base_accuracy,
                   sample_size, updated_at
            FROM signals
            ORDER BY signal_name ASC, timeframe ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to query signal definitions")?;

        Ok(records)
    }
}
