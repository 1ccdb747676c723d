//! Database client and schema.
//!
//! The schema is owned by this crate: `init_schema` issues idempotent
//! `CREATE TABLE IF NOT EXISTS` statements for the six persisted tables.
//! Uniqueness constraints enforce the append-only invariants; duplicate
//! inserts are swallowed at the repository layer with `ON CONFLICT DO
//! NOTHING`.

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS signals (
        id BIGSERIAL PRIMARY KEY,
        signal_name TEXT NOT NULL,
        timeframe TEXT NOT NULL,
        category TEXT,
        validation_window INTEGER NOT NULL DEFAULT 12,
        base_accuracy DOUBLE PRECISION,
        sample_size INTEGER NOT NULL DEFAULT 0,
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        UNIQUE (signal_name, timeframe)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS live_signals (
        id BIGSERIAL PRIMARY KEY,
        signal_name TEXT NOT NULL,
        timeframe TEXT NOT NULL,
        symbol TEXT NOT NULL,
        signal_type TEXT NOT NULL,
        confidence DOUBLE PRECISION NOT NULL,
        strength TEXT NOT NULL,
        signal_value NUMERIC,
        price NUMERIC NOT NULL,
        timestamp TIMESTAMPTZ NOT NULL
    )
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_live_signals_identity
    ON live_signals (signal_name, timeframe, timestamp)
    ",
    r"
    CREATE TABLE IF NOT EXISTS signal_fact_checks (
        id BIGSERIAL PRIMARY KEY,
        signal_name TEXT NOT NULL,
        timeframe TEXT NOT NULL,
        detected_at TIMESTAMPTZ NOT NULL,
        price_at_detection NUMERIC NOT NULL,
        actual_move TEXT NOT NULL,
        predicted_correctly BOOLEAN NOT NULL,
        price_change_pct NUMERIC NOT NULL,
        exit_reason TEXT NOT NULL,
        candles_elapsed INTEGER NOT NULL,
        validation_window INTEGER NOT NULL,
        checked_at TIMESTAMPTZ NOT NULL,
        UNIQUE (signal_name, timeframe, detected_at)
    )
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_fact_checks_timeframe
    ON signal_fact_checks (timeframe, detected_at)
    ",
    r"
    CREATE TABLE IF NOT EXISTS signal_confidence_adjustments (
        signal_name TEXT NOT NULL,
        timeframe TEXT NOT NULL,
        original_confidence DOUBLE PRECISION NOT NULL,
        adjusted_confidence DOUBLE PRECISION NOT NULL,
        accuracy_rate DOUBLE PRECISION NOT NULL,
        sample_size INTEGER NOT NULL,
        last_updated TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (signal_name, timeframe)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS tf_combos (
        id BIGSERIAL PRIMARY KEY,
        combo_hash TEXT NOT NULL,
        signal_names TEXT NOT NULL,
        timeframe TEXT NOT NULL,
        accuracy DOUBLE PRECISION NOT NULL,
        sample_count INTEGER NOT NULL,
        correct_predictions INTEGER NOT NULL,
        avg_price_change DOUBLE PRECISION NOT NULL,
        profit_factor DOUBLE PRECISION NOT NULL,
        combo_size INTEGER NOT NULL,
        UNIQUE (combo_hash, timeframe)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS cross_tf_combos (
        id BIGSERIAL PRIMARY KEY,
        combo_hash TEXT NOT NULL UNIQUE,
        combo_signature TEXT NOT NULL,
        timeframes TEXT NOT NULL,
        signal_names TEXT NOT NULL,
        accuracy DOUBLE PRECISION NOT NULL,
        sample_count INTEGER NOT NULL,
        correct_predictions INTEGER NOT NULL,
        avg_price_change DOUBLE PRECISION NOT NULL,
        profit_factor DOUBLE PRECISION NOT NULL,
        combo_size INTEGER NOT NULL,
        num_timeframes INTEGER NOT NULL
    )
    ",
];

pub struct DatabaseClient {
    pool: PgPool,
}

impl DatabaseClient {
    /// Connects to the configured `PostgreSQL` database.
    ///
    /// # Errors
    /// Returns an error if the connection cannot be established.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self { pool })
    }

    /// Wraps an existing pool (used by tests and embedding callers).
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates all tables and indexes if they do not exist.
    ///
    /// # Errors
    /// Returns an error if any DDL statement fails.
    pub async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to apply schema statement")?;
        }
        tracing::info!("database schema ready ({} statements)", SCHEMA.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_covers_all_six_tables() {
        let ddl = SCHEMA.join("\n");
        for table in [
            "signals",
            "live_signals",
            "signal_fact_checks",
            "signal_confidence_adjustments",
            "tf_combos",
            "cross_tf_combos",
        ] {
            assert!(
                ddl.contains(&format!("CREATE TABLE IF NOT EXISTS {table}")),
                "missing table {table}"
            );
        }
    }

    #[test]
    fn fact_checks_have_identity_constraint() {
        let ddl = SCHEMA.join("\n");
        assert!(ddl.contains("UNIQUE (signal_name, timeframe, detected_at)"));
    }
}
