//! Record types mapping the persisted tables.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sigval_core::{FactCheckOutcome, SignalInstance, Timeframe};

/// Row of `signals`: one definition per (signal name, timeframe).
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct SignalDefinitionRecord {
    pub signal_name: String,
    pub timeframe: String,
    pub category: Option<String>,
    pub validation_window: i32,
    pub base_accuracy: Option<f64>,
    pub sample_size: i32,
    pub updated_at: DateTime<Utc>,
}

/// Row of `live_signals`: a detected signal awaiting fact-check.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct LiveSignalRecord {
    pub id: i64,
    pub signal_name: String,
    pub timeframe: String,
    pub symbol: String,
    pub signal_type: String,
    pub confidence: f64,
    pub strength: String,
    pub signal_value: Option<Decimal>,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl LiveSignalRecord {
    /// Converts the row into the domain type, validating the enum columns.
    ///
    /// # Errors
    /// Returns an error if the timeframe, type, or strength column holds an
    /// unknown label.
    pub fn to_instance(&self) -> Result<SignalInstance> {
        Ok(SignalInstance {
            id: self.id,
            symbol: self.symbol.clone(),
            timeframe: self
                .timeframe
                .parse::<Timeframe>()
                .context("live_signals.timeframe")?,
            signal_name: self.signal_name.clone(),
            signal_type: self.signal_type.parse().context("live_signals.signal_type")?,
            strength: self.strength.parse().context("live_signals.strength")?,
            confidence: self.confidence,
            signal_value: self.signal_value,
            price: self.price,
            detected_at: self.timestamp,
        })
    }
}

/// Row of `signal_fact_checks`: one append-only outcome per
/// (signal, timeframe, detection instant).
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct FactCheckRecord {
    pub signal_name: String,
    pub timeframe: String,
    pub detected_at: DateTime<Utc>,
    pub price_at_detection: Decimal,
    pub actual_move: String,
    pub predicted_correctly: bool,
    pub price_change_pct: Decimal,
    pub exit_reason: String,
    pub candles_elapsed: i32,
    pub validation_window: i32,
    pub checked_at: DateTime<Utc>,
}

impl FactCheckRecord {
    /// Builds the persistable record from an evaluator outcome.
    #[must_use]
    pub fn from_outcome(
        signal: &SignalInstance,
        outcome: &FactCheckOutcome,
        validation_window: i32,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            signal_name: signal.signal_name.clone(),
            timeframe: signal.timeframe.as_str().to_string(),
            detected_at: signal.detected_at,
            price_at_detection: signal.price,
            actual_move: outcome.actual_move.as_str().to_string(),
            predicted_correctly: outcome.predicted_correctly,
            price_change_pct: outcome.price_change_pct,
            exit_reason: outcome.exit_reason.as_label(),
            candles_elapsed: outcome.candles_elapsed as i32,
            validation_window,
            checked_at,
        }
    }

    /// True when this outcome was a stop-loss exit.
    #[must_use]
    pub fn is_stopped_out(&self) -> bool {
        self.exit_reason.contains("STOPPED_OUT")
    }
}

/// Row of `signal_confidence_adjustments`: one per (signal, timeframe).
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ConfidenceAdjustmentRecord {
    pub signal_name: String,
    pub timeframe: String,
    pub original_confidence: f64,
    pub adjusted_confidence: f64,
    pub accuracy_rate: f64,
    pub sample_size: i32,
    pub last_updated: DateTime<Utc>,
}

/// Row of `tf_combos`: a qualifying same-timeframe combination.
///
/// `signal_names` holds the canonically sorted names joined with `+`;
/// `combo_hash` is the digest of that joined form plus the timeframe.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct TfComboRecord {
    pub combo_hash: String,
    pub signal_names: String,
    pub timeframe: String,
    pub accuracy: f64,
    pub sample_count: i32,
    pub correct_predictions: i32,
    pub avg_price_change: f64,
    pub profit_factor: f64,
    pub combo_size: i32,
}

impl TfComboRecord {
    /// Splits the stored `signal_names` back into individual names.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.signal_names.split('+').collect()
    }
}

/// Row of `cross_tf_combos`: a qualifying cross-timeframe combination.
///
/// `combo_signature` holds the sorted `name@timeframe` tokens joined with
/// `+`; `combo_hash` is its digest.
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct CrossTfComboRecord {
    pub combo_hash: String,
    pub combo_signature: String,
    pub timeframes: String,
    pub signal_names: String,
    pub accuracy: f64,
    pub sample_count: i32,
    pub correct_predictions: i32,
    pub avg_price_change: f64,
    pub profit_factor: f64,
    pub combo_size: i32,
    pub num_timeframes: i32,
}
