//! JSON import of signal definitions and detected signals.
//!
//! The analyzers that detect signals live outside this system; this importer
//! is the door through which their output (or a test fixture) enters the
//! `signals` and `live_signals` tables.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sigval_core::{SignalStrength, SignalType, Timeframe};

use crate::models::{LiveSignalRecord, SignalDefinitionRecord};
use crate::repositories::Repositories;

/// Top-level shape of a seed file.
#[derive(Debug, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub definitions: Vec<SeedDefinition>,
    #[serde(default)]
    pub signals: Vec<SeedSignal>,
}

/// One `signals` row in seed form.
#[derive(Debug, Deserialize)]
pub struct SeedDefinition {
    pub signal_name: String,
    pub timeframe: String,
    #[serde(default)]
    pub category: Option<String>,
    pub validation_window: i32,
    #[serde(default)]
    pub base_accuracy: Option<f64>,
    #[serde(default)]
    pub sample_size: i32,
}

/// One `live_signals` row in seed form (no row id; the database assigns it).
#[derive(Debug, Deserialize)]
pub struct SeedSignal {
    pub signal_name: String,
    pub timeframe: String,
    pub symbol: String,
    pub signal_type: String,
    pub confidence: f64,
    pub strength: String,
    #[serde(default)]
    pub signal_value: Option<Decimal>,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Counts from one import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub definitions: usize,
    pub signals: usize,
}

/// Parses a seed file, validating every enum label up front so a typo fails
/// the whole import instead of planting rows the pipeline cannot read.
///
/// # Errors
/// Returns an error on malformed JSON or an unknown timeframe, signal type,
/// or strength label.
pub fn parse_seed_file(json: &str) -> Result<SeedFile> {
    let file: SeedFile = serde_json::from_str(json).context("parse seed file")?;

    for definition in &file.definitions {
        definition
            .timeframe
            .parse::<Timeframe>()
            .with_context(|| format!("definition {}", definition.signal_name))?;
        if definition.validation_window < 1 {
            anyhow::bail!(
                "definition {}: validation window must be at least 1",
                definition.signal_name
            );
        }
    }
    for signal in &file.signals {
        signal
            .timeframe
            .parse::<Timeframe>()
            .with_context(|| format!("signal {}", signal.signal_name))?;
        signal
            .signal_type
            .parse::<SignalType>()
            .with_context(|| format!("signal {}", signal.signal_name))?;
        signal
            .strength
            .parse::<SignalStrength>()
            .with_context(|| format!("signal {}", signal.signal_name))?;
        if !(0.0..=100.0).contains(&signal.confidence) {
            anyhow::bail!(
                "signal {}: confidence {} outside [0, 100]",
                signal.signal_name,
                signal.confidence
            );
        }
    }
    Ok(file)
}

/// Imports a parsed seed file: definitions are upserted, signals appended.
///
/// # Errors
/// Returns an error if any database write fails.
pub async fn import_seed_file(repos: &Repositories, file: &SeedFile) -> Result<SeedReport> {
    let now = Utc::now();
    for definition in &file.definitions {
        repos
            .definitions
            .upsert(&SignalDefinitionRecord {
                signal_name: definition.signal_name.clone(),
                timeframe: definition.timeframe.clone(),
                category: definition.category.clone(),
                validation_window: definition.validation_window,
                base_accuracy: definition.base_accuracy,
                sample_size: definition.sample_size,
                updated_at: now,
            })
            .await?;
    }
    for signal in &file.signals {
        repos
            .live_signals
            .insert(&LiveSignalRecord {
                id: 0,
                signal_name: signal.signal_name.clone(),
                timeframe: signal.timeframe.clone(),
                symbol: signal.symbol.clone(),
                signal_type: signal.signal_type.clone(),
                confidence: signal.confidence,
                strength: signal.strength.clone(),
                signal_value: signal.signal_value,
                price: signal.price,
                timestamp: signal.timestamp,
            })
            .await?;
    }

    let report = SeedReport {
        definitions: file.definitions.len(),
        signals: file.signals.len(),
    };
    tracing::info!(
        "seeded {} definitions and {} signals",
        report.definitions,
        report.signals
    );
    Ok(report)
}
