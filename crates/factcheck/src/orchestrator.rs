//! Bulk fact-check orchestrator.
//!
//! Streams signals that have no fact-check yet (anti-join on signal name,
//! timeframe, and detection instant), filters them, evaluates them in
//! bounded-concurrency batches against journeys from the price-data facade,
//! persists outcomes, and finally refreshes confidence adjustments for every
//! touched (signal, timeframe) pair.
//!
//! A single signal's failure never fails the run; errors are logged and
//! counted. On cancellation the in-flight batch completes and the partial
//! summary is returned.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use sigval_core::{Candle, ExitReason, FactCheckConfig, SignalInstance};
use sigval_data::{FactCheckRecord, Repositories};
use sigval_exchanges::PriceDataFacade;
use tokio_util::sync::CancellationToken;

use crate::accuracy::ConfidenceService;
use crate::evaluator::evaluate;
use crate::filter::{FilterInputs, FilterStats, SignalFilter};

const PROGRESS_EVERY: usize = 50;

/// Options for one bulk run.
#[derive(Debug, Clone)]
pub struct FactCheckOptions {
    /// Restrict to one symbol.
    pub symbol: Option<String>,
    /// Cap the number of candidate signals pulled.
    pub limit: Option<i64>,
    /// Apply the signal filter before evaluating.
    pub use_filtering: bool,
    /// Concurrent evaluations per batch.
    pub max_workers: usize,
}

impl Default for FactCheckOptions {
    fn default() -> Self {
        Self {
            symbol: None,
            limit: None,
            use_filtering: true,
            max_workers: 10,
        }
    }
}

/// Compact per-signal detail kept in the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct FactCheckDetail {
    pub signal_name: String,
    pub timeframe: String,
    pub exit_reason: String,
    pub predicted_correctly: bool,
    pub price_change_pct: f64,
}

/// Result of one bulk run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FactCheckRunSummary {
    pub total_candidates: usize,
    pub filtered_out: usize,
    pub total_checked: u64,
    pub correct_predictions: u64,
    pub incorrect_predictions: u64,
    pub stopped_out: u64,
    pub no_data: u64,
    pub errors: u64,
    /// Percent of checked signals predicted correctly.
    pub accuracy: f64,
    /// Sum of winning magnitudes over sum of losing magnitudes.
    pub profit_factor: f64,
    pub by_exit_reason: HashMap<String, u64>,
    pub details: Vec<FactCheckDetail>,
    pub filter_stats: Option<FilterStats>,
    pub confidence_rows_updated: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
}

/// Drives the whole fact-check pass.
pub struct BulkFactChecker {
    repos: Repositories,
    facade: Arc<PriceDataFacade>,
    filter: SignalFilter,
    config: FactCheckConfig,
    cancel: CancellationToken,
}

impl BulkFactChecker {
    #[must_use]
    pub fn new(
        repos: Repositories,
        facade: Arc<PriceDataFacade>,
        config: FactCheckConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            repos,
            facade,
            filter: SignalFilter::new(config.clone()),
            config,
            cancel,
        }
    }

    /// Runs the bulk fact-check and returns the (possibly partial) summary.
    ///
    /// # Errors
    /// Returns an error only when the candidate query itself fails;
    /// per-signal failures are counted, not propagated.
    pub async fn run(&self, options: &FactCheckOptions) -> Result<FactCheckRunSummary> {
        let started = Instant::now();
        let mut summary = FactCheckRunSummary::default();

        let rows = self
            .repos
            .live_signals
            .query_unchecked(options.symbol.as_deref(), options.limit)
            .await?;
        summary.total_candidates = rows.len();
        tracing::info!("{} unchecked signals to consider", rows.len());

        let mut signals = Vec::with_capacity(rows.len());
        for row in &rows {
            match row.to_instance() {
                Ok(signal) => signals.push(signal),
                Err(error) => {
                    summary.errors += 1;
                    tracing::warn!("skipping malformed live signal {}: {error:#}", row.id);
                }
            }
        }

        if options.use_filtering {
            let combos = self
                .repos
                .combos
                .winning_tf_combos(self.config.winning_combo_min_accuracy)
                .await?;
            let counts = self.repos.fact_checks.sample_counts().await?;
            let inputs = FilterInputs::new(&combos, &counts);

            let mut stats = FilterStats::default();
            signals.retain(|signal| {
                let decision = self.filter.decide(signal, &inputs);
                stats.record(decision);
                if !decision.should_check {
                    tracing::debug!(
                        "filtered out {}@{}: {}",
                        signal.signal_name,
                        signal.timeframe,
                        decision.reason
                    );
                }
                decision.should_check
            });
            summary.filtered_out = stats.total as usize - signals.len();
            tracing::info!(
                "filter kept {} of {} ({:.0}% check rate)",
                signals.len(),
                stats.total,
                stats.check_rate() * 100.0
            );
            summary.filter_stats = Some(stats);
        }

        let windows: HashMap<(String, String), i32> = self
            .repos
            .definitions
            .find_all()
            .await?
            .into_iter()
            .map(|d| ((d.signal_name, d.timeframe), d.validation_window))
            .collect();

        let total = signals.len();
        let mut processed = 0usize;
        let mut win_sum = 0.0f64;
        let mut loss_sum = 0.0f64;
        let mut touched: HashSet<(String, String)> = HashSet::new();

        for chunk in signals.chunks(options.max_workers.max(1)) {
            if self.cancel.is_cancelled() {
                tracing::info!("cancellation requested; stopping after {processed} signals");
                summary.cancelled = true;
                break;
            }

            let results =
                futures::future::join_all(chunk.iter().map(|s| self.process_one(s, &windows)))
                    .await;

            for result in results {
                processed += 1;
                match result {
                    Ok(Some(record)) => {
                        summary.total_checked += 1;
                        if record.predicted_correctly {
                            summary.correct_predictions += 1;
                        } else {
                            summary.incorrect_predictions += 1;
                        }
                        if record.is_stopped_out() {
                            summary.stopped_out += 1;
                        }
                        *summary
                            .by_exit_reason
                            .entry(record.exit_reason.clone())
                            .or_insert(0) += 1;

                        let change = record.price_change_pct.to_f64().unwrap_or(0.0).abs();
                        if record.predicted_correctly {
                            win_sum += change;
                        } else {
                            loss_sum += change;
                        }

                        touched.insert((record.signal_name.clone(), record.timeframe.clone()));
                        summary.details.push(FactCheckDetail {
                            signal_name: record.signal_name,
                            timeframe: record.timeframe,
                            exit_reason: record.exit_reason,
                            predicted_correctly: record.predicted_correctly,
                            price_change_pct: record.price_change_pct.to_f64().unwrap_or(0.0),
                        });
                    }
                    Ok(None) => summary.no_data += 1,
                    Err(error) => {
                        summary.errors += 1;
                        tracing::warn!("fact-check failed: {error:#}");
                    }
                }

                if processed % PROGRESS_EVERY == 0 {
                    log_progress(processed, total, started.elapsed());
                }
            }
        }
        if processed > 0 && processed % PROGRESS_EVERY != 0 {
            log_progress(processed, total, started.elapsed());
        }

        summary.accuracy = if summary.total_checked == 0 {
            0.0
        } else {
            summary.correct_predictions as f64 / summary.total_checked as f64 * 100.0
        };
        summary.profit_factor = aggregate_profit_factor(win_sum, loss_sum);

        let confidence = ConfidenceService::new(self.repos.clone(), self.config.clone());
        for (signal_name, timeframe) in &touched {
            match confidence.refresh_pair(signal_name, timeframe).await {
                Ok(Some(_)) => summary.confidence_rows_updated += 1,
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(
                        "confidence refresh failed for {signal_name}@{timeframe}: {error:#}"
                    );
                }
            }
        }

        summary.elapsed = started.elapsed();
        tracing::info!(
            "fact-check run done: {} checked, {:.1}% accuracy, pf {:.2}, {} no-data, {} errors in {:.1}s",
            summary.total_checked,
            summary.accuracy,
            summary.profit_factor,
            summary.no_data,
            summary.errors,
            summary.elapsed.as_secs_f64()
        );
        Ok(summary)
    }

    /// Evaluates and persists one signal. `Ok(None)` means no usable candle
    /// journey existed, in which case nothing is written.
    async fn process_one(
        &self,
        signal: &SignalInstance,
        windows: &HashMap<(String, String), i32>,
    ) -> Result<Option<FactCheckRecord>> {
        let window = windows
            .get(&(
                signal.signal_name.clone(),
                signal.timeframe.as_str().to_string(),
            ))
            .copied()
            .unwrap_or(self.config.default_validation_window as i32)
            .max(1) as usize;

        let Some(candles) = self
            .facade
            .candle_journey(&signal.symbol, signal.detected_at, signal.timeframe, window)
            .await
        else {
            tracing::debug!(
                "no journey for {}@{} at {}",
                signal.signal_name,
                signal.timeframe,
                signal.detected_at
            );
            return Ok(None);
        };

        let scoped = journey_slice(&candles, window);
        let outcome = evaluate(
            signal.price,
            signal.signal_type,
            scoped,
            self.config.stop_loss_pct,
            self.config.min_profit_pct,
        );
        if outcome.exit_reason == ExitReason::InsufficientData {
            return Ok(None);
        }

        let record = FactCheckRecord::from_outcome(signal, &outcome, window as i32, Utc::now());
        let inserted = self.repos.fact_checks.insert(&record).await?;
        if !inserted {
            tracing::debug!(
                "fact-check for {}@{} at {} already existed",
                record.signal_name,
                record.timeframe,
                record.detected_at
            );
        }
        Ok(Some(record))
    }
}

/// Entry candle plus at most `window` forward candles, so the elapsed count
/// never exceeds the validation window (the facade fetches a safety buffer
/// past the horizon).
fn journey_slice(candles: &[Candle], window: usize) -> &[Candle] {
    let keep = (window + 1).min(candles.len());
    &candles[..keep]
}

/// Run-level profit factor: when nothing was lost, the factor equals the
/// winning sum.
fn aggregate_profit_factor(win_sum: f64, loss_sum: f64) -> f64 {
    if loss_sum == 0.0 {
        win_sum
    } else {
        win_sum / loss_sum
    }
}

fn log_progress(processed: usize, total: usize, elapsed: Duration) {
    let rate = processed as f64 / elapsed.as_secs_f64().max(0.001);
    let remaining = total.saturating_sub(processed);
    let eta_secs = remaining as f64 / rate.max(0.001);
    tracing::info!(
        "fact-check progress: {processed}/{total} ({rate:.1}/s, eta {eta_secs:.0}s)"
    );
}
