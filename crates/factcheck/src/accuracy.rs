//! Per-signal accuracy statistics and confidence adjustment.
//!
//! Accuracy is recomputed from the full fact-check history for a
//! (signal, timeframe) pair; the adjusted confidence blends the configured
//! original confidence toward the empirical accuracy as the sample grows,
//! with a profit-factor bonus/malus and a stop-out penalty.

use anyhow::Result;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use sigval_core::FactCheckConfig;
use sigval_data::{ConfidenceAdjustmentRecord, FactCheckRecord, Repositories};

/// Sample count at which empirical accuracy fully replaces the original
/// confidence.
const FULL_WEIGHT_SAMPLES: f64 = 500.0;

/// Derived statistics for one (signal, timeframe) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalAccuracyStats {
    pub total_samples: usize,
    pub correct_predictions: usize,
    /// Percent of predictions that were correct.
    pub accuracy: f64,
    pub avg_price_change: f64,
    /// Mean percent change over correct predictions.
    pub avg_win: f64,
    /// Mean percent change over incorrect predictions.
    pub avg_loss: f64,
    /// `|avg_win / avg_loss|`, 0 when there are no losses.
    pub profit_factor: f64,
    pub stopped_out: usize,
    /// Percent of samples that exited through the stop-loss.
    pub stopped_out_rate: f64,
}

/// Computes accuracy statistics, or `None` below the sample floor.
#[must_use]
pub fn compute_accuracy(
    records: &[FactCheckRecord],
    min_samples: usize,
) -> Option<SignalAccuracyStats> {
    let total = records.len();
    if total < min_samples {
        return None;
    }

    let pct = |record: &FactCheckRecord| record.price_change_pct.to_f64().unwrap_or(0.0);

    let correct: Vec<f64> = records
        .iter()
        .filter(|r| r.predicted_correctly)
        .map(pct)
        .collect();
    let incorrect: Vec<f64> = records
        .iter()
        .filter(|r| !r.predicted_correctly)
        .map(pct)
        .collect();

    let avg_win = mean(&correct);
    let avg_loss = mean(&incorrect);
    let profit_factor = if avg_loss == 0.0 {
        0.0
    } else {
        (avg_win / avg_loss).abs()
    };

    let stopped_out = records.iter().filter(|r| r.is_stopped_out()).count();
    let all_changes: Vec<f64> = records.iter().map(pct).collect();

    Some(SignalAccuracyStats {
        total_samples: total,
        correct_predictions: correct.len(),
        accuracy: correct.len() as f64 / total as f64 * 100.0,
        avg_price_change: mean(&all_changes),
        avg_win,
        avg_loss,
        profit_factor,
        stopped_out,
        stopped_out_rate: stopped_out as f64 / total as f64 * 100.0,
    })
}

/// Blends the original confidence toward empirical accuracy and applies the
/// profit and stop-out modifiers. The result is rounded and clamped to
/// `[0, 100]`.
#[must_use]
pub fn adjust_confidence(original: f64, stats: &SignalAccuracyStats) -> f64 {
    let sample_weight = (stats.total_samples as f64 / FULL_WEIGHT_SAMPLES).min(1.0);
    let base = original * (1.0 - sample_weight) + stats.accuracy * sample_weight;

    let profit_bonus = if stats.profit_factor > 2.0 {
        ((stats.profit_factor - 2.0) * 5.0).min(10.0)
    } else if stats.profit_factor < 1.0 {
        ((stats.profit_factor - 1.0) * 15.0).max(-15.0)
    } else {
        0.0
    };

    let stop_penalty = if stats.stopped_out_rate > 30.0 {
        ((stats.stopped_out_rate - 30.0) * 0.3).max(0.0)
    } else {
        0.0
    };

    (base + profit_bonus - stop_penalty).round().clamp(0.0, 100.0)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Recomputes and upserts confidence adjustments from persisted history.
pub struct ConfidenceService {
    repos: Repositories,
    config: FactCheckConfig,
}

impl ConfidenceService {
    #[must_use]
    pub fn new(repos: Repositories, config: FactCheckConfig) -> Self {
        Self { repos, config }
    }

    /// Refreshes the adjustment row for one pair. Returns `None` when the
    /// pair has too few samples to score.
    ///
    /// # Errors
    /// Returns an error if the history query or the upsert fails.
    pub async fn refresh_pair(
        &self,
        signal_name: &str,
        timeframe: &str,
    ) -> Result<Option<ConfidenceAdjustmentRecord>> {
        let records = self
            .repos
            .fact_checks
            .query_for_signal(signal_name, Some(timeframe))
            .await?;
        let Some(stats) = compute_accuracy(&records, self.config.min_samples) else {
            tracing::debug!(
                "{signal_name}@{timeframe}: {} samples, below floor of {}",
                records.len(),
                self.config.min_samples
            );
            return Ok(None);
        };

        let original = self.config.original_confidence(signal_name);
        let record = ConfidenceAdjustmentRecord {
            signal_name: signal_name.to_string(),
            timeframe: timeframe.to_string(),
            original_confidence: original,
            adjusted_confidence: adjust_confidence(original, &stats),
            accuracy_rate: stats.accuracy,
            sample_size: stats.total_samples as i32,
            last_updated: Utc::now(),
        };
        self.repos.confidence.upsert(&record).await?;
        tracing::info!(
            "{signal_name}@{timeframe}: confidence {} -> {} (accuracy {:.1}%, n={})",
            record.original_confidence,
            record.adjusted_confidence,
            record.accuracy_rate,
            record.sample_size
        );
        Ok(Some(record))
    }

    /// Refreshes every pair present in the fact-check history. Returns the
    /// number of rows upserted.
    ///
    /// # Errors
    /// Returns an error if any query or upsert fails.
    pub async fn refresh_all(&self) -> Result<usize> {
        let pairs = self.repos.fact_checks.distinct_pairs().await?;
        let mut updated = 0;
        for (signal_name, timeframe) in pairs {
            if self.refresh_pair(&signal_name, &timeframe).await?.is_some() {
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn record(correct: bool, change_pct: Decimal, stopped: bool) -> FactCheckRecord {
        FactCheckRecord {
            signal_name: "rsi_oversold".to_string(),
            timeframe: "1h".to_string(),
            detected_at: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
            price_at_detection: dec!(100),
            actual_move: "UP".to_string(),
            predicted_correctly: correct,
            price_change_pct: change_pct,
            exit_reason: if stopped {
                "STOPPED_OUT_CANDLE_3".to_string()
            } else if correct {
                "PROFIT_TARGET".to_string()
            } else {
                "LOSS".to_string()
            },
            candles_elapsed: 3,
            validation_window: 12,
            checked_at: Utc::now(),
        }
    }

    fn mixed_history(wins: usize, losses: usize, stops: usize) -> Vec<FactCheckRecord> {
        let mut records = Vec::new();
        for _ in 0..wins {
            records.push(record(true, dec!(2), false));
        }
        for _ in 0..losses {
            records.push(record(false, dec!(-1), false));
        }
        for _ in 0..stops {
            records.push(record(false, dec!(-5), true));
        }
        records
    }

    // ============================================
    // compute_accuracy
    // ============================================

    #[test]
    fn below_sample_floor_yields_none() {
        let records = mixed_history(5, 5, 0);
        assert!(compute_accuracy(&records, 20).is_none());
        assert!(compute_accuracy(&records, 10).is_some());
    }

    #[test]
    fn accuracy_and_averages_are_correct() {
        // 12 wins at +2, 6 losses at -1, 2 stops at -5.
        let records = mixed_history(12, 6, 2);
        let stats = compute_accuracy(&records, 20).unwrap();

        assert_eq!(stats.total_samples, 20);
        assert_eq!(stats.correct_predictions, 12);
        assert!((stats.accuracy - 60.0).abs() < 1e-9);
        assert!((stats.avg_win - 2.0).abs() < 1e-9);
        // 8 incorrect: six at -1, two at -5 -> mean -2.
        assert!((stats.avg_loss + 2.0).abs() < 1e-9);
        assert!((stats.profit_factor - 1.0).abs() < 1e-9);
        assert_eq!(stats.stopped_out, 2);
        assert!((stats.stopped_out_rate - 10.0).abs() < 1e-9);
    }

    #[test]
    fn no_losses_means_zero_profit_factor() {
        let records = mixed_history(20, 0, 0);
        let stats = compute_accuracy(&records, 20).unwrap();
        assert!((stats.profit_factor).abs() < 1e-9);
        assert!((stats.accuracy - 100.0).abs() < 1e-9);
    }

    // ============================================
    // adjust_confidence
    // ============================================

    fn stats_with(
        total: usize,
        accuracy: f64,
        profit_factor: f64,
        stopped_out_rate: f64,
    ) -> SignalAccuracyStats {
        SignalAccuracyStats {
            total_samples: total,
            correct_predictions: 0,
            accuracy,
            avg_price_change: 0.0,
            avg_win: 0.0,
            avg_loss: 0.0,
            profit_factor,
            stopped_out: 0,
            stopped_out_rate,
        }
    }

    #[test]
    fn small_samples_stay_near_original() {
        // 50 of 500 samples: weight 0.1.
        let stats = stats_with(50, 100.0, 1.5, 0.0);
        let adjusted = adjust_confidence(70.0, &stats);
        // 70 * 0.9 + 100 * 0.1 = 73
        assert!((adjusted - 73.0).abs() < f64::EPSILON);
    }

    #[test]
    fn full_weight_uses_empirical_accuracy() {
        let stats = stats_with(1_000, 55.0, 1.5, 0.0);
        let adjusted = adjust_confidence(70.0, &stats);
        assert!((adjusted - 55.0).abs() < f64::EPSILON);
    }

    #[test]
    fn profit_bonus_is_capped_at_ten() {
        let stats = stats_with(500, 60.0, 10.0, 0.0);
        let adjusted = adjust_confidence(70.0, &stats);
        assert!((adjusted - 70.0).abs() < f64::EPSILON); // 60 + 10
    }

    #[test]
    fn poor_profit_factor_is_floored_at_minus_fifteen() {
        let stats = stats_with(500, 60.0, 0.0, 0.0);
        let adjusted = adjust_confidence(70.0, &stats);
        assert!((adjusted - 45.0).abs() < f64::EPSILON); // 60 - 15
    }

    #[test]
    fn stop_penalty_applies_above_thirty_percent() {
        let stats = stats_with(500, 60.0, 1.5, 50.0);
        let adjusted = adjust_confidence(70.0, &stats);
        // penalty = (50 - 30) * 0.3 = 6
        assert!((adjusted - 54.0).abs() < f64::EPSILON);
    }

    #[test]
    fn adjusted_confidence_is_always_in_bounds() {
        let high = stats_with(1_000, 99.0, 5.0, 0.0);
        assert!(adjust_confidence(100.0, &high) <= 100.0);

        let low = stats_with(1_000, 2.0, 0.1, 90.0);
        let adjusted = adjust_confidence(10.0, &low);
        assert!((0.0..=100.0).contains(&adjusted));
    }

    #[test]
    fn result_is_rounded_to_an_integer_value() {
        let stats = stats_with(100, 63.3, 1.5, 0.0);
        let adjusted = adjust_confidence(70.0, &stats);
        assert!((adjusted - adjusted.round()).abs() < f64::EPSILON);
    }
}
