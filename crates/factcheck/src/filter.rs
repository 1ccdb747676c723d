//! Signal filter: decides which pending signals warrant a fact-check.
//!
//! The decision table is evaluated first-match-wins over preloaded inputs
//! (winning combos and existing sample counts), so the rules themselves are
//! synchronous and deterministic. The one stochastic rule draws against a
//! configured sampling rate that can be pinned to 0 or 1.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sigval_core::{FactCheckConfig, SignalInstance, SignalStrength, Timeframe};
use sigval_data::TfComboRecord;

/// Why a signal was checked or skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckReason {
    StrongSignal,
    ModerateSignal,
    HighConfidence,
    WinningComboMember,
    InsufficientData,
    RandomSample,
    TimeframeNotStandard,
    WeakSignalSkip,
}

impl CheckReason {
    /// Stable uppercase label for stats and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StrongSignal => "STRONG_SIGNAL",
            Self::ModerateSignal => "MODERATE_SIGNAL",
            Self::HighConfidence => "HIGH_CONFIDENCE",
            Self::WinningComboMember => "WINNING_COMBO_MEMBER",
            Self::InsufficientData => "INSUFFICIENT_DATA",
            Self::RandomSample => "RANDOM_SAMPLE",
            Self::TimeframeNotStandard => "TIMEFRAME_NOT_STANDARD",
            Self::WeakSignalSkip => "WEAK_SIGNAL_SKIP",
        }
    }
}

impl fmt::Display for CheckReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one filter decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterDecision {
    pub should_check: bool,
    pub reason: CheckReason,
}

/// Preloaded data the rules consult: winning combo membership per timeframe
/// and existing fact-check sample counts per (signal, timeframe).
#[derive(Debug, Clone, Default)]
pub struct FilterInputs {
    winning_combos: Vec<(Timeframe, String)>,
    sample_counts: HashMap<(String, Timeframe), i64>,
}

impl FilterInputs {
    /// Builds inputs from winning combo rows and grouped sample counts.
    /// Rows with unknown timeframe labels are dropped with a warning.
    #[must_use]
    pub fn new(combos: &[TfComboRecord], counts: &[(String, String, i64)]) -> Self {
        let winning_combos = combos
            .iter()
            .filter_map(|combo| match combo.timeframe.parse::<Timeframe>() {
                Ok(tf) => Some((tf, combo.signal_names.clone())),
                Err(_) => {
                    tracing::warn!("dropping combo with unknown timeframe {}", combo.timeframe);
                    None
                }
            })
            .collect();
        let sample_counts = counts
            .iter()
            .filter_map(|(name, tf, count)| {
                tf.parse::<Timeframe>()
                    .ok()
                    .map(|tf| ((name.clone(), tf), *count))
            })
            .collect();
        Self {
            winning_combos,
            sample_counts,
        }
    }

    fn is_winning_combo_member(&self, signal_name: &str, timeframe: Timeframe) -> bool {
        self.winning_combos
            .iter()
            .any(|(tf, names)| *tf == timeframe && names.contains(signal_name))
    }

    fn sample_count(&self, signal_name: &str, timeframe: Timeframe) -> i64 {
        self.sample_counts
            .get(&(signal_name.to_string(), timeframe))
            .copied()
            .unwrap_or(0)
    }
}

/// Aggregate filter statistics for one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterStats {
    pub total: u64,
    pub checked: u64,
    pub by_reason: HashMap<String, u64>,
}

impl FilterStats {
    /// Records one decision.
    pub fn record(&mut self, decision: FilterDecision) {
        self.total += 1;
        if decision.should_check {
            self.checked += 1;
        }
        *self
            .by_reason
            .entry(decision.reason.as_str().to_string())
            .or_insert(0) += 1;
    }

    /// Fraction of signals that passed, in `[0, 1]`.
    #[must_use]
    pub fn check_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.checked as f64 / self.total as f64
        }
    }
}

/// The filter itself; holds only configuration.
pub struct SignalFilter {
    config: FactCheckConfig,
}

impl SignalFilter {
    #[must_use]
    pub fn new(config: FactCheckConfig) -> Self {
        Self { config }
    }

    /// Decides whether the signal warrants a fact-check this pass.
    #[must_use]
    pub fn decide(&self, signal: &SignalInstance, inputs: &FilterInputs) -> FilterDecision {
        self.decide_with_draw(signal, inputs, rand::random::<f64>())
    }

    /// Decision with an explicit random draw in `[0, 1)`; first match wins.
    #[must_use]
    pub fn decide_with_draw(
        &self,
        signal: &SignalInstance,
        inputs: &FilterInputs,
        draw: f64,
    ) -> FilterDecision {
        // 1-2. Strength buckets.
        match signal.strength {
            SignalStrength::Strong | SignalStrength::VeryStrong => {
                return check(CheckReason::StrongSignal)
            }
            SignalStrength::Moderate => return check(CheckReason::ModerateSignal),
            SignalStrength::Weak => {}
        }

        // 3. Analyzer confidence.
        if signal.confidence >= self.config.high_confidence_threshold {
            return check(CheckReason::HighConfidence);
        }

        // 4. Member of a winning combination on this timeframe.
        if inputs.is_winning_combo_member(&signal.signal_name, signal.timeframe) {
            return check(CheckReason::WinningComboMember);
        }

        // 5. Not enough history yet.
        if inputs.sample_count(&signal.signal_name, signal.timeframe)
            < self.config.filter_min_samples
        {
            return check(CheckReason::InsufficientData);
        }

        // 6. Random sampling of the remainder.
        if draw < self.config.random_sample_rate {
            return check(CheckReason::RandomSample);
        }

        // 7. Off-rotation timeframes.
        if matches!(signal.timeframe, Timeframe::H2 | Timeframe::H6) {
            return skip(CheckReason::TimeframeNotStandard);
        }

        // 8. Everything else.
        skip(CheckReason::WeakSignalSkip)
    }
}

const fn check(reason: CheckReason) -> FilterDecision {
    FilterDecision {
        should_check: true,
        reason,
    }
}

const fn skip(reason: CheckReason) -> FilterDecision {
    FilterDecision {
        should_check: false,
        reason,
    }
}
