//! Fact-check outcome types.
//!
//! An evaluator replays a signal against its forward candle journey and
//! produces a [`FactCheckOutcome`]; the orchestrator persists it as one
//! append-only record per (signal, timeframe, detection instant).

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Why the evaluation of a signal ended.
///
/// Rendered to stable uppercase labels (`STOPPED_OUT_CANDLE_<i>` carries the
/// triggering candle index) so persisted history can be matched by label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    /// Fewer than two candles were available.
    InsufficientData,
    /// Final/entry price ratio fell outside `[0.1, 10]`, indicating the
    /// journey was quoted in a different unit than the entry (e.g. Rial
    /// candles against a USDT entry).
    PriceUnitMismatch,
    /// Absolute price change exceeded 50 percent.
    InvalidPriceChange,
    /// The stop-loss level was touched at `candle_index`.
    StoppedOut { candle_index: usize },
    /// The journey closed above the minimum profit threshold.
    ProfitTarget,
    /// The journey closed positive but below the minimum profit threshold.
    ProfitTooSmall,
    /// The journey closed against the prediction.
    Loss,
}

impl ExitReason {
    /// Stable persistence label.
    #[must_use]
    pub fn as_label(&self) -> String {
        match self {
            Self::InsufficientData => "INSUFFICIENT_DATA".to_string(),
            Self::PriceUnitMismatch => "PRICE_UNIT_MISMATCH".to_string(),
            Self::InvalidPriceChange => "INVALID_PRICE_CHANGE".to_string(),
            Self::StoppedOut { candle_index } => format!("STOPPED_OUT_CANDLE_{candle_index}"),
            Self::ProfitTarget => "PROFIT_TARGET".to_string(),
            Self::ProfitTooSmall => "PROFIT_TOO_SMALL".to_string(),
            Self::Loss => "LOSS".to_string(),
        }
    }

    /// Parses a persisted label back into the enum.
    #[must_use]
    pub fn parse_label(label: &str) -> Option<Self> {
        match label {
            "INSUFFICIENT_DATA" => Some(Self::InsufficientData),
            "PRICE_UNIT_MISMATCH" => Some(Self::PriceUnitMismatch),
            "INVALID_PRICE_CHANGE" => Some(Self::InvalidPriceChange),
            "PROFIT_TARGET" => Some(Self::ProfitTarget),
            "PROFIT_TOO_SMALL" => Some(Self::ProfitTooSmall),
            "LOSS" => Some(Self::Loss),
            other => {
                let index = other.strip_prefix("STOPPED_OUT_CANDLE_")?;
                index
                    .parse()
                    .ok()
                    .map(|candle_index| Self::StoppedOut { candle_index })
            }
        }
    }

    /// Returns true for any stop-loss exit, regardless of candle index.
    #[must_use]
    pub const fn is_stopped_out(&self) -> bool {
        matches!(self, Self::StoppedOut { .. })
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_label())
    }
}

/// Realized direction of the price over the validation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActualMove {
    Up,
    Down,
    Flat,
}

impl ActualMove {
    /// Derives the move from a signed percent change, using a flat band of
    /// ±0.1 percent.
    #[must_use]
    pub fn from_change_pct(change_pct: Decimal) -> Self {
        let band = Decimal::new(1, 1); // 0.1
        if change_pct > band {
            Self::Up
        } else if change_pct < -band {
            Self::Down
        } else {
            Self::Flat
        }
    }

    /// Uppercase label used in persistence.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Up => "UP",
            Self::Down => "DOWN",
            Self::Flat => "FLAT",
        }
    }
}

impl fmt::Display for ActualMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of evaluating one signal against its candle journey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactCheckOutcome {
    pub predicted_correctly: bool,
    pub exit_reason: ExitReason,
    /// Signed percent change in the direction of the prediction (positive
    /// means the prediction paid off).
    pub price_change_pct: Decimal,
    pub actual_move: ActualMove,
    /// Number of forward candles consumed before the exit.
    pub candles_elapsed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn stopped_out_label_carries_index() {
        let reason = ExitReason::StoppedOut { candle_index: 2 };
        assert_eq!(reason.as_label(), "STOPPED_OUT_CANDLE_2");
        assert!(reason.is_stopped_out());
    }

    #[test]
    fn labels_round_trip() {
        let reasons = [
            ExitReason::InsufficientData,
            ExitReason::PriceUnitMismatch,
            ExitReason::InvalidPriceChange,
            ExitReason::StoppedOut { candle_index: 7 },
            ExitReason::ProfitTarget,
            ExitReason::ProfitTooSmall,
            ExitReason::Loss,
        ];
        for reason in reasons {
            assert_eq!(ExitReason::parse_label(&reason.as_label()), Some(reason));
        }
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(ExitReason::parse_label("STOPPED_OUT_CANDLE_x"), None);
        assert_eq!(ExitReason::parse_label("BANANA"), None);
    }

    #[test]
    fn actual_move_uses_flat_band() {
        assert_eq!(ActualMove::from_change_pct(dec!(1.0)), ActualMove::Up);
        assert_eq!(ActualMove::from_change_pct(dec!(0.1)), ActualMove::Flat);
        assert_eq!(ActualMove::from_change_pct(dec!(0.05)), ActualMove::Flat);
        assert_eq!(ActualMove::from_change_pct(dec!(-0.1)), ActualMove::Flat);
        assert_eq!(ActualMove::from_change_pct(dec!(-0.2)), ActualMove::Down);
    }
}
