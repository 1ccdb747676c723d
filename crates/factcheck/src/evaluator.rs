//! Fact-check evaluator.
//!
//! Replays a signal's prediction against its forward candle journey,
//! applying stop-loss and minimum-profit semantics. The evaluator is a pure
//! function over the candle slice; persistence and fetching live elsewhere.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sigval_core::{ActualMove, Candle, ExitReason, FactCheckOutcome, SignalType};

/// Final/entry ratio bounds beyond which the journey is assumed to be quoted
/// in a different unit than the entry price.
const UNIT_RATIO_UPPER: Decimal = dec!(10);
const UNIT_RATIO_LOWER: Decimal = dec!(0.1);

/// Absolute percent change beyond which the result is discarded as invalid.
const MAX_ABS_CHANGE_PCT: Decimal = dec!(50);

/// Evaluates one signal against its candle journey.
///
/// `candles[0]` is the entry candle; the scan for stop-loss touches starts
/// at index 1. The returned percent change is signed in the direction of the
/// prediction: positive means the prediction paid off, for SELL signals as
/// well as BUY.
#[must_use]
pub fn evaluate(
    entry_price: Decimal,
    signal_type: SignalType,
    candles: &[Candle],
    stop_loss_pct: Decimal,
    min_profit_pct: Decimal,
) -> FactCheckOutcome {
    if candles.len() < 2 {
        return failure(ExitReason::InsufficientData, candles.len());
    }

    let final_price = candles[candles.len() - 1].close;
    if entry_price <= Decimal::ZERO {
        return failure(ExitReason::PriceUnitMismatch, candles.len() - 1);
    }
    let ratio = final_price / entry_price;
    if ratio > UNIT_RATIO_UPPER || ratio < UNIT_RATIO_LOWER {
        return failure(ExitReason::PriceUnitMismatch, candles.len() - 1);
    }

    let stop_fraction = stop_loss_pct / Decimal::ONE_HUNDRED;
    match signal_type {
        SignalType::Buy => {
            let stop_price = entry_price * (Decimal::ONE - stop_fraction);
            for (index, candle) in candles.iter().enumerate().skip(1) {
                if candle.low <= stop_price {
                    return stopped_out(index, stop_loss_pct);
                }
            }
            let change_pct = (final_price - entry_price) / entry_price * Decimal::ONE_HUNDRED;
            settle(change_pct, min_profit_pct, candles.len() - 1)
        }
        SignalType::Sell => {
            let stop_price = entry_price * (Decimal::ONE + stop_fraction);
            for (index, candle) in candles.iter().enumerate().skip(1) {
                if candle.high >= stop_price {
                    return stopped_out(index, stop_loss_pct);
                }
            }
            let change_pct = (entry_price - final_price) / entry_price * Decimal::ONE_HUNDRED;
            settle(change_pct, min_profit_pct, candles.len() - 1)
        }
    }
}

fn failure(exit_reason: ExitReason, candles_elapsed: usize) -> FactCheckOutcome {
    FactCheckOutcome {
        predicted_correctly: false,
        exit_reason,
        price_change_pct: Decimal::ZERO,
        actual_move: ActualMove::Flat,
        candles_elapsed,
    }
}

fn stopped_out(candle_index: usize, stop_loss_pct: Decimal) -> FactCheckOutcome {
    let change_pct = -stop_loss_pct;
    FactCheckOutcome {
        predicted_correctly: false,
        exit_reason: ExitReason::StoppedOut { candle_index },
        price_change_pct: change_pct,
        actual_move: ActualMove::from_change_pct(change_pct),
        candles_elapsed: candle_index,
    }
}

fn settle(
    change_pct: Decimal,
    min_profit_pct: Decimal,
    candles_elapsed: usize,
) -> FactCheckOutcome {
    if change_pct.abs() > MAX_ABS_CHANGE_PCT {
        return failure(ExitReason::InvalidPriceChange, candles_elapsed);
    }

    let (predicted_correctly, exit_reason) = if change_pct > min_profit_pct {
        (true, ExitReason::ProfitTarget)
    } else if change_pct > Decimal::ZERO {
        (false, ExitReason::ProfitTooSmall)
    } else {
        (false, ExitReason::Loss)
    };

    FactCheckOutcome {
        predicted_correctly,
        exit_reason,
        price_change_pct: change_pct,
        actual_move: ActualMove::from_change_pct(change_pct),
        candles_elapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const STOP: Decimal = dec!(5);
    const MIN_PROFIT: Decimal = dec!(0.1);

    /// Builds an hourly journey from (low, high, close) triples; opens track
    /// the closes so every candle is well-formed.
    fn journey(points: &[(Decimal, Decimal, Decimal)]) -> Vec<Candle> {
        points
            .iter()
            .enumerate()
            .map(|(i, &(low, high, close))| Candle {
                timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
                    + chrono::Duration::hours(i as i64),
                open: close,
                high,
                low,
                close,
                volume: dec!(10),
            })
            .collect()
    }

    // ============================================
    // Sanity checks
    // ============================================

    #[test]
    fn single_candle_is_insufficient_data() {
        let candles = journey(&[(dec!(99), dec!(101), dec!(100))]);
        let outcome = evaluate(dec!(100), SignalType::Buy, &candles, STOP, MIN_PROFIT);
        assert_eq!(outcome.exit_reason, ExitReason::InsufficientData);
        assert!(!outcome.predicted_correctly);
        assert_eq!(outcome.price_change_pct, Decimal::ZERO);
    }

    #[test]
    fn unit_mismatch_guard_catches_wrong_quote_currency() {
        // Entry at 1.0 USDT, journey accidentally in a different unit.
        let candles = journey(&[
            (dec!(49000), dec!(51000), dec!(50000)),
            (dec!(49000), dec!(51000), dec!(50000)),
        ]);
        let outcome = evaluate(dec!(1), SignalType::Buy, &candles, STOP, MIN_PROFIT);
        assert_eq!(outcome.exit_reason, ExitReason::PriceUnitMismatch);
        assert!(!outcome.predicted_correctly);
        assert_eq!(outcome.price_change_pct, Decimal::ZERO);
    }

    #[test]
    fn unit_mismatch_guard_catches_tiny_ratio() {
        let candles = journey(&[(dec!(4), dec!(6), dec!(5)), (dec!(4), dec!(6), dec!(5))]);
        let outcome = evaluate(dec!(100), SignalType::Buy, &candles, STOP, MIN_PROFIT);
        assert_eq!(outcome.exit_reason, ExitReason::PriceUnitMismatch);
    }

    #[test]
    fn excessive_change_is_invalid() {
        // +80 percent inside the ratio bounds.
        let candles = journey(&[
            (dec!(99), dec!(101), dec!(100)),
            (dec!(99), dec!(181), dec!(180)),
        ]);
        let outcome = evaluate(dec!(100), SignalType::Buy, &candles, STOP, MIN_PROFIT);
        assert_eq!(outcome.exit_reason, ExitReason::InvalidPriceChange);
        assert_eq!(outcome.price_change_pct, Decimal::ZERO);
        assert!(!outcome.predicted_correctly);
    }

    // ============================================
    // BUY path
    // ============================================

    #[test]
    fn buy_profit_target_hit() {
        // Scenario S1: entry 100, closes drift to 101, lows never near 95.
        let candles = journey(&[
            (dec!(99.5), dec!(100.5), dec!(100)),
            (dec!(99.8), dec!(100.6), dec!(100.2)),
            (dec!(100.2), dec!(101.2), dec!(101.0)),
        ]);
        let outcome = evaluate(dec!(100), SignalType::Buy, &candles, STOP, MIN_PROFIT);
        assert!(outcome.predicted_correctly);
        assert_eq!(outcome.exit_reason, ExitReason::ProfitTarget);
        assert_eq!(outcome.price_change_pct, dec!(1.0));
        assert_eq!(outcome.actual_move, ActualMove::Up);
        assert_eq!(outcome.candles_elapsed, 2);
    }

    #[test]
    fn buy_stopped_out_at_index_two() {
        // Scenario S2: the third candle's low touches the 95 stop.
        let candles = journey(&[
            (dec!(100), dec!(100.5), dec!(100)),
            (dec!(98), dec!(100), dec!(99)),
            (dec!(94), dec!(99), dec!(94)),
        ]);
        let outcome = evaluate(dec!(100), SignalType::Buy, &candles, STOP, MIN_PROFIT);
        assert!(!outcome.predicted_correctly);
        assert_eq!(outcome.exit_reason, ExitReason::StoppedOut { candle_index: 2 });
        assert_eq!(outcome.exit_reason.as_label(), "STOPPED_OUT_CANDLE_2");
        assert_eq!(outcome.price_change_pct, dec!(-5));
        assert_eq!(outcome.candles_elapsed, 2);
    }

    #[test]
    fn buy_entry_candle_low_does_not_trigger_stop() {
        // Only candles after the entry are scanned.
        let candles = journey(&[
            (dec!(90), dec!(100.5), dec!(100)),
            (dec!(99), dec!(101.5), dec!(101)),
        ]);
        let outcome = evaluate(dec!(100), SignalType::Buy, &candles, STOP, MIN_PROFIT);
        assert_eq!(outcome.exit_reason, ExitReason::ProfitTarget);
    }

    #[test]
    fn buy_profit_too_small_band() {
        let candles = journey(&[
            (dec!(99.5), dec!(100.5), dec!(100)),
            (dec!(99.9), dec!(100.1), dec!(100.05)),
        ]);
        let outcome = evaluate(dec!(100), SignalType::Buy, &candles, STOP, MIN_PROFIT);
        assert!(!outcome.predicted_correctly);
        assert_eq!(outcome.exit_reason, ExitReason::ProfitTooSmall);
        assert_eq!(outcome.actual_move, ActualMove::Flat);
    }

    #[test]
    fn buy_exactly_at_threshold_is_too_small() {
        // 0.1 percent is not strictly above the threshold.
        let candles = journey(&[
            (dec!(99.5), dec!(100.5), dec!(100)),
            (dec!(100.0), dec!(100.2), dec!(100.1)),
        ]);
        let outcome = evaluate(dec!(100), SignalType::Buy, &candles, STOP, MIN_PROFIT);
        assert_eq!(outcome.exit_reason, ExitReason::ProfitTooSmall);
    }

    #[test]
    fn buy_negative_close_is_a_loss() {
        let candles = journey(&[
            (dec!(99.5), dec!(100.5), dec!(100)),
            (dec!(97), dec!(100), dec!(98)),
        ]);
        let outcome = evaluate(dec!(100), SignalType::Buy, &candles, STOP, MIN_PROFIT);
        assert!(!outcome.predicted_correctly);
        assert_eq!(outcome.exit_reason, ExitReason::Loss);
        assert_eq!(outcome.price_change_pct, dec!(-2));
        assert_eq!(outcome.actual_move, ActualMove::Down);
    }

    // ============================================
    // SELL path
    // ============================================

    #[test]
    fn sell_profit_when_price_falls() {
        let candles = journey(&[
            (dec!(99.5), dec!(100.5), dec!(100)),
            (dec!(98.5), dec!(100), dec!(99)),
        ]);
        let outcome = evaluate(dec!(100), SignalType::Sell, &candles, STOP, MIN_PROFIT);
        assert!(outcome.predicted_correctly);
        assert_eq!(outcome.exit_reason, ExitReason::ProfitTarget);
        // Positive change: the short-like prediction paid off.
        assert_eq!(outcome.price_change_pct, dec!(1));
    }

    #[test]
    fn sell_stopped_out_by_high() {
        let candles = journey(&[
            (dec!(99.5), dec!(100.5), dec!(100)),
            (dec!(100), dec!(105.5), dec!(104)),
        ]);
        let outcome = evaluate(dec!(100), SignalType::Sell, &candles, STOP, MIN_PROFIT);
        assert_eq!(outcome.exit_reason, ExitReason::StoppedOut { candle_index: 1 });
        assert_eq!(outcome.price_change_pct, dec!(-5));
        assert_eq!(outcome.candles_elapsed, 1);
    }

    #[test]
    fn sell_loss_when_price_rises() {
        let candles = journey(&[
            (dec!(99.5), dec!(100.5), dec!(100)),
            (dec!(100), dec!(102.5), dec!(102)),
        ]);
        let outcome = evaluate(dec!(100), SignalType::Sell, &candles, STOP, MIN_PROFIT);
        assert!(!outcome.predicted_correctly);
        assert_eq!(outcome.exit_reason, ExitReason::Loss);
        assert_eq!(outcome.price_change_pct, dec!(-2));
    }

    #[test]
    fn custom_stop_loss_distance_is_respected() {
        // With a 3 percent stop, a dip to 96.5 triggers; with 5 it would not.
        let candles = journey(&[
            (dec!(99.5), dec!(100.5), dec!(100)),
            (dec!(96.5), dec!(100), dec!(99)),
        ]);
        let outcome = evaluate(dec!(100), SignalType::Buy, &candles, dec!(3), MIN_PROFIT);
        assert_eq!(outcome.exit_reason, ExitReason::StoppedOut { candle_index: 1 });
        assert_eq!(outcome.price_change_pct, dec!(-3));
    }
}
