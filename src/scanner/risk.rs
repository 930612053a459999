// Stop, target and position sizing helpers
//
// One stop policy everywhere: the more conservative of a structure-based
// swing extreme and an ATR-multiple offset, with targets at 1R and 2R.

use crate::indicators::{highest_high, lowest_low};
use crate::models::{Candle, Side};

/// Stop level from recent structure and volatility
///
/// For longs the stop sits below both the swing low of the last
/// `swing_lookback` bars and `entry - atr_mult * atr`; shorts mirror above.
pub fn conservative_stop(
    candles: &[Candle],
    side: Side,
    atr: f64,
    entry: f64,
    atr_mult: f64,
    swing_lookback: usize,
) -> f64 {
    let lookback = swing_lookback.min(candles.len());

    match side {
        Side::Long => {
            let structure = lowest_low(candles, lookback).unwrap_or(entry);
            let atr_stop = entry - atr_mult * atr;
            structure.min(atr_stop)
        }
        Side::Short => {
            let structure = highest_high(candles, lookback).unwrap_or(entry);
            let atr_stop = entry + atr_mult * atr;
            structure.max(atr_stop)
        }
    }
}

/// Targets at 1R and 2R of the stop distance
pub fn targets_from_stop(entry: f64, stop: f64, side: Side) -> (f64, f64) {
    let risk = (entry - stop).abs();
    match side {
        Side::Long => (entry + risk, entry + 2.0 * risk),
        Side::Short => (entry - risk, entry - 2.0 * risk),
    }
}

/// Quantity that risks `risk_percent` of the balance between entry and stop
pub fn position_size(balance: f64, risk_percent: f64, entry: f64, stop: f64) -> f64 {
    let risk_per_unit = (entry - stop).abs();
    if risk_per_unit <= 0.0 {
        return 0.0;
    }
    let risk_amount = balance * (risk_percent / 100.0);
    (risk_amount / risk_per_unit).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candle(high: f64, low: f64) -> Candle {
        Candle {
            timestamp: Utc::now(),
            open: (high + low) / 2.0,
            high,
            low,
            close: (high + low) / 2.0,
            volume: 1000.0,
        }
    }

    #[test]
    fn test_long_stop_takes_the_lower_of_structure_and_atr() {
        let candles = vec![candle(101.0, 97.0), candle(102.0, 98.0)];

        // Structure low 97.0 below ATR stop 100 - 1.2*2 = 97.6
        let stop = conservative_stop(&candles, Side::Long, 2.0, 100.0, 1.2, 10);
        assert_eq!(stop, 97.0);

        // Tight structure: ATR stop wins
        let candles = vec![candle(101.0, 99.5), candle(102.0, 99.8)];
        let stop = conservative_stop(&candles, Side::Long, 2.0, 100.0, 1.2, 10);
        assert_eq!(stop, 97.6);
    }

    #[test]
    fn test_short_stop_takes_the_higher_of_structure_and_atr() {
        let candles = vec![candle(103.0, 99.0), candle(102.5, 98.0)];

        // Structure high 103.0 above ATR stop 100 + 1.2*2 = 102.4
        let stop = conservative_stop(&candles, Side::Short, 2.0, 100.0, 1.2, 10);
        assert_eq!(stop, 103.0);
    }

    #[test]
    fn test_targets_are_1r_and_2r() {
        let (t1, t2) = targets_from_stop(100.0, 98.0, Side::Long);
        assert_eq!(t1, 102.0);
        assert_eq!(t2, 104.0);

        let (t1, t2) = targets_from_stop(100.0, 102.0, Side::Short);
        assert_eq!(t1, 98.0);
        assert_eq!(t2, 96.0);
    }

    #[test]
    fn test_position_size() {
        // 1% of 10_000 = 100 USDT risk, 2.0 risk per unit => 50 units
        let qty = position_size(10_000.0, 1.0, 100.0, 98.0);
        assert_eq!(qty, 50.0);

        assert_eq!(position_size(10_000.0, 1.0, 100.0, 100.0), 0.0);
    }
}
