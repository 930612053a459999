// Technical indicators module
// Pure functions over price/volume windows; every function returns None
// instead of erroring when the available history is shorter than its period.

pub mod atr;
pub mod bollinger;
pub mod donchian;
pub mod macd;
pub mod moving_average;
pub mod pmo;
pub mod rsi;

pub use atr::calculate_atr;
pub use bollinger::{calculate_bollinger, BollingerBands};
pub use donchian::{calculate_donchian, calculate_donchian_at, DonchianChannel};
pub use macd::{calculate_macd, MacdOutput};
pub use moving_average::{calculate_ema, calculate_ema_series, calculate_sma, calculate_volume_ma};
pub use pmo::calculate_pmo;
pub use rsi::calculate_rsi;

use crate::models::Candle;

/// Extract close prices from candles
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

/// Extract volumes from candles
pub fn volumes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.volume).collect()
}

/// Highest high over the trailing `period` candles
pub fn highest_high(candles: &[Candle], period: usize) -> Option<f64> {
    let start = candles.len().checked_sub(period)?;
    candles[start..]
        .iter()
        .map(|c| c.high)
        .fold(None, |acc, h| Some(acc.map_or(h, |a: f64| a.max(h))))
}

/// Lowest low over the trailing `period` candles
pub fn lowest_low(candles: &[Candle], period: usize) -> Option<f64> {
    let start = candles.len().checked_sub(period)?;
    candles[start..]
        .iter()
        .map(|c| c.low)
        .fold(None, |acc, l| Some(acc.map_or(l, |a: f64| a.min(l))))
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
    fn test_highest_lowest_over_window() {
        let candles = vec![candle(10.0, 8.0), candle(12.0, 9.0), candle(11.0, 7.0)];
        assert_eq!(highest_high(&candles, 2), Some(12.0));
        assert_eq!(lowest_low(&candles, 2), Some(7.0));
        assert_eq!(highest_high(&candles, 3), Some(12.0));
        assert_eq!(highest_high(&candles, 4), None);
    }
}
