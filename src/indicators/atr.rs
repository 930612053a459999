/// Average True Range (ATR) indicator
///
/// Measures volatility as the average of true ranges over a period.
/// True Range is the greatest of:
/// - Current High - Current Low
/// - Abs(Current High - Previous Close)
/// - Abs(Current Low - Previous Close)
///
/// Uses Wilder's smoothing (same as RSI) for the moving average.
use crate::models::Candle;

/// Calculate ATR for the given candles
///
/// Returns the current ATR value, or None if fewer than `period + 1` candles
/// are available (the first true range needs a previous close).
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }

    let mut true_ranges = Vec::with_capacity(candles.len() - 1);
    for i in 1..candles.len() {
        let high = candles[i].high;
        let low = candles[i].low;
        let prev_close = candles[i - 1].close;

        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());

        true_ranges.push(tr);
    }

    if true_ranges.len() < period {
        return None;
    }

    // First ATR is the simple average of the first `period` true ranges
    let mut atr: f64 = true_ranges.iter().take(period).sum::<f64>() / period as f64;

    // Wilder's smoothing for subsequent values
    for tr in &true_ranges[period..] {
        atr = (atr * (period as f64 - 1.0) + tr) / period as f64;
    }

    Some(atr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn create_test_candles(bars: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        bars.iter()
            .enumerate()
            .map(|(i, &(open, high, low, close))| Candle {
                timestamp: Utc::now() + chrono::Duration::hours(i as i64),
                open,
                high,
                low,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn test_calculate_atr_low_volatility() {
        let bars = vec![(100.0, 101.0, 99.0, 100.0); 15];
        let candles = create_test_candles(&bars);

        let atr = calculate_atr(&candles, 14).unwrap();
        // Constant 2-point range
        assert!((atr - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_calculate_atr_high_volatility() {
        let bars = vec![
            (100.0, 105.0, 95.0, 102.0),
            (102.0, 110.0, 98.0, 105.0),
            (105.0, 108.0, 92.0, 95.0),
            (95.0, 103.0, 88.0, 100.0),
            (100.0, 115.0, 97.0, 110.0),
            (110.0, 112.0, 95.0, 98.0),
            (98.0, 108.0, 90.0, 105.0),
            (105.0, 120.0, 100.0, 115.0),
            (115.0, 118.0, 105.0, 110.0),
            (110.0, 125.0, 108.0, 120.0),
            (120.0, 130.0, 115.0, 125.0),
            (125.0, 128.0, 110.0, 115.0),
            (115.0, 122.0, 105.0, 118.0),
            (118.0, 130.0, 115.0, 125.0),
            (125.0, 135.0, 120.0, 130.0),
        ];

        let candles = create_test_candles(&bars);
        let atr = calculate_atr(&candles, 14).unwrap();
        assert!(atr > 10.0);
    }

    #[test]
    fn test_atr_insufficient_data() {
        let bars = vec![(100.0, 101.0, 99.0, 100.0); 14];
        let candles = create_test_candles(&bars);
        assert!(calculate_atr(&candles, 14).is_none());
    }

    #[test]
    fn test_atr_includes_gap_in_true_range() {
        // Gap up: previous close 100, next low 110
        let bars = vec![
            (100.0, 101.0, 99.0, 100.0),
            (110.0, 112.0, 110.0, 111.0),
            (111.0, 112.0, 110.0, 111.0),
        ];
        let candles = create_test_candles(&bars);
        let atr = calculate_atr(&candles, 2).unwrap();
        // First TR = 12 (gap), second TR = 2
        assert!((atr - 7.0).abs() < 1e-9);
    }
}
