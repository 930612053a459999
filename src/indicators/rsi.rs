/// Calculate Relative Strength Index (RSI) with Wilder's smoothing
///
/// Needs at least `period` closes. Average gain/loss are seeded over the
/// first window of price changes, then smoothed with factor 1/period for the
/// remainder. A flat series (no net change anywhere) yields 50.
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
///
pub fn calculate_rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    if changes.is_empty() {
        return Some(50.0);
    }

    let seed_len = period.min(changes.len());

    let mut avg_gain = changes[..seed_len]
        .iter()
        .map(|&c| if c > 0.0 { c } else { 0.0 })
        .sum::<f64>()
        / seed_len as f64;
    let mut avg_loss = changes[..seed_len]
        .iter()
        .map(|&c| if c < 0.0 { -c } else { 0.0 })
        .sum::<f64>()
        / seed_len as f64;

    // Wilder's smoothing over the remaining changes
    for &change in &changes[seed_len..] {
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { -change } else { 0.0 };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }

    if avg_gain == 0.0 && avg_loss == 0.0 {
        return Some(50.0);
    }
    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - (100.0 / (1.0 + rs)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsi_calculation() {
        let closes = vec![
            44.0, 44.25, 44.5, 43.75, 44.0, 44.5, 45.0, 45.5, 45.25, 45.5, 46.0, 46.5, 46.25,
            46.0, 46.5,
        ];

        let rsi = calculate_rsi(&closes, 14).unwrap();
        assert!(rsi > 50.0 && rsi < 100.0); // mostly gains
    }

    #[test]
    fn test_rsi_insufficient_data() {
        let closes = vec![100.0; 13];
        assert!(calculate_rsi(&closes, 14).is_none());
    }

    #[test]
    fn test_rsi_flat_series_is_neutral() {
        // 14 identical closes with period 14: defined and exactly neutral
        let closes = vec![100.0; 14];
        assert_eq!(calculate_rsi(&closes, 14), Some(50.0));
    }

    #[test]
    fn test_rsi_all_gains() {
        let closes = vec![100.0, 101.0, 102.0, 103.0, 104.0, 105.0];
        assert_eq!(calculate_rsi(&closes, 5), Some(100.0));
    }

    #[test]
    fn test_rsi_all_losses() {
        let closes = vec![105.0, 104.0, 103.0, 102.0, 101.0, 100.0];
        let rsi = calculate_rsi(&closes, 5).unwrap();
        assert!(rsi < 1e-9);
    }
}
