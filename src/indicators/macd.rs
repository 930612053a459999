use super::moving_average::calculate_ema_series;

/// MACD line, signal line and histogram
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacdOutput {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Calculate MACD: fast EMA minus slow EMA, with a signal-line EMA of the
/// difference and a histogram (MACD - signal).
///
/// Needs at least `slow_period + signal_period` closes.
pub fn calculate_macd(
    closes: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> Option<MacdOutput> {
    if fast_period == 0 || slow_period <= fast_period || signal_period == 0 {
        return None;
    }
    if closes.len() < slow_period + signal_period {
        return None;
    }

    let fast = calculate_ema_series(closes, fast_period)?;
    let slow = calculate_ema_series(closes, slow_period)?;

    // Both series end at the last close; align them from the back so the
    // MACD line covers every bar where the slow EMA is defined.
    let len = slow.len();
    let fast_offset = fast.len() - len;
    let macd_line: Vec<f64> = (0..len)
        .map(|i| fast[fast_offset + i] - slow[i])
        .collect();

    let signal_series = calculate_ema_series(&macd_line, signal_period)?;

    let macd = macd_line[macd_line.len() - 1];
    let signal = signal_series[signal_series.len() - 1];

    Some(MacdOutput {
        macd,
        signal,
        histogram: macd - signal,
    })
}
