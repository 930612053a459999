use super::moving_average::calculate_ema;

const PMO_SCALE: f64 = 10.0;

/// Calculate the Price Momentum Oscillator (PMO)
///
/// Rate-of-Change percent over `roc_period`, run through two EMA smoothing
/// stages; the oscillator is the scaled difference of the fast stage over the
/// slow stage. Crosses zero when short-horizon momentum overtakes (or falls
/// behind) long-horizon momentum.
pub fn calculate_pmo(
    closes: &[f64],
    roc_period: usize,
    fast_period: usize,
    slow_period: usize,
) -> Option<f64> {
    if roc_period == 0 || fast_period == 0 || slow_period <= fast_period {
        return None;
    }
    if closes.len() < roc_period + slow_period {
        return None;
    }

    let mut roc = Vec::with_capacity(closes.len() - roc_period);
    for i in roc_period..closes.len() {
        let base = closes[i - roc_period];
        if base == 0.0 {
            return None;
        }
        roc.push((closes[i] - base) / base * 100.0);
    }

    let fast_stage = calculate_ema(&roc, fast_period)?;
    let slow_stage = calculate_ema(&roc, slow_period)?;

    Some(PMO_SCALE * (fast_stage - slow_stage))
}
