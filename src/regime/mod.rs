// Market regime and directional bias from a higher-timeframe snapshot
//
// Regime separates ranging from trending tape; bias is the directional lean
// derived from moving-average ordering and momentum. Both are recomputed per
// evaluation from the current indicator snapshot, no history kept here.

use crate::indicators::{calculate_bollinger, calculate_ema, calculate_rsi};
use crate::models::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    Range,
    Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    Bull,
    Bear,
    Neutral,
}

/// Ephemeral classification for one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegimeState {
    pub regime: Regime,
    pub bias: Bias,
}

impl RegimeState {
    /// A trending market with no directional lean is an explicit no-entry
    /// outcome, not an error.
    pub fn allows_entry(&self) -> bool {
        !(self.regime == Regime::Trend && self.bias == Bias::Neutral)
    }
}

#[derive(Debug, Clone)]
pub struct RegimeConfig {
    /// Minimum EMA20/EMA50 separation relative to price for a trend
    pub trend_threshold: f64,
    /// Minimum Bollinger bandwidth for a trend
    pub range_threshold: f64,
    pub ema_fast_period: usize,
    pub ema_slow_period: usize,
    pub rsi_period: usize,
    pub bb_period: usize,
    pub bb_std_dev_mult: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            trend_threshold: 0.003,
            range_threshold: 0.05,
            ema_fast_period: 20,
            ema_slow_period: 50,
            rsi_period: 14,
            bb_period: 20,
            bb_std_dev_mult: 2.0,
        }
    }
}

/// Indicator snapshot of the higher timeframe
#[derive(Debug, Clone, Copy)]
pub struct RegimeInputs {
    pub close: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub rsi: f64,
    pub bandwidth: f64,
}

/// Classify regime and bias from an indicator snapshot
pub fn classify(inputs: &RegimeInputs, config: &RegimeConfig) -> RegimeState {
    let separation = if inputs.close != 0.0 {
        (inputs.ema_fast - inputs.ema_slow).abs() / inputs.close
    } else {
        0.0
    };

    let regime = if separation >= config.trend_threshold
        || inputs.bandwidth >= config.range_threshold
    {
        Regime::Trend
    } else {
        Regime::Range
    };

    let bias = if inputs.close > inputs.ema_slow
        && inputs.ema_fast > inputs.ema_slow
        && inputs.rsi >= 50.0
    {
        Bias::Bull
    } else if inputs.close < inputs.ema_slow
        && inputs.ema_fast < inputs.ema_slow
        && inputs.rsi <= 50.0
    {
        Bias::Bear
    } else {
        Bias::Neutral
    };

    RegimeState { regime, bias }
}

/// Compute the snapshot from a candle prefix and classify it
///
/// Returns None when the history is too short for any required indicator.
pub fn classify_candles(candles: &[Candle], config: &RegimeConfig) -> Option<RegimeState> {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let close = *closes.last()?;

    let ema_fast = calculate_ema(&closes, config.ema_fast_period)?;
    let ema_slow = calculate_ema(&closes, config.ema_slow_period)?;
    let rsi = calculate_rsi(&closes, config.rsi_period)?;
    let bb = calculate_bollinger(&closes, config.bb_period, config.bb_std_dev_mult)?;

    Some(classify(
        &RegimeInputs {
            close,
            ema_fast,
            ema_slow,
            rsi,
            bandwidth: bb.bandwidth(),
        },
        config,
    ))
}
