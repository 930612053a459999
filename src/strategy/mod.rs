// Trading strategy module
//
// The indicator strategies are pure evaluations over a candle history: they
// decide direction and strength, and the engine turns the draft into a stored
// signal with unified stop/target placement.

pub mod breakout;
pub mod multi_timeframe;

pub use breakout::{BreakoutTracker, PendingBreakout};
pub use multi_timeframe::{Evaluation, MultiTimeframeConfig, MultiTimeframeEvaluator};

use crate::indicators::{calculate_macd, calculate_pmo, calculate_rsi, closes};
use crate::models::{Candle, Direction};
use chrono::{DateTime, Timelike, Utc};
use serde_json::json;

/// Hours (UTC) when the 4h-gated strategies may emit
pub const DEFAULT_ALLOWED_HOURS: [u32; 5] = [8, 12, 16, 20, 23];

pub fn is_allowed_hour(now: DateTime<Utc>, allowed: &[u32]) -> bool {
    allowed.contains(&now.hour())
}

/// Draft signal from an indicator strategy, before stop/target placement
#[derive(Debug, Clone, PartialEq)]
pub struct StrategySignal {
    pub direction: Direction,
    pub strength: u8,
    pub extra_info: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct RsiParams {
    pub period: usize,
    pub overbought: f64,
    pub oversold: f64,
}

impl Default for RsiParams {
    fn default() -> Self {
        Self {
            period: 14,
            overbought: 69.0,
            oversold: 30.0,
        }
    }
}

/// RSI reversal: buy oversold, sell overbought. Strength scales with how far
/// past the threshold momentum has stretched.
pub fn evaluate_rsi(candles: &[Candle], params: &RsiParams) -> Option<StrategySignal> {
    let closes = closes(candles);
    let rsi = calculate_rsi(&closes, params.period)?;

    if rsi < params.oversold {
        let strength = (((params.oversold - rsi) / params.oversold) * 100.0)
            .round()
            .clamp(0.0, 100.0) as u8;
        return Some(StrategySignal {
            direction: Direction::Buy,
            strength,
            extra_info: json!({
                "rsi": format!("{rsi:.2}"),
                "period": params.period,
                "oversold": params.oversold,
            }),
        });
    }

    if rsi > params.overbought {
        let strength = (((rsi - params.overbought) / (100.0 - params.overbought)) * 100.0)
            .round()
            .clamp(0.0, 100.0) as u8;
        return Some(StrategySignal {
            direction: Direction::Sell,
            strength,
            extra_info: json!({
                "rsi": format!("{rsi:.2}"),
                "period": params.period,
                "overbought": params.overbought,
            }),
        });
    }

    None
}

#[derive(Debug, Clone)]
pub struct MacdHistogramParams {
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
    /// Fire when the histogram converges within this band of the zero line
    /// instead of waiting for the full cross
    pub early_entry_threshold: f64,
}

impl Default for MacdHistogramParams {
    fn default() -> Self {
        Self {
            fast_period: 12,
            slow_period: 26,
            signal_period: 9,
            early_entry_threshold: 0.001,
        }
    }
}

/// MACD histogram convergence toward the zero line
pub fn evaluate_macd_histogram(
    candles: &[Candle],
    params: &MacdHistogramParams,
) -> Option<StrategySignal> {
    let closes = closes(candles);
    if closes.len() < params.slow_period + params.signal_period + 1 {
        return None;
    }

    let current = calculate_macd(
        &closes,
        params.fast_period,
        params.slow_period,
        params.signal_period,
    )?;
    let previous = calculate_macd(
        &closes[..closes.len() - 1],
        params.fast_period,
        params.slow_period,
        params.signal_period,
    )?;

    let t = params.early_entry_threshold;
    let extra = |direction: &str| {
        json!({
            "macd": format!("{:.4}", current.macd),
            "signal": format!("{:.4}", current.signal),
            "histogram": format!("{:.4}", current.histogram),
            "prev_histogram": format!("{:.4}", previous.histogram),
            "early_entry": true,
            "threshold": t,
            "direction": direction,
        })
    };

    let strength = (current.histogram.abs() * 1000.0).round().clamp(60.0, 100.0) as u8;

    if previous.histogram < -t && current.histogram > -t && current.histogram <= t {
        return Some(StrategySignal {
            direction: Direction::Buy,
            strength,
            extra_info: extra("buy"),
        });
    }

    if previous.histogram > t && current.histogram < t && current.histogram >= -t {
        return Some(StrategySignal {
            direction: Direction::Sell,
            strength,
            extra_info: extra("sell"),
        });
    }

    None
}

#[derive(Debug, Clone)]
pub struct PmoParams {
    pub roc_period: usize,
    pub fast_period: usize,
    pub slow_period: usize,
}

impl Default for PmoParams {
    fn default() -> Self {
        Self {
            roc_period: 10,
            fast_period: 5,
            slow_period: 35,
        }
    }
}

/// PMO zero-line cross
pub fn evaluate_pmo(candles: &[Candle], params: &PmoParams) -> Option<StrategySignal> {
    let closes = closes(candles);
    if closes.len() < params.roc_period + params.slow_period + 1 {
        return None;
    }

    let current = calculate_pmo(
        &closes,
        params.roc_period,
        params.fast_period,
        params.slow_period,
    )?;
    let previous = calculate_pmo(
        &closes[..closes.len() - 1],
        params.roc_period,
        params.fast_period,
        params.slow_period,
    )?;

    let direction = if previous < 0.0 && current > 0.0 {
        Direction::Buy
    } else if previous > 0.0 && current < 0.0 {
        Direction::Sell
    } else {
        return None;
    };

    let strength = (current.abs() * 10.0).round().clamp(60.0, 100.0) as u8;

    Some(StrategySignal {
        direction,
        strength,
        extra_info: json!({
            "pmo": format!("{current:.4}"),
            "prev_pmo": format!("{previous:.4}"),
            "roc_period": params.roc_period,
            "fast_period": params.fast_period,
            "slow_period": params.slow_period,
        }),
    })
}

#[derive(Debug, Clone)]
pub struct MacdPmoParams {
    pub fast_period: usize,
    pub slow_period: usize,
    pub signal_period: usize,
    pub roc_period: usize,
    pub pmo_fast_period: usize,
    pub pmo_slow_period: usize,
    pub pmo_buy_threshold: f64,
    pub pmo_sell_threshold: f64,
}

impl Default for MacdPmoParams {
    fn default() -> Self {
        Self {
            fast_period: 12,
            slow_period: 26,
            signal_period: 9,
            roc_period: 10,
            pmo_fast_period: 5,
            pmo_slow_period: 35,
            pmo_buy_threshold: -0.5,
            pmo_sell_threshold: 0.5,
        }
    }
}

/// MACD histogram zero-cross filtered by the momentum oscillator
pub fn evaluate_macd_histogram_pmo(
    candles: &[Candle],
    params: &MacdPmoParams,
) -> Option<StrategySignal> {
    let closes = closes(candles);
    let needed = (params.slow_period + params.signal_period)
        .max(params.roc_period + params.pmo_slow_period)
        + 1;
    if closes.len() < needed {
        return None;
    }

    let current = calculate_macd(
        &closes,
        params.fast_period,
        params.slow_period,
        params.signal_period,
    )?;
    let previous = calculate_macd(
        &closes[..closes.len() - 1],
        params.fast_period,
        params.slow_period,
        params.signal_period,
    )?;
    let pmo = calculate_pmo(
        &closes,
        params.roc_period,
        params.pmo_fast_period,
        params.pmo_slow_period,
    )?;

    let crossed_up = previous.histogram < 0.0 && current.histogram > 0.0;
    let crossed_down = previous.histogram > 0.0 && current.histogram < 0.0;

    let (direction, pmo_part) = if crossed_up && pmo > params.pmo_buy_threshold {
        (
            Direction::Buy,
            ((pmo - params.pmo_buy_threshold) * 20.0).clamp(0.0, 50.0),
        )
    } else if crossed_down && pmo < params.pmo_sell_threshold {
        (
            Direction::Sell,
            ((params.pmo_sell_threshold - pmo) * 20.0).clamp(0.0, 50.0),
        )
    } else {
        return None;
    };

    let histogram_part = (current.histogram.abs() * 1000.0).clamp(0.0, 50.0);
    let strength = (histogram_part + pmo_part).round().clamp(60.0, 100.0) as u8;

    Some(StrategySignal {
        direction,
        strength,
        extra_info: json!({
            "macd": format!("{:.4}", current.macd),
            "signal": format!("{:.4}", current.signal),
            "histogram": format!("{:.4}", current.histogram),
            "prev_histogram": format!("{:.4}", previous.histogram),
            "pmo": format!("{pmo:.4}"),
        }),
    })
}
