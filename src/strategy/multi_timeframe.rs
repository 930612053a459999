// Multi-timeframe entry evaluator: 4h regime filter, 1h entries
//
// In RANGE the evaluator trades Bollinger band rejection wicks; in TREND it
// waits for a Donchian breakout and only enters on the retest, tracked by the
// per-symbol BreakoutTracker.

use super::breakout::{BreakoutTracker, BREAKOUT_VOLUME_MULT, RETEST_ATR_TOLERANCE};
use crate::indicators::{
    calculate_atr, calculate_bollinger, calculate_donchian_at, calculate_ema, calculate_rsi,
    calculate_volume_ma, closes, volumes,
};
use crate::models::{Candle, Side};
use crate::regime::{classify_candles, Bias, Regime, RegimeConfig, RegimeState};

#[derive(Debug, Clone)]
pub struct MultiTimeframeConfig {
    /// Minimum 1h bars before any evaluation
    pub warmup_entry_bars: usize,
    /// Minimum 4h bars before any evaluation
    pub warmup_regime_bars: usize,
    pub donchian_period: usize,
    pub rsi_period: usize,
    pub atr_period: usize,
    pub bb_period: usize,
    pub bb_std_dev_mult: f64,
    /// 1h EMA filter applied to range entries
    pub ema_filter_period: usize,
    pub volume_ma_period: usize,
    /// Volume multiple over its MA required for a range rejection entry
    pub range_volume_mult: f64,
    /// RSI exhaustion bounds for range entries
    pub range_rsi_long_max: f64,
    pub range_rsi_short_min: f64,
    pub regime: RegimeConfig,
}

impl Default for MultiTimeframeConfig {
    fn default() -> Self {
        Self {
            warmup_entry_bars: 100,
            warmup_regime_bars: 60,
            donchian_period: 20,
            rsi_period: 14,
            atr_period: 14,
            bb_period: 20,
            bb_std_dev_mult: 2.0,
            ema_filter_period: 50,
            volume_ma_period: 20,
            range_volume_mult: 1.1,
            range_rsi_long_max: 35.0,
            range_rsi_short_min: 65.0,
            regime: RegimeConfig::default(),
        }
    }
}

/// Outcome of evaluating one 1h bar
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub entry: Option<Side>,
    pub reason: String,
    pub regime: Option<RegimeState>,
}

impl Evaluation {
    fn none(reason: &str, regime: Option<RegimeState>) -> Self {
        Self {
            entry: None,
            reason: reason.to_string(),
            regime,
        }
    }
}

/// Map a 1h bar index to the most recently closed 4h bar
pub fn map_1h_to_4h(i_1h: usize) -> usize {
    i_1h.saturating_sub(1) / 4
}

/// Walks 1h bars against the 4h regime, carrying the pending-breakout state
/// across calls. One instance per symbol per run; never shared.
pub struct MultiTimeframeEvaluator<'a> {
    candles_1h: &'a [Candle],
    candles_4h: &'a [Candle],
    config: MultiTimeframeConfig,
    tracker: BreakoutTracker,
}

impl<'a> MultiTimeframeEvaluator<'a> {
    pub fn new(
        candles_1h: &'a [Candle],
        candles_4h: &'a [Candle],
        config: MultiTimeframeConfig,
    ) -> Self {
        Self {
            candles_1h,
            candles_4h,
            config,
            tracker: BreakoutTracker::new(),
        }
    }

    pub fn evaluate(&mut self, i_1h: usize) -> Evaluation {
        let cfg = &self.config;

        if i_1h < cfg.warmup_entry_bars || self.candles_4h.len() < cfg.warmup_regime_bars {
            return Evaluation::none("insufficient warmup", None);
        }
        if i_1h >= self.candles_1h.len() {
            return Evaluation::none("1h index out of range", None);
        }

        let i_4h = map_1h_to_4h(i_1h);
        if i_4h >= self.candles_4h.len() {
            return Evaluation::none("4h index out of range", None);
        }

        // 4h filter: regime + bias over the closed prefix
        let regime = match classify_candles(&self.candles_4h[..=i_4h], &cfg.regime) {
            Some(state) => state,
            None => return Evaluation::none("insufficient 4h history", None),
        };

        if !regime.allows_entry() {
            return Evaluation::none("trend regime with neutral bias", Some(regime));
        }

        self.tracker.expire(i_1h);

        // 1h indicators over the closed prefix
        let prefix = &self.candles_1h[..=i_1h];
        let closes_1h = closes(prefix);
        let volumes_1h = volumes(prefix);
        let candle = &self.candles_1h[i_1h];

        let bb = calculate_bollinger(&closes_1h, cfg.bb_period, cfg.bb_std_dev_mult);
        let rsi = calculate_rsi(&closes_1h, cfg.rsi_period);
        let atr = calculate_atr(prefix, cfg.atr_period);
        let vol_ma = calculate_volume_ma(&volumes_1h, cfg.volume_ma_period);
        let ema_filter = calculate_ema(&closes_1h, cfg.ema_filter_period);
        let donchian = calculate_donchian_at(self.candles_1h, cfg.donchian_period, i_1h);

        let (Some(bb), Some(rsi), Some(atr), Some(vol_ma), Some(ema_filter), Some(donchian)) =
            (bb, rsi, atr, vol_ma, ema_filter, donchian)
        else {
            return Evaluation::none("insufficient 1h history", Some(regime));
        };

        // Range entries: band rejection wicks with exhaustion confirmation
        if regime.regime == Regime::Range {
            let range = candle.high - candle.low;
            let bullish_body = range > 0.0 && (candle.close - candle.open) / range > 0.5;
            let bearish_body = range > 0.0 && (candle.open - candle.close) / range > 0.5;

            if candle.low <= bb.lower
                && candle.close > bb.lower
                && rsi < cfg.range_rsi_long_max
                && candle.volume > vol_ma * cfg.range_volume_mult
                && (candle.close >= ema_filter || bullish_body)
            {
                return Evaluation {
                    entry: Some(Side::Long),
                    reason: "lower band rejection".to_string(),
                    regime: Some(regime),
                };
            }

            if candle.high >= bb.upper
                && candle.close < bb.upper
                && rsi > cfg.range_rsi_short_min
                && candle.volume > vol_ma * cfg.range_volume_mult
                && (candle.close <= ema_filter || bearish_body)
            {
                return Evaluation {
                    entry: Some(Side::Short),
                    reason: "upper band rejection".to_string(),
                    regime: Some(regime),
                };
            }
        }

        // Trend entries: breakout first, entry only on the retest
        if regime.regime == Regime::Trend {
            if regime.bias == Bias::Bull
                && self.tracker.pending(Side::Long).is_none()
                && candle.close > donchian.high
                && candle.volume > vol_ma * BREAKOUT_VOLUME_MULT
                && rsi > 50.0
            {
                self.tracker
                    .observe_breakout(Side::Long, donchian.high, i_1h);
                return Evaluation::none("breakout long detected, awaiting retest", Some(regime));
            }

            if regime.bias == Bias::Bear
                && self.tracker.pending(Side::Short).is_none()
                && candle.close < donchian.low
                && candle.volume > vol_ma * BREAKOUT_VOLUME_MULT
                && rsi < 50.0
            {
                self.tracker
                    .observe_breakout(Side::Short, donchian.low, i_1h);
                return Evaluation::none("breakout short detected, awaiting retest", Some(regime));
            }

            let tolerance = RETEST_ATR_TOLERANCE * atr;
            if self
                .tracker
                .confirm_retest(Side::Long, candle, tolerance)
                .is_some()
            {
                return Evaluation {
                    entry: Some(Side::Long),
                    reason: "long retest after breakout".to_string(),
                    regime: Some(regime),
                };
            }
            if self
                .tracker
                .confirm_retest(Side::Short, candle, tolerance)
                .is_some()
            {
                return Evaluation {
                    entry: Some(Side::Short),
                    reason: "short retest after breakout".to_string(),
                    regime: Some(regime),
                };
            }
        }

        Evaluation::none("no entry condition met", Some(regime))
    }
}
