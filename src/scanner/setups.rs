// Setup detection and the additive scoring model
//
// TREND_PULLBACK is the primary setup: higher-timeframe trend, price pulled
// back into the EMA21 zone, entry-timeframe close crossing back in the bias
// direction. BREAKOUT_RETEST replays the last few entry bars through the
// breakout state machine and only emits on a retest confirmed at the live bar.

use super::risk::{conservative_stop, targets_from_stop};
use super::{MarketSnapshot, ScannerConfig};
use crate::indicators::{calculate_donchian_at, calculate_rsi, calculate_volume_ma, closes, volumes};
use crate::models::{clamp_score, Alert, EntryAlert, PreSetupAlert, SetupKind, Side};
use crate::regime::{Bias, Regime};
use crate::strategy::breakout::{
    BreakoutTracker, BREAKOUT_VOLUME_MULT, RETEST_ATR_TOLERANCE,
};
use chrono::Utc;

/// Fixed score assigned to qualifying-but-untriggered setups
pub const PRE_SETUP_SCORE: f64 = 4.0;

pub(crate) struct EntryContext {
    pub side: Side,
    pub volume: f64,
    pub volume_ma: f64,
    pub rsi: f64,
    pub entry: f64,
    pub stop: f64,
    pub target2: f64,
    pub slope_percent: f64,
    pub in_zone: bool,
    pub zone_distance: f64,
    pub zone_atr: f64,
}

/// Additive score over independent components, clamped to [0, 10]
pub(crate) fn score_entry(ctx: &EntryContext, cfg: &ScannerConfig) -> (f64, Vec<String>) {
    let mut score = 0.0;
    let mut reasons = Vec::new();

    // Trigger clarity
    score += 2.0;
    reasons.push("entry trigger fired".to_string());

    // Volume confirmation
    if ctx.volume > ctx.volume_ma {
        score += 2.0;
        reasons.push("volume above average".to_string());
        if ctx.volume > ctx.volume_ma * 1.5 {
            score += 1.0;
            reasons.push("volume surge".to_string());
        }
    }

    // RSI quality: ideal band scores, tolerable band scores less, stretched
    // momentum is penalized
    let rsi_ideal = (35.0..=65.0).contains(&ctx.rsi);
    let rsi_tolerable = match ctx.side {
        Side::Long => ctx.rsi > 65.0 && ctx.rsi <= 72.0,
        Side::Short => ctx.rsi < 35.0 && ctx.rsi >= 28.0,
    };
    if rsi_ideal {
        score += 2.0;
        reasons.push("rsi in ideal band".to_string());
    } else if rsi_tolerable {
        score += 1.0;
        reasons.push("rsi acceptable".to_string());
    } else {
        score -= 1.0;
        reasons.push("rsi stretched".to_string());
    }

    // Risk:reward against the 2R target
    let risk = (ctx.entry - ctx.stop).abs();
    let reward = (ctx.target2 - ctx.entry).abs();
    if risk > 0.0 && reward >= cfg.rr_multiple * risk {
        score += 2.0;
        reasons.push(format!("risk reward >= {}", cfg.rr_multiple));
    }

    // Trend-slope strength in the trade direction
    let directional_slope = match ctx.side {
        Side::Long => ctx.slope_percent,
        Side::Short => -ctx.slope_percent,
    };
    if directional_slope > 0.15 {
        score += 2.0;
        reasons.push("strong trend slope".to_string());
    } else if directional_slope > 0.1 {
        score += 1.0;
        reasons.push("trend slope confirming".to_string());
    }

    // Zone proximity
    if ctx.in_zone {
        score += 2.0;
        reasons.push("price in pullback zone".to_string());
        if ctx.zone_distance <= 0.25 * ctx.zone_atr {
            score += 1.0;
            reasons.push("tight pullback zone".to_string());
        }
    }

    (clamp_score(score), reasons)
}

/// TREND_PULLBACK detection over one symbol's snapshot
///
/// Returns an Entry alert when the cross trigger fires and scores above the
/// configured minimum, a PreSetup when regime and zone hold without a
/// trigger, and nothing otherwise.
pub fn detect_trend_pullback(snapshot: &MarketSnapshot, cfg: &ScannerConfig) -> Option<Alert> {
    let atr_percent = snapshot.atr_percent();
    if atr_percent < cfg.min_atr_percent || atr_percent > cfg.max_atr_percent {
        return None;
    }

    let state = snapshot.regime_state;
    if state.regime != Regime::Trend {
        return None;
    }
    let side = match state.bias {
        Bias::Bull => Side::Long,
        Bias::Bear => Side::Short,
        Bias::Neutral => return None,
    };

    // Zone: higher-timeframe close near its EMA21
    let zone_distance = (snapshot.close_regime - snapshot.ema21_regime).abs();
    if zone_distance > cfg.zone_atr_mult * snapshot.atr_regime {
        return None;
    }

    let last = snapshot.candles_entry.last()?;
    let prev = snapshot
        .candles_entry
        .get(snapshot.candles_entry.len().checked_sub(2)?)?;

    let crossed = match side {
        Side::Long => prev.close < snapshot.ema21_entry && last.close > snapshot.ema21_entry,
        Side::Short => prev.close > snapshot.ema21_entry && last.close < snapshot.ema21_entry,
    };
    let volume_ok = last.volume > snapshot.volume_ma_entry;
    let rsi_ok = match side {
        Side::Long => snapshot.rsi_entry <= 72.0,
        Side::Short => snapshot.rsi_entry >= 28.0,
    };

    if crossed && volume_ok && rsi_ok {
        let entry = snapshot.current_price;
        let stop = conservative_stop(
            &snapshot.candles_entry,
            side,
            snapshot.atr_entry,
            entry,
            cfg.stop_atr_mult,
            cfg.swing_lookback,
        );
        let (target1, target2) = targets_from_stop(entry, stop, side);

        let (score, mut reasons) = score_entry(
            &EntryContext {
                side,
                volume: last.volume,
                volume_ma: snapshot.volume_ma_entry,
                rsi: snapshot.rsi_entry,
                entry,
                stop,
                target2,
                slope_percent: snapshot.ema_slope_percent,
                in_zone: true,
                zone_distance,
                zone_atr: snapshot.atr_regime,
            },
            cfg,
        );

        if score < cfg.min_entry_score {
            return None;
        }

        reasons.insert(0, "trend regime with directional bias".to_string());
        return Some(Alert::Entry(EntryAlert {
            symbol: snapshot.symbol.clone(),
            side,
            setup: SetupKind::TrendPullback,
            timeframe: cfg.entry_timeframe,
            score,
            entry,
            stop,
            target1,
            target2,
            atr_percent,
            reasons,
            timestamp: Utc::now(),
        }));
    }

    Some(Alert::PreSetup(PreSetupAlert {
        symbol: snapshot.symbol.clone(),
        side,
        setup: SetupKind::TrendPullback,
        timeframe: cfg.entry_timeframe,
        score: PRE_SETUP_SCORE,
        entry: snapshot.current_price,
        atr_percent,
        reasons: vec![
            "trend regime with directional bias".to_string(),
            "price in pullback zone".to_string(),
        ],
        timestamp: Utc::now(),
    }))
}

/// BREAKOUT_RETEST detection
///
/// Replays the trailing entry bars through the symbol's breakout tracker so
/// a level broken a few bars ago can confirm now. Only a retest confirmed on
/// the live bar emits an alert.
pub fn detect_breakout_retest(
    snapshot: &MarketSnapshot,
    tracker: &mut BreakoutTracker,
    cfg: &ScannerConfig,
) -> Option<EntryAlert> {
    if !cfg.enable_breakout_retest {
        return None;
    }

    let atr_percent = snapshot.atr_percent();
    if atr_percent < cfg.min_atr_percent || atr_percent > cfg.max_atr_percent {
        return None;
    }

    let state = snapshot.regime_state;
    if state.regime != Regime::Trend {
        return None;
    }
    let side = match state.bias {
        Bias::Bull => Side::Long,
        Bias::Bear => Side::Short,
        Bias::Neutral => return None,
    };

    let candles = &snapshot.candles_entry;
    let len = candles.len();
    let replay_start = len.saturating_sub(crate::strategy::breakout::RETEST_WINDOW_BARS + 1);
    let tolerance = RETEST_ATR_TOLERANCE * snapshot.atr_entry;

    let mut confirmed_on_live_bar = false;

    for i in replay_start..len {
        tracker.expire(i);
        let candle = &candles[i];

        if tracker.pending(side).is_none() {
            let prefix = &candles[..=i];
            let Some(dc) = calculate_donchian_at(candles, cfg.breakout_period, i) else {
                continue;
            };
            let Some(vol_ma) = calculate_volume_ma(&volumes(prefix), cfg.volume_ma_period) else {
                continue;
            };
            let Some(rsi) = calculate_rsi(&closes(prefix), cfg.rsi_period) else {
                continue;
            };

            let (broke, level, rsi_consistent) = match side {
                Side::Long => (candle.close > dc.high, dc.high, rsi > 50.0),
                Side::Short => (candle.close < dc.low, dc.low, rsi < 50.0),
            };
            if broke && candle.volume > BREAKOUT_VOLUME_MULT * vol_ma && rsi_consistent {
                tracker.observe_breakout(side, level, i);
            }
        } else if tracker.confirm_retest(side, candle, tolerance).is_some() {
            confirmed_on_live_bar = i == len - 1;
        }
    }

    if !confirmed_on_live_bar {
        return None;
    }

    let entry = snapshot.current_price;
    let stop = conservative_stop(
        candles,
        side,
        snapshot.atr_entry,
        entry,
        cfg.stop_atr_mult,
        cfg.swing_lookback,
    );
    let (target1, target2) = targets_from_stop(entry, stop, side);
    let last = candles.last()?;

    let (score, mut reasons) = score_entry(
        &EntryContext {
            side,
            volume: last.volume,
            volume_ma: snapshot.volume_ma_entry,
            rsi: snapshot.rsi_entry,
            entry,
            stop,
            target2,
            slope_percent: snapshot.ema_slope_percent,
            in_zone: false,
            zone_distance: 0.0,
            zone_atr: snapshot.atr_regime,
        },
        cfg,
    );

    if score < cfg.min_entry_score {
        return None;
    }

    reasons.insert(0, "breakout retest confirmed".to_string());
    Some(EntryAlert {
        symbol: snapshot.symbol.clone(),
        side,
        setup: SetupKind::BreakoutRetest,
        timeframe: cfg.entry_timeframe,
        score,
        entry,
        stop,
        target1,
        target2,
        atr_percent,
        reasons,
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regime::{Bias, Regime, RegimeState};
    use chrono::{Duration, Utc};

    fn bar(close: f64, high: f64, low: f64, volume: f64, i: usize) -> crate::models::Candle {
        crate::models::Candle {
            timestamp: Utc::now() + Duration::minutes(15 * i as i64),
            open: close,
            high,
            low,
            close,
            volume,
        }
    }

    fn trending_snapshot() -> MarketSnapshot {
        // 15m candles: pullback below the EMA then a cross back above it
        let mut candles = Vec::new();
        for i in 0..20 {
            candles.push(bar(99.0, 99.5, 98.5, 1000.0, i));
        }
        candles.push(bar(99.4, 99.6, 98.8, 1000.0, 20)); // prev close below EMA21
        candles.push(bar(100.6, 100.8, 99.2, 2000.0, 21)); // crosses above on volume

        MarketSnapshot {
            symbol: "TESTUSDT".to_string(),
            candles_entry: candles,
            current_price: 100.6,
            close_regime: 100.2,
            ema21_regime: 100.0,
            atr_regime: 1.0,
            ema21_entry: 100.0,
            atr_entry: 0.8,
            rsi_entry: 55.0,
            volume_ma_entry: 1000.0,
            regime_state: RegimeState {
                regime: Regime::Trend,
                bias: Bias::Bull,
            },
            ema_slope_percent: 0.2,
        }
    }

    #[test]
    fn test_trend_pullback_long_entry() {
        let cfg = ScannerConfig::default();
        let alert = detect_trend_pullback(&trending_snapshot(), &cfg).unwrap();

        let Alert::Entry(entry) = alert else {
            panic!("expected an entry alert");
        };
        assert_eq!(entry.side, Side::Long);
        assert_eq!(entry.setup, SetupKind::TrendPullback);
        assert!(entry.score >= cfg.min_entry_score);
        assert!(entry.stop < entry.entry);
        assert!(entry.target2 > entry.target1);
        assert!(entry.target1 > entry.entry);
    }

    #[test]
    fn test_score_is_clamped_to_ten() {
        // Maximal components sum past 10 before clamping
        let cfg = ScannerConfig::default();
        let (score, _) = score_entry(
            &EntryContext {
                side: Side::Long,
                volume: 2000.0,
                volume_ma: 1000.0,
                rsi: 50.0,
                entry: 100.0,
                stop: 98.0,
                target2: 104.0,
                slope_percent: 0.5,
                in_zone: true,
                zone_distance: 0.1,
                zone_atr: 1.0,
            },
            &cfg,
        );
        assert_eq!(score, 10.0);
    }

    #[test]
    fn test_score_never_negative() {
        let cfg = ScannerConfig::default();
        let (score, _) = score_entry(
            &EntryContext {
                side: Side::Long,
                volume: 500.0,
                volume_ma: 1000.0,
                rsi: 90.0,
                entry: 100.0,
                stop: 99.0,
                target2: 100.5,
                slope_percent: -0.5,
                in_zone: false,
                zone_distance: 0.0,
                zone_atr: 1.0,
            },
            &cfg,
        );
        assert!(score >= 0.0);
    }

    #[test]
    fn test_pre_setup_when_no_trigger() {
        let mut snapshot = trending_snapshot();
        // No cross: both recent closes sit above the entry EMA
        let n = snapshot.candles_entry.len();
        snapshot.candles_entry[n - 2].close = 100.5;

        let cfg = ScannerConfig::default();
        let alert = detect_trend_pullback(&snapshot, &cfg).unwrap();

        let Alert::PreSetup(pre) = alert else {
            panic!("expected a pre-setup alert");
        };
        assert_eq!(pre.score, PRE_SETUP_SCORE);
        assert_eq!(pre.side, Side::Long);
    }

    #[test]
    fn test_atr_filter_rejects_quiet_and_wild_tape() {
        let cfg = ScannerConfig::default();

        let mut snapshot = trending_snapshot();
        snapshot.atr_entry = 0.1; // 0.1% of price, below the 0.3% floor
        assert!(detect_trend_pullback(&snapshot, &cfg).is_none());

        let mut snapshot = trending_snapshot();
        snapshot.atr_entry = 5.0; // ~5% of price, above the 2.5% ceiling
        assert!(detect_trend_pullback(&snapshot, &cfg).is_none());
    }

    #[test]
    fn test_out_of_zone_yields_nothing() {
        let mut snapshot = trending_snapshot();
        snapshot.close_regime = 103.0; // 3.0 away with 0.5 * atr_regime = 0.5
        let cfg = ScannerConfig::default();
        assert!(detect_trend_pullback(&snapshot, &cfg).is_none());
    }

    #[test]
    fn test_neutral_bias_yields_nothing() {
        let mut snapshot = trending_snapshot();
        snapshot.regime_state = RegimeState {
            regime: Regime::Trend,
            bias: Bias::Neutral,
        };
        let cfg = ScannerConfig::default();
        assert!(detect_trend_pullback(&snapshot, &cfg).is_none());
    }

    #[test]
    fn test_breakout_retest_disabled_by_default() {
        let snapshot = trending_snapshot();
        let mut tracker = BreakoutTracker::new();
        let cfg = ScannerConfig::default();
        assert!(detect_breakout_retest(&snapshot, &mut tracker, &cfg).is_none());
    }

    #[test]
    fn test_breakout_retest_confirms_on_live_bar() {
        // 60 bars around 100, a breakout bar over the channel high, then a
        // retest bar closing back above the level
        let mut candles = Vec::new();
        for i in 0..58 {
            candles.push(bar(100.0, 100.5, 99.5, 1000.0, i));
        }
        candles.push(bar(101.5, 101.8, 100.2, 3000.0, 58)); // breakout above 100.5
        candles.push(bar(100.9, 101.2, 100.4, 1200.0, 59)); // retest of 100.5

        let snapshot = MarketSnapshot {
            symbol: "TESTUSDT".to_string(),
            candles_entry: candles,
            current_price: 100.9,
            close_regime: 100.8,
            ema21_regime: 100.0,
            atr_regime: 1.0,
            ema21_entry: 100.0,
            atr_entry: 0.9,
            rsi_entry: 55.0,
            volume_ma_entry: 1050.0,
            regime_state: RegimeState {
                regime: Regime::Trend,
                bias: Bias::Bull,
            },
            ema_slope_percent: 0.2,
        };

        let cfg = ScannerConfig {
            enable_breakout_retest: true,
            breakout_period: 48,
            min_entry_score: 5.0,
            ..ScannerConfig::default()
        };

        let mut tracker = BreakoutTracker::new();
        let entry = detect_breakout_retest(&snapshot, &mut tracker, &cfg).unwrap();
        assert_eq!(entry.side, Side::Long);
        assert_eq!(entry.setup, SetupKind::BreakoutRetest);
        // Pending state consumed by the confirmation
        assert!(tracker.pending(Side::Long).is_none());
    }
}
