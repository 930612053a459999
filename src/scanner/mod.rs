// Scanner / entry evaluator
//
// Walks a volume-ranked candidate set sequentially, computes dual-timeframe
// indicators per symbol, applies the anti-trade filters and setup detectors,
// and returns ranked ENTRY alerts plus a bounded list of PRE_SETUPs.
// Sequential on purpose: the upstream API is rate limited and the loop paces
// itself with a fixed delay plus exponential backoff on throttling.

pub mod risk;
pub mod setups;

pub use setups::{detect_breakout_retest, detect_trend_pullback};

use crate::api::MarketData;
use crate::error::FetchError;
use crate::indicators::{
    calculate_atr, calculate_ema, calculate_ema_series, calculate_rsi, calculate_volume_ma,
    closes, volumes,
};
use crate::models::{Alert, Candle, EntryAlert, PreSetupAlert, Timeframe};
use crate::regime::{classify_candles, RegimeConfig, RegimeState};
use crate::strategy::breakout::BreakoutTracker;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::time::sleep;

const BACKOFF_BASE_MS: u64 = 2000;
const BACKOFF_CAP_MS: u64 = 8000;

#[derive(Debug, Clone)]
pub struct ScannerConfig {
    // Liquidity filters
    pub top_symbols_limit: usize,
    pub min_quote_volume: f64,

    // Volatility filters
    pub min_atr_percent: f64,
    pub max_atr_percent: f64,

    // Entry gating and ranking
    pub min_entry_score: f64,
    pub top_n_alerts: usize,
    pub max_pre_setups: usize,

    // BREAKOUT_RETEST setup
    pub enable_breakout_retest: bool,
    pub breakout_period: usize,

    // Cooldown between ENTRY alerts per symbol
    pub cooldown_minutes: i64,

    // Rate limit control
    pub request_delay_ms: u64,
    pub max_retries: u32,

    // Timeframes and indicator periods
    pub regime_timeframe: Timeframe,
    pub entry_timeframe: Timeframe,
    pub history_bars: usize,
    pub pullback_ema_period: usize,
    pub atr_period: usize,
    pub rsi_period: usize,
    pub volume_ma_period: usize,
    pub slope_bars: usize,

    // Zone and stop geometry
    pub zone_atr_mult: f64,
    pub stop_atr_mult: f64,
    pub swing_lookback: usize,
    pub rr_multiple: f64,

    pub regime: RegimeConfig,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            top_symbols_limit: 50,
            min_quote_volume: 0.0,
            min_atr_percent: 0.3,
            max_atr_percent: 2.5,
            min_entry_score: 7.0,
            top_n_alerts: 3,
            max_pre_setups: 10,
            enable_breakout_retest: false,
            breakout_period: 48,
            cooldown_minutes: 60,
            request_delay_ms: 500,
            max_retries: 3,
            regime_timeframe: Timeframe::H1,
            entry_timeframe: Timeframe::M15,
            history_bars: 300,
            pullback_ema_period: 21,
            atr_period: 14,
            rsi_period: 14,
            volume_ma_period: 20,
            slope_bars: 10,
            zone_atr_mult: 0.5,
            stop_atr_mult: 1.2,
            swing_lookback: 10,
            rr_multiple: 2.0,
            regime: RegimeConfig::default(),
        }
    }
}

/// Per-symbol indicator snapshot across both timeframes
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub candles_entry: Vec<Candle>,
    pub current_price: f64,
    pub close_regime: f64,
    pub ema21_regime: f64,
    pub atr_regime: f64,
    pub ema21_entry: f64,
    pub atr_entry: f64,
    pub rsi_entry: f64,
    pub volume_ma_entry: f64,
    pub regime_state: RegimeState,
    /// Slow EMA slope over `slope_bars`, in percent of its earlier value
    pub ema_slope_percent: f64,
}

impl MarketSnapshot {
    pub fn atr_percent(&self) -> f64 {
        if self.current_price == 0.0 {
            return 0.0;
        }
        self.atr_entry / self.current_price * 100.0
    }

    /// Compute the snapshot from raw candle history
    ///
    /// Returns None whenever the history is too short for any required
    /// indicator; the caller treats that as "no signal", never an error.
    pub fn compute(
        symbol: &str,
        candles_regime: &[Candle],
        candles_entry: Vec<Candle>,
        cfg: &ScannerConfig,
    ) -> Option<MarketSnapshot> {
        if candles_regime.len() < cfg.history_bars || candles_entry.len() < cfg.history_bars {
            return None;
        }

        let closes_regime = closes(candles_regime);
        let closes_entry = closes(&candles_entry);
        let volumes_entry = volumes(&candles_entry);

        let ema21_regime = calculate_ema(&closes_regime, cfg.pullback_ema_period)?;
        let atr_regime = calculate_atr(candles_regime, cfg.atr_period)?;
        let regime_state = classify_candles(candles_regime, &cfg.regime)?;

        let slow_series = calculate_ema_series(&closes_regime, cfg.regime.ema_slow_period)?;
        let ema_slope_percent = if slow_series.len() > cfg.slope_bars {
            let now = slow_series[slow_series.len() - 1];
            let then = slow_series[slow_series.len() - 1 - cfg.slope_bars];
            if then != 0.0 {
                (now - then) / then * 100.0
            } else {
                0.0
            }
        } else {
            0.0
        };

        let ema21_entry = calculate_ema(&closes_entry, cfg.pullback_ema_period)?;
        let atr_entry = calculate_atr(&candles_entry, cfg.atr_period)?;
        let rsi_entry = calculate_rsi(&closes_entry, cfg.rsi_period)?;
        let volume_ma_entry = calculate_volume_ma(&volumes_entry, cfg.volume_ma_period)?;

        let close_regime = candles_regime.last()?.close;
        let current_price = candles_entry.last()?.close;

        Some(MarketSnapshot {
            symbol: symbol.to_string(),
            candles_entry,
            current_price,
            close_regime,
            ema21_regime,
            atr_regime,
            ema21_entry,
            atr_entry,
            rsi_entry,
            volume_ma_entry,
            regime_state,
            ema_slope_percent,
        })
    }
}

/// Result of one full scan pass
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub entries: Vec<EntryAlert>,
    pub pre_setups: Vec<PreSetupAlert>,
    pub symbols_scanned: usize,
    pub errors: usize,
}

/// Fetch both timeframes for one symbol and compute the snapshot
pub async fn fetch_snapshot<M: MarketData>(
    market: &M,
    symbol: &str,
    cfg: &ScannerConfig,
) -> Result<Option<MarketSnapshot>, FetchError> {
    let candles_regime = market
        .fetch_candles(symbol, cfg.regime_timeframe, cfg.history_bars, None, None)
        .await?;
    let candles_entry = market
        .fetch_candles(symbol, cfg.entry_timeframe, cfg.history_bars, None, None)
        .await?;

    Ok(MarketSnapshot::compute(
        symbol,
        &candles_regime,
        candles_entry,
        cfg,
    ))
}

/// Fetch with the configured retry discipline: exponential backoff for rate
/// limiting up to `max_retries`, a single short-delay retry for anything else.
async fn fetch_snapshot_with_retry<M: MarketData>(
    market: &M,
    symbol: &str,
    cfg: &ScannerConfig,
) -> Result<Option<MarketSnapshot>, FetchError> {
    let mut rate_limit_attempts = 0u32;
    let mut transient_retried = false;

    loop {
        match fetch_snapshot(market, symbol, cfg).await {
            Ok(snapshot) => return Ok(snapshot),
            Err(e) if e.is_rate_limited() => {
                rate_limit_attempts += 1;
                if rate_limit_attempts >= cfg.max_retries {
                    return Err(e);
                }
                let backoff_ms = (BACKOFF_BASE_MS * 2u64.pow(rate_limit_attempts - 1))
                    .min(BACKOFF_CAP_MS);
                tracing::warn!(
                    "Rate limited on {}, backing off {}ms (attempt {}/{})",
                    symbol,
                    backoff_ms,
                    rate_limit_attempts,
                    cfg.max_retries
                );
                sleep(std::time::Duration::from_millis(backoff_ms)).await;
            }
            Err(e) => {
                if transient_retried {
                    return Err(e);
                }
                transient_retried = true;
                tracing::warn!("Fetch failed for {}: {}. Retrying once...", symbol, e);
                sleep(std::time::Duration::from_millis(cfg.request_delay_ms)).await;
            }
        }
    }
}

/// Run one scan pass over the volume-ranked candidate set
///
/// Per-symbol failures are counted and skipped; only a failure of the
/// ranking source itself aborts the run.
pub async fn run_scanner<M: MarketData>(
    market: &M,
    cfg: &ScannerConfig,
) -> crate::Result<ScanOutcome> {
    let symbols = market
        .fetch_top_symbols_by_volume(cfg.top_symbols_limit, cfg.min_quote_volume)
        .await?;

    tracing::info!("Scanning {} symbols", symbols.len());

    let mut outcome = ScanOutcome::default();
    let mut cooldowns: HashMap<String, DateTime<Utc>> = HashMap::new();
    // Breakout state lives for this run only; one tracker per symbol
    let mut trackers: HashMap<String, BreakoutTracker> = HashMap::new();

    for (i, symbol) in symbols.iter().enumerate() {
        if let Some(last_alert) = cooldowns.get(symbol) {
            if Utc::now() - *last_alert < Duration::minutes(cfg.cooldown_minutes) {
                tracing::debug!("{} on cooldown, skipping", symbol);
                continue;
            }
        }

        match fetch_snapshot_with_retry(market, symbol, cfg).await {
            Ok(Some(snapshot)) => {
                outcome.symbols_scanned += 1;

                if let Some(alert) = detect_trend_pullback(&snapshot, cfg) {
                    match alert {
                        Alert::Entry(entry) => {
                            tracing::info!(
                                "ENTRY {} {} score {:.1}",
                                entry.symbol,
                                entry.side.as_str(),
                                entry.score
                            );
                            cooldowns.insert(symbol.clone(), Utc::now());
                            outcome.entries.push(entry);
                        }
                        Alert::PreSetup(pre) => {
                            tracing::debug!("PRE_SETUP {} {}", pre.symbol, pre.side.as_str());
                            outcome.pre_setups.push(pre);
                        }
                    }
                }

                if !cooldowns.contains_key(symbol) {
                    let tracker = trackers.entry(symbol.clone()).or_default();
                    if let Some(entry) = detect_breakout_retest(&snapshot, tracker, cfg) {
                        tracing::info!(
                            "ENTRY {} {} score {:.1} (breakout retest)",
                            entry.symbol,
                            entry.side.as_str(),
                            entry.score
                        );
                        cooldowns.insert(symbol.clone(), Utc::now());
                        outcome.entries.push(entry);
                    }
                }
            }
            Ok(None) => {
                outcome.symbols_scanned += 1;
                tracing::debug!("{}: insufficient history, no signal", symbol);
            }
            Err(e) => {
                outcome.errors += 1;
                tracing::warn!("Skipping {} after retries: {}", symbol, e);
            }
        }

        if i < symbols.len() - 1 {
            sleep(std::time::Duration::from_millis(cfg.request_delay_ms)).await;
        }
    }

    outcome
        .entries
        .sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    outcome.entries.truncate(cfg.top_n_alerts);
    outcome.pre_setups.truncate(cfg.max_pre_setups);

    tracing::info!(
        "Scan complete: {} entries, {} pre-setups, {} errors",
        outcome.entries.len(),
        outcome.pre_setups.len(),
        outcome.errors
    );

    Ok(outcome)
}
