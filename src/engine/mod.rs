// Signal engine: runs the active strategies over the configured symbols and
// timeframes, passes every draft through the dedup gate, and persists what
// survives. Symbols are processed sequentially with a fixed delay to respect
// upstream rate limits.

use crate::api::MarketData;
use crate::models::{
    strength_from_score, Direction, NewSignal, Side, Timeframe,
};
use crate::scanner::risk::{conservative_stop, targets_from_stop};
use crate::scanner::{run_scanner, ScannerConfig};
use crate::store::SignalStore;
use crate::strategy::{
    evaluate_macd_histogram, evaluate_macd_histogram_pmo, evaluate_pmo, evaluate_rsi,
    is_allowed_hour, multi_timeframe::MultiTimeframeEvaluator, MacdHistogramParams, MacdPmoParams,
    MultiTimeframeConfig, PmoParams, RsiParams, StrategySignal, DEFAULT_ALLOWED_HOURS,
};
use crate::indicators::calculate_atr;
use chrono::{Duration, Utc};
use serde_json::json;
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Symbols evaluated by the per-symbol strategies
    pub symbols: Vec<String>,
    /// Rolling uniqueness window for the dedup gate
    pub dedup_window_hours: i64,
    pub request_delay_ms: u64,
    /// Hours (UTC) when the 4h-gated strategies may emit
    pub allowed_hours: Vec<u32>,
    // Stop/target geometry shared by all strategy-driven signals
    pub atr_period: usize,
    pub stop_atr_mult: f64,
    pub swing_lookback: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: vec![
                "BTCUSDT".to_string(),
                "ETHUSDT".to_string(),
                "BNBUSDT".to_string(),
                "SOLUSDT".to_string(),
                "ADAUSDT".to_string(),
            ],
            dedup_window_hours: 2,
            request_delay_ms: 500,
            allowed_hours: DEFAULT_ALLOWED_HOURS.to_vec(),
            atr_period: 14,
            stop_atr_mult: 1.2,
            swing_lookback: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub enum StrategyKind {
    Rsi(RsiParams),
    MacdHistogram(MacdHistogramParams),
    Pmo(PmoParams),
    MacdHistogramPmo(MacdPmoParams),
    MultiTimeframe(MultiTimeframeConfig),
    Scanner(ScannerConfig),
}

#[derive(Debug, Clone)]
pub struct StrategySpec {
    /// Identity stored on signals and used by the dedup gate
    pub name: String,
    pub kind: StrategyKind,
    /// Timeframes this strategy evaluates
    pub timeframes: Vec<Timeframe>,
}

impl StrategySpec {
    /// The default active set
    pub fn default_set() -> Vec<StrategySpec> {
        vec![
            StrategySpec {
                name: "RSI".to_string(),
                kind: StrategyKind::Rsi(RsiParams::default()),
                timeframes: vec![Timeframe::H4],
            },
            StrategySpec {
                name: "MACD_HISTOGRAM".to_string(),
                kind: StrategyKind::MacdHistogram(MacdHistogramParams::default()),
                timeframes: vec![Timeframe::H4],
            },
            StrategySpec {
                name: "PMO".to_string(),
                kind: StrategyKind::Pmo(PmoParams::default()),
                timeframes: vec![Timeframe::H4],
            },
            StrategySpec {
                name: "MACD_HISTOGRAM_PMO".to_string(),
                kind: StrategyKind::MacdHistogramPmo(MacdPmoParams::default()),
                timeframes: vec![Timeframe::H1],
            },
            StrategySpec {
                name: "MULTI_TIMEFRAME".to_string(),
                kind: StrategyKind::MultiTimeframe(MultiTimeframeConfig::default()),
                timeframes: vec![Timeframe::H1],
            },
            StrategySpec {
                name: "SCANNER_APLUS".to_string(),
                kind: StrategyKind::Scanner(ScannerConfig::default()),
                timeframes: vec![Timeframe::M15],
            },
        ]
    }
}

/// Counters from one engine run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub created: usize,
    pub deduped: usize,
    pub errors: usize,
}

pub struct SignalEngine<'a, M, S> {
    market: &'a M,
    store: &'a S,
    config: EngineConfig,
}

impl<'a, M: MarketData, S: SignalStore> SignalEngine<'a, M, S> {
    pub fn new(market: &'a M, store: &'a S, config: EngineConfig) -> Self {
        Self {
            market,
            store,
            config,
        }
    }

    /// Run every strategy once; per-item failures are counted and skipped
    pub async fn run(&self, strategies: &[StrategySpec]) -> crate::Result<RunSummary> {
        let mut summary = RunSummary::default();

        for spec in strategies {
            match &spec.kind {
                StrategyKind::Scanner(cfg) => {
                    self.run_scanner_strategy(spec, cfg, &mut summary).await;
                }
                StrategyKind::MultiTimeframe(cfg) => {
                    self.run_multi_timeframe_strategy(spec, cfg, &mut summary)
                        .await;
                }
                _ => {
                    self.run_indicator_strategy(spec, &mut summary).await;
                }
            }
        }

        tracing::info!(
            "Engine run complete: {} created, {} deduped, {} errors",
            summary.created,
            summary.deduped,
            summary.errors
        );

        Ok(summary)
    }

    /// Dedup gate: at most one open signal per (symbol, strategy, timeframe,
    /// direction) within the rolling window. A duplicate is a deliberate
    /// no-op, not an error.
    async fn gate_and_store(&self, new: NewSignal, summary: &mut RunSummary) {
        let since = Utc::now() - Duration::hours(self.config.dedup_window_hours);

        let existing = match self
            .store
            .find_open_signal(&new.symbol, &new.strategy, new.timeframe, new.direction, since)
            .await
        {
            Ok(existing) => existing,
            Err(e) => {
                summary.errors += 1;
                tracing::warn!("Dedup lookup failed for {}: {}", new.symbol, e);
                return;
            }
        };

        if existing.is_some() {
            summary.deduped += 1;
            tracing::debug!(
                "Duplicate open signal for {} {} {} {}, skipping",
                new.symbol,
                new.strategy,
                new.timeframe,
                new.direction.as_str()
            );
            return;
        }

        match self.store.create_signal(new).await {
            Ok(signal) => {
                summary.created += 1;
                tracing::info!(
                    "Signal created: {} {} ({}) strength {}",
                    signal.symbol,
                    signal.direction.as_str(),
                    signal.strategy,
                    signal.strength
                );
            }
            Err(e) => {
                summary.errors += 1;
                tracing::warn!("Signal write failed: {}", e);
            }
        }
    }

    async fn run_scanner_strategy(
        &self,
        spec: &StrategySpec,
        cfg: &ScannerConfig,
        summary: &mut RunSummary,
    ) {
        tracing::info!("Running scanner strategy {}", spec.name);

        let outcome = match run_scanner(self.market, cfg).await {
            Ok(outcome) => outcome,
            Err(e) => {
                summary.errors += 1;
                tracing::error!("Scanner run failed: {}", e);
                return;
            }
        };
        summary.errors += outcome.errors;

        for alert in outcome.entries {
            let new = NewSignal {
                symbol: alert.symbol.clone(),
                direction: alert.side.into(),
                timeframe: alert.timeframe,
                strategy: spec.name.clone(),
                entry_price: alert.entry,
                stop_loss: alert.stop,
                target1: alert.target1,
                target2: Some(alert.target2),
                target3: None,
                strength: strength_from_score(alert.score),
                extra_info: json!({
                    "setup": alert.setup.as_str(),
                    "score": alert.score,
                    "atr_percent": alert.atr_percent,
                    "reasons": alert.reasons,
                })
                .to_string(),
            };
            self.gate_and_store(new, summary).await;
        }
    }

    async fn run_multi_timeframe_strategy(
        &self,
        spec: &StrategySpec,
        cfg: &MultiTimeframeConfig,
        summary: &mut RunSummary,
    ) {
        tracing::info!("Running multi-timeframe strategy {}", spec.name);

        for symbol in &self.config.symbols {
            let fetched = async {
                let candles_1h = self
                    .market
                    .fetch_candles(symbol, Timeframe::H1, 200, None, None)
                    .await?;
                let candles_4h = self
                    .market
                    .fetch_candles(symbol, Timeframe::H4, 100, None, None)
                    .await?;
                Ok::<_, crate::FetchError>((candles_1h, candles_4h))
            }
            .await;

            let (candles_1h, candles_4h) = match fetched {
                Ok(pair) => pair,
                Err(e) => {
                    summary.errors += 1;
                    tracing::warn!("Fetch failed for {}: {}", symbol, e);
                    continue;
                }
            };

            if candles_1h.len() < cfg.warmup_entry_bars || candles_4h.len() < cfg.warmup_regime_bars
            {
                tracing::debug!("{}: insufficient multi-timeframe history", symbol);
                continue;
            }

            let mut evaluator =
                MultiTimeframeEvaluator::new(&candles_1h, &candles_4h, cfg.clone());
            let evaluation = evaluator.evaluate(candles_1h.len() - 1);

            if let Some(side) = evaluation.entry {
                if let Some(new) =
                    self.draft_from_candles(&candles_1h, side, symbol, spec, &evaluation)
                {
                    self.gate_and_store(new, summary).await;
                }
            }

            sleep(std::time::Duration::from_millis(self.config.request_delay_ms)).await;
        }
    }

    fn draft_from_candles(
        &self,
        candles: &[crate::models::Candle],
        side: Side,
        symbol: &str,
        spec: &StrategySpec,
        evaluation: &crate::strategy::Evaluation,
    ) -> Option<NewSignal> {
        let entry = candles.last()?.close;
        let atr = calculate_atr(candles, self.config.atr_period)?;
        let stop = conservative_stop(
            candles,
            side,
            atr,
            entry,
            self.config.stop_atr_mult,
            self.config.swing_lookback,
        );
        let (target1, target2) = targets_from_stop(entry, stop, side);

        let regime = evaluation.regime?;
        let mut strength: u8 = 50;
        if regime.regime == crate::regime::Regime::Trend {
            strength += 20;
        }
        if regime.bias != crate::regime::Bias::Neutral {
            strength += 20;
        }
        let aligned = matches!(
            (side, regime.bias),
            (Side::Long, crate::regime::Bias::Bull) | (Side::Short, crate::regime::Bias::Bear)
        );
        if aligned {
            strength += 10;
        }

        Some(NewSignal {
            symbol: symbol.to_string(),
            direction: side.into(),
            timeframe: Timeframe::H1,
            strategy: spec.name.clone(),
            entry_price: entry,
            stop_loss: stop,
            target1,
            target2: Some(target2),
            target3: None,
            strength: strength.min(100),
            extra_info: json!({
                "reason": evaluation.reason,
                "regime": format!("{:?}", regime.regime),
                "bias": format!("{:?}", regime.bias),
            })
            .to_string(),
        })
    }

    async fn run_indicator_strategy(&self, spec: &StrategySpec, summary: &mut RunSummary) {
        // The 4h oscillator strategies only emit on the configured hours
        let hour_gated = matches!(
            spec.kind,
            StrategyKind::MacdHistogram(_) | StrategyKind::Pmo(_)
        );
        if hour_gated && !is_allowed_hour(Utc::now(), &self.config.allowed_hours) {
            tracing::debug!("{}: outside allowed hours, skipping", spec.name);
            return;
        }

        tracing::info!("Running strategy {}", spec.name);

        for symbol in &self.config.symbols {
            for timeframe in &spec.timeframes {
                let limit = self.history_bars_for(&spec.kind);
                let candles = match self
                    .market
                    .fetch_candles(symbol, *timeframe, limit, None, None)
                    .await
                {
                    Ok(candles) => candles,
                    Err(e) => {
                        summary.errors += 1;
                        tracing::warn!("Fetch failed for {} {}: {}", symbol, timeframe, e);
                        continue;
                    }
                };

                let draft = match &spec.kind {
                    StrategyKind::Rsi(params) => evaluate_rsi(&candles, params),
                    StrategyKind::MacdHistogram(params) => {
                        evaluate_macd_histogram(&candles, params)
                    }
                    StrategyKind::Pmo(params) => evaluate_pmo(&candles, params),
                    StrategyKind::MacdHistogramPmo(params) => {
                        evaluate_macd_histogram_pmo(&candles, params)
                    }
                    _ => None,
                };

                if let Some(draft) = draft {
                    if let Some(new) =
                        self.draft_from_indicator(&candles, symbol, *timeframe, spec, &draft)
                    {
                        self.gate_and_store(new, summary).await;
                    }
                }

                sleep(std::time::Duration::from_millis(self.config.request_delay_ms)).await;
            }
        }
    }

    fn draft_from_indicator(
        &self,
        candles: &[crate::models::Candle],
        symbol: &str,
        timeframe: Timeframe,
        spec: &StrategySpec,
        draft: &StrategySignal,
    ) -> Option<NewSignal> {
        let entry = candles.last()?.close;
        let atr = calculate_atr(candles, self.config.atr_period)?;
        let side = match draft.direction {
            Direction::Buy => Side::Long,
            Direction::Sell => Side::Short,
        };
        let stop = conservative_stop(
            candles,
            side,
            atr,
            entry,
            self.config.stop_atr_mult,
            self.config.swing_lookback,
        );
        let (target1, target2) = targets_from_stop(entry, stop, side);

        Some(NewSignal {
            symbol: symbol.to_string(),
            direction: draft.direction,
            timeframe,
            strategy: spec.name.clone(),
            entry_price: entry,
            stop_loss: stop,
            target1,
            target2: Some(target2),
            target3: None,
            strength: draft.strength.min(100),
            extra_info: draft.extra_info.to_string(),
        })
    }

    fn history_bars_for(&self, kind: &StrategyKind) -> usize {
        match kind {
            StrategyKind::Rsi(p) => p.period + 20,
            StrategyKind::MacdHistogram(p) => p.slow_period + p.signal_period + 20,
            StrategyKind::Pmo(p) => p.roc_period + p.slow_period + 20,
            StrategyKind::MacdHistogramPmo(p) => {
                (p.slow_period + p.signal_period).max(p.roc_period + p.pmo_slow_period) + 20
            }
            StrategyKind::MultiTimeframe(_) => 200,
            StrategyKind::Scanner(cfg) => cfg.history_bars,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::models::Candle;
    use crate::store::{MemorySignalStore, SignalStore};
    use chrono::{DateTime, Utc};

    struct DecliningMarket;

    impl MarketData for DecliningMarket {
        async fn fetch_candles(
            &self,
            _symbol: &str,
            interval: Timeframe,
            limit: usize,
            _start_time: Option<DateTime<Utc>>,
            _end_time: Option<DateTime<Utc>>,
        ) -> Result<Vec<Candle>, FetchError> {
            // Steady decline: drives RSI deep into oversold
            let step = chrono::Duration::minutes(interval.minutes() as i64);
            let start = Utc::now() - step * limit as i32;
            Ok((0..limit)
                .map(|i| {
                    let close = 200.0 - i as f64 * 2.0;
                    Candle {
                        timestamp: start + step * i as i32,
                        open: close + 2.0,
                        high: close + 2.5,
                        low: close - 0.5,
                        close,
                        volume: 1000.0,
                    }
                })
                .collect())
        }

        async fn fetch_current_price(&self, _symbol: &str) -> Result<f64, FetchError> {
            Ok(100.0)
        }

        async fn fetch_top_symbols_by_volume(
            &self,
            _limit: usize,
            _min_quote_volume: f64,
        ) -> Result<Vec<String>, FetchError> {
            Ok(Vec::new())
        }
    }

    fn quick_engine_config() -> EngineConfig {
        EngineConfig {
            symbols: vec!["BTCUSDT".to_string()],
            request_delay_ms: 0,
            ..EngineConfig::default()
        }
    }

    fn rsi_spec() -> StrategySpec {
        StrategySpec {
            name: "RSI".to_string(),
            kind: StrategyKind::Rsi(RsiParams::default()),
            timeframes: vec![Timeframe::H4],
        }
    }

    #[tokio::test]
    async fn test_engine_creates_signal_from_oversold_market() {
        let market = DecliningMarket;
        let store = MemorySignalStore::new();
        let engine = SignalEngine::new(&market, &store, quick_engine_config());

        let summary = engine.run(&[rsi_spec()]).await.unwrap();
        assert_eq!(summary.created, 1);
        assert_eq!(summary.deduped, 0);

        let signals = store.all();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].direction, Direction::Buy);
        assert_eq!(signals[0].strategy, "RSI");
        // Buy stop sits below entry, targets stack above
        assert!(signals[0].stop_loss < signals[0].entry_price);
        assert!(signals[0].target2.unwrap() > signals[0].target1);
    }

    #[tokio::test]
    async fn test_dedup_gate_blocks_second_signal_in_window() {
        let market = DecliningMarket;
        let store = MemorySignalStore::new();
        let engine = SignalEngine::new(&market, &store, quick_engine_config());

        let first = engine.run(&[rsi_spec()]).await.unwrap();
        assert_eq!(first.created, 1);

        // Same conditions minutes later: gate discards the duplicate
        let second = engine.run(&[rsi_spec()]).await.unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.deduped, 1);

        assert_eq!(store.all().len(), 1);
    }

    #[tokio::test]
    async fn test_dedup_window_expires() {
        use crate::models::{Signal, SignalStatus};
        use uuid::Uuid;

        let market = DecliningMarket;
        let store = MemorySignalStore::new();
        let engine = SignalEngine::new(&market, &store, quick_engine_config());

        // An identical open signal from 3 hours ago sits outside the
        // 2-hour window and must not block a new one
        store.insert_raw(Signal {
            id: Uuid::new_v4(),
            symbol: "BTCUSDT".to_string(),
            direction: Direction::Buy,
            timeframe: Timeframe::H4,
            strategy: "RSI".to_string(),
            entry_price: 150.0,
            stop_loss: 147.0,
            target1: 153.0,
            target2: Some(156.0),
            target3: None,
            strength: 90,
            status: SignalStatus::New,
            generated_at: Utc::now() - chrono::Duration::hours(3),
            extra_info: "{}".to_string(),
            price_24h: None,
            result_24h: None,
            status_24h: None,
            high_24h: None,
            low_24h: None,
        });

        let summary = engine.run(&[rsi_spec()]).await.unwrap();
        assert_eq!(summary.created, 1);
        assert_eq!(summary.deduped, 0);
        assert_eq!(store.all().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_failures_are_counted() {
        struct FailingMarket;
        impl MarketData for FailingMarket {
            async fn fetch_candles(
                &self,
                _symbol: &str,
                _interval: Timeframe,
                _limit: usize,
                _start_time: Option<DateTime<Utc>>,
                _end_time: Option<DateTime<Utc>>,
            ) -> Result<Vec<Candle>, FetchError> {
                Err(FetchError::InvalidResponse("boom".to_string()))
            }
            async fn fetch_current_price(&self, _symbol: &str) -> Result<f64, FetchError> {
                Err(FetchError::InvalidResponse("boom".to_string()))
            }
            async fn fetch_top_symbols_by_volume(
                &self,
                _limit: usize,
                _min_quote_volume: f64,
            ) -> Result<Vec<String>, FetchError> {
                Err(FetchError::InvalidResponse("boom".to_string()))
            }
        }

        let market = FailingMarket;
        let store = MemorySignalStore::new();
        let engine = SignalEngine::new(&market, &store, quick_engine_config());

        let summary = engine.run(&[rsi_spec()]).await.unwrap();
        assert_eq!(summary.created, 0);
        assert_eq!(summary.errors, 1);
    }
}
