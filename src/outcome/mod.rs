// 24-hour outcome reconciliation and high/low backfill
//
// Reconciliation closes aged-out signals with their realized 24h result and
// the high/low extremes over the window. Backfill retroactively fills
// extremes for CLOSED signals that predate the extremes columns; running it
// on fully-populated data updates nothing.

use crate::api::MarketData;
use crate::models::{Candle, Direction, Signal, SignalOutcome, Timeframe};
use crate::store::SignalStore;
use chrono::{DateTime, Duration, Utc};
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub struct OutcomeConfig {
    /// Hours after generation before a signal is reconciled
    pub window_hours: i64,
    /// Timeframe of the candles used for the high/low window
    pub candle_timeframe: Timeframe,
    /// Candles fetched per signal; wider than the window as a safety margin
    pub candle_lookback: usize,
    /// Backfill page size
    pub page_size: usize,
    /// Backfill iteration cap
    pub max_iterations: usize,
    /// Pause between per-signal fetches
    pub request_delay_ms: u64,
}

impl Default for OutcomeConfig {
    fn default() -> Self {
        Self {
            window_hours: 24,
            candle_timeframe: Timeframe::H1,
            candle_lookback: 48,
            page_size: 500,
            max_iterations: 20,
            request_delay_ms: 200,
        }
    }
}

/// Counters from one batch pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub updated: usize,
    pub errors: usize,
}

/// Realized 24h result: price change in the trade direction
pub fn result_24h(direction: Direction, entry_price: f64, current_price: f64) -> f64 {
    match direction {
        Direction::Buy => current_price - entry_price,
        Direction::Sell => entry_price - current_price,
    }
}

/// High/low over the candles overlapping `[window_start, window_end]`,
/// widened to cover the entry and reference prices. Falls back to just those
/// two prices when no candle overlaps the window.
pub fn window_extremes(
    candles: &[Candle],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    candle_duration: Duration,
    entry_price: f64,
    reference_price: f64,
) -> (f64, f64) {
    let mut high: Option<f64> = None;
    let mut low: Option<f64> = None;

    for candle in candles {
        let start = candle.timestamp;
        let end = start + candle_duration;
        let overlaps = start < window_end && end > window_start;
        if overlaps {
            high = Some(high.map_or(candle.high, |h| h.max(candle.high)));
            low = Some(low.map_or(candle.low, |l| l.min(candle.low)));
        }
    }

    let must_cover_high = entry_price.max(reference_price);
    let must_cover_low = entry_price.min(reference_price);

    match (high, low) {
        (Some(h), Some(l)) => (h.max(must_cover_high), l.min(must_cover_low)),
        _ => (must_cover_high, must_cover_low),
    }
}

async fn extremes_for_signal<M: MarketData>(
    market: &M,
    signal: &Signal,
    reference_price: f64,
    cfg: &OutcomeConfig,
) -> (f64, f64) {
    let window_start = signal.generated_at;
    let window_end = window_start + Duration::hours(cfg.window_hours);
    let candle_duration = Duration::minutes(cfg.candle_timeframe.minutes() as i64);

    match market
        .fetch_candles(
            &signal.symbol,
            cfg.candle_timeframe,
            cfg.candle_lookback,
            None,
            None,
        )
        .await
    {
        Ok(candles) => window_extremes(
            &candles,
            window_start,
            window_end,
            candle_duration,
            signal.entry_price,
            reference_price,
        ),
        Err(e) => {
            // The window degrades to the two known prices; the backfill job
            // can widen it later
            tracing::warn!(
                "Candle fetch failed for {} during outcome window, using price fallback: {}",
                signal.symbol,
                e
            );
            (
                signal.entry_price.max(reference_price),
                signal.entry_price.min(reference_price),
            )
        }
    }
}

/// Close every signal older than the outcome window with its realized result
///
/// Per-signal failures are counted and skipped; the batch continues.
pub async fn reconcile_24h<S: SignalStore, M: MarketData>(
    store: &S,
    market: &M,
    cfg: &OutcomeConfig,
) -> crate::Result<BatchStats> {
    let cutoff = Utc::now() - Duration::hours(cfg.window_hours);
    let signals = store.find_needing_reconciliation(cutoff).await?;

    tracing::info!("Reconciling {} aged-out signals", signals.len());

    let mut stats = BatchStats::default();

    for signal in &signals {
        let current_price = match market.fetch_current_price(&signal.symbol).await {
            Ok(price) => price,
            Err(e) => {
                stats.errors += 1;
                tracing::warn!("Price fetch failed for {}: {}", signal.symbol, e);
                continue;
            }
        };

        let (high, low) = extremes_for_signal(market, signal, current_price, cfg).await;

        let outcome = SignalOutcome {
            price_24h: current_price,
            result_24h: result_24h(signal.direction, signal.entry_price, current_price),
            high_24h: high,
            low_24h: low,
        };

        match store.update_signal_outcome(signal.id, &outcome).await {
            Ok(()) => {
                stats.updated += 1;
                tracing::info!(
                    "Closed {} {}: entry {:.4}, 24h {:.4}, result {:+.4}",
                    signal.symbol,
                    signal.direction.as_str(),
                    signal.entry_price,
                    current_price,
                    outcome.result_24h
                );
            }
            Err(e) => {
                stats.errors += 1;
                tracing::warn!("Outcome write failed for {}: {}", signal.id, e);
            }
        }

        sleep(std::time::Duration::from_millis(cfg.request_delay_ms)).await;
    }

    Ok(stats)
}

/// Fill missing high/low on already-closed signals
///
/// Idempotent: paginates through matching signals, reusing the stored 24h
/// price, and stops once a full pass updates nothing or the iteration cap is
/// hit.
pub async fn backfill_high_low<S: SignalStore, M: MarketData>(
    store: &S,
    market: &M,
    cfg: &OutcomeConfig,
) -> crate::Result<BatchStats> {
    let mut stats = BatchStats::default();

    for iteration in 0..cfg.max_iterations {
        let page = store.find_missing_high_low(cfg.page_size).await?;
        if page.is_empty() {
            break;
        }

        tracing::info!(
            "Backfill pass {}: {} signals missing extremes",
            iteration + 1,
            page.len()
        );

        let mut pass_updated = 0usize;

        for signal in &page {
            let reference_price = match signal.price_24h {
                Some(price) => price,
                None => match market.fetch_current_price(&signal.symbol).await {
                    Ok(price) => price,
                    Err(e) => {
                        stats.errors += 1;
                        tracing::warn!("Price fetch failed for {}: {}", signal.symbol, e);
                        continue;
                    }
                },
            };

            let (high, low) = extremes_for_signal(market, signal, reference_price, cfg).await;

            match store.fill_high_low(signal.id, high, low).await {
                Ok(()) => {
                    stats.updated += 1;
                    pass_updated += 1;
                }
                Err(e) => {
                    stats.errors += 1;
                    tracing::warn!("High/low write failed for {}: {}", signal.id, e);
                }
            }

            sleep(std::time::Duration::from_millis(cfg.request_delay_ms)).await;
        }

        if pass_updated == 0 {
            break;
        }
    }

    Ok(stats)
}
