// Record store contract for persisted signals
//
// The engine and batch jobs talk to this trait only; Postgres backs the real
// deployment and the in-memory store backs dry runs and tests. Writes are
// per-record; the store is expected to serialize them, so no multi-record
// transactions exist here.

pub mod memory;
pub mod postgres;

pub use memory::MemorySignalStore;
pub use postgres::PostgresSignalStore;

use crate::models::{Direction, NewSignal, Signal, SignalOutcome, Timeframe};
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub trait SignalStore {
    /// Most recent signal with an open status matching the identity tuple
    /// and generated at or after `since`
    fn find_open_signal(
        &self,
        symbol: &str,
        strategy: &str,
        timeframe: Timeframe,
        direction: Direction,
        since: DateTime<Utc>,
    ) -> impl std::future::Future<Output = crate::Result<Option<Signal>>> + Send;

    fn create_signal(
        &self,
        new: NewSignal,
    ) -> impl std::future::Future<Output = crate::Result<Signal>> + Send;

    /// Signals generated at or before `cutoff` whose 24h outcome is unset
    fn find_needing_reconciliation(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl std::future::Future<Output = crate::Result<Vec<Signal>>> + Send;

    /// Write the full 24h outcome and mark the signal CLOSED
    fn update_signal_outcome(
        &self,
        id: Uuid,
        outcome: &SignalOutcome,
    ) -> impl std::future::Future<Output = crate::Result<()>> + Send;

    /// CLOSED signals still missing a high or low, most recent first
    fn find_missing_high_low(
        &self,
        limit: usize,
    ) -> impl std::future::Future<Output = crate::Result<Vec<Signal>>> + Send;

    /// Fill only the high/low extremes (backfill path)
    fn fill_high_low(
        &self,
        id: Uuid,
        high: f64,
        low: f64,
    ) -> impl std::future::Future<Output = crate::Result<()>> + Send;
}
