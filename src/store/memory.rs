use super::SignalStore;
use crate::models::{
    Direction, NewSignal, OutcomeStatus, Signal, SignalOutcome, SignalStatus, Timeframe,
};
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use uuid::Uuid;

/// In-memory signal store for dry runs and tests
///
/// Same contract as the Postgres store, backed by a mutex-guarded vector.
#[derive(Debug, Default)]
pub struct MemorySignalStore {
    signals: Mutex<Vec<Signal>>,
}

impl MemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully-formed signal, bypassing the dedup gate. Used to seed
    /// dry runs and tests with historical records.
    pub fn insert_raw(&self, signal: Signal) {
        self.signals.lock().unwrap().push(signal);
    }

    pub fn all(&self) -> Vec<Signal> {
        self.signals.lock().unwrap().clone()
    }

    pub fn get(&self, id: Uuid) -> Option<Signal> {
        self.signals
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == id)
            .cloned()
    }
}

impl SignalStore for MemorySignalStore {
    async fn find_open_signal(
        &self,
        symbol: &str,
        strategy: &str,
        timeframe: Timeframe,
        direction: Direction,
        since: DateTime<Utc>,
    ) -> crate::Result<Option<Signal>> {
        let signals = self.signals.lock().unwrap();
        Ok(signals
            .iter()
            .filter(|s| {
                s.symbol == symbol
                    && s.strategy == strategy
                    && s.timeframe == timeframe
                    && s.direction == direction
                    && s.status.is_open()
                    && s.generated_at >= since
            })
            .max_by_key(|s| s.generated_at)
            .cloned())
    }

    async fn create_signal(&self, new: NewSignal) -> crate::Result<Signal> {
        let signal = Signal {
            id: Uuid::new_v4(),
            symbol: new.symbol,
            direction: new.direction,
            timeframe: new.timeframe,
            strategy: new.strategy,
            entry_price: new.entry_price,
            stop_loss: new.stop_loss,
            target1: new.target1,
            target2: new.target2,
            target3: new.target3,
            strength: new.strength.min(100),
            status: SignalStatus::New,
            generated_at: Utc::now(),
            extra_info: new.extra_info,
            price_24h: None,
            result_24h: None,
            status_24h: None,
            high_24h: None,
            low_24h: None,
        };
        self.signals.lock().unwrap().push(signal.clone());
        Ok(signal)
    }

    async fn find_needing_reconciliation(
        &self,
        cutoff: DateTime<Utc>,
    ) -> crate::Result<Vec<Signal>> {
        let signals = self.signals.lock().unwrap();
        Ok(signals
            .iter()
            .filter(|s| s.generated_at <= cutoff && s.status_24h.is_none())
            .cloned()
            .collect())
    }

    async fn update_signal_outcome(&self, id: Uuid, outcome: &SignalOutcome) -> crate::Result<()> {
        let mut signals = self.signals.lock().unwrap();
        let signal = signals
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| format!("signal {id} not found"))?;

        signal.price_24h = Some(outcome.price_24h);
        signal.result_24h = Some(outcome.result_24h);
        signal.status_24h = Some(OutcomeStatus::Closed);
        signal.high_24h = Some(outcome.high_24h);
        signal.low_24h = Some(outcome.low_24h);
        Ok(())
    }

    async fn find_missing_high_low(&self, limit: usize) -> crate::Result<Vec<Signal>> {
        let signals = self.signals.lock().unwrap();
        let mut matching: Vec<Signal> = signals
            .iter()
            .filter(|s| {
                s.status_24h == Some(OutcomeStatus::Closed)
                    && (s.high_24h.is_none() || s.low_24h.is_none())
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn fill_high_low(&self, id: Uuid, high: f64, low: f64) -> crate::Result<()> {
        let mut signals = self.signals.lock().unwrap();
        let signal = signals
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| format!("signal {id} not found"))?;

        signal.high_24h = Some(high);
        signal.low_24h = Some(low);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_signal(symbol: &str) -> NewSignal {
        NewSignal {
            symbol: symbol.to_string(),
            direction: Direction::Buy,
            timeframe: Timeframe::M15,
            strategy: "SCANNER".to_string(),
            entry_price: 100.0,
            stop_loss: 98.0,
            target1: 102.0,
            target2: Some(104.0),
            target3: None,
            strength: 80,
            extra_info: "{}".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_find_open() {
        let store = MemorySignalStore::new();
        let created = store.create_signal(new_signal("BTCUSDT")).await.unwrap();
        assert_eq!(created.status, SignalStatus::New);

        let since = Utc::now() - chrono::Duration::hours(2);
        let found = store
            .find_open_signal("BTCUSDT", "SCANNER", Timeframe::M15, Direction::Buy, since)
            .await
            .unwrap();
        assert_eq!(found.unwrap().id, created.id);

        // Different direction does not match
        let found = store
            .find_open_signal("BTCUSDT", "SCANNER", Timeframe::M15, Direction::Sell, since)
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_outcome_update_closes_signal() {
        let store = MemorySignalStore::new();
        let created = store.create_signal(new_signal("ETHUSDT")).await.unwrap();

        let outcome = SignalOutcome {
            price_24h: 110.0,
            result_24h: 10.0,
            high_24h: 112.0,
            low_24h: 99.0,
        };
        store.update_signal_outcome(created.id, &outcome).await.unwrap();

        let stored = store.get(created.id).unwrap();
        assert_eq!(stored.status_24h, Some(OutcomeStatus::Closed));
        assert_eq!(stored.price_24h, Some(110.0));
        assert_eq!(stored.result_24h, Some(10.0));
    }

    #[tokio::test]
    async fn test_missing_high_low_pagination_order() {
        let store = MemorySignalStore::new();

        for i in 0..3 {
            let mut signal = store.create_signal(new_signal("SOLUSDT")).await.unwrap();
            signal.status_24h = Some(OutcomeStatus::Closed);
            signal.high_24h = None;
            signal.low_24h = None;
            signal.generated_at = Utc::now() - chrono::Duration::hours(i);
            // Rebuild the stored copy with the tweaked fields
            store.signals.lock().unwrap().retain(|s| s.id != signal.id);
            store.insert_raw(signal);
        }

        let page = store.find_missing_high_low(2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert!(page[0].generated_at >= page[1].generated_at);
    }
}
