use super::SignalStore;
use crate::models::{
    Direction, NewSignal, OutcomeStatus, Signal, SignalOutcome, SignalStatus, Timeframe,
};
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use uuid::Uuid;

/// Postgres-backed signal store
pub struct PostgresSignalStore {
    pool: PgPool,
}

impl PostgresSignalStore {
    /// Connect and run migrations
    pub async fn new(database_url: &str) -> crate::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to Postgres signal store");

        Ok(Self { pool })
    }

    fn signal_from_row(row: &sqlx::postgres::PgRow) -> crate::Result<Signal> {
        let direction_str: String = row.get("direction");
        let direction = Direction::parse(&direction_str)
            .ok_or_else(|| format!("invalid direction `{direction_str}`"))?;

        let timeframe_str: String = row.get("timeframe");
        let timeframe = Timeframe::parse(&timeframe_str)
            .ok_or_else(|| format!("invalid timeframe `{timeframe_str}`"))?;

        let status_str: String = row.get("status");
        let status = SignalStatus::parse(&status_str)
            .ok_or_else(|| format!("invalid status `{status_str}`"))?;

        let status_24h_str: Option<String> = row.get("status_24h");
        let status_24h = match status_24h_str.as_deref() {
            None => None,
            Some("CLOSED") => Some(OutcomeStatus::Closed),
            Some(other) => return Err(format!("invalid status_24h `{other}`").into()),
        };

        let strength: i16 = row.get("strength");

        Ok(Signal {
            id: row.get("id"),
            symbol: row.get("symbol"),
            direction,
            timeframe,
            strategy: row.get("strategy"),
            entry_price: row.get("entry_price"),
            stop_loss: row.get("stop_loss"),
            target1: row.get("target1"),
            target2: row.get("target2"),
            target3: row.get("target3"),
            strength: strength.clamp(0, 100) as u8,
            status,
            generated_at: row.get("generated_at"),
            extra_info: row.get("extra_info"),
            price_24h: row.get("price_24h"),
            result_24h: row.get("result_24h"),
            status_24h,
            high_24h: row.get("high_24h"),
            low_24h: row.get("low_24h"),
        })
    }
}

impl SignalStore for PostgresSignalStore {
    async fn find_open_signal(
        &self,
        symbol: &str,
        strategy: &str,
        timeframe: Timeframe,
        direction: Direction,
        since: DateTime<Utc>,
    ) -> crate::Result<Option<Signal>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM signals
            WHERE symbol = $1
              AND strategy = $2
              AND timeframe = $3
              AND direction = $4
              AND status IN ('NEW', 'IN_PROGRESS')
              AND generated_at >= $5
            ORDER BY generated_at DESC
            LIMIT 1
            "#,
        )
        .bind(symbol)
        .bind(strategy)
        .bind(timeframe.as_str())
        .bind(direction.as_str())
        .bind(since)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| Self::signal_from_row(&r)).transpose()
    }

    async fn create_signal(&self, new: NewSignal) -> crate::Result<Signal> {
        let id = Uuid::new_v4();
        let generated_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO signals (
                id, symbol, direction, timeframe, strategy,
                entry_price, stop_loss, target1, target2, target3,
                strength, status, generated_at, extra_info
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(&new.symbol)
        .bind(new.direction.as_str())
        .bind(new.timeframe.as_str())
        .bind(&new.strategy)
        .bind(new.entry_price)
        .bind(new.stop_loss)
        .bind(new.target1)
        .bind(new.target2)
        .bind(new.target3)
        .bind(new.strength.min(100) as i16)
        .bind(SignalStatus::New.as_str())
        .bind(generated_at)
        .bind(&new.extra_info)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Created signal {} for {}", id, new.symbol);

        Ok(Signal {
            id,
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
            generated_at,
            extra_info: new.extra_info,
            price_24h: None,
            result_24h: None,
            status_24h: None,
            high_24h: None,
            low_24h: None,
        })
    }

    async fn find_needing_reconciliation(
        &self,
        cutoff: DateTime<Utc>,
    ) -> crate::Result<Vec<Signal>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM signals
            WHERE generated_at <= $1
              AND status_24h IS NULL
            ORDER BY generated_at ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::signal_from_row).collect()
    }

    async fn update_signal_outcome(&self, id: Uuid, outcome: &SignalOutcome) -> crate::Result<()> {
        sqlx::query(
            r#"
            UPDATE signals
            SET price_24h = $2,
                result_24h = $3,
                status_24h = 'CLOSED',
                high_24h = $4,
                low_24h = $5
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(outcome.price_24h)
        .bind(outcome.result_24h)
        .bind(outcome.high_24h)
        .bind(outcome.low_24h)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_missing_high_low(&self, limit: usize) -> crate::Result<Vec<Signal>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM signals
            WHERE status_24h = 'CLOSED'
              AND (high_24h IS NULL OR low_24h IS NULL)
            ORDER BY generated_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::signal_from_row).collect()
    }

    async fn fill_high_low(&self, id: Uuid, high: f64, low: f64) -> crate::Result<()> {
        sqlx::query(
            r#"
            UPDATE signals
            SET high_24h = $2,
                low_24h = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(high)
        .bind(low)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
