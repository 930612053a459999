pub mod binance;

pub use binance::BinanceFuturesClient;

use crate::error::FetchError;
use crate::models::{Candle, Timeframe};
use chrono::{DateTime, Utc};

/// Collaborator contract for candle, price and ranking sources.
///
/// Implementations must surface upstream throttling as
/// `FetchError::RateLimited` so callers can back off instead of skipping.
pub trait MarketData {
    /// Ordered candles, oldest first
    fn fetch_candles(
        &self,
        symbol: &str,
        interval: Timeframe,
        limit: usize,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> impl std::future::Future<Output = Result<Vec<Candle>, FetchError>> + Send;

    fn fetch_current_price(
        &self,
        symbol: &str,
    ) -> impl std::future::Future<Output = Result<f64, FetchError>> + Send;

    /// Symbols sorted by descending 24h quote volume
    fn fetch_top_symbols_by_volume(
        &self,
        limit: usize,
        min_quote_volume: f64,
    ) -> impl std::future::Future<Output = Result<Vec<String>, FetchError>> + Send;
}
