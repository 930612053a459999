use super::MarketData;
use crate::error::FetchError;
use crate::models::{Candle, Timeframe};
use chrono::{DateTime, TimeZone, Utc};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;

const BINANCE_FUTURES_API_BASE: &str = "https://fapi.binance.com";

// Well under the exchange's request-weight budget; the reactive backoff in
// the scan loop handles whatever slips through.
const RATE_LIMIT_RPM: u32 = 600;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Client for Binance USDⓈ-M futures public market data
///
/// Cloneable; all clones share the same request quota.
#[derive(Clone)]
pub struct BinanceFuturesClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<BinanceRateLimiter>,
}

#[derive(Debug, Deserialize)]
struct PriceTicker {
    price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    symbol: String,
    quote_volume: String,
}

impl BinanceFuturesClient {
    pub fn new() -> Self {
        Self::with_base_url(BINANCE_FUTURES_API_BASE.to_string())
    }

    /// Point the client at a different host (tests use a local mock server)
    pub fn with_base_url(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap());

        Self {
            client,
            base_url,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    /// Issue one rate-limited GET, mapping throttle statuses to a typed error
    async fn get(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        self.rate_limiter.until_ready().await;

        let response = self.client.get(url).send().await?;
        let status = response.status().as_u16();

        // 418 is the exchange's repeat-offender ban status
        if status == 429 || status == 418 {
            return Err(FetchError::RateLimited { status });
        }

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }

        Ok(response)
    }

    fn parse_kline_row(row: &[serde_json::Value]) -> Result<Candle, FetchError> {
        if row.len() < 6 {
            return Err(FetchError::InvalidResponse(format!(
                "kline row has {} fields, expected at least 6",
                row.len()
            )));
        }

        let ts_ms = row[0]
            .as_i64()
            .ok_or_else(|| FetchError::InvalidResponse("kline open time is not an integer".into()))?;
        let timestamp = Utc
            .timestamp_millis_opt(ts_ms)
            .single()
            .ok_or_else(|| FetchError::InvalidResponse(format!("invalid kline timestamp {ts_ms}")))?;

        let field = |i: usize, name: &str| -> Result<f64, FetchError> {
            row[i]
                .as_str()
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| FetchError::InvalidResponse(format!("kline {name} is not numeric")))
        };

        Ok(Candle {
            timestamp,
            open: field(1, "open")?,
            high: field(2, "high")?,
            low: field(3, "low")?,
            close: field(4, "close")?,
            volume: field(5, "volume")?,
        })
    }
}

impl Default for BinanceFuturesClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketData for BinanceFuturesClient {
    /// GET /fapi/v1/klines
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Timeframe,
        limit: usize,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<Candle>, FetchError> {
        let mut url = format!(
            "{}/fapi/v1/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            symbol,
            interval.as_str(),
            limit
        );
        if let Some(start) = start_time {
            url.push_str(&format!("&startTime={}", start.timestamp_millis()));
        }
        if let Some(end) = end_time {
            url.push_str(&format!("&endTime={}", end.timestamp_millis()));
        }

        let response = self.get(&url).await?;
        let rows: Vec<Vec<serde_json::Value>> = response.json().await?;

        let mut candles = Vec::with_capacity(rows.len());
        for row in &rows {
            candles.push(Self::parse_kline_row(row)?);
        }

        tracing::debug!("Fetched {} {} candles for {}", candles.len(), interval, symbol);

        Ok(candles)
    }

    /// GET /fapi/v1/ticker/price
    async fn fetch_current_price(&self, symbol: &str) -> Result<f64, FetchError> {
        let url = format!("{}/fapi/v1/ticker/price?symbol={}", self.base_url, symbol);

        let response = self.get(&url).await?;
        let ticker: PriceTicker = response.json().await?;

        ticker
            .price
            .parse::<f64>()
            .map_err(|_| FetchError::InvalidResponse(format!("price `{}` is not numeric", ticker.price)))
    }

    /// GET /fapi/v1/ticker/24hr, filtered to USDT perpetual pairs and sorted
    /// by descending quote volume
    async fn fetch_top_symbols_by_volume(
        &self,
        limit: usize,
        min_quote_volume: f64,
    ) -> Result<Vec<String>, FetchError> {
        let url = format!("{}/fapi/v1/ticker/24hr", self.base_url);

        let response = self.get(&url).await?;
        let tickers: Vec<Ticker24h> = response.json().await?;

        let mut pairs: Vec<(String, f64)> = tickers
            .into_iter()
            .filter_map(|t| {
                let volume = t.quote_volume.parse::<f64>().ok()?;
                if t.symbol.ends_with("USDT")
                    && !t.symbol.contains("BUSD")
                    && volume >= min_quote_volume
                {
                    Some((t.symbol, volume))
                } else {
                    None
                }
            })
            .collect();

        pairs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        Ok(pairs.into_iter().take(limit).map(|(s, _)| s).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kline_row(ts: i64, o: &str, h: &str, l: &str, c: &str, v: &str) -> serde_json::Value {
        serde_json::json!([ts, o, h, l, c, v, ts + 899_999, "0", 100, "0", "0", "0"])
    }

    #[tokio::test]
    async fn test_fetch_candles_parses_klines() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!([
            kline_row(1_700_000_000_000, "100.0", "101.5", "99.5", "101.0", "1234.5"),
            kline_row(1_700_000_900_000, "101.0", "102.0", "100.0", "101.5", "2345.6"),
        ]);
        let mock = server
            .mock("GET", "/fapi/v1/klines")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let client = BinanceFuturesClient::with_base_url(server.url());
        let candles = client
            .fetch_candles("BTCUSDT", Timeframe::M15, 2, None, None)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open, 100.0);
        assert_eq!(candles[0].high, 101.5);
        assert_eq!(candles[1].close, 101.5);
        assert!(candles[1].timestamp > candles[0].timestamp);
    }

    #[tokio::test]
    async fn test_fetch_candles_maps_429_to_rate_limited() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/fapi/v1/klines")
            .match_query(mockito::Matcher::Any)
            .with_status(429)
            .with_body("{\"code\":-1003}")
            .create_async()
            .await;

        let client = BinanceFuturesClient::with_base_url(server.url());
        let err = client
            .fetch_candles("BTCUSDT", Timeframe::M15, 10, None, None)
            .await
            .unwrap_err();

        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn test_fetch_current_price() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/fapi/v1/ticker/price")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body("{\"symbol\":\"BTCUSDT\",\"price\":\"43210.50\"}")
            .create_async()
            .await;

        let client = BinanceFuturesClient::with_base_url(server.url());
        let price = client.fetch_current_price("BTCUSDT").await.unwrap();
        assert_eq!(price, 43210.50);
    }

    #[tokio::test]
    async fn test_top_symbols_sorted_and_filtered() {
        let mut server = mockito::Server::new_async().await;
        let body = serde_json::json!([
            {"symbol": "BTCUSDT", "quoteVolume": "5000000"},
            {"symbol": "ETHUSDT", "quoteVolume": "9000000"},
            {"symbol": "BTCBUSD", "quoteVolume": "9999999"},
            {"symbol": "DOGEUSDT", "quoteVolume": "100"},
            {"symbol": "ETHBTC", "quoteVolume": "8888888"},
        ]);
        let _mock = server
            .mock("GET", "/fapi/v1/ticker/24hr")
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let client = BinanceFuturesClient::with_base_url(server.url());
        let symbols = client.fetch_top_symbols_by_volume(10, 1000.0).await.unwrap();

        // BUSD and non-USDT pairs excluded, low volume filtered, sorted desc
        assert_eq!(symbols, vec!["ETHUSDT".to_string(), "BTCUSDT".to_string()]);
    }

    #[test]
    fn test_parse_kline_row_rejects_short_rows() {
        let row = vec![serde_json::json!(1_700_000_000_000_i64)];
        assert!(BinanceFuturesClient::parse_kline_row(&row).is_err());
    }
}
