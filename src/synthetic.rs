// Synthetic candle generation for tests and dry runs
//
// Seeded so every run reproduces the same tape.

use crate::models::Candle;
use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Market shapes the generator can produce
#[derive(Debug, Clone, Copy)]
pub enum MarketScenario {
    /// Steady drift up (+2% daily) with small noise
    Uptrend,
    /// Steady drift down (-2% daily) with small noise
    Downtrend,
    /// Mean-reverting chop around the base price
    Sideways,
    /// Large swings with no drift
    Volatile,
}

pub struct SyntheticDataGenerator {
    rng: StdRng,
    base_price: f64,
    base_volume: f64,
}

impl SyntheticDataGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            base_price: 100.0,
            base_volume: 10_000.0,
        }
    }

    /// Generate `num_candles` candles at `interval_minutes` spacing, ending
    /// near the present
    pub fn generate(
        &mut self,
        scenario: MarketScenario,
        num_candles: usize,
        interval_minutes: i64,
    ) -> Vec<Candle> {
        let start_time = Utc::now() - Duration::minutes(num_candles as i64 * interval_minutes);
        let intervals_per_day = 24.0 * 60.0 / interval_minutes as f64;

        let (drift, noise_pct, reversion) = match scenario {
            MarketScenario::Uptrend => (0.02 / intervals_per_day, 0.001, 0.0),
            MarketScenario::Downtrend => (-0.02 / intervals_per_day, 0.001, 0.0),
            MarketScenario::Sideways => (0.0, 0.01, 0.1),
            MarketScenario::Volatile => (0.0, 0.05, 0.0),
        };

        let mut candles = Vec::with_capacity(num_candles);
        let mut price = self.base_price;

        for i in 0..num_candles {
            let timestamp = start_time + Duration::minutes(i as i64 * interval_minutes);

            let pull = (self.base_price - price) * reversion;
            let noise = price * self.rng.gen_range(-noise_pct..noise_pct);
            price += price * drift + pull + noise;
            price = price.max(self.base_price * 0.2);

            candles.push(self.candle_at(price, timestamp));
        }

        candles
    }

    fn candle_at(&mut self, close: f64, timestamp: chrono::DateTime<Utc>) -> Candle {
        let wick = 0.002;
        let high = close * (1.0 + self.rng.gen_range(0.0..wick));
        let low = close * (1.0 - self.rng.gen_range(0.0..wick));
        let open = (close * (1.0 + self.rng.gen_range(-wick..wick))).clamp(low, high);
        let volume = self.base_volume * self.rng.gen_range(0.7..1.3);

        Candle {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}
