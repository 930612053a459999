use crate::models::Candle;

/// Highest-high / lowest-low breakout boundary
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DonchianChannel {
    pub high: f64,
    pub low: f64,
}

/// Donchian channel over the trailing `period` candles (includes the last bar)
pub fn calculate_donchian(candles: &[Candle], period: usize) -> Option<DonchianChannel> {
    if period == 0 || candles.len() < period {
        return None;
    }

    channel_of(&candles[candles.len() - period..])
}

/// Donchian channel at a bar index without lookahead
///
/// Uses the `period` candles strictly preceding `index`; the bar at `index`
/// itself is never included. This keeps breakout levels honest when walking
/// history bar by bar.
pub fn calculate_donchian_at(
    candles: &[Candle],
    period: usize,
    index: usize,
) -> Option<DonchianChannel> {
    if period == 0 || index < period || index > candles.len() {
        return None;
    }

    channel_of(&candles[index - period..index])
}

fn channel_of(window: &[Candle]) -> Option<DonchianChannel> {
    let first = window.first()?;
    let mut high = first.high;
    let mut low = first.low;
    for candle in &window[1..] {
        high = high.max(candle.high);
        low = low.min(candle.low);
    }
    Some(DonchianChannel { high, low })
}
