use super::moving_average::calculate_sma;

/// Bollinger Bands: SMA +/- multiplier * population standard deviation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl BollingerBands {
    /// Band width relative to the middle band, used by the regime classifier
    pub fn bandwidth(&self) -> f64 {
        if self.middle == 0.0 {
            return 0.0;
        }
        (self.upper - self.lower) / self.middle
    }
}

/// Calculate Bollinger Bands over the trailing `period` closes
pub fn calculate_bollinger(
    closes: &[f64],
    period: usize,
    std_dev_mult: f64,
) -> Option<BollingerBands> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let middle = calculate_sma(closes, period)?;
    let recent = &closes[closes.len() - period..];

    let variance = recent
        .iter()
        .map(|price| (price - middle).powi(2))
        .sum::<f64>()
        / period as f64;
    let std_dev = variance.sqrt();

    Some(BollingerBands {
        upper: middle + std_dev_mult * std_dev,
        middle,
        lower: middle - std_dev_mult * std_dev,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bollinger_insufficient_data() {
        let closes = vec![100.0; 19];
        assert!(calculate_bollinger(&closes, 20, 2.0).is_none());
    }

    #[test]
    fn test_bollinger_flat_series_collapses() {
        let closes = vec![100.0; 25];
        let bb = calculate_bollinger(&closes, 20, 2.0).unwrap();
        assert_eq!(bb.upper, 100.0);
        assert_eq!(bb.middle, 100.0);
        assert_eq!(bb.lower, 100.0);
        assert_eq!(bb.bandwidth(), 0.0);
    }

    #[test]
    fn test_bollinger_bands_are_symmetric() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + (i % 5) as f64).collect();
        let bb = calculate_bollinger(&closes, 20, 2.0).unwrap();
        let up = bb.upper - bb.middle;
        let down = bb.middle - bb.lower;
        assert!((up - down).abs() < 1e-9);
        assert!(up > 0.0);
    }

    #[test]
    fn test_bandwidth_grows_with_volatility() {
        let calm: Vec<f64> = (0..30).map(|i| 100.0 + (i % 2) as f64 * 0.5).collect();
        let wild: Vec<f64> = (0..30).map(|i| 100.0 + (i % 2) as f64 * 10.0).collect();

        let bb_calm = calculate_bollinger(&calm, 20, 2.0).unwrap();
        let bb_wild = calculate_bollinger(&wild, 20, 2.0).unwrap();
        assert!(bb_wild.bandwidth() > bb_calm.bandwidth());
    }
}
