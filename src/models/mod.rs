use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// OHLCV candlestick for one (symbol, timeframe) sequence
///
/// Immutable once fetched; sequences are ordered by timestamp and no two
/// candles in a sequence share one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Supported candle intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
    H4,
    D1,
}

impl Timeframe {
    /// Wire name used by the exchange API and stored on signals
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    pub fn minutes(&self) -> u64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    pub fn parse(s: &str) -> Option<Timeframe> {
        match s {
            "1m" => Some(Timeframe::M1),
            "5m" => Some(Timeframe::M5),
            "15m" => Some(Timeframe::M15),
            "1h" => Some(Timeframe::H1),
            "4h" => Some(Timeframe::H4),
            "1d" => Some(Timeframe::D1),
            _ => None,
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trade direction as seen by the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
        }
    }
}

/// Trade direction as stored on signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
        }
    }

    pub fn parse(s: &str) -> Option<Direction> {
        match s {
            "BUY" => Some(Direction::Buy),
            "SELL" => Some(Direction::Sell),
            _ => None,
        }
    }
}

impl From<Side> for Direction {
    fn from(side: Side) -> Self {
        match side {
            Side::Long => Direction::Buy,
            Side::Short => Direction::Sell,
        }
    }
}

/// Which setup produced a scanner alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetupKind {
    TrendPullback,
    BreakoutRetest,
}

impl SetupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetupKind::TrendPullback => "TREND_PULLBACK",
            SetupKind::BreakoutRetest => "BREAKOUT_RETEST",
        }
    }
}

/// Qualifying-but-untriggered condition, surfaced for visibility only.
/// Never carries stop or target levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreSetupAlert {
    pub symbol: String,
    pub side: Side,
    pub setup: SetupKind,
    pub timeframe: Timeframe,
    pub score: f64,
    pub entry: f64,
    pub atr_percent: f64,
    pub reasons: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Fully triggered, scored, tradable alert with defined stop/targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryAlert {
    pub symbol: String,
    pub side: Side,
    pub setup: SetupKind,
    pub timeframe: Timeframe,
    pub score: f64,
    pub entry: f64,
    pub stop: f64,
    pub target1: f64,
    pub target2: f64,
    pub atr_percent: f64,
    pub reasons: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Scanner output. Entry always has stop/targets; PreSetup never does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Alert {
    PreSetup(PreSetupAlert),
    Entry(EntryAlert),
}

impl Alert {
    pub fn symbol(&self) -> &str {
        match self {
            Alert::PreSetup(a) => &a.symbol,
            Alert::Entry(a) => &a.symbol,
        }
    }

    pub fn score(&self) -> f64 {
        match self {
            Alert::PreSetup(a) => a.score,
            Alert::Entry(a) => a.score,
        }
    }

    pub fn side(&self) -> Side {
        match self {
            Alert::PreSetup(a) => a.side,
            Alert::Entry(a) => a.side,
        }
    }
}

/// Lifecycle status of a stored signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalStatus {
    New,
    InProgress,
    HitTarget,
    HitStop,
    Expired,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::New => "NEW",
            SignalStatus::InProgress => "IN_PROGRESS",
            SignalStatus::HitTarget => "HIT_TARGET",
            SignalStatus::HitStop => "HIT_STOP",
            SignalStatus::Expired => "EXPIRED",
        }
    }

    pub fn parse(s: &str) -> Option<SignalStatus> {
        match s {
            "NEW" => Some(SignalStatus::New),
            "IN_PROGRESS" => Some(SignalStatus::InProgress),
            "HIT_TARGET" => Some(SignalStatus::HitTarget),
            "HIT_STOP" => Some(SignalStatus::HitStop),
            "EXPIRED" => Some(SignalStatus::Expired),
            _ => None,
        }
    }

    /// Statuses that count against the dedup window
    pub fn is_open(&self) -> bool {
        matches!(self, SignalStatus::New | SignalStatus::InProgress)
    }
}

/// Fields for creating a new signal through the dedup gate
#[derive(Debug, Clone)]
pub struct NewSignal {
    pub symbol: String,
    pub direction: Direction,
    pub timeframe: Timeframe,
    pub strategy: String,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub target1: f64,
    pub target2: Option<f64>,
    pub target3: Option<f64>,
    pub strength: u8,
    pub extra_info: String,
}

/// Persisted signal record
///
/// Created once by the dedup gate; `status_24h` flips to CLOSED exactly once
/// by the reconciliation job; backfill may later fill high/low if missing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub timeframe: Timeframe,
    pub strategy: String,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub target1: f64,
    pub target2: Option<f64>,
    pub target3: Option<f64>,
    pub strength: u8,
    pub status: SignalStatus,
    pub generated_at: DateTime<Utc>,
    pub extra_info: String,
    pub price_24h: Option<f64>,
    pub result_24h: Option<f64>,
    pub status_24h: Option<OutcomeStatus>,
    pub high_24h: Option<f64>,
    pub low_24h: Option<f64>,
}

/// Outcome lifecycle marker. Absent until the 24h window is reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeStatus {
    Closed,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        "CLOSED"
    }
}

/// Outcome fields written back by reconciliation
#[derive(Debug, Clone, PartialEq)]
pub struct SignalOutcome {
    pub price_24h: f64,
    pub result_24h: f64,
    pub high_24h: f64,
    pub low_24h: f64,
}

/// Clamp a raw additive score into the 0-10 alert range
pub fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 10.0)
}

/// Convert an alert score into the 0-100 strength stored on signals
pub fn strength_from_score(score: f64) -> u8 {
    (clamp_score(score) * 10.0).round().min(100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_roundtrip() {
        for tf in [
            Timeframe::M1,
            Timeframe::M5,
            Timeframe::M15,
            Timeframe::H1,
            Timeframe::H4,
            Timeframe::D1,
        ] {
            assert_eq!(Timeframe::parse(tf.as_str()), Some(tf));
        }
        assert_eq!(Timeframe::parse("2h"), None);
    }

    #[test]
    fn test_side_maps_to_direction() {
        assert_eq!(Direction::from(Side::Long), Direction::Buy);
        assert_eq!(Direction::from(Side::Short), Direction::Sell);
    }

    #[test]
    fn test_score_clamping() {
        assert_eq!(clamp_score(-3.0), 0.0);
        assert_eq!(clamp_score(4.5), 4.5);
        assert_eq!(clamp_score(14.0), 10.0);
    }

    #[test]
    fn test_strength_from_score_clamps() {
        assert_eq!(strength_from_score(-2.0), 0);
        assert_eq!(strength_from_score(7.0), 70);
        assert_eq!(strength_from_score(25.0), 100);
    }

    #[test]
    fn test_open_statuses() {
        assert!(SignalStatus::New.is_open());
        assert!(SignalStatus::InProgress.is_open());
        assert!(!SignalStatus::HitTarget.is_open());
        assert!(!SignalStatus::Expired.is_open());
    }
}
