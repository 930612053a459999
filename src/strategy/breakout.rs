// Breakout-retest state machine
//
// IDLE -> PENDING (breakout detected, awaiting retest)
//      -> CONFIRMED (price retests the level and closes back beyond it)
//      -> back to IDLE; or PENDING -> EXPIRED -> IDLE once the retest window
// passes. One pending record per side; the first detection wins until it is
// confirmed or expires.

use crate::models::{Candle, Side};

/// Bars a pending breakout stays alive waiting for its retest
pub const RETEST_WINDOW_BARS: usize = 6;

/// Retest tolerance as a multiple of ATR around the broken level
pub const RETEST_ATR_TOLERANCE: f64 = 0.3;

/// Volume multiple over its moving average required to open a pending record
pub const BREAKOUT_VOLUME_MULT: f64 = 1.5;

/// A detected breakout level awaiting retest
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingBreakout {
    pub level: f64,
    pub expires_at: usize,
}

/// Per-symbol breakout state, owned by exactly one evaluator per run
#[derive(Debug, Clone, Default)]
pub struct BreakoutTracker {
    pending_long: Option<PendingBreakout>,
    pending_short: Option<PendingBreakout>,
}

impl BreakoutTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self, side: Side) -> Option<&PendingBreakout> {
        match side {
            Side::Long => self.pending_long.as_ref(),
            Side::Short => self.pending_short.as_ref(),
        }
    }

    /// Drop pending records whose retest window has passed
    pub fn expire(&mut self, index: usize) {
        if let Some(p) = &self.pending_long {
            if index > p.expires_at {
                self.pending_long = None;
            }
        }
        if let Some(p) = &self.pending_short {
            if index > p.expires_at {
                self.pending_short = None;
            }
        }
    }

    /// Record a breakout at `index` unless one is already pending for that
    /// side. Returns true when a new record was opened.
    pub fn observe_breakout(&mut self, side: Side, level: f64, index: usize) -> bool {
        let slot = match side {
            Side::Long => &mut self.pending_long,
            Side::Short => &mut self.pending_short,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(PendingBreakout {
            level,
            expires_at: index + RETEST_WINDOW_BARS,
        });
        true
    }

    /// Check whether `candle` confirms the retest: price returns within
    /// `tolerance` of the level and closes back beyond it. On confirmation
    /// the pending record is cleared in the same step and the level returned.
    pub fn confirm_retest(&mut self, side: Side, candle: &Candle, tolerance: f64) -> Option<f64> {
        match side {
            Side::Long => {
                let pending = self.pending_long.as_ref()?;
                if candle.low <= pending.level + tolerance && candle.close > pending.level {
                    let level = pending.level;
                    self.pending_long = None;
                    return Some(level);
                }
            }
            Side::Short => {
                let pending = self.pending_short.as_ref()?;
                if candle.high >= pending.level - tolerance && candle.close < pending.level {
                    let level = pending.level;
                    self.pending_short = None;
                    return Some(level);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candle(high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: Utc::now(),
            open: close,
            high,
            low,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn test_first_detection_wins() {
        let mut tracker = BreakoutTracker::new();
        assert!(tracker.observe_breakout(Side::Long, 100.0, 10));
        assert!(!tracker.observe_breakout(Side::Long, 105.0, 11));
        assert_eq!(tracker.pending(Side::Long).unwrap().level, 100.0);
    }

    #[test]
    fn test_sides_are_independent() {
        let mut tracker = BreakoutTracker::new();
        assert!(tracker.observe_breakout(Side::Long, 100.0, 10));
        assert!(tracker.observe_breakout(Side::Short, 90.0, 10));
        assert!(tracker.pending(Side::Long).is_some());
        assert!(tracker.pending(Side::Short).is_some());
    }

    #[test]
    fn test_pending_expires_strictly_after_window() {
        let mut tracker = BreakoutTracker::new();
        tracker.observe_breakout(Side::Long, 100.0, 10);

        tracker.expire(16); // index == expires_at keeps the record
        assert!(tracker.pending(Side::Long).is_some());

        tracker.expire(17);
        assert!(tracker.pending(Side::Long).is_none());
    }

    #[test]
    fn test_long_retest_confirms_and_clears() {
        let mut tracker = BreakoutTracker::new();
        tracker.observe_breakout(Side::Long, 100.0, 10);

        // Pulls back to the level and closes back above it
        let confirmed = tracker.confirm_retest(Side::Long, &candle(101.0, 99.8, 100.6), 0.3);
        assert_eq!(confirmed, Some(100.0));
        assert!(tracker.pending(Side::Long).is_none());
    }

    #[test]
    fn test_long_retest_requires_close_beyond_level() {
        let mut tracker = BreakoutTracker::new();
        tracker.observe_breakout(Side::Long, 100.0, 10);

        // Touches the level but closes below it: breakout failed, stay pending
        let confirmed = tracker.confirm_retest(Side::Long, &candle(100.5, 99.8, 99.9), 0.3);
        assert_eq!(confirmed, None);
        assert!(tracker.pending(Side::Long).is_some());
    }

    #[test]
    fn test_long_retest_requires_touch_within_tolerance() {
        let mut tracker = BreakoutTracker::new();
        tracker.observe_breakout(Side::Long, 100.0, 10);

        // Never comes back near the level
        let confirmed = tracker.confirm_retest(Side::Long, &candle(103.0, 101.0, 102.5), 0.3);
        assert_eq!(confirmed, None);
    }

    #[test]
    fn test_short_retest_confirms() {
        let mut tracker = BreakoutTracker::new();
        tracker.observe_breakout(Side::Short, 90.0, 5);

        let confirmed = tracker.confirm_retest(Side::Short, &candle(90.2, 89.0, 89.4), 0.3);
        assert_eq!(confirmed, Some(90.0));
        assert!(tracker.pending(Side::Short).is_none());
    }

    #[test]
    fn test_confirm_without_pending_is_none() {
        let mut tracker = BreakoutTracker::new();
        assert_eq!(
            tracker.confirm_retest(Side::Long, &candle(101.0, 99.8, 100.6), 0.3),
            None
        );
    }
}
