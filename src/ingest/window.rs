//! # Time Window
//! Trailing window (default 48h) an item's timestamp must fall into to be kept.
//!
//! An absent timestamp is always accepted: entries whose date could not be
//! parsed are treated as current instead of being silently dropped.

use chrono::{DateTime, Duration, Utc};

pub const DEFAULT_WINDOW_HOURS: u32 = 48;
/// Ten years. Larger values are clamped down to this.
pub const MAX_WINDOW_HOURS: u32 = 24 * 365 * 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    hours: u32,
}

impl TimeWindow {
    /// Create a window spanning `hours`, clamped to `1..=MAX_WINDOW_HOURS`.
    pub fn with_hours(hours: u32) -> Self {
        Self {
            hours: hours.clamp(1, MAX_WINDOW_HOURS),
        }
    }

    pub fn hours(&self) -> u32 {
        self.hours
    }

    /// Oldest instant still inside the window relative to `now`.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(Duration::hours(i64::from(self.hours)))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Whether `candidate` lies within the last `hours` before `now`.
    pub fn contains(&self, candidate: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match candidate {
            Some(ts) => ts >= self.cutoff(now),
            None => true,
        }
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self::with_hours(DEFAULT_WINDOW_HOURS)
    }
}
