//! Wall-clock abstraction
//!
//! The cache validity window depends on local wall time, so the clock is
//! injected rather than read globally.

use crate::cache::period;
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, Local};
use parking_lot::RwLock;
use std::sync::Arc;

/// Source of the current local time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;

    /// Current time in milliseconds since the Unix epoch
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }

    /// Start of the daily window containing the current time, resolved in
    /// this clock's time zone
    fn period_start(&self, refresh_hour: u8) -> DateTime<FixedOffset> {
        period::period_start(&self.now(), refresh_hour)
    }
}

/// Reads the host clock in the host time zone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }

    fn period_start(&self, refresh_hour: u8) -> DateTime<FixedOffset> {
        period::period_start(&Local::now(), refresh_hour)
    }
}

/// Manually driven clock for tests and replay.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<FixedOffset>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<FixedOffset>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    /// Parse an RFC 3339 timestamp, e.g. `2024-03-10T07:59:00+00:00`
    pub fn at(rfc3339: &str) -> Result<Self, chrono::ParseError> {
        DateTime::parse_from_rfc3339(rfc3339).map(Self::new)
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        *self.now.write() = now;
    }

    pub fn advance(&self, by: ChronoDuration) {
        let mut now = self.now.write();
        *now = *now + by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.read()
    }
}
