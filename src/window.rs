//! Shared Transfer Window
//!
//! The single source of truth for run timing. The orchestrator computes one
//! `TimeWindow` from the wall clock and hands the same value to the producer,
//! the consumer and the verifier, so no component derives its own cutoffs.
//!
//! The window is half-open, `[start, end)`, and carries one interval of slack
//! past the last producer interval:
//!
//! `end = start + interval * (interval_count + 1)`

use std::time::Duration;

use serde::Serialize;

use crate::error::{HarnessError, Result};

/// Current wall-clock time in epoch seconds.
#[inline]
pub fn now_epoch_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimeWindow {
    /// Start of the window (inclusive), epoch seconds.
    pub start: i64,
    /// End of the window (exclusive), epoch seconds.
    pub end: i64,
    /// Interval length in seconds.
    pub interval: i64,
    /// Number of producer intervals, not counting the slack interval.
    pub interval_count: i64,
}

impl TimeWindow {
    /// Build the window beginning at `start`.
    pub fn starting_at(start: i64, interval: i64, interval_count: i64) -> Result<Self> {
        if interval <= 0 || interval_count <= 0 {
            return Err(HarnessError::InvalidConfig(format!(
                "window needs a positive interval and count, got interval={} count={}",
                interval, interval_count
            )));
        }
        Ok(Self {
            start,
            end: start + interval * (interval_count + 1),
            interval,
            interval_count,
        })
    }

    /// Build the window beginning now.
    pub fn from_wall_clock(interval: i64, interval_count: i64) -> Result<Self> {
        Self::starting_at(now_epoch_secs(), interval, interval_count)
    }

    #[inline]
    pub fn contains(&self, t: i64) -> bool {
        t >= self.start && t < self.end
    }

    /// Start of every interval inside the window, slack interval included.
    pub fn boundaries(&self) -> impl Iterator<Item = i64> + '_ {
        (0..=self.interval_count).map(move |k| self.start + k * self.interval)
    }

    /// Time left until the window closes, zero once it has.
    pub fn remaining(&self, now: i64) -> Duration {
        Duration::from_secs(self.end.saturating_sub(now).max(0) as u64)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs((self.end - self.start) as u64)
    }
}
