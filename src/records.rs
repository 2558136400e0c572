//! Archive records and the deterministic test sequence.
//!
//! The same generator seeds the source store and, regenerated later with the
//! same parameters, serves as the oracle the target store is checked against.

use std::fmt;

use crate::window::TimeWindow;

/// Records emitted per configured interval.
pub const RECORDS_PER_INTERVAL: i64 = 3;

/// Spacing between consecutive generated records, in seconds.
pub const RECORD_STEP_SECS: i64 = 1;

/// Sentinel written to the unit-system and interval columns of test rows.
pub const SENTINEL_TAG: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Record {
    pub timestamp: i64,
    pub value: f64,
}

impl Record {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.timestamp, self.value)
    }
}

/// Lazy, finite record sequence. Restart it by calling `generate` again with
/// the same parameters.
#[derive(Debug, Clone)]
pub struct RecordSeq {
    next: i64,
    end: i64,
}

impl Iterator for RecordSeq {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        if self.next >= self.end {
            return None;
        }
        let ts = self.next;
        self.next += RECORD_STEP_SECS;
        Some(Record::new(ts, ts as f64))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = ((self.end - self.next).max(0) / RECORD_STEP_SECS) as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for RecordSeq {}

/// Generate `count * 3` records starting at `start`, one per second, each
/// with `value == timestamp`.
///
/// `interval` is part of the key so seed and oracle are always derived from
/// the same parameters; the record step itself is fixed.
pub fn generate(start: i64, interval: i64, count: i64) -> RecordSeq {
    debug_assert!(interval > 0, "generate: interval must be positive");
    let len = count.max(0) * RECORDS_PER_INTERVAL;
    RecordSeq {
        next: start,
        end: start + len * RECORD_STEP_SECS,
    }
}

/// The sequence seeded for `window`.
pub fn for_window(window: &TimeWindow) -> RecordSeq {
    generate(window.start, window.interval, window.interval_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let a: Vec<Record> = generate(1_700_000_000, 4, 3).collect();
        let b: Vec<Record> = generate(1_700_000_000, 4, 3).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_shape() {
        let seq = generate(50, 4, 3);
        assert_eq!(seq.len(), 9);
        let records: Vec<Record> = seq.collect();
        assert_eq!(records.first(), Some(&Record::new(50, 50.0)));
        assert_eq!(records.last(), Some(&Record::new(58, 58.0)));
        for pair in records.windows(2) {
            assert_eq!(pair[1].timestamp - pair[0].timestamp, RECORD_STEP_SECS);
        }
        assert!(records.iter().all(|r| r.value == r.timestamp as f64));
    }

    #[test]
    fn test_restartable() {
        let mut first = generate(10, 1, 2);
        first.next();
        first.next();
        assert_eq!(first.len(), 4);
        assert_eq!(generate(10, 1, 2).next(), Some(Record::new(10, 10.0)));
    }

    #[test]
    fn test_window_seed_matches_generate() {
        let window = TimeWindow::starting_at(1_000, 4, 3).unwrap();
        assert!(for_window(&window).eq(generate(1_000, 4, 3)));
        assert_eq!(for_window(&window).next().map(|r| r.timestamp), Some(window.start));
    }

    #[test]
    fn test_empty_for_non_positive_count() {
        assert_eq!(generate(0, 4, 0).count(), 0);
        assert_eq!(generate(0, 4, -2).count(), 0);
    }
}
