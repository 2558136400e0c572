//! Target Store Verification
//!
//! Compares what reached the target store against the regenerated oracle,
//! position by position. The whole sequence is always scanned and every
//! mismatch is kept, including records missing from the end of the target
//! and extra records the oracle never produced.

use std::fmt;
use std::path::Path;
use std::process::ExitCode;

use tracing::{info, warn};

use crate::error::{HarnessError, Result};
use crate::records::{self, Record};
use crate::store::ArchiveStore;
use crate::window::TimeWindow;

pub const PASSED_EXIT_STATUS: u8 = 0;
pub const FAILED_EXIT_STATUS: u8 = 1;
/// The run aborted before a verdict was reached.
pub const ABORTED_EXIT_STATUS: u8 = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum Mismatch {
    /// Both sides have a record at `index` but they differ.
    Differs {
        index: usize,
        expected: Record,
        actual: Record,
    },
    /// The target ran out before the oracle did.
    Missing { index: usize, expected: Record },
    /// The target holds more records than the oracle.
    Unexpected { index: usize, actual: Record },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Differs {
                index,
                expected,
                actual,
            } => write!(f, "[{}] expected {} but found {}", index, expected, actual),
            Self::Missing { index, expected } => {
                write!(f, "[{}] expected {} but target has no record", index, expected)
            }
            Self::Unexpected { index, actual } => {
                write!(f, "[{}] unexpected extra record {}", index, actual)
            }
        }
    }
}

/// Outcome of one verification pass
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Passed {
        records: usize,
    },
    Failed {
        expected: usize,
        actual: usize,
        mismatches: Vec<Mismatch>,
    },
}

impl Verdict {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed { .. })
    }

    pub fn mismatches(&self) -> &[Mismatch] {
        match self {
            Self::Passed { .. } => &[],
            Self::Failed { mismatches, .. } => mismatches,
        }
    }

    /// Process exit status: 0 passed, 1 failed.
    pub fn exit_status(&self) -> u8 {
        if self.is_passed() {
            PASSED_EXIT_STATUS
        } else {
            FAILED_EXIT_STATUS
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed { records } => write!(
                f,
                "PASS: all {} records transferred unchanged from source to target",
                records
            ),
            Self::Failed {
                expected,
                actual,
                mismatches,
            } => {
                write!(
                    f,
                    "FAIL: {} mismatch(es); expected {} records, target holds {}",
                    mismatches.len(),
                    expected,
                    actual
                )?;
                for m in mismatches {
                    write!(f, "\n  {}", m)?;
                }
                Ok(())
            }
        }
    }
}

/// Compare `actual` with `oracle` element-wise.
pub fn verify<I>(actual: &[Record], oracle: I) -> Verdict
where
    I: IntoIterator<Item = Record>,
{
    let mut mismatches = Vec::new();
    let mut expected_len = 0usize;

    for (index, expected) in oracle.into_iter().enumerate() {
        expected_len += 1;
        match actual.get(index) {
            Some(found) if *found == expected => {}
            Some(found) => mismatches.push(Mismatch::Differs {
                index,
                expected,
                actual: *found,
            }),
            None => mismatches.push(Mismatch::Missing { index, expected }),
        }
    }

    for (index, extra) in actual.iter().enumerate().skip(expected_len) {
        mismatches.push(Mismatch::Unexpected {
            index,
            actual: *extra,
        });
    }

    if mismatches.is_empty() {
        Verdict::Passed {
            records: expected_len,
        }
    } else {
        Verdict::Failed {
            expected: expected_len,
            actual: actual.len(),
            mismatches,
        }
    }
}

/// Read the target store at `path` and verify it against the oracle seeded
/// for `window`.
pub fn verify_target_store(path: &Path, window: &TimeWindow) -> Result<Verdict> {
    let read = |source| HarnessError::TargetRead {
        path: path.to_path_buf(),
        source,
    };
    let store = ArchiveStore::open_read_only(path).map_err(read)?;
    let actual = store.read_all().map_err(read)?;

    let verdict = verify(&actual, records::for_window(window));
    match &verdict {
        Verdict::Passed { records } => info!(records, "target store verified"),
        Verdict::Failed {
            expected,
            actual,
            mismatches,
        } => warn!(
            expected,
            actual,
            mismatches = mismatches.len(),
            "target store does not match the seed"
        ),
    }
    Ok(verdict)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::generate;

    fn oracle() -> Vec<Record> {
        generate(1_000, 4, 3).collect()
    }

    #[test]
    fn test_identical_passes() {
        let verdict = verify(&oracle(), generate(1_000, 4, 3));
        assert_eq!(verdict, Verdict::Passed { records: 9 });
        assert!(verdict.mismatches().is_empty());
    }

    #[test]
    fn test_reports_every_difference() {
        let mut actual = oracle();
        actual[2].value = -1.0;
        actual[7].timestamp += 100;

        let verdict = verify(&actual, generate(1_000, 4, 3));
        let mismatches = verdict.mismatches();
        assert_eq!(mismatches.len(), 2);
        assert!(matches!(mismatches[0], Mismatch::Differs { index: 2, .. }));
        assert!(matches!(mismatches[1], Mismatch::Differs { index: 7, .. }));
    }

    #[test]
    fn test_short_target_fails() {
        let records = oracle();
        let verdict = verify(&records[..6], generate(1_000, 4, 3));
        match &verdict {
            Verdict::Failed {
                expected,
                actual,
                mismatches,
            } => {
                assert_eq!((*expected, *actual), (9, 6));
                assert_eq!(mismatches.len(), 3);
                assert!(mismatches
                    .iter()
                    .all(|m| matches!(m, Mismatch::Missing { .. })));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_target_fails() {
        let verdict = verify(&[], generate(1_000, 4, 3));
        assert!(!verdict.is_passed());
        assert_eq!(verdict.mismatches().len(), 9);
    }

    #[test]
    fn test_extra_records_fail() {
        let mut actual = oracle();
        actual.push(Record::new(2_000, 2_000.0));
        let verdict = verify(&actual, generate(1_000, 4, 3));
        assert_eq!(
            verdict.mismatches(),
            &[Mismatch::Unexpected {
                index: 9,
                actual: Record::new(2_000, 2_000.0)
            }]
        );
    }

    #[test]
    fn test_null_measurement_never_matches() {
        let mut actual = oracle();
        actual[0].value = f64::NAN;
        assert!(!verify(&actual, generate(1_000, 4, 3)).is_passed());
    }

    #[test]
    fn test_report_lists_mismatches() {
        let verdict = verify(&oracle()[..8], generate(1_000, 4, 3));
        let text = verdict.to_string();
        assert!(text.starts_with("FAIL: 1 mismatch(es)"));
        assert!(text.contains("[8] expected (1008, 1008)"));
    }

    #[test]
    fn test_exit_status_per_verdict() {
        let passed = verify(&oracle(), generate(1_000, 4, 3));
        assert_eq!(passed.exit_status(), 0);
        assert_eq!(
            format!("{:?}", passed.exit_code()),
            format!("{:?}", ExitCode::SUCCESS)
        );

        let failed = verify(&[], generate(1_000, 4, 3));
        assert_eq!(failed.exit_status(), 1);
        assert_eq!(
            format!("{:?}", failed.exit_code()),
            format!("{:?}", ExitCode::from(1))
        );
    }

    #[test]
    fn test_missing_target_store_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let window = TimeWindow::starting_at(1_000, 4, 3).unwrap();
        let err = verify_target_store(&dir.path().join("target.db"), &window).unwrap_err();
        assert!(matches!(err, HarnessError::TargetRead { .. }));
    }
}
