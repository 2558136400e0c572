//! Harness Error Taxonomy
//!
//! Every failure that aborts a run maps to one variant here. A verification
//! mismatch is not an error: it is reported through `Verdict::Failed`.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("store already exists at {}", path.display())]
    StoreAlreadyExists { path: PathBuf },

    #[error("failed to initialize store at {}: {source}", path.display())]
    StoreInit {
        path: PathBuf,
        #[source]
        source: StoreFault,
    },

    #[error("{worker} worker failed: {reason}")]
    WorkerFailure { worker: &'static str, reason: String },

    #[error("{worker} worker did not terminate within {waited:?}")]
    WorkerJoinTimeout {
        worker: &'static str,
        waited: Duration,
    },

    #[error("failed to remove store at {}: {source}", path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read target store at {}: {source}", path.display())]
    TargetRead {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Underlying cause of a store initialization failure.
#[derive(Debug, Error)]
pub enum StoreFault {
    #[error("schema file unreadable: {0}")]
    Schema(#[from] std::io::Error),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl HarnessError {
    pub(crate) fn store_init(path: impl Into<PathBuf>, source: impl Into<StoreFault>) -> Self {
        Self::StoreInit {
            path: path.into(),
            source: source.into(),
        }
    }

    pub(crate) fn worker(worker: &'static str, err: &anyhow::Error) -> Self {
        Self::WorkerFailure {
            worker,
            reason: format!("{:#}", err),
        }
    }
}
