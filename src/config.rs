//! Harness Configuration
//!
//! All values are compile-time defaults mirroring the reference run: a
//! transfer server on port 22322, three 4-second intervals, and the two
//! SQLite stores in the working directory.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::records::{RECORDS_PER_INTERVAL, RECORD_STEP_SECS};

pub const DEFAULT_SERVER_PORT: u16 = 22322;
pub const DEFAULT_INTERVAL_SECS: i64 = 4;
pub const DEFAULT_INTERVAL_COUNT: i64 = 3;
pub const SOURCE_DATABASE_FILENAME: &str = "source.db";
pub const TARGET_DATABASE_FILENAME: &str = "target.db";
pub const DATA_API_PATH: &str = "/data";

/// Which timestamp the producer is told its first interval starts at.
///
/// The reference run hands the client the window's *end*, so every seeded
/// record is backlog and goes out on the first flush. `WindowStart` makes the
/// client stream the seed interval by interval instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProducerAnchor {
    #[default]
    WindowEnd,
    WindowStart,
}

/// Main configuration for one harness run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Address the transfer server binds to
    pub server_host: String,
    /// Port for the transfer server (0 = ephemeral)
    pub server_port: u16,
    /// Path of the ingestion endpoint
    pub api_path: String,
    /// Interval length in seconds
    pub interval_secs: i64,
    /// Number of intervals the producer is expected to emit
    pub interval_count: i64,
    /// Directory holding both stores
    pub work_dir: PathBuf,
    pub source_db: String,
    pub target_db: String,
    /// Archive table definition applied to the source store
    pub schema_path: PathBuf,
    /// Upper bound on waiting for a stopped worker to exit
    #[serde(with = "duration_serde")]
    pub join_timeout: Duration,
    /// Per-request timeout for the transfer client
    #[serde(with = "duration_serde")]
    pub http_timeout: Duration,
    pub producer_anchor: ProducerAnchor,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: DEFAULT_SERVER_PORT,
            api_path: DATA_API_PATH.to_string(),
            interval_secs: DEFAULT_INTERVAL_SECS,
            interval_count: DEFAULT_INTERVAL_COUNT,
            work_dir: PathBuf::from("."),
            source_db: SOURCE_DATABASE_FILENAME.to_string(),
            target_db: TARGET_DATABASE_FILENAME.to_string(),
            schema_path: PathBuf::from(concat!(
                env!("CARGO_MANIFEST_DIR"),
                "/sql/archive_schema.sql"
            )),
            join_timeout: Duration::from_secs(30),
            http_timeout: Duration::from_secs(2),
            producer_anchor: ProducerAnchor::WindowEnd,
        }
    }
}

impl HarnessConfig {
    pub fn source_path(&self) -> PathBuf {
        self.work_dir.join(&self.source_db)
    }

    pub fn target_path(&self) -> PathBuf {
        self.work_dir.join(&self.target_db)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server_host, self.server_port)
            .parse()
            .map_err(|e| {
                HarnessError::InvalidConfig(format!(
                    "bad server address {}:{}: {}",
                    self.server_host, self.server_port, e
                ))
            })
    }

    /// Full URL of the ingestion endpoint served at `addr`.
    pub fn endpoint_url(&self, addr: SocketAddr) -> String {
        format!("http://{}{}", addr, self.api_path)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_secs <= 0 {
            return Err(HarnessError::InvalidConfig(format!(
                "interval_secs must be positive, got {}",
                self.interval_secs
            )));
        }
        if self.interval_count <= 0 {
            return Err(HarnessError::InvalidConfig(format!(
                "interval_count must be positive, got {}",
                self.interval_count
            )));
        }
        // Every seeded record must fall inside [start, end).
        let seed_span = self.interval_count * RECORDS_PER_INTERVAL * RECORD_STEP_SECS;
        let window_span = self.interval_secs * (self.interval_count + 1);
        if seed_span > window_span {
            return Err(HarnessError::InvalidConfig(format!(
                "{} intervals of {}s leave a {}s window, too short for {}s of seed records",
                self.interval_count, self.interval_secs, window_span, seed_span
            )));
        }
        if self.source_path() == self.target_path() {
            return Err(HarnessError::InvalidConfig(
                "source and target stores must be distinct files".to_string(),
            ));
        }
        if self.join_timeout.is_zero() {
            return Err(HarnessError::InvalidConfig(
                "join_timeout must be non-zero".to_string(),
            ));
        }
        if !self.api_path.starts_with('/') {
            return Err(HarnessError::InvalidConfig(format!(
                "api_path must start with '/', got {:?}",
                self.api_path
            )));
        }
        self.bind_addr().map(|_| ())
    }
}

// Serde helper for Duration (using milliseconds for simplicity)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
