//! SQLite-backed archive stores
//!
//! Both ends of the pipeline use the same single-table shape:
//! `archive(dateTime, usUnits, interval, outTemp)`, keyed by `dateTime`.
//! The source store is seeded once by the harness; the target store is
//! written only by the transfer server.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{HarnessError, Result};
use crate::records::{Record, SENTINEL_TAG};

/// One row of the `archive` table, named the way it travels on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArchiveRow {
    #[serde(rename = "dateTime")]
    pub date_time: i64,
    #[serde(rename = "usUnits")]
    pub us_units: i64,
    pub interval: i64,
    #[serde(rename = "outTemp")]
    pub out_temp: Option<f64>,
}

impl ArchiveRow {
    /// Test row with both tag columns set to the sentinel.
    pub fn from_record(record: Record) -> Self {
        Self {
            date_time: record.timestamp,
            us_units: SENTINEL_TAG,
            interval: SENTINEL_TAG,
            out_temp: Some(record.value),
        }
    }

    /// A missing measurement becomes NaN, which never compares equal.
    pub fn to_record(self) -> Record {
        Record::new(self.date_time, self.out_temp.unwrap_or(f64::NAN))
    }
}

/// Read the archive table definition from disk.
pub fn load_schema(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| HarnessError::store_init(path, e))
}

/// Create a fresh source store at `path`, apply `schema_sql` and insert every
/// record in a single transaction. Returns the number of rows written.
///
/// Fails with `StoreAlreadyExists` when a stale store is present; nothing is
/// left behind on a schema or insert failure other than the empty file.
pub fn create_source_store<I>(path: &Path, schema_sql: &str, records: I) -> Result<usize>
where
    I: IntoIterator<Item = Record>,
{
    if path.exists() {
        return Err(HarnessError::StoreAlreadyExists {
            path: path.to_path_buf(),
        });
    }

    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    let mut conn =
        Connection::open_with_flags(path, flags).map_err(|e| HarnessError::store_init(path, e))?;
    conn.execute_batch(schema_sql)
        .map_err(|e| HarnessError::store_init(path, e))?;

    let tx = conn
        .transaction()
        .map_err(|e| HarnessError::store_init(path, e))?;
    let mut inserted = 0usize;
    {
        let mut stmt = tx
            .prepare(
                "INSERT INTO archive (dateTime, usUnits, interval, outTemp)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .map_err(|e| HarnessError::store_init(path, e))?;
        for record in records {
            let row = ArchiveRow::from_record(record);
            inserted += stmt
                .execute(params![row.date_time, row.us_units, row.interval, row.out_temp])
                .map_err(|e| HarnessError::store_init(path, e))?;
        }
    }
    tx.commit().map_err(|e| HarnessError::store_init(path, e))?;

    info!(path = %path.display(), rows = inserted, "source store seeded");
    Ok(inserted)
}

/// Remove the store file at `path` and any journal left beside it.
///
/// Returns `Ok(false)` when there was nothing to remove, so calling it on a
/// missing store, or twice in a row, is a no-op.
pub fn remove_store(path: &Path) -> Result<bool> {
    let removed = match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(source) => {
            return Err(HarnessError::Cleanup {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    for suffix in ["-journal", "-wal", "-shm"] {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(suffix);
        let sidecar = PathBuf::from(sidecar);
        match std::fs::remove_file(&sidecar) {
            Ok(()) => debug!(path = %sidecar.display(), "removed store journal"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => return Err(HarnessError::Cleanup { path: sidecar, source }),
        }
    }

    if removed {
        debug!(path = %path.display(), "store removed");
    }
    Ok(removed)
}

/// Handle on one archive database.
pub struct ArchiveStore {
    conn: Connection,
    path: PathBuf,
}

impl ArchiveStore {
    /// Open (creating if needed) a writable store and make sure the archive
    /// table exists.
    pub fn open_or_create(path: &Path, schema_sql: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        conn.execute_batch(schema_sql)
            .context("Failed to initialize archive schema")?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing store without write access.
    pub fn open_read_only(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert a batch in one transaction, skipping timestamps already present.
    /// Returns how many rows were new.
    pub fn insert_batch(&mut self, rows: &[ArchiveRow]) -> rusqlite::Result<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO archive (dateTime, usUnits, interval, outTemp)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for row in rows {
                inserted +=
                    stmt.execute(params![row.date_time, row.us_units, row.interval, row.out_temp])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Rows with `from <= dateTime < to`, oldest first. `from = None` means
    /// no lower bound.
    pub fn rows_between(&self, from: Option<i64>, to: i64) -> rusqlite::Result<Vec<ArchiveRow>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT dateTime, usUnits, interval, outTemp
             FROM archive
             WHERE dateTime >= ?1 AND dateTime < ?2
             ORDER BY dateTime",
        )?;
        let rows = stmt
            .query_map(params![from.unwrap_or(i64::MIN), to], Self::row_to_archive)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Every record, ordered by timestamp.
    pub fn read_all(&self) -> rusqlite::Result<Vec<Record>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT dateTime, usUnits, interval, outTemp FROM archive ORDER BY dateTime",
        )?;
        let records = stmt
            .query_map([], Self::row_to_archive)?
            .map(|r| r.map(ArchiveRow::to_record))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn count(&self) -> rusqlite::Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM archive", [], |row| row.get(0))
    }

    pub fn latest_timestamp(&self) -> rusqlite::Result<Option<i64>> {
        self.conn
            .query_row("SELECT MAX(dateTime) FROM archive", [], |row| row.get(0))
            .optional()
            .map(Option::flatten)
    }

    fn row_to_archive(row: &rusqlite::Row<'_>) -> rusqlite::Result<ArchiveRow> {
        Ok(ArchiveRow {
            date_time: row.get(0)?,
            us_units: row.get(1)?,
            interval: row.get(2)?,
            out_temp: row.get(3)?,
        })
    }
}
