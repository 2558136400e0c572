//! Transfer Client
//!
//! Reads archive rows from the source store and posts them to the transfer
//! server once per interval. A cursor tracks the first timestamp not yet
//! acknowledged; it only advances when the server accepts a whole batch, so a
//! failed send is retried on the next tick.

use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use crossbeam::channel::{Receiver, RecvTimeoutError};
use tracing::{debug, info, warn};

use super::wire::{ArchiveBatch, BatchAck};
use crate::store::ArchiveStore;
use crate::window::now_epoch_secs;

/// Configuration for the transfer client
#[derive(Debug, Clone)]
pub struct TransferClientConfig {
    /// Full URL of the ingestion endpoint
    pub endpoint: String,
    /// Source store to read from
    pub source_path: PathBuf,
    /// Interval length in seconds
    pub interval_secs: i64,
    /// Start of the first live interval; everything older is backlog
    pub interval_start: i64,
    /// On stop, one last flush sends everything below this timestamp
    pub drain_until: Option<i64>,
    /// Per-request timeout
    pub http_timeout: Duration,
}

/// Client-side statistics
#[derive(Debug, Default)]
pub struct TransferClientStats {
    pub flushes: AtomicU64,
    pub batches_sent: AtomicU64,
    pub records_sent: AtomicU64,
    pub send_errors: AtomicU64,
}

impl TransferClientStats {
    pub fn snapshot(&self) -> TransferClientStatsSnapshot {
        TransferClientStatsSnapshot {
            flushes: self.flushes.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            records_sent: self.records_sent.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct TransferClientStatsSnapshot {
    pub flushes: u64,
    pub batches_sent: u64,
    pub records_sent: u64,
    pub send_errors: u64,
}

/// Exclusive upper timestamp the client may send at wall time `now`.
///
/// Before `interval_start` that is `interval_start` itself (the backlog);
/// afterwards it is the most recent interval boundary at or before `now`.
pub fn flush_upper_bound(interval_start: i64, interval: i64, now: i64) -> i64 {
    if now < interval_start {
        interval_start
    } else {
        interval_start + ((now - interval_start) / interval) * interval
    }
}

pub struct TransferClient {
    config: TransferClientConfig,
    http: reqwest::blocking::Client,
    source: ArchiveStore,
    cursor: Option<i64>,
    stats: Arc<TransferClientStats>,
}

impl TransferClient {
    /// Open the source store and build the HTTP client.
    pub fn new(config: TransferClientConfig) -> Result<Self> {
        if config.interval_secs <= 0 {
            anyhow::bail!(
                "interval_secs must be positive, got {}",
                config.interval_secs
            );
        }
        let source = ArchiveStore::open_read_only(&config.source_path).with_context(|| {
            format!("Failed to open source store {}", config.source_path.display())
        })?;
        let http = reqwest::blocking::Client::builder()
            .timeout(config.http_timeout)
            .pool_max_idle_per_host(0)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            config,
            http,
            source,
            cursor: None,
            stats: Arc::new(TransferClientStats::default()),
        })
    }

    pub fn stats(&self) -> Arc<TransferClientStats> {
        self.stats.clone()
    }

    pub fn cursor(&self) -> Option<i64> {
        self.cursor
    }

    /// Flush now, then once per interval until `stop` fires or its sender is
    /// dropped (blocking).
    pub fn run(mut self, stop: Receiver<()>) -> Result<()> {
        let tick = Duration::from_secs(self.config.interval_secs as u64);
        info!(
            endpoint = %self.config.endpoint,
            interval_start = self.config.interval_start,
            "Transfer client started"
        );

        loop {
            self.flush_at(now_epoch_secs())?;

            match stop.recv_timeout(tick) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if let Some(bound) = self.config.drain_until {
            let drained = self.flush_until(bound)?;
            debug!(bound, drained, "final drain flush");
        }

        info!(stats = ?self.stats.snapshot(), "Transfer client stopped");
        Ok(())
    }

    /// Send everything between the cursor and the upper bound for `now`.
    ///
    /// Returns the number of rows acknowledged. Source read failures are
    /// fatal; send failures are counted and retried on the next flush.
    pub fn flush_at(&mut self, now: i64) -> Result<usize> {
        let upper = flush_upper_bound(self.config.interval_start, self.config.interval_secs, now);
        self.flush_until(upper)
    }

    /// Send everything between the cursor and `upper` (exclusive).
    pub fn flush_until(&mut self, upper: i64) -> Result<usize> {
        self.stats.flushes.fetch_add(1, Ordering::Relaxed);
        if matches!(self.cursor, Some(c) if c >= upper) {
            return Ok(0);
        }

        let rows = self
            .source
            .rows_between(self.cursor, upper)
            .context("Failed to read source store")?;
        if rows.is_empty() {
            self.cursor = Some(upper);
            return Ok(0);
        }

        let batch = ArchiveBatch::new(rows);
        match self.send(&batch) {
            Ok(ack) if ack.accepted == batch.len() => {
                self.stats.batches_sent.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .records_sent
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
                debug!(
                    batch_id = %batch.batch_id,
                    accepted = ack.accepted,
                    inserted = ack.inserted,
                    upper,
                    "batch acknowledged"
                );
                self.cursor = Some(upper);
                Ok(ack.accepted)
            }
            Ok(ack) => {
                self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
                warn!(
                    batch_id = %batch.batch_id,
                    sent = batch.len(),
                    accepted = ack.accepted,
                    "partial acknowledgement, will resend"
                );
                Ok(0)
            }
            Err(e) => {
                self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
                warn!(batch_id = %batch.batch_id, error = %format!("{:#}", e), "send failed, will retry");
                Ok(0)
            }
        }
    }

    fn send(&self, batch: &ArchiveBatch) -> Result<BatchAck> {
        let ack = self
            .http
            .post(&self.config.endpoint)
            .json(batch)
            .send()?
            .error_for_status()?
            .json::<BatchAck>()?;
        Ok(ack)
    }
}
