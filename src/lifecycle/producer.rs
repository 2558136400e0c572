//! Producer adapter: runs the transfer client on its own thread.

use std::{sync::Arc, time::Duration};

use crossbeam::channel::{bounded, Sender};
use parking_lot::Mutex;
use tracing::{debug, info};

use super::{Lifecycle, WorkerThread};
use crate::error::{HarnessError, Result};
use crate::transfer::client::{
    TransferClient, TransferClientConfig, TransferClientStats, TransferClientStatsSnapshot,
};

const NAME: &str = "producer";

pub struct ProducerWorker {
    config: TransferClientConfig,
    stop_tx: Mutex<Option<Sender<()>>>,
    thread: Option<WorkerThread>,
    stats: Option<Arc<TransferClientStats>>,
}

impl ProducerWorker {
    pub fn new(config: TransferClientConfig) -> Self {
        Self {
            config,
            stop_tx: Mutex::new(None),
            thread: None,
            stats: None,
        }
    }

    pub fn config(&self) -> &TransferClientConfig {
        &self.config
    }

    /// Client counters, once started.
    pub fn stats(&self) -> Option<TransferClientStatsSnapshot> {
        self.stats.as_ref().map(|s| s.snapshot())
    }
}

impl Lifecycle for ProducerWorker {
    fn name(&self) -> &'static str {
        NAME
    }

    fn start(&mut self) -> Result<()> {
        if self.thread.is_some() {
            return Ok(());
        }

        let client = TransferClient::new(self.config.clone())
            .map_err(|e| HarnessError::worker(NAME, &e))?;
        self.stats = Some(client.stats());

        let (tx, rx) = bounded(1);
        *self.stop_tx.lock() = Some(tx);
        self.thread = Some(WorkerThread::spawn(NAME, move || client.run(rx))?);

        info!(
            endpoint = %self.config.endpoint,
            interval_start = self.config.interval_start,
            "producer started"
        );
        Ok(())
    }

    fn stop(&self) {
        if let Some(tx) = self.stop_tx.lock().take() {
            // The client may already have exited and dropped its receiver.
            let _ = tx.send(());
            debug!("producer stop requested");
        }
    }

    fn join(&mut self, timeout: Duration) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread.join(timeout),
            None => Ok(()),
        }
    }

    fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for ProducerWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
