//! Consumer adapter: runs the transfer server on its own thread.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info};

use super::{Lifecycle, WorkerThread};
use crate::error::{HarnessError, Result};
use crate::transfer::server::{
    TransferServer, TransferServerConfig, TransferServerStats, TransferServerStatsSnapshot,
};

const NAME: &str = "consumer";

pub struct ConsumerWorker {
    config: TransferServerConfig,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    thread: Option<WorkerThread>,
    local_addr: Option<SocketAddr>,
    stats: Option<Arc<TransferServerStats>>,
}

impl ConsumerWorker {
    pub fn new(config: TransferServerConfig) -> Self {
        Self {
            config,
            shutdown_tx: Mutex::new(None),
            thread: None,
            local_addr: None,
            stats: None,
        }
    }

    /// Address actually bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Server counters, once started.
    pub fn stats(&self) -> Option<TransferServerStatsSnapshot> {
        self.stats.as_ref().map(|s| s.snapshot())
    }
}

impl Lifecycle for ConsumerWorker {
    fn name(&self) -> &'static str {
        NAME
    }

    fn start(&mut self) -> Result<()> {
        if self.thread.is_some() {
            return Ok(());
        }

        // Bind here so a port conflict fails start() rather than the thread.
        let server = TransferServer::bind(self.config.clone())
            .map_err(|e| HarnessError::worker(NAME, &e))?;
        let addr = server.local_addr();
        self.stats = Some(server.stats());

        let (tx, rx) = oneshot::channel();
        *self.shutdown_tx.lock() = Some(tx);
        self.thread = Some(WorkerThread::spawn(NAME, move || server.serve(rx))?);
        self.local_addr = Some(addr);

        info!(addr = %addr, "consumer started");
        Ok(())
    }

    fn stop(&self) {
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
            debug!("consumer stop requested");
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

impl Drop for ConsumerWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
