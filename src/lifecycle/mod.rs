//! Worker Lifecycle
//!
//! The orchestrator drives both ends of the pipeline through `Lifecycle`
//! only. Each adapter owns its worker and runs it on a dedicated thread.

pub mod consumer;
pub mod producer;

pub use consumer::ConsumerWorker;
pub use producer::ProducerWorker;

use std::{
    any::Any,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError};
use tracing::{debug, error};

use crate::error::{HarnessError, Result};

/// Start/stop/join contract shared by the producer and consumer adapters
pub trait Lifecycle {
    fn name(&self) -> &'static str;

    /// Launch the worker and return without waiting for it.
    fn start(&mut self) -> Result<()>;

    /// Ask the worker to terminate. Idempotent, and a no-op once the worker
    /// has exited on its own.
    fn stop(&self);

    /// Wait up to `timeout` for the worker thread to exit. A worker that
    /// outlives the timeout is detached and reported as failed.
    fn join(&mut self, timeout: Duration) -> Result<()>;

    /// Whether the worker thread is alive.
    fn is_running(&self) -> bool;
}

/// A named worker thread whose outcome is handed back over a channel, so the
/// wait for it can be bounded.
pub(crate) struct WorkerThread {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
    done: Receiver<anyhow::Result<()>>,
}

impl WorkerThread {
    pub(crate) fn spawn<F>(name: &'static str, body: F) -> Result<Self>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        let (tx, rx) = bounded(1);
        let handle = thread::Builder::new()
            .name(format!("dts-{}", name))
            .spawn(move || {
                let _ = tx.send(body());
            })
            .map_err(|e| HarnessError::WorkerFailure {
                worker: name,
                reason: format!("failed to spawn thread: {}", e),
            })?;

        debug!(worker = name, "worker thread spawned");
        Ok(Self {
            name,
            handle: Some(handle),
            done: rx,
        })
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    pub(crate) fn join(mut self, timeout: Duration) -> Result<()> {
        match self.done.recv_timeout(timeout) {
            Ok(outcome) => {
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
                debug!(worker = self.name, "worker thread joined");
                outcome.map_err(|e| HarnessError::worker(self.name, &e))
            }
            // The sender only disappears without a message if the body panicked.
            Err(RecvTimeoutError::Disconnected) => {
                let reason = match self.handle.take().map(JoinHandle::join) {
                    Some(Err(payload)) => format!("panicked: {}", panic_message(payload.as_ref())),
                    _ => "exited without reporting an outcome".to_string(),
                };
                Err(HarnessError::WorkerFailure {
                    worker: self.name,
                    reason,
                })
            }
            Err(RecvTimeoutError::Timeout) => {
                error!(
                    worker = self.name,
                    ?timeout,
                    "worker ignored stop request, abandoning its thread"
                );
                drop(self.handle.take());
                Err(HarnessError::WorkerJoinTimeout {
                    worker: self.name,
                    waited: timeout,
                })
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_clean_exit() {
        let worker = WorkerThread::spawn("test", || Ok(())).unwrap();
        assert!(worker.join(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_error_becomes_worker_failure() {
        let worker = WorkerThread::spawn("test", || anyhow::bail!("disk on fire")).unwrap();
        match worker.join(Duration::from_secs(5)) {
            Err(HarnessError::WorkerFailure { worker, reason }) => {
                assert_eq!(worker, "test");
                assert!(reason.contains("disk on fire"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_panic_becomes_worker_failure() {
        let worker = WorkerThread::spawn("test", || panic!("boom")).unwrap();
        match worker.join(Duration::from_secs(5)) {
            Err(HarnessError::WorkerFailure { reason, .. }) => {
                assert!(reason.contains("boom"), "reason was {}", reason);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_join_is_bounded() {
        let (_keep_alive, parked) = bounded::<()>(0);
        let worker = WorkerThread::spawn("stuck", move || {
            let _ = parked.recv_timeout(Duration::from_secs(30));
            Ok(())
        })
        .unwrap();

        let started = Instant::now();
        let err = worker.join(Duration::from_millis(200)).unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(
            err,
            HarnessError::WorkerJoinTimeout { worker: "stuck", .. }
        ));
    }
}
