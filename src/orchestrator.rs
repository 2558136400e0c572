//! Harness Orchestrator
//!
//! Sequences one end-to-end run:
//!
//! `Init -> Seeded -> Running -> Stopping -> Verified -> Cleaned`
//!
//! Any error moves the run to `Failed`. Started workers are still stopped and
//! joined on that path, and the stores are removed on every exit path unless
//! the run is in debug mode.

use std::thread;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::{HarnessConfig, ProducerAnchor};
use crate::error::{HarnessError, Result};
use crate::lifecycle::{ConsumerWorker, Lifecycle, ProducerWorker};
use crate::records;
use crate::store;
use crate::transfer::{TransferClientConfig, TransferServerConfig};
use crate::verifier::{self, Verdict, ABORTED_EXIT_STATUS};
use crate::window::{now_epoch_secs, TimeWindow};

/// Longest single sleep while waiting for the window to close, so an early
/// worker exit is noticed promptly.
const WAIT_STEP: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Seeded,
    Running,
    Stopping,
    Verified,
    Cleaned,
    Failed,
}

/// Result of a run that got as far as verification
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub window: TimeWindow,
    pub verdict: Verdict,
    pub final_state: RunState,
    /// True when debug mode left both stores on disk.
    pub stores_kept: bool,
}

/// Producer and consumer slots; filled as each one is started.
#[derive(Default)]
struct Workers {
    consumer: Option<ConsumerWorker>,
    producer: Option<ProducerWorker>,
}

impl Workers {
    fn each(&mut self) -> impl Iterator<Item = &mut dyn Lifecycle> {
        let producer = self.producer.as_mut().map(|w| w as &mut dyn Lifecycle);
        let consumer = self.consumer.as_mut().map(|w| w as &mut dyn Lifecycle);
        producer.into_iter().chain(consumer)
    }

    /// Producer first, so the server stays up while the client winds down.
    fn stop_all(&mut self) {
        for worker in self.each() {
            worker.stop();
        }
    }

    /// Join every started worker, even after one fails; returns the first
    /// failure.
    fn join_all(&mut self, timeout: Duration) -> Result<()> {
        let mut first_err = None;
        for worker in self.each() {
            if let Err(e) = worker.join(timeout) {
                error!(worker = worker.name(), error = %e, "worker join failed");
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    fn any_exited(&self) -> bool {
        let producer_down = self.producer.as_ref().is_some_and(|w| !w.is_running());
        let consumer_down = self.consumer.as_ref().is_some_and(|w| !w.is_running());
        producer_down || consumer_down
    }
}

/// Process exit status for a finished run: the verdict's status, or 2 when
/// the run aborted.
pub fn exit_status(result: &Result<RunOutcome>) -> u8 {
    match result {
        Ok(outcome) => outcome.verdict.exit_status(),
        Err(_) => ABORTED_EXIT_STATUS,
    }
}

pub struct Harness {
    config: HarnessConfig,
    debug: bool,
    state: RunState,
}

impl Harness {
    pub fn new(config: HarnessConfig, debug: bool) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            debug,
            state: RunState::Init,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// The window for a run starting now. Compute it once and pass the same
    /// value to `run`.
    pub fn plan_window(&self) -> Result<TimeWindow> {
        TimeWindow::from_wall_clock(self.config.interval_secs, self.config.interval_count)
    }

    /// Execute one run inside `window` (blocking until the window closes).
    pub fn run(&mut self, window: &TimeWindow) -> Result<RunOutcome> {
        info!(
            start = window.start,
            end = window.end,
            interval = window.interval,
            intervals = window.interval_count,
            "harness run starting"
        );

        let mut workers = Workers::default();
        let result = self.execute(window, &mut workers).map_err(|e| {
            self.transition(RunState::Failed);
            workers.stop_all();
            if let Err(join_err) = workers.join_all(self.config.join_timeout) {
                warn!(error = %join_err, "worker teardown after failure was incomplete");
            }
            e
        });
        drop(workers);

        let cleanup = if self.debug {
            info!(
                source = %self.config.source_path().display(),
                target = %self.config.target_path().display(),
                "debug mode: keeping stores"
            );
            Ok(())
        } else {
            self.cleanup()
        };

        match (result, cleanup) {
            (Ok(verdict), Ok(())) => {
                if !self.debug {
                    self.transition(RunState::Cleaned);
                }
                Ok(RunOutcome {
                    window: *window,
                    verdict,
                    final_state: self.state,
                    stores_kept: self.debug,
                })
            }
            (Ok(_), Err(cleanup_err)) => {
                self.transition(RunState::Failed);
                Err(cleanup_err)
            }
            (Err(run_err), Ok(())) => Err(run_err),
            (Err(run_err), Err(cleanup_err)) => {
                error!(error = %cleanup_err, "cleanup after failed run also failed");
                Err(run_err)
            }
        }
    }

    fn execute(&mut self, window: &TimeWindow, workers: &mut Workers) -> Result<Verdict> {
        let source_path = self.config.source_path();
        let target_path = self.config.target_path();

        // Stale stores from an earlier debug run; absence is fine.
        self.cleanup()?;
        let schema_sql = store::load_schema(&self.config.schema_path)?;
        store::create_source_store(&source_path, &schema_sql, records::for_window(window))?;
        self.transition(RunState::Seeded);

        // Server first so the endpoint exists before the client's first flush.
        let consumer = workers
            .consumer
            .insert(ConsumerWorker::new(TransferServerConfig {
                bind_addr: self.config.bind_addr()?,
                target_path: target_path.clone(),
                schema_sql,
                api_path: self.config.api_path.clone(),
            }));
        consumer.start()?;
        let addr = consumer.local_addr().ok_or(HarnessError::WorkerFailure {
            worker: "consumer",
            reason: "started without a bound address".to_string(),
        })?;

        let interval_start = match self.config.producer_anchor {
            ProducerAnchor::WindowEnd => window.end,
            ProducerAnchor::WindowStart => window.start,
        };
        let producer = workers
            .producer
            .insert(ProducerWorker::new(TransferClientConfig {
                endpoint: self.config.endpoint_url(addr),
                source_path,
                interval_secs: window.interval,
                interval_start,
                drain_until: Some(window.end),
                http_timeout: self.config.http_timeout,
            }));
        producer.start()?;
        self.transition(RunState::Running);

        self.wait_for_close(window, workers);

        self.transition(RunState::Stopping);
        workers.stop_all();
        workers.join_all(self.config.join_timeout)?;
        if let Some(stats) = workers.producer.as_ref().and_then(|w| w.stats()) {
            info!(?stats, "producer finished");
        }
        if let Some(stats) = workers.consumer.as_ref().and_then(|w| w.stats()) {
            info!(?stats, "consumer finished");
        }

        let verdict = verifier::verify_target_store(&target_path, window)?;
        self.transition(RunState::Verified);
        Ok(verdict)
    }

    /// Sleep until the window closes, or until a worker exits on its own.
    fn wait_for_close(&self, window: &TimeWindow, workers: &Workers) {
        loop {
            let remaining = window.remaining(now_epoch_secs());
            if remaining.is_zero() {
                return;
            }
            if workers.any_exited() {
                warn!(
                    remaining_secs = remaining.as_secs(),
                    "a worker exited before the window closed"
                );
                return;
            }
            thread::sleep(remaining.min(WAIT_STEP));
        }
    }

    fn cleanup(&self) -> Result<()> {
        let source = store::remove_store(&self.config.source_path());
        let target = store::remove_store(&self.config.target_path());
        source?;
        target?;
        Ok(())
    }

    fn transition(&mut self, next: RunState) {
        info!(from = ?self.state, to = ?next, "harness state");
        self.state = next;
    }
}
