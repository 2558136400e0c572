//! Data Transfer Service End-to-End Harness
//!
//! Seeds a source archive store, runs a transfer client (producer) against a
//! transfer server (consumer) for a fixed time window, then checks the
//! target store against the regenerated seed.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod orchestrator;
pub mod records;
pub mod store;
pub mod transfer;
pub mod verifier;
pub mod window;

pub use config::{HarnessConfig, ProducerAnchor};
pub use error::{HarnessError, Result};
pub use orchestrator::{Harness, RunOutcome, RunState};
pub use records::Record;
pub use verifier::{Mismatch, Verdict};
pub use window::TimeWindow;
