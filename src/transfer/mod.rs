//! Reference Transfer Pipeline
//!
//! The pipeline under test, kept behind the lifecycle boundary:
//! - Client: reads the source store and posts batches once per interval
//! - Server: accepts batches over HTTP and writes the target store

pub mod client;
pub mod server;
pub mod wire;

pub use client::{TransferClient, TransferClientConfig, TransferClientStats};
pub use server::{TransferServer, TransferServerConfig, TransferServerStats};
pub use wire::{ArchiveBatch, BatchAck};
