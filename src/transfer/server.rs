//! Transfer Server
//!
//! Accepts archive batches over HTTP and writes them into the target store.
//! Binding happens eagerly in `TransferServer::bind` so a port conflict is
//! reported to the caller instead of surfacing later on the server thread.

use std::{
    net::{SocketAddr, TcpListener},
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use super::wire::{ArchiveBatch, BatchAck};
use crate::store::ArchiveStore;

/// Configuration for the transfer server
#[derive(Debug, Clone)]
pub struct TransferServerConfig {
    /// Address to listen on (port 0 = ephemeral)
    pub bind_addr: SocketAddr,
    /// Target store written by the server
    pub target_path: PathBuf,
    /// Archive table definition applied on open
    pub schema_sql: String,
    /// Route that accepts batches
    pub api_path: String,
}

/// Statistics for the transfer server
#[derive(Debug, Default)]
pub struct TransferServerStats {
    pub batches_received: AtomicU64,
    pub records_received: AtomicU64,
    pub records_inserted: AtomicU64,
    pub store_errors: AtomicU64,
}

impl TransferServerStats {
    pub fn snapshot(&self) -> TransferServerStatsSnapshot {
        TransferServerStatsSnapshot {
            batches_received: self.batches_received.load(Ordering::Relaxed),
            records_received: self.records_received.load(Ordering::Relaxed),
            records_inserted: self.records_inserted.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct TransferServerStatsSnapshot {
    pub batches_received: u64,
    pub records_received: u64,
    pub records_inserted: u64,
    pub store_errors: u64,
}

#[derive(Clone)]
struct ServerState {
    store: Arc<Mutex<ArchiveStore>>,
    stats: Arc<TransferServerStats>,
}

/// A bound, not yet serving, transfer server
pub struct TransferServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    state: ServerState,
    api_path: String,
}

impl TransferServer {
    /// Bind the listening socket and open the target store.
    pub fn bind(config: TransferServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.bind_addr)
            .with_context(|| format!("Failed to bind transfer server on {}", config.bind_addr))?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let store = ArchiveStore::open_or_create(&config.target_path, &config.schema_sql)?;
        info!(
            addr = %local_addr,
            target = %config.target_path.display(),
            "transfer server bound"
        );

        Ok(Self {
            listener,
            local_addr,
            state: ServerState {
                store: Arc::new(Mutex::new(store)),
                stats: Arc::new(TransferServerStats::default()),
            },
            api_path: config.api_path,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> Arc<TransferServerStats> {
        self.state.stats.clone()
    }

    /// Serve until `shutdown` fires or its sender is dropped (blocking).
    ///
    /// Runs its own tokio runtime so it can live on a plain worker thread.
    pub fn serve(self, shutdown: oneshot::Receiver<()>) -> Result<()> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("transfer-server-rt")
            .enable_all()
            .build()
            .context("Failed to build transfer server runtime")?;

        let app = router(&self.api_path, self.state.clone());
        let local_addr = self.local_addr;
        let std_listener = self.listener;

        rt.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(std_listener)?;
            info!("Transfer server listening on {}", local_addr);
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown.await;
                    info!("Transfer server shutdown requested");
                })
                .await
                .context("Transfer server terminated abnormally")
        })?;

        info!("Transfer server stopped");
        Ok(())
    }
}

fn router(api_path: &str, state: ServerState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route(api_path, post(ingest))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn ingest(
    State(state): State<ServerState>,
    Json(batch): Json<ArchiveBatch>,
) -> Result<Json<BatchAck>, (StatusCode, String)> {
    state.stats.batches_received.fetch_add(1, Ordering::Relaxed);
    state
        .stats
        .records_received
        .fetch_add(batch.len() as u64, Ordering::Relaxed);

    let batch_id = batch.batch_id;
    let accepted = batch.len();
    let span = batch.span();

    let store = state.store.clone();
    let result = tokio::task::spawn_blocking(move || store.lock().insert_batch(&batch.records))
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("ingest task failed: {}", e)))?;

    match result {
        Ok(inserted) => {
            state
                .stats
                .records_inserted
                .fetch_add(inserted as u64, Ordering::Relaxed);
            debug!(%batch_id, accepted, inserted, ?span, "batch stored");
            Ok(Json(BatchAck {
                batch_id,
                accepted,
                inserted,
            }))
        }
        Err(e) => {
            state.stats.store_errors.fetch_add(1, Ordering::Relaxed);
            error!(%batch_id, error = %e, "failed to store batch");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}
