//! baldosa-daemon: availability and purchase service for the tile canvas.
//!
//! Single OS process running a Tokio async runtime. Clients talk to the
//! daemon via JSON-RPC over a Unix socket; a background worker keeps the
//! published chunk bitmaps in step with the ledger.

mod blob_fs;
mod commands;
mod config;
mod password;
mod publisher_http;
mod rpc;
mod state;

use std::sync::Arc;

use baldosa_map::blob::BlobStore;
use baldosa_map::ledger::{Ledger, SqliteLedger};
use baldosa_map::publisher::{NullPublisher, Publisher};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::blob_fs::FsBlobStore;
use crate::config::DaemonConfig;
use crate::publisher_http::HttpPublisher;
use crate::rpc::RpcServer;
use crate::state::DaemonState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = DaemonConfig::load()?;

    // 2. Initialize tracing. RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(format!("baldosa={}", config.advanced.log_level))
    })?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(version = env!("CARGO_PKG_VERSION"), "baldosa daemon starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // 3. Open the ledger
    let db_path = data_dir.join("baldosa.db");
    let ledger: Arc<dyn Ledger> = Arc::new(SqliteLedger::new(baldosa_db::open(&db_path)?));
    info!(path = ?db_path, "ledger opened");

    // 4. Blob buckets
    let submitted = FsBlobStore::new(
        "submitted",
        config.bucket_dir(&config.blob.submitted_dir),
        &config.blob.public_base_url,
        &config.blob.signing_secret,
    );
    let published = FsBlobStore::new(
        "published",
        config.bucket_dir(&config.blob.published_dir),
        &config.blob.public_base_url,
        &config.blob.signing_secret,
    );
    info!(
        submitted = ?submitted.root(),
        published = ?published.root(),
        "blob buckets ready"
    );
    let submitted: Arc<dyn BlobStore> = Arc::new(submitted);
    let published: Arc<dyn BlobStore> = Arc::new(published);

    // 5. Downstream publisher
    let publisher: Arc<dyn Publisher> = if config.publisher.enabled() {
        info!(addr = %config.publisher.addr, "publishing enabled");
        Arc::new(HttpPublisher::new(
            &config.publisher.addr,
            config.publisher.api_key.clone(),
            config.publisher.timeout(),
            ledger.clone(),
        )?)
    } else {
        info!("no publisher configured, publishing disabled");
        Arc::new(NullPublisher)
    };

    // 6. Wire the core and start the republish worker
    let (state, worker) = DaemonState::new(config, ledger, submitted, published, publisher);
    let worker_handle = tokio::spawn(worker.run(state.shutdown_tx.subscribe()));

    // 7. Start IPC server
    let socket_path = data_dir.join("daemon.sock");
    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());

    // 8. Run the RPC server until shutdown
    let mut shutdown_rx = state.shutdown_tx.subscribe();
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "RPC server error");
            }
        }
        _ = shutdown_rx.recv() => {
            info!("shutdown signal received");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    // Graceful shutdown
    info!("daemon shutting down gracefully");
    let _ = state.shutdown_tx.send(());
    if let Err(e) = worker_handle.await {
        error!(error = %e, "republish worker panicked");
    }

    // Clean up socket file
    let _ = std::fs::remove_file(&socket_path);

    info!("daemon stopped");
    Ok(())
}
