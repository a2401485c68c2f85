//! Cellar Data Store Binary
//!
//! Main entry point for the data store server: loads the configuration,
//! initializes logging, reconciles the storage subsystem from disk and
//! serves the HTTP API until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cellar_backend_lib::api::create_app;
use cellar_backend_lib::log::init_logging;
use cellar_backend_lib::services::Services;
use cellar_common::config::SystemConfig;
use cellar_common::shutdown::StopSource;
use cellar_storage::engine::{Engine, RocksEngine};
use cellar_storage::DataStoreRuntime;
use clap::Parser;
use tracing::{error, info};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "cellar-backend")]
#[command(about = "Cellar persistent object data store", long_about = None)]
struct Args {
    /// Config file path; defaults apply when omitted.
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => SystemConfig::from_file(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?,
        None => SystemConfig::default(),
    };

    config
        .set_up_system_directories()
        .context("Failed to create the system directories")?;

    // Session id correlates every log line of this process lifetime.
    let session_id = Uuid::new_v4();
    init_logging(&config.logger, session_id).context("Failed to initialize logging")?;

    info!(%session_id, "starting the cellar data store");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.server_number_threads.max(1))
        .enable_all()
        .build()
        .context("Failed to build the server runtime")?;

    runtime.block_on(serve(config))
}

async fn serve(config: SystemConfig) -> Result<()> {
    let stop_source = StopSource::new();

    // The storage subsystem reconciles on-disk state before the HTTP
    // surface accepts any request.
    let engine = Arc::new(RocksEngine::new(&config.storage)) as Arc<dyn Engine>;
    let store = DataStoreRuntime::start(engine, &config.storage, stop_source.token())
        .map_err(|status| anyhow::anyhow!("storage subsystem failed to start: {status}"))?;

    let app = create_app(Services::from_runtime(&store));

    let listener = tokio::net::TcpListener::bind((
        config.server.server_listener_ip_address.as_str(),
        config.server.port_number,
    ))
    .await
    .context("Failed to bind the TCP listener")?;

    info!(
        address = %config.server.server_listener_ip_address,
        port = config.server.port_number,
        "server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(stop_source))
        .await
        .context("Server error")?;

    // The server stopped accepting; drain the storage threads.
    store.wait_for_stop();
    info!("cellar data store stopped");

    Ok(())
}

/// Resolves when SIGINT or SIGTERM arrives, after flagging the process-wide
/// stop token so the storage threads begin draining.
async fn shutdown_signal(stop_source: StopSource) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install the SIGINT handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => error!("failed to install the SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("termination signal received; shutting down");
    stop_source.request_stop();
}
