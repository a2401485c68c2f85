//! Logging setup for the data store.
//!
//! Installs a layered `tracing` subscriber: an `EnvFilter` (defaulting to
//! `info`), a human-readable stdout layer, and a per-session log file under
//! the configured logs directory. Records emitted through the `log` facade
//! by the storage crates are captured by the subscriber's log bridge.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use cellar_common::config::LoggerConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Initializes the global subscriber. Returns the path of the session log
/// file.
pub fn init_logging(config: &LoggerConfig, session_id: Uuid) -> std::io::Result<PathBuf> {
    let session_directory = config.logs_directory_path.join(format!(
        "{}-{}",
        config.logging_session_directory_prefix, session_id
    ));
    std::fs::create_dir_all(&session_directory)?;

    let log_file_path = session_directory.join(format!("{}.log", config.log_file_prefix));
    let log_file = Arc::new(File::create(&log_file_path)?);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // `try_init` so embedding contexts (tests, tooling) that already
    // installed a subscriber keep theirs.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(log_file),
        )
        .try_init();

    tracing::info!(
        component_name = %config.component_name,
        session_log_file = %log_file_path.display(),
        "logger initialized"
    );

    Ok(log_file_path)
}
