//! Runs the full data store API on the in-memory engine.
//!
//! Handy for poking at the HTTP surface without a RocksDB directory:
//!
//! ```sh
//! cargo run -p cellar-backend-lib --example in_memory_store
//! curl -X POST localhost:8080/containers -H 'content-type: application/json' \
//!   -d '{"object_container_name": "scratch"}'
//! ```

use std::sync::Arc;

use cellar_backend_lib::api::create_app;
use cellar_backend_lib::services::Services;
use cellar_common::config::StorageConfig;
use cellar_common::shutdown::StopSource;
use cellar_storage::engine::{Engine, MemoryEngine};
use cellar_storage::DataStoreRuntime;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    let config = StorageConfig::default();
    let stop = StopSource::new();
    let engine = Arc::new(MemoryEngine::new()) as Arc<dyn Engine>;
    let runtime = DataStoreRuntime::start(engine, &config, stop.token())
        .expect("in-memory storage runtime failed to start");

    let app = create_app(Services::from_runtime(&runtime));
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 8080))
        .await
        .expect("failed to bind 127.0.0.1:8080");

    println!("in-memory cellar listening on http://127.0.0.1:8080 (ctrl-c to stop)");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            stop.request_stop();
        })
        .await
        .expect("server error");

    runtime.wait_for_stop();
}
