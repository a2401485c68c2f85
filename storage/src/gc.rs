//! Garbage collector for stale storage resources.
//!
//! One long-running thread sweeps the container index bucket by bucket.
//! Containers flagged as deleted have their partition dropped from the
//! engine first and their index record evicted second; the record's memory
//! (and the engine handle) is released once the last outstanding reference
//! drops. A failed partition drop leaves the entry for the next iteration.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cellar_common::shutdown::StopToken;
use log::{error, info};
use parking_lot::Mutex;

use crate::engine::Engine;
use crate::index::ContainerIndex;
use crate::LOG_TARGET;

pub struct GarbageCollector {
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl GarbageCollector {
    /// Starts the long-running garbage collector thread.
    pub fn start(
        engine: Arc<dyn Engine>,
        index: Arc<ContainerIndex>,
        interval_ms: u64,
        stop: StopToken,
    ) -> Self {
        info!(target: LOG_TARGET, "Starting garbage collector thread.");

        let worker = std::thread::Builder::new()
            .name("garbage-collector".to_string())
            .spawn(move || {
                let interval = Duration::from_millis(interval_ms.max(1));
                let mut iteration: u64 = 0;
                loop {
                    sweep(&engine, &index, iteration);
                    iteration += 1;
                    // Alertable sleep: wakes early when stop is requested.
                    if stop.wait_timeout(interval) {
                        break;
                    }
                }
                info!(target: LOG_TARGET, "Stopping garbage collector thread.");
            })
            .expect("failed to spawn the garbage collector thread");

        Self {
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Joins the collector thread in a blocking manner.
    pub fn wait_for_stop(&self) {
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

/// One full garbage collection pass over every index bucket.
pub(crate) fn sweep(engine: &Arc<dyn Engine>, index: &Arc<ContainerIndex>, iteration: u64) {
    let mut cleaned_up: u32 = 0;

    for bucket_index in 0..index.bucket_count() {
        for container in index.all_in_bucket(bucket_index) {
            if !container.is_deleted() {
                continue;
            }

            info!(
                target: LOG_TARGET,
                "Found tombstoned container during garbage collection; attempting to \
                 delete it. ContainerMetadata={}, BucketIndex={}, GcIteration={}.",
                container.describe(),
                bucket_index,
                iteration
            );

            if let Err(status) = engine.drop_partition(&container.handle()) {
                // Partition drop failed; the entry stays for a retry on the
                // next iteration.
                error!(
                    target: LOG_TARGET,
                    "Failed to drop container partition from the storage engine. \
                     ContainerMetadata={}, BucketIndex={}, GcIteration={}, Status={}.",
                    container.describe(),
                    bucket_index,
                    iteration,
                    status
                );
                continue;
            }

            match index.remove(container.name()) {
                Ok(()) => {
                    cleaned_up += 1;
                    info!(
                        target: LOG_TARGET,
                        "Container deleted from the storage engine and evicted from the \
                         index; memory is freed after the last reference drops. \
                         ContainerMetadata={}, GcIteration={}.",
                        container.describe(),
                        iteration
                    );
                }
                Err(status) => {
                    // The partition is gone but the record is stuck; this
                    // leaks the record for the session.
                    error!(
                        target: LOG_TARGET,
                        "Failed to evict container from the index after dropping its \
                         partition. ContainerMetadata={}, GcIteration={}, Status={}.",
                        container.describe(),
                        iteration,
                        status
                    );
                }
            }
        }
    }

    if cleaned_up > 0 {
        info!(
            target: LOG_TARGET,
            "Garbage collection iteration cleaned up tombstoned containers. \
             NumberContainersCleanedUp={}, GcIteration={}.",
            cleaned_up,
            iteration
        );
    }
}
