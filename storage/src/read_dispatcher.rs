//! Read request dispatcher: a fixed pool of worker threads servicing object
//! retrieval tasks against the storage engine.
//!
//! The engine is blocking, so each worker ties up one thread for the
//! duration of a storage call. Replies go out before the frontline cache is
//! populated; a cache population failure is logged and never surfaced.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cellar_common::shutdown::StopToken;
use cellar_common::Status;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{error, info, warn};
use parking_lot::Mutex;

use crate::cache::FrontlineCache;
use crate::engine::Engine;
use crate::task::{ObjectIoTask, ObjectOptype, ObjectResponse};
use crate::LOG_TARGET;

const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct ReadIoDispatcher {
    sender: Sender<ObjectIoTask>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ReadIoDispatcher {
    pub fn start(
        number_threads: usize,
        engine: Arc<dyn Engine>,
        cache: Arc<FrontlineCache>,
        stop: StopToken,
    ) -> Self {
        let number_threads = number_threads.max(1);
        let (sender, receiver) = crossbeam_channel::unbounded::<ObjectIoTask>();

        info!(
            target: LOG_TARGET,
            "Starting read IO dispatcher thread pool. NumberReadIoThreads={}.", number_threads
        );

        let workers = (0..number_threads)
            .map(|worker_index| {
                let engine = Arc::clone(&engine);
                let cache = Arc::clone(&cache);
                let receiver = receiver.clone();
                let stop = stop.clone();
                std::thread::Builder::new()
                    .name(format!("read-io-{worker_index}"))
                    .spawn(move || worker_loop(engine, cache, receiver, stop))
                    .expect("failed to spawn a read IO worker thread")
            })
            .collect();

        Self {
            sender,
            workers: Mutex::new(workers),
        }
    }

    /// Enqueues a read IO task for the worker pool.
    pub fn enqueue(&self, task: ObjectIoTask) {
        if let Err(rejected) = self.sender.send(task) {
            rejected
                .0
                .reply
                .reply(ObjectResponse::status(Status::Fail));
        }
    }

    /// Joins every worker in a blocking manner.
    pub fn wait_for_stop(&self) {
        for worker in self.workers.lock().drain(..) {
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    engine: Arc<dyn Engine>,
    cache: Arc<FrontlineCache>,
    receiver: Receiver<ObjectIoTask>,
    stop: StopToken,
) {
    loop {
        match receiver.recv_timeout(QUEUE_POLL_INTERVAL) {
            Ok(task) => execute_read(&engine, &cache, task),
            Err(RecvTimeoutError::Timeout) => {
                if stop.is_stop_requested() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    while let Ok(task) = receiver.try_recv() {
        execute_read(&engine, &cache, task);
    }
}

fn execute_read(engine: &Arc<dyn Engine>, cache: &Arc<FrontlineCache>, task: ObjectIoTask) {
    let ObjectIoTask {
        request,
        container,
        reply,
    } = task;

    if request.optype != ObjectOptype::Get {
        // Misrouted tasks indicate a dispatch bug upstream.
        error!(
            target: LOG_TARGET,
            "Invalid optype scheduled on the read IO pool. Optype={:?}, ObjectId={}, \
             ContainerName={}.",
            request.optype,
            request.object_id,
            request.container_name
        );
        reply.reply(ObjectResponse::status(Status::InvalidOperation));
        return;
    }

    // The held container reference keeps the engine handle alive for the
    // whole storage call.
    let handle = container.handle();
    match engine.get(&handle, &request.object_id) {
        Ok(Some(data)) => {
            info!(
                target: LOG_TARGET,
                "Object retrieval succeeded. ObjectId={}, ContainerName={}.",
                request.object_id,
                request.container_name
            );

            let cached_copy = data.clone();
            reply.reply(ObjectResponse::with_data(data));

            // Populate the cache only after the requester has its answer.
            if let Err(status) =
                cache.put(&request.container_name, &request.object_id, cached_copy)
            {
                warn!(
                    target: LOG_TARGET,
                    "Frontline cache population failed after object retrieval. ObjectId={}, \
                     ContainerName={}, Status={}.",
                    request.object_id,
                    request.container_name,
                    status
                );
            }
        }
        Ok(None) => {
            error!(
                target: LOG_TARGET,
                "Object not found in its container. ObjectId={}, ContainerName={}.",
                request.object_id,
                request.container_name
            );
            reply.reply(ObjectResponse::status(Status::ObjectRetrievalFailed));
        }
        Err(status) => {
            error!(
                target: LOG_TARGET,
                "Object retrieval failed. ObjectId={}, ContainerName={}, Status={}.",
                request.object_id,
                request.container_name,
                status
            );
            reply.reply(ObjectResponse::status(status));
        }
    }
}
