//! Container operation serializer.
//!
//! The storage engine offers no atomic partition lifecycle, so container
//! create/remove are linearized through a single dedicated thread draining a
//! FIFO queue. At most one operation runs at any instant and each observes
//! the index state left behind by its predecessors.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cellar_common::shutdown::StopToken;
use cellar_common::Status;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{error, info};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::container::{Container, ContainerRecord};
use crate::engine::Engine;
use crate::index::{ContainerExistence, ContainerIndex};
use crate::LOG_TARGET;

const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerOptype {
    Create,
    Remove,
}

struct ContainerOperation {
    optype: ContainerOptype,
    name: String,
    reply: oneshot::Sender<Status>,
}

pub struct ContainerOperationSerializer {
    sender: Sender<ContainerOperation>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ContainerOperationSerializer {
    /// Spawns the serializer thread.
    pub fn start(engine: Arc<dyn Engine>, index: Arc<ContainerIndex>, stop: StopToken) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();

        info!(target: LOG_TARGET, "Starting container operation serializer thread.");

        let worker = std::thread::Builder::new()
            .name("container-serializer".to_string())
            .spawn(move || serializer_loop(engine, index, receiver, stop))
            .expect("failed to spawn the container serializer thread");

        Self {
            sender,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Enqueues a serialized container operation. The final status arrives
    /// on the returned receiver once the operation has run.
    pub fn enqueue(&self, optype: ContainerOptype, name: String) -> oneshot::Receiver<Status> {
        let (reply, receiver) = oneshot::channel();
        let operation = ContainerOperation {
            optype,
            name,
            reply,
        };
        if let Err(rejected) = self.sender.send(operation) {
            let _ = rejected.0.reply.send(Status::Fail);
        }
        receiver
    }

    /// Joins the serializer thread in a blocking manner.
    pub fn wait_for_stop(&self) {
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

fn serializer_loop(
    engine: Arc<dyn Engine>,
    index: Arc<ContainerIndex>,
    receiver: Receiver<ContainerOperation>,
    stop: StopToken,
) {
    loop {
        match receiver.recv_timeout(QUEUE_POLL_INTERVAL) {
            Ok(operation) => execute_operation(&engine, &index, operation),
            Err(RecvTimeoutError::Timeout) => {
                if stop.is_stop_requested() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    // Drain whatever was enqueued before the stop request.
    while let Ok(operation) = receiver.try_recv() {
        execute_operation(&engine, &index, operation);
    }

    info!(target: LOG_TARGET, "Stopping container operation serializer thread.");
}

fn execute_operation(
    engine: &Arc<dyn Engine>,
    index: &Arc<ContainerIndex>,
    operation: ContainerOperation,
) {
    info!(
        target: LOG_TARGET,
        "Executing serialized container operation. Optype={:?}, ContainerName={}.",
        operation.optype,
        operation.name
    );

    let status = match operation.optype {
        ContainerOptype::Create => handle_creation(engine, index, &operation.name),
        ContainerOptype::Remove => handle_removal(engine, index, &operation.name),
    };

    let _ = operation.reply.send(status);
}

/// Creation path: partition first, then the metadata row, then the index
/// entry. A crash or failure midway leaves an orphaned partition for the
/// garbage collector or next-boot reconciliation to sweep; nothing is rolled
/// back here.
fn handle_creation(
    engine: &Arc<dyn Engine>,
    index: &Arc<ContainerIndex>,
    name: &str,
) -> Status {
    let existence = index.existence(name);
    if existence != ContainerExistence::NotExists {
        error!(
            target: LOG_TARGET,
            "Container creation failed; container is in a non-creatable state. \
             ContainerName={}, Status={}.",
            name,
            existence.as_status()
        );
        return existence.as_status();
    }

    let handle = match engine.create_partition(name) {
        Ok(handle) => handle,
        Err(status) => {
            error!(
                target: LOG_TARGET,
                "Storage engine failed to create the new container partition. \
                 ContainerName={}, Status={}.",
                name,
                status
            );
            return status;
        }
    };

    let record = ContainerRecord::new(name);
    let status = persist_metadata_row(engine, index, &record);
    if status.is_failure() {
        return status;
    }

    if let Err(status) = index.insert(Arc::new(Container::new(
        Arc::clone(engine),
        handle,
        record,
    ))) {
        error!(
            target: LOG_TARGET,
            "Container index insertion failed for the new container. \
             ContainerName={}, Status={}.",
            name,
            status
        );
        return status;
    }

    info!(
        target: LOG_TARGET,
        "Container creation succeeded. ContainerName={}.", name
    );

    Status::Success
}

fn persist_metadata_row(
    engine: &Arc<dyn Engine>,
    index: &Arc<ContainerIndex>,
    record: &ContainerRecord,
) -> Status {
    let serialized = match record.to_bytes() {
        Ok(bytes) => bytes,
        Err(status) => return status,
    };

    let metadata_handle = match index.internal_metadata_handle() {
        Ok(handle) => handle,
        Err(status) => {
            error!(
                target: LOG_TARGET,
                "Internal metadata partition reference is missing. ContainerName={}, Status={}.",
                record.name,
                status
            );
            return status;
        }
    };

    match engine.put(&metadata_handle, &record.name, &serialized) {
        Ok(()) => Status::Success,
        Err(status) => {
            error!(
                target: LOG_TARGET,
                "Storage engine failed to insert the metadata row for the new container. \
                 ContainerName={}, Status={}.",
                record.name,
                status
            );
            status
        }
    }
}

/// Removal path: the metadata row is deleted first, breaking the persistent
/// link, then the in-memory record is marked deleted for the garbage
/// collector. A crash in between leaves an orphan that startup
/// reconciliation flags on the next boot.
fn handle_removal(
    engine: &Arc<dyn Engine>,
    index: &Arc<ContainerIndex>,
    name: &str,
) -> Status {
    let existence = index.existence(name);
    if existence != ContainerExistence::AlreadyExists {
        error!(
            target: LOG_TARGET,
            "Container removal failed; container is in a non-deletable state. \
             ContainerName={}, Status={}.",
            name,
            existence.as_status()
        );
        return existence.as_status();
    }

    let metadata_handle = match index.internal_metadata_handle() {
        Ok(handle) => handle,
        Err(status) => return status,
    };

    if let Err(status) = engine.delete(&metadata_handle, name) {
        error!(
            target: LOG_TARGET,
            "Failed to remove the container metadata row. ContainerName={}, Status={}.",
            name,
            status
        );
        return status;
    }

    match index.get(name) {
        Some(container) => {
            container.mark_deleted();
            info!(
                target: LOG_TARGET,
                "Container marked for deletion. ContainerMetadata={}.",
                container.describe()
            );
            Status::Success
        }
        None => {
            // The record vanished between the existence check and here; the
            // partition stays behind until reconciliation sweeps it.
            error!(
                target: LOG_TARGET,
                "Failed to mark the container as deleted; resource is leaked for this \
                 session. ContainerName={}.",
                name
            );
            Status::ContainerNotExists
        }
    }
}
