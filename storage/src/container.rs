//! Container record.
//!
//! Containers are logical buckets holding closely related objects; each is
//! backed by one engine partition. An in-memory record can only exist after
//! its creation was committed to the engine's write-ahead log, and it is
//! shared by reference between the index, request handlers and dispatchers.

use std::sync::Arc;

use cellar_common::Status;
use log::{error, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::engine::{Engine, PartitionHandle};
use crate::LOG_TARGET;

/// Persistent metadata stored in the internal-metadata partition, one row
/// per container, keyed by container name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub name: String,
}

impl ContainerRecord {
    /// Default persistent metadata for a newly created container.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Status> {
        serde_json::to_vec(self).map_err(|e| {
            error!(
                target: LOG_TARGET,
                "Failed to serialize container metadata. ContainerName={}, Error={}.",
                self.name,
                e
            );
            Status::SerializationFailed
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Status> {
        serde_json::from_slice(bytes).map_err(|e| {
            error!(
                target: LOG_TARGET,
                "Failed to parse container metadata row. Error={}.", e
            );
            Status::ParsingFailed
        })
    }
}

struct ContainerState {
    handle: PartitionHandle,
    is_deleted: bool,
}

/// In-memory container record.
///
/// The engine handle is owned collectively by every live reference to the
/// record; it is released exactly once, when the last reference drops. The
/// deletion flag is one-way and in-memory only: persistent deletion is the
/// absence of the metadata row.
pub struct Container {
    engine: Arc<dyn Engine>,
    record: ContainerRecord,
    state: RwLock<ContainerState>,
}

impl Container {
    pub fn new(engine: Arc<dyn Engine>, handle: PartitionHandle, record: ContainerRecord) -> Self {
        Self {
            engine,
            record,
            state: RwLock::new(ContainerState {
                handle,
                is_deleted: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn record(&self) -> &ContainerRecord {
        &self.record
    }

    pub fn handle(&self) -> PartitionHandle {
        self.state.read().handle.clone()
    }

    pub fn is_deleted(&self) -> bool {
        self.state.read().is_deleted
    }

    /// Flags the container for garbage collection. One-way.
    pub fn mark_deleted(&self) {
        self.state.write().is_deleted = true;
    }

    /// Log-friendly rendering of the record.
    pub fn describe(&self) -> String {
        let state = self.state.read();
        format!(
            "{{Name={}, Partition={}, IsDeleted={}}}",
            self.record.name,
            state.handle.partition_name(),
            state.is_deleted
        )
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        info!(
            target: LOG_TARGET,
            "Removing last container reference from memory. ContainerMetadata={}.",
            self.describe()
        );

        let handle = self.state.read().handle.clone();
        if let Err(status) = self.engine.close_handle(&handle) {
            error!(
                target: LOG_TARGET,
                "Failed to close storage engine reference. ContainerMetadata={}, Status={}.",
                self.describe(),
                status
            );
        }
    }
}
