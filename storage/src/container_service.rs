//! Management service for container operations.
//!
//! Validates requests before they reach the serializer and owns the startup
//! reconciliation that rebuilds the container index from the engine's
//! on-disk state.

use std::collections::HashMap;
use std::sync::Arc;

use cellar_common::config::StorageConfig;
use cellar_common::Status;
use log::{error, info, warn};

use crate::container::{Container, ContainerRecord};
use crate::engine::{is_internal_partition, Engine, PartitionHandle, INTERNAL_METADATA_PARTITION};
use crate::index::{ContainerExistence, ContainerIndex};
use crate::serializer::{ContainerOperationSerializer, ContainerOptype};
use crate::validation::validate_container_name;
use crate::LOG_TARGET;

pub struct ContainerManagementService {
    config: StorageConfig,
    index: Arc<ContainerIndex>,
    serializer: Arc<ContainerOperationSerializer>,
}

impl ContainerManagementService {
    pub fn new(
        config: StorageConfig,
        index: Arc<ContainerIndex>,
        serializer: Arc<ContainerOperationSerializer>,
    ) -> Self {
        Self {
            config,
            index,
            serializer,
        }
    }

    /// Creates a container. Resolves once the serialized operation has run.
    pub async fn create_container(&self, name: &str) -> Status {
        if let Err(status) = validate_container_name(name, &self.config) {
            error!(
                target: LOG_TARGET,
                "Container creation request failed validation. \
                 ContainerNameSizeBytes={}, MaxContainerNameSizeBytes={}, Status={}.",
                name.len(),
                self.config.max_container_name_size_bytes,
                status
            );
            return status;
        }

        // Fail fast outside the serializer; the serializer re-checks under
        // its own serialization before acting.
        let existence = self.index.existence(name);
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

        if self.index.total_count() >= self.config.max_number_containers {
            error!(
                target: LOG_TARGET,
                "Container creation failed; container count is at the limit. \
                 ContainerName={}, TotalNumberContainers={}, MaxNumberContainers={}.",
                name,
                self.index.total_count(),
                self.config.max_number_containers
            );
            return Status::MaxNumberContainersReached;
        }

        self.await_serialized_operation(ContainerOptype::Create, name)
            .await
    }

    /// Removes a container. Resolves once the serialized operation has run.
    pub async fn remove_container(&self, name: &str) -> Status {
        if let Err(status) = validate_container_name(name, &self.config) {
            error!(
                target: LOG_TARGET,
                "Container removal request failed validation. \
                 ContainerNameSizeBytes={}, MaxContainerNameSizeBytes={}, Status={}.",
                name.len(),
                self.config.max_container_name_size_bytes,
                status
            );
            return status;
        }

        let existence = self.index.existence(name);
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

        self.await_serialized_operation(ContainerOptype::Remove, name)
            .await
    }

    async fn await_serialized_operation(&self, optype: ContainerOptype, name: &str) -> Status {
        match self.serializer.enqueue(optype, name.to_string()).await {
            Ok(status) => status,
            Err(_) => {
                error!(
                    target: LOG_TARGET,
                    "Serialized container operation was dropped before completion. \
                     ContainerName={}.",
                    name
                );
                Status::Fail
            }
        }
    }
}

/// Rebuilds the container index from the handles the engine returned at
/// startup. Runs before the HTTP surface starts.
///
/// On the true first boot (only the default partition present) the
/// internal-metadata partition is created here. Partitions without a
/// metadata row that are not internal are orphans from an earlier crash:
/// they are indexed tombstoned so the garbage collector drops them.
pub fn populate_container_index(
    engine: &Arc<dyn Engine>,
    index: &Arc<ContainerIndex>,
    handles: &mut HashMap<String, PartitionHandle>,
) -> Result<(), Status> {
    if handles.len() == 1 {
        info!(
            target: LOG_TARGET,
            "First data store boot detected; creating the internal metadata partition."
        );
        let handle = engine.create_partition(INTERNAL_METADATA_PARTITION).map_err(|status| {
            error!(
                target: LOG_TARGET,
                "Failed to create the internal metadata partition on first boot. Status={}.",
                status
            );
            status
        })?;
        handles.insert(INTERNAL_METADATA_PARTITION.to_string(), handle);
    }

    let metadata_handle = handles
        .get(INTERNAL_METADATA_PARTITION)
        .cloned()
        .ok_or_else(|| {
            error!(
                target: LOG_TARGET,
                "Failed to find the storage engine reference for the '{}' internal metadata.",
                INTERNAL_METADATA_PARTITION
            );
            Status::ContainersInternalMetadataLookupFailed
        })?;

    let known_rows = engine.iterate_all(&metadata_handle).map_err(|status| {
        error!(
            target: LOG_TARGET,
            "Failed to read the container metadata rows during startup. Status={}.", status
        );
        status
    })?;

    for (name, handle) in handles.iter() {
        match known_rows.get(name) {
            Some(row) => {
                // A known container: rebuild its record from the row.
                let record = ContainerRecord::from_bytes(row)?;
                index.insert(Arc::new(Container::new(
                    Arc::clone(engine),
                    handle.clone(),
                    record,
                )))?;

                info!(
                    target: LOG_TARGET,
                    "Found container on startup; indexed into the container index. \
                     ContainerName={}.",
                    name
                );
            }
            None => {
                // No metadata row: internal partitions are expected to lack
                // one; anything else is an orphan from an earlier crash.
                let record = ContainerRecord::new(name);
                index.insert(Arc::new(Container::new(
                    Arc::clone(engine),
                    handle.clone(),
                    record,
                )))?;

                if !is_internal_partition(name) {
                    warn!(
                        target: LOG_TARGET,
                        "Found orphaned container on startup; flagging it for garbage \
                         collection. ContainerName={}.",
                        name
                    );
                    index
                        .get(name)
                        .ok_or(Status::ContainerNotExists)?
                        .mark_deleted();
                }
            }
        }
    }

    Ok(())
}
