//! Fundamental bucket unit of the container index.

use std::sync::Arc;

use cellar_common::Status;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::info;

use crate::container::Container;
use crate::LOG_TARGET;

/// One concurrently accessed slice of the container index.
pub struct ContainerBucket {
    index: u16,
    entries: DashMap<String, Arc<Container>>,
}

impl ContainerBucket {
    pub fn new(index: u16) -> Self {
        Self {
            index,
            entries: DashMap::new(),
        }
    }

    /// Inserts a container into the bucket. Fails if a live entry with the
    /// same name is already present.
    pub fn insert(&self, container: Arc<Container>) -> Result<(), Status> {
        match self.entries.entry(container.name().to_string()) {
            Entry::Occupied(_) => Err(Status::ContainerInsertionCollision),
            Entry::Vacant(slot) => {
                info!(
                    target: LOG_TARGET,
                    "Inserted container into the bucket map. ContainerName={}, BucketIndex={}.",
                    container.name(),
                    self.index
                );
                slot.insert(container);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<Container>> {
        self.entries.get(name).map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshot of every container in the bucket, live and soft-deleted.
    pub fn all(&self) -> Vec<Arc<Container>> {
        self.entries
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Removes a container from the bucket. Subsequent lookups no longer see
    /// it; memory is freed once every outstanding reference drops.
    pub fn remove(&self, name: &str) -> Result<(), Status> {
        match self.entries.remove(name) {
            Some((_, container)) => {
                info!(
                    target: LOG_TARGET,
                    "Deleted container reference from the bucket map. ContainerMetadata={}.",
                    container.describe()
                );
                Ok(())
            }
            None => Err(Status::ContainerNotExists),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
