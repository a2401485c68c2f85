//! Container index: routes container names to their open records.
//!
//! The index is a fixed vector of concurrently accessed buckets. A name is
//! routed to its bucket by a stable hash; there are no cross-bucket
//! invariants, and each bucket operation is a single concurrent-map call.
//! A monotonic atomic mirrors the total entry count across buckets.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cellar_common::Status;

use crate::bucket::ContainerBucket;
use crate::container::Container;
use crate::engine::{PartitionHandle, INTERNAL_METADATA_PARTITION};

/// Tri-state existence of a container in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerExistence {
    NotExists,
    AlreadyExists,
    InDeletionProcess,
}

impl ContainerExistence {
    /// The status a request in this state resolves to when the state blocks
    /// the operation.
    pub fn as_status(self) -> Status {
        match self {
            ContainerExistence::NotExists => Status::ContainerNotExists,
            ContainerExistence::AlreadyExists => Status::ContainerAlreadyExists,
            ContainerExistence::InDeletionProcess => Status::ContainerInDeletionProcess,
        }
    }
}

pub struct ContainerIndex {
    buckets: Vec<ContainerBucket>,
    total_count: AtomicUsize,
}

impl ContainerIndex {
    pub fn new(number_buckets: u16) -> Self {
        let number_buckets = number_buckets.max(1);
        Self {
            buckets: (0..number_buckets).map(ContainerBucket::new).collect(),
            total_count: AtomicUsize::new(0),
        }
    }

    fn bucket_for(&self, name: &str) -> &ContainerBucket {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        name.hash(&mut hasher);
        let slot = (hasher.finish() % self.buckets.len() as u64) as usize;
        &self.buckets[slot]
    }

    /// Inserts a container record. Fails with a collision if a live entry
    /// with the same name already exists.
    pub fn insert(&self, container: Arc<Container>) -> Result<(), Status> {
        self.bucket_for(container.name()).insert(container)?;
        self.total_count.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Container>> {
        self.bucket_for(name).get(name)
    }

    pub fn existence(&self, name: &str) -> ContainerExistence {
        match self.get(name) {
            Some(container) if container.is_deleted() => ContainerExistence::InDeletionProcess,
            Some(_) => ContainerExistence::AlreadyExists,
            None => ContainerExistence::NotExists,
        }
    }

    /// Removes a container record; the record itself is freed when the last
    /// outstanding reference drops.
    pub fn remove(&self, name: &str) -> Result<(), Status> {
        self.bucket_for(name).remove(name)?;
        self.total_count.fetch_sub(1, Ordering::AcqRel);
        Ok(())
    }

    /// Snapshot of one bucket, for the garbage collector sweep.
    pub fn all_in_bucket(&self, bucket_index: usize) -> Vec<Arc<Container>> {
        self.buckets[bucket_index].all()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Total number of entries, active and soft-deleted.
    pub fn total_count(&self) -> usize {
        self.total_count.load(Ordering::Acquire)
    }

    /// Engine handle of the internal-metadata partition's record.
    pub fn internal_metadata_handle(&self) -> Result<PartitionHandle, Status> {
        self.get(INTERNAL_METADATA_PARTITION)
            .map(|container| container.handle())
            .ok_or(Status::MissingStorageEngineReference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerRecord;
    use crate::engine::{Engine, MemoryEngine};

    fn new_container(engine: &Arc<MemoryEngine>, name: &str) -> Arc<Container> {
        let handle = engine.create_partition(name).unwrap();
        Arc::new(Container::new(
            Arc::clone(engine) as Arc<dyn Engine>,
            handle,
            ContainerRecord::new(name),
        ))
    }

    #[test]
    fn names_route_to_a_stable_bucket() {
        let index = ContainerIndex::new(8);
        let first = index.bucket_for("stable-name") as *const _;
        let second = index.bucket_for("stable-name") as *const _;
        assert_eq!(first, second);
    }

    #[test]
    fn insert_lookup_remove_updates_the_total() {
        let engine = Arc::new(MemoryEngine::new());
        let index = ContainerIndex::new(8);

        index.insert(new_container(&engine, "a")).unwrap();
        index.insert(new_container(&engine, "b")).unwrap();
        assert_eq!(index.total_count(), 2);
        assert_eq!(index.get("a").unwrap().name(), "a");

        index.remove("a").unwrap();
        assert_eq!(index.total_count(), 1);
        assert!(index.get("a").is_none());
    }

    #[test]
    fn at_most_one_live_entry_per_name() {
        let engine = Arc::new(MemoryEngine::new());
        let index = ContainerIndex::new(8);

        index.insert(new_container(&engine, "a")).unwrap();
        assert_eq!(
            index.insert(new_container(&engine, "a")).unwrap_err(),
            Status::ContainerInsertionCollision
        );
        assert_eq!(index.total_count(), 1);
    }

    #[test]
    fn existence_reflects_the_deletion_flag() {
        let engine = Arc::new(MemoryEngine::new());
        let index = ContainerIndex::new(8);

        assert_eq!(index.existence("a"), ContainerExistence::NotExists);

        let container = new_container(&engine, "a");
        index.insert(Arc::clone(&container)).unwrap();
        assert_eq!(index.existence("a"), ContainerExistence::AlreadyExists);

        container.mark_deleted();
        assert_eq!(index.existence("a"), ContainerExistence::InDeletionProcess);
    }

    #[test]
    fn internal_metadata_handle_requires_the_record() {
        let engine = Arc::new(MemoryEngine::new());
        let index = ContainerIndex::new(8);
        assert_eq!(
            index.internal_metadata_handle().unwrap_err(),
            Status::MissingStorageEngineReference
        );

        index
            .insert(new_container(&engine, INTERNAL_METADATA_PARTITION))
            .unwrap();
        assert_eq!(
            index
                .internal_metadata_handle()
                .unwrap()
                .partition_name(),
            INTERNAL_METADATA_PARTITION
        );
    }

    #[test]
    fn buckets_partition_the_namespace() {
        let engine = Arc::new(MemoryEngine::new());
        let index = ContainerIndex::new(4);
        for i in 0..32 {
            index
                .insert(new_container(&engine, &format!("container-{i}")))
                .unwrap();
        }

        let spread: usize = (0..index.bucket_count())
            .map(|i| index.all_in_bucket(i).len())
            .sum();
        assert_eq!(spread, 32);
        assert_eq!(index.total_count(), 32);
    }
}
