//! In-memory storage engine used by tests.
//!
//! Mirrors the durability-relevant behavior of the RocksDB engine closely
//! enough for the storage core to be exercised without touching disk:
//! partitions persist across `start` calls on the same instance (simulating
//! a process restart over the same files) and individual operation classes
//! can be switched to fail to drive error paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use cellar_common::Status;
use parking_lot::Mutex;

use crate::engine::{BatchOp, Engine, PartitionHandle, WriteBatch};

#[derive(Default)]
pub struct MemoryEngine {
    partitions: Mutex<HashMap<String, BTreeMap<String, Vec<u8>>>>,
    started: AtomicBool,
    fail_puts: AtomicBool,
    fail_creates: AtomicBool,
    fail_batches: AtomicBool,
    fail_partition_drops: AtomicBool,
    closed_handles: AtomicUsize,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `put` fail with `ObjectInsertionFailed`.
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `create_partition` fail.
    pub fn set_fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `execute_write_batch` fail.
    pub fn set_fail_batches(&self, fail: bool) {
        self.fail_batches.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `drop_partition` fail.
    pub fn set_fail_partition_drops(&self, fail: bool) {
        self.fail_partition_drops.store(fail, Ordering::SeqCst);
    }

    /// Number of handles released via `close_handle` so far.
    pub fn closed_handle_count(&self) -> usize {
        self.closed_handles.load(Ordering::SeqCst)
    }

    pub fn partition_exists(&self, name: &str) -> bool {
        self.partitions.lock().contains_key(name)
    }
}

impl Engine for MemoryEngine {
    fn start(&self, partition_names: &[String]) -> Result<HashMap<String, PartitionHandle>, Status> {
        let mut partitions = self.partitions.lock();
        for name in partition_names {
            partitions.entry(name.clone()).or_default();
        }
        self.started.store(true, Ordering::SeqCst);
        Ok(partition_names
            .iter()
            .map(|name| (name.clone(), PartitionHandle::new(name)))
            .collect())
    }

    fn list_partitions(&self) -> Result<Vec<String>, Status> {
        let mut names: Vec<String> = self.partitions.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn create_partition(&self, name: &str) -> Result<PartitionHandle, Status> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(Status::ContainerCreationFailed);
        }
        self.partitions
            .lock()
            .entry(name.to_string())
            .or_default();
        Ok(PartitionHandle::new(name))
    }

    fn drop_partition(&self, handle: &PartitionHandle) -> Result<(), Status> {
        if self.fail_partition_drops.load(Ordering::SeqCst) {
            return Err(Status::ContainerStorageEngineDeletionFailed);
        }
        self.partitions
            .lock()
            .remove(handle.partition_name())
            .map(|_| ())
            .ok_or(Status::ContainerStorageEngineDeletionFailed)
    }

    fn close_handle(&self, _handle: &PartitionHandle) -> Result<(), Status> {
        self.closed_handles.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn put(&self, handle: &PartitionHandle, key: &str, data: &[u8]) -> Result<(), Status> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(Status::ObjectInsertionFailed);
        }
        let mut partitions = self.partitions.lock();
        let partition = partitions
            .get_mut(handle.partition_name())
            .ok_or(Status::MissingStorageEngineReference)?;
        partition.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn get(&self, handle: &PartitionHandle, key: &str) -> Result<Option<Vec<u8>>, Status> {
        let partitions = self.partitions.lock();
        let partition = partitions
            .get(handle.partition_name())
            .ok_or(Status::MissingStorageEngineReference)?;
        Ok(partition.get(key).cloned())
    }

    fn delete(&self, handle: &PartitionHandle, key: &str) -> Result<(), Status> {
        let mut partitions = self.partitions.lock();
        let partition = partitions
            .get_mut(handle.partition_name())
            .ok_or(Status::MissingStorageEngineReference)?;
        partition.remove(key);
        Ok(())
    }

    fn iterate_all(&self, handle: &PartitionHandle) -> Result<HashMap<String, Vec<u8>>, Status> {
        let partitions = self.partitions.lock();
        let partition = partitions
            .get(handle.partition_name())
            .ok_or(Status::MissingStorageEngineReference)?;
        Ok(partition
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn execute_write_batch(&self, batch: WriteBatch) -> Result<(), Status> {
        if self.fail_batches.load(Ordering::SeqCst) {
            return Err(Status::ObjectWriteBatchFailed);
        }
        let mut partitions = self.partitions.lock();
        // Validate every target partition before mutating anything so a
        // failed batch leaves no partial state behind.
        for (handle, _) in batch.ops() {
            if !partitions.contains_key(handle.partition_name()) {
                return Err(Status::ObjectWriteBatchFailed);
            }
        }
        for (handle, op) in batch.ops() {
            let partition = partitions
                .get_mut(handle.partition_name())
                .expect("validated above");
            match op {
                BatchOp::Put { key, data } => {
                    partition.insert(key.clone(), data.clone());
                }
                BatchOp::Delete { key } => {
                    partition.remove(key);
                }
            }
        }
        Ok(())
    }
}
