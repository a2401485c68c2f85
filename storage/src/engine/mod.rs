//! Storage engine adapter.
//!
//! The core depends on an abstract partitioned key/value store: named
//! partitions that can be created and dropped independently, synchronous
//! point operations, full-partition iteration and atomic multi-partition
//! write batches. [`rocks::RocksEngine`] is the production implementation
//! (one RocksDB column family per partition); [`memory::MemoryEngine`] is
//! the in-process twin used by tests.

pub mod memory;
pub mod rocks;

use std::collections::HashMap;
use std::sync::Arc;

use cellar_common::Status;

pub use memory::MemoryEngine;
pub use rocks::RocksEngine;

/// Name of the engine's default partition, present on every store.
pub const DEFAULT_PARTITION: &str = "default";

/// Reserved partition holding one metadata row per user container.
pub const INTERNAL_METADATA_PARTITION: &str = "_internal_metadata_:object_containers";

/// Whether a partition name belongs to the engine internals rather than to a
/// user container.
pub fn is_internal_partition(name: &str) -> bool {
    name == DEFAULT_PARTITION || name == INTERNAL_METADATA_PARTITION
}

/// Opaque reference identifying an open partition to the engine.
///
/// Handles are shared-owned by the container records holding them; the
/// engine releases the underlying resources when the partition is dropped or
/// the last holder closes its handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionHandle {
    name: Arc<str>,
}

impl PartitionHandle {
    pub(crate) fn new(name: &str) -> Self {
        Self { name: name.into() }
    }

    /// Partition name the handle resolves to inside the engine.
    pub fn partition_name(&self) -> &str {
        &self.name
    }
}

/// A single mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: String, data: Vec<u8> },
    Delete { key: String },
}

/// An ordered set of mutations, possibly spanning partitions, committed
/// atomically by [`Engine::execute_write_batch`].
#[derive(Debug, Default)]
pub struct WriteBatch {
    ops: Vec<(PartitionHandle, BatchOp)>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, handle: &PartitionHandle, key: &str, data: Vec<u8>) {
        self.ops.push((
            handle.clone(),
            BatchOp::Put {
                key: key.to_string(),
                data,
            },
        ));
    }

    pub fn delete(&mut self, handle: &PartitionHandle, key: &str) {
        self.ops.push((
            handle.clone(),
            BatchOp::Delete {
                key: key.to_string(),
            },
        ));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub(crate) fn ops(&self) -> &[(PartitionHandle, BatchOp)] {
        &self.ops
    }
}

/// Capability set the storage core requires from any engine implementation.
///
/// All calls are synchronous and may block on IO. Implementations must
/// guarantee that a `put` which returns success is write-ahead-logged, that
/// every partition returned by `list_partitions` can be opened via `start`,
/// and that dropping a partition permanently removes its keys.
pub trait Engine: Send + Sync {
    /// Opens the engine with the given partitions and returns a handle per
    /// partition name.
    fn start(&self, partition_names: &[String]) -> Result<HashMap<String, PartitionHandle>, Status>;

    /// Enumerates the partitions currently present on disk.
    fn list_partitions(&self) -> Result<Vec<String>, Status>;

    /// Creates a new partition and returns its handle.
    fn create_partition(&self, name: &str) -> Result<PartitionHandle, Status>;

    /// Permanently removes a partition and all of its keys.
    fn drop_partition(&self, handle: &PartitionHandle) -> Result<(), Status>;

    /// Releases a handle. Must be called exactly once per open handle, after
    /// which the handle is invalid.
    fn close_handle(&self, handle: &PartitionHandle) -> Result<(), Status>;

    fn put(&self, handle: &PartitionHandle, key: &str, data: &[u8]) -> Result<(), Status>;

    fn get(&self, handle: &PartitionHandle, key: &str) -> Result<Option<Vec<u8>>, Status>;

    fn delete(&self, handle: &PartitionHandle, key: &str) -> Result<(), Status>;

    /// Returns every key/value pair in the partition, unordered.
    fn iterate_all(&self, handle: &PartitionHandle) -> Result<HashMap<String, Vec<u8>>, Status>;

    /// Atomically commits a batch of mutations.
    fn execute_write_batch(&self, batch: WriteBatch) -> Result<(), Status>;
}
