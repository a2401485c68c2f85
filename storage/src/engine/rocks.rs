//! RocksDB-backed storage engine.
//!
//! One column family per partition. Handles are resolved to column families
//! by name on every call; the multi-threaded column family mode lets
//! partitions be created and dropped while readers and writers are active.

use std::collections::HashMap;
use std::path::PathBuf;

use cellar_common::config::StorageConfig;
use cellar_common::Status;
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use rocksdb::{
    BlockBasedOptions, BoundColumnFamily, Cache, ColumnFamilyDescriptor, DBWithThreadMode,
    IteratorMode, MultiThreaded, Options,
};

use crate::engine::{BatchOp, Engine, PartitionHandle, WriteBatch};
use crate::LOG_TARGET;

type Db = DBWithThreadMode<MultiThreaded>;

pub struct RocksEngine {
    db: RwLock<Option<Db>>,
    db_path: PathBuf,
    block_cache_size_mib: usize,
}

impl RocksEngine {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            db: RwLock::new(None),
            db_path: config.kv_store_path.clone(),
            block_cache_size_mib: config.storage_engine_block_cache_size_mib,
        }
    }

    /// Engine-wide RocksDB options: parallelism matching the logical core
    /// count, level-style compaction tuned against write stalls, and an
    /// LRU block cache.
    fn engine_options(&self) -> Options {
        let mut options = Options::default();
        options.create_if_missing(true);
        options.create_missing_column_families(true);

        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        options.increase_parallelism(parallelism as i32);
        options.optimize_level_style_compaction(512 * 1024 * 1024);

        let cache = Cache::new_lru_cache(self.block_cache_size_mib * 1024 * 1024);
        let mut table_options = BlockBasedOptions::default();
        table_options.set_block_cache(&cache);
        options.set_block_based_table_factory(&table_options);

        options
    }

    /// Runs `operation` against the open database, failing with
    /// `on_closed` when the engine has not been started.
    fn with_db<T>(
        &self,
        on_closed: Status,
        operation: impl FnOnce(&Db) -> Result<T, Status>,
    ) -> Result<T, Status> {
        let guard = self.db.read();
        match guard.as_ref() {
            Some(db) => operation(db),
            None => {
                error!(
                    target: LOG_TARGET,
                    "Storage engine API was called before the engine was started."
                );
                Err(on_closed)
            }
        }
    }
}

fn resolve_partition<'a>(
    db: &'a Db,
    handle: &PartitionHandle,
) -> Result<std::sync::Arc<BoundColumnFamily<'a>>, Status> {
    db.cf_handle(handle.partition_name()).ok_or_else(|| {
        error!(
            target: LOG_TARGET,
            "No storage engine reference found for partition. PartitionName={}.",
            handle.partition_name()
        );
        Status::MissingStorageEngineReference
    })
}

impl Engine for RocksEngine {
    fn start(&self, partition_names: &[String]) -> Result<HashMap<String, PartitionHandle>, Status> {
        let descriptors: Vec<ColumnFamilyDescriptor> = partition_names
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = Db::open_cf_descriptors(&self.engine_options(), &self.db_path, descriptors)
            .map_err(|e| {
                error!(
                    target: LOG_TARGET,
                    "An error occurred while trying to start the storage engine. \
                     NumberPartitionsOnDisk={}, StorageEngineError={}.",
                    partition_names.len(),
                    e
                );
                Status::StorageEngineStartupFailed
            })?;

        *self.db.write() = Some(db);

        info!(
            target: LOG_TARGET,
            "Storage engine started. DbPath={}, NumberPartitions={}.",
            self.db_path.display(),
            partition_names.len()
        );

        Ok(partition_names
            .iter()
            .map(|name| (name.clone(), PartitionHandle::new(name)))
            .collect())
    }

    fn list_partitions(&self) -> Result<Vec<String>, Status> {
        match Db::list_cf(&Options::default(), &self.db_path) {
            Ok(names) => Ok(names),
            Err(e) => {
                // A missing database directory is a valid first-boot state.
                if !self.db_path.join("CURRENT").exists() {
                    debug!(
                        target: LOG_TARGET,
                        "No database found on disk; treating as first boot. DbPath={}.",
                        self.db_path.display()
                    );
                    return Ok(Vec::new());
                }
                error!(
                    target: LOG_TARGET,
                    "Failed to enumerate the partitions on disk. StorageEngineError={}.", e
                );
                Err(Status::FetchContainersFromDiskFailed)
            }
        }
    }

    fn create_partition(&self, name: &str) -> Result<PartitionHandle, Status> {
        self.with_db(Status::ContainerCreationFailed, |db| {
            db.create_cf(name, &Options::default()).map_err(|e| {
                error!(
                    target: LOG_TARGET,
                    "Failed to create partition. PartitionName={}, StorageEngineError={}.",
                    name,
                    e
                );
                Status::ContainerCreationFailed
            })?;
            Ok(PartitionHandle::new(name))
        })
    }

    fn drop_partition(&self, handle: &PartitionHandle) -> Result<(), Status> {
        self.with_db(Status::ContainerStorageEngineDeletionFailed, |db| {
            db.drop_cf(handle.partition_name()).map_err(|e| {
                error!(
                    target: LOG_TARGET,
                    "Failed to drop partition from the storage engine. \
                     PartitionName={}, StorageEngineError={}.",
                    handle.partition_name(),
                    e
                );
                Status::ContainerStorageEngineDeletionFailed
            })
        })
    }

    fn close_handle(&self, handle: &PartitionHandle) -> Result<(), Status> {
        // Column family references are managed by the engine in the
        // multi-threaded mode; closing a handle is bookkeeping only.
        debug!(
            target: LOG_TARGET,
            "Closed storage engine reference. PartitionName={}.",
            handle.partition_name()
        );
        Ok(())
    }

    fn put(&self, handle: &PartitionHandle, key: &str, data: &[u8]) -> Result<(), Status> {
        self.with_db(Status::ObjectInsertionFailed, |db| {
            let cf = resolve_partition(db, handle)?;
            db.put_cf(&cf, key, data).map_err(|e| {
                error!(
                    target: LOG_TARGET,
                    "Failed to insert object into partition. ObjectId={}, PartitionName={}, \
                     StorageEngineError={}.",
                    key,
                    handle.partition_name(),
                    e
                );
                Status::ObjectInsertionFailed
            })
        })
    }

    fn get(&self, handle: &PartitionHandle, key: &str) -> Result<Option<Vec<u8>>, Status> {
        self.with_db(Status::ObjectRetrievalFailed, |db| {
            let cf = resolve_partition(db, handle)?;
            match db.get_pinned_cf(&cf, key) {
                Ok(Some(slice)) => Ok(Some(slice.as_ref().to_vec())),
                Ok(None) => Ok(None),
                Err(e) => {
                    error!(
                        target: LOG_TARGET,
                        "Failed to retrieve object from partition. ObjectId={}, \
                         PartitionName={}, StorageEngineError={}.",
                        key,
                        handle.partition_name(),
                        e
                    );
                    Err(Status::ObjectRetrievalFailed)
                }
            }
        })
    }

    fn delete(&self, handle: &PartitionHandle, key: &str) -> Result<(), Status> {
        self.with_db(Status::ObjectDeletionFailed, |db| {
            let cf = resolve_partition(db, handle)?;
            db.delete_cf(&cf, key).map_err(|e| {
                error!(
                    target: LOG_TARGET,
                    "Failed to remove object from partition. ObjectId={}, PartitionName={}, \
                     StorageEngineError={}.",
                    key,
                    handle.partition_name(),
                    e
                );
                Status::ObjectDeletionFailed
            })
        })
    }

    fn iterate_all(&self, handle: &PartitionHandle) -> Result<HashMap<String, Vec<u8>>, Status> {
        self.with_db(Status::ObjectsRetrievalFromContainerFailed, |db| {
            let cf = resolve_partition(db, handle)?;
            let mut objects = HashMap::new();
            for item in db.iterator_cf(&cf, IteratorMode::Start) {
                let (key, value) = item.map_err(|e| {
                    error!(
                        target: LOG_TARGET,
                        "Failed to iterate over partition. PartitionName={}, \
                         StorageEngineError={}.",
                        handle.partition_name(),
                        e
                    );
                    Status::ObjectsRetrievalFromContainerFailed
                })?;
                let key = String::from_utf8(key.to_vec()).map_err(|_| {
                    warn!(
                        target: LOG_TARGET,
                        "Found a non-UTF-8 key while iterating over partition. PartitionName={}.",
                        handle.partition_name()
                    );
                    Status::ParsingFailed
                })?;
                objects.insert(key, value.to_vec());
            }
            Ok(objects)
        })
    }

    fn execute_write_batch(&self, batch: WriteBatch) -> Result<(), Status> {
        self.with_db(Status::ObjectWriteBatchFailed, |db| {
            let mut engine_batch = rocksdb::WriteBatch::default();
            for (handle, op) in batch.ops() {
                let cf = resolve_partition(db, handle)?;
                match op {
                    BatchOp::Put { key, data } => engine_batch.put_cf(&cf, key, data),
                    BatchOp::Delete { key } => engine_batch.delete_cf(&cf, key),
                }
            }
            db.write(engine_batch).map_err(|e| {
                error!(
                    target: LOG_TARGET,
                    "Failed to commit objects write batch. NumberMutations={}, \
                     StorageEngineError={}.",
                    batch.len(),
                    e
                );
                Status::ObjectWriteBatchFailed
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DEFAULT_PARTITION;

    fn test_config(path: &std::path::Path) -> StorageConfig {
        StorageConfig {
            kv_store_path: path.to_path_buf(),
            storage_engine_block_cache_size_mib: 8,
            ..StorageConfig::default()
        }
    }

    fn started_engine(path: &std::path::Path) -> (RocksEngine, PartitionHandle) {
        let engine = RocksEngine::new(&test_config(path));
        let handles = engine.start(&[DEFAULT_PARTITION.to_string()]).unwrap();
        let default = handles.get(DEFAULT_PARTITION).unwrap().clone();
        (engine, default)
    }

    #[test]
    fn fresh_path_lists_no_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let engine = RocksEngine::new(&test_config(&dir.path().join("db")));
        assert!(engine.list_partitions().unwrap().is_empty());
    }

    #[test]
    fn put_get_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, default) = started_engine(dir.path());

        engine.put(&default, "k", b"v").unwrap();
        assert_eq!(engine.get(&default, "k").unwrap(), Some(b"v".to_vec()));

        engine.delete(&default, "k").unwrap();
        assert_eq!(engine.get(&default, "k").unwrap(), None);
    }

    #[test]
    fn created_partitions_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (engine, _) = started_engine(dir.path());
            let orders = engine.create_partition("orders").unwrap();
            engine.put(&orders, "o1", b"payload").unwrap();
        }

        let engine = RocksEngine::new(&test_config(dir.path()));
        let mut names = engine.list_partitions().unwrap();
        names.sort();
        assert_eq!(names, vec!["default".to_string(), "orders".to_string()]);

        let handles = engine.start(&names).unwrap();
        let orders = handles.get("orders").unwrap();
        assert_eq!(engine.get(orders, "o1").unwrap(), Some(b"payload".to_vec()));
    }

    #[test]
    fn dropped_partition_loses_its_keys() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, _) = started_engine(dir.path());

        let scratch = engine.create_partition("scratch").unwrap();
        engine.put(&scratch, "k", b"v").unwrap();
        engine.drop_partition(&scratch).unwrap();

        assert_eq!(
            engine.get(&scratch, "k").unwrap_err(),
            Status::MissingStorageEngineReference
        );
    }

    #[test]
    fn write_batch_commits_across_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, default) = started_engine(dir.path());
        let other = engine.create_partition("other").unwrap();

        engine.put(&default, "stale", b"old").unwrap();

        let mut batch = WriteBatch::new();
        batch.put(&default, "a", b"1".to_vec());
        batch.put(&other, "b", b"2".to_vec());
        batch.delete(&default, "stale");
        engine.execute_write_batch(batch).unwrap();

        assert_eq!(engine.get(&default, "a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(engine.get(&other, "b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(engine.get(&default, "stale").unwrap(), None);
    }

    #[test]
    fn iterate_all_returns_every_row() {
        let dir = tempfile::tempdir().unwrap();
        let (engine, default) = started_engine(dir.path());

        engine.put(&default, "a", b"1").unwrap();
        engine.put(&default, "b", b"2").unwrap();

        let all = engine.iterate_all(&default).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.get("a"), Some(&b"1".to_vec()));
        assert_eq!(all.get("b"), Some(&b"2".to_vec()));
    }

    #[test]
    fn calls_before_start_fail() {
        let dir = tempfile::tempdir().unwrap();
        let engine = RocksEngine::new(&test_config(dir.path()));
        let handle = PartitionHandle::new("default");
        assert_eq!(
            engine.put(&handle, "k", b"v").unwrap_err(),
            Status::ObjectInsertionFailed
        );
    }
}
