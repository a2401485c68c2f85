//! Startup orchestration for the storage subsystem.
//!
//! Wires the engine, index, cache, dispatchers, serializer and garbage
//! collector together and runs the startup reconciliation: enumerate the
//! partitions on disk, open the engine over them, rebuild the container
//! index (flagging orphans) and only then let traffic in.

use std::sync::Arc;

use cellar_common::config::StorageConfig;
use cellar_common::shutdown::StopToken;
use cellar_common::Status;
use log::{error, info};

use crate::cache::FrontlineCache;
use crate::container_service::{populate_container_index, ContainerManagementService};
use crate::engine::{Engine, DEFAULT_PARTITION};
use crate::gc::GarbageCollector;
use crate::index::ContainerIndex;
use crate::object_service::ObjectManagementService;
use crate::read_dispatcher::ReadIoDispatcher;
use crate::serializer::ContainerOperationSerializer;
use crate::write_dispatcher::WriteIoDispatcher;
use crate::LOG_TARGET;

/// The running storage subsystem.
pub struct DataStoreRuntime {
    pub engine: Arc<dyn Engine>,
    pub index: Arc<ContainerIndex>,
    pub cache: Arc<FrontlineCache>,
    pub container_service: Arc<ContainerManagementService>,
    pub object_service: Arc<ObjectManagementService>,
    serializer: Arc<ContainerOperationSerializer>,
    read_dispatcher: Arc<ReadIoDispatcher>,
    write_dispatcher: Arc<WriteIoDispatcher>,
    garbage_collector: GarbageCollector,
}

impl DataStoreRuntime {
    /// Starts the storage subsystem over the given engine.
    ///
    /// The reconciliation steps run to completion before any dispatcher or
    /// the garbage collector starts, so the first sweep observes a fully
    /// rebuilt index.
    pub fn start(
        engine: Arc<dyn Engine>,
        config: &StorageConfig,
        stop: StopToken,
    ) -> Result<Self, Status> {
        // Enumerate the partitions recorded on disk. An empty listing means
        // a first boot, which still needs the engine's default partition to
        // open.
        let mut partition_names = engine.list_partitions()?;
        if partition_names.is_empty() {
            info!(
                target: LOG_TARGET,
                "No partitions found on disk; starting from a fresh data store."
            );
            partition_names.push(DEFAULT_PARTITION.to_string());
        }

        let mut handles = engine.start(&partition_names)?;

        let index = Arc::new(ContainerIndex::new(config.container_index_number_buckets));
        populate_container_index(&engine, &index, &mut handles).map_err(|status| {
            error!(
                target: LOG_TARGET,
                "Failed to populate the container index during startup. Status={}.", status
            );
            status
        })?;

        info!(
            target: LOG_TARGET,
            "Container index populated from disk. NumberContainers={}, NumberBuckets={}.",
            index.total_count(),
            index.bucket_count()
        );

        let cache = Arc::new(FrontlineCache::new(
            config.number_frontline_cache_shards,
            config.max_frontline_cache_shard_size_mib * 1024 * 1024,
            config.max_frontline_cache_shard_object_size_bytes,
            Arc::clone(&index),
        ));

        if config.number_write_io_threads > 1 {
            info!(
                target: LOG_TARGET,
                "Write IO is single-master batched; ignoring extra configured write \
                 threads. NumberWriteIoThreads={}.",
                config.number_write_io_threads
            );
        }

        let serializer = Arc::new(ContainerOperationSerializer::start(
            Arc::clone(&engine),
            Arc::clone(&index),
            stop.clone(),
        ));
        let read_dispatcher = Arc::new(ReadIoDispatcher::start(
            config.number_read_io_threads,
            Arc::clone(&engine),
            Arc::clone(&cache),
            stop.clone(),
        ));
        let write_dispatcher = Arc::new(WriteIoDispatcher::start(
            Arc::clone(&engine),
            Arc::clone(&cache),
            stop.clone(),
        ));

        let container_service = Arc::new(ContainerManagementService::new(
            config.clone(),
            Arc::clone(&index),
            Arc::clone(&serializer),
        ));
        let object_service = Arc::new(ObjectManagementService::new(
            config.clone(),
            Arc::clone(&index),
            Arc::clone(&write_dispatcher),
            Arc::clone(&read_dispatcher),
            Arc::clone(&cache),
        ));

        // The collector starts only after reconciliation so the initial
        // orphans are already flagged.
        let garbage_collector = GarbageCollector::start(
            Arc::clone(&engine),
            Arc::clone(&index),
            config.garbage_collector_periodic_interval_ms,
            stop,
        );

        Ok(Self {
            engine,
            index,
            cache,
            container_service,
            object_service,
            serializer,
            read_dispatcher,
            write_dispatcher,
            garbage_collector,
        })
    }

    /// Blocks until every storage thread has observed the stop request and
    /// exited.
    pub fn wait_for_stop(&self) {
        self.serializer.wait_for_stop();
        self.write_dispatcher.wait_for_stop();
        self.read_dispatcher.wait_for_stop();
        self.garbage_collector.wait_for_stop();
        info!(target: LOG_TARGET, "Storage subsystem stopped.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellar_common::shutdown::StopSource;
    use crate::engine::{MemoryEngine, INTERNAL_METADATA_PARTITION};
    use crate::index::ContainerExistence;

    fn test_config() -> StorageConfig {
        StorageConfig {
            garbage_collector_periodic_interval_ms: 20,
            number_read_io_threads: 2,
            container_index_number_buckets: 4,
            number_frontline_cache_shards: 4,
            ..StorageConfig::default()
        }
    }

    #[tokio::test]
    async fn fresh_boot_creates_the_internal_layout() {
        let engine = Arc::new(MemoryEngine::new());
        let stop = StopSource::new();
        let runtime = DataStoreRuntime::start(
            Arc::clone(&engine) as Arc<dyn Engine>,
            &test_config(),
            stop.token(),
        )
        .unwrap();

        assert!(engine.partition_exists(INTERNAL_METADATA_PARTITION));
        // Default partition plus the internal metadata record.
        assert_eq!(runtime.index.total_count(), 2);
        assert!(runtime.index.internal_metadata_handle().is_ok());

        stop.request_stop();
        runtime.wait_for_stop();
    }

    #[tokio::test]
    async fn full_object_lifecycle_through_the_services() {
        let engine = Arc::new(MemoryEngine::new()) as Arc<dyn Engine>;
        let stop = StopSource::new();
        let runtime =
            DataStoreRuntime::start(engine, &test_config(), stop.token()).unwrap();

        assert_eq!(
            runtime.container_service.create_container("c").await,
            Status::Success
        );
        assert_eq!(
            runtime
                .object_service
                .insert_object("c".to_string(), "k".to_string(), b"v".to_vec())
                .await,
            Status::Success
        );

        let response = runtime
            .object_service
            .get_object("c".to_string(), "k".to_string())
            .await;
        assert_eq!(response.status, Status::Success);
        assert_eq!(response.object_data, Some(b"v".to_vec()));

        stop.request_stop();
        runtime.wait_for_stop();
    }

    #[tokio::test]
    async fn orphan_recovery_across_restart() {
        let engine = Arc::new(MemoryEngine::new());

        // Simulate a crash between partition creation and the metadata row:
        // the partition exists, the metadata row does not.
        engine.start(&["default".to_string()]).unwrap();
        engine.create_partition(INTERNAL_METADATA_PARTITION).unwrap();
        engine.create_partition("half-created").unwrap();

        let stop = StopSource::new();
        let runtime = DataStoreRuntime::start(
            Arc::clone(&engine) as Arc<dyn Engine>,
            &test_config(),
            stop.token(),
        )
        .unwrap();

        // Reconciliation flags the orphan; the GC then drops it, after
        // which the name is creatable again.
        let mut recovered = false;
        for _ in 0..200 {
            if runtime.index.existence("half-created") == ContainerExistence::NotExists {
                recovered = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(recovered, "the orphan was never swept");
        assert!(!engine.partition_exists("half-created"));

        assert_eq!(
            runtime.container_service.create_container("half-created").await,
            Status::Success
        );

        stop.request_stop();
        runtime.wait_for_stop();
    }

    #[tokio::test]
    async fn remove_in_flight_then_recreate_after_gc() {
        let engine = Arc::new(MemoryEngine::new()) as Arc<dyn Engine>;
        let stop = StopSource::new();
        let runtime =
            DataStoreRuntime::start(engine, &test_config(), stop.token()).unwrap();

        runtime.container_service.create_container("c").await;
        runtime
            .object_service
            .insert_object("c".to_string(), "k".to_string(), b"v".to_vec())
            .await;

        assert_eq!(
            runtime.container_service.remove_container("c").await,
            Status::Success
        );

        // Tombstoned: object reads fail immediately.
        assert_eq!(
            runtime
                .object_service
                .get_object("c".to_string(), "k".to_string())
                .await
                .status,
            Status::ContainerNotExists
        );

        // Eventually the GC evicts the record and the name is reusable.
        let mut recreated = Status::Fail;
        for _ in 0..200 {
            recreated = runtime.container_service.create_container("c").await;
            if recreated == Status::Success {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(recreated, Status::Success);

        stop.request_stop();
        runtime.wait_for_stop();
    }
}
