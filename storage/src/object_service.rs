//! Management service for object operations.
//!
//! Every object request is validated, resolved to a live container
//! reference and dispatched: inserts and removes to the write dispatcher,
//! reads to the frontline cache first and the read dispatcher on a miss.

use std::sync::Arc;

use cellar_common::config::StorageConfig;
use cellar_common::Status;
use log::{error, info};

use crate::cache::FrontlineCache;
use crate::container::Container;
use crate::index::ContainerIndex;
use crate::read_dispatcher::ReadIoDispatcher;
use crate::task::{ObjectIoTask, ObjectOptype, ObjectRequest, ObjectResponse, ReplyHandle};
use crate::validation::{validate_container_name, validate_object_data, validate_object_id};
use crate::write_dispatcher::WriteIoDispatcher;
use crate::LOG_TARGET;

pub struct ObjectManagementService {
    config: StorageConfig,
    index: Arc<ContainerIndex>,
    write_dispatcher: Arc<WriteIoDispatcher>,
    read_dispatcher: Arc<ReadIoDispatcher>,
    cache: Arc<FrontlineCache>,
}

impl ObjectManagementService {
    pub fn new(
        config: StorageConfig,
        index: Arc<ContainerIndex>,
        write_dispatcher: Arc<WriteIoDispatcher>,
        read_dispatcher: Arc<ReadIoDispatcher>,
        cache: Arc<FrontlineCache>,
    ) -> Self {
        Self {
            config,
            index,
            write_dispatcher,
            read_dispatcher,
            cache,
        }
    }

    /// Inserts an object into a container.
    pub async fn insert_object(
        &self,
        container_name: String,
        object_id: String,
        object_data: Vec<u8>,
    ) -> Status {
        let request = ObjectRequest::insert(container_name, object_id, object_data);
        if let Err(status) = self.validate_request(&request) {
            return status;
        }
        let container = match self.lookup_live_container(&request) {
            Ok(container) => container,
            Err(status) => return status,
        };

        self.dispatch_write(request, container).await
    }

    /// Removes an object from a container.
    pub async fn remove_object(&self, container_name: String, object_id: String) -> Status {
        let request = ObjectRequest::remove(container_name, object_id);
        if let Err(status) = self.validate_request(&request) {
            return status;
        }
        let container = match self.lookup_live_container(&request) {
            Ok(container) => container,
            Err(status) => return status,
        };

        self.dispatch_write(request, container).await
    }

    /// Retrieves an object, serving straight from the frontline cache when
    /// possible to avoid the context switch into the read pool and the
    /// engine call behind it.
    pub async fn get_object(&self, container_name: String, object_id: String) -> ObjectResponse {
        let request = ObjectRequest::get(container_name, object_id);
        if let Err(status) = self.validate_request(&request) {
            return ObjectResponse::status(status);
        }
        let container = match self.lookup_live_container(&request) {
            Ok(container) => container,
            Err(status) => return ObjectResponse::status(status),
        };

        if let Some(data) = self
            .cache
            .get(&request.container_name, &request.object_id)
        {
            info!(
                target: LOG_TARGET,
                "Frontline cache hit for get object operation. ObjectId={}, ContainerName={}.",
                request.object_id,
                request.container_name
            );
            return ObjectResponse::with_data(data);
        }

        let (reply, receiver) = ReplyHandle::channel();
        self.read_dispatcher
            .enqueue(ObjectIoTask::new(request, container, reply));

        match receiver.await {
            Ok(response) => response,
            Err(_) => ObjectResponse::status(Status::Fail),
        }
    }

    async fn dispatch_write(&self, request: ObjectRequest, container: Arc<Container>) -> Status {
        let (reply, receiver) = ReplyHandle::channel();
        self.write_dispatcher
            .enqueue(ObjectIoTask::new(request, container, reply));

        match receiver.await {
            Ok(response) => response.status,
            Err(_) => Status::Fail,
        }
    }

    fn validate_request(&self, request: &ObjectRequest) -> Result<(), Status> {
        validate_container_name(&request.container_name, &self.config).map_err(|status| {
            // Sizes only: malformed parameters are never logged verbatim.
            error!(
                target: LOG_TARGET,
                "Object operation failed; the container name is invalid. Optype={:?}, \
                 ContainerNameSizeBytes={}, MaxContainerNameSizeBytes={}, Status={}.",
                request.optype,
                request.container_name.len(),
                self.config.max_container_name_size_bytes,
                status
            );
            status
        })?;

        validate_object_id(&request.object_id, &self.config).map_err(|status| {
            error!(
                target: LOG_TARGET,
                "Object operation failed; the object id is invalid. Optype={:?}, \
                 ObjectIdSizeBytes={}, MaxObjectIdSizeBytes={}, Status={}.",
                request.optype,
                request.object_id.len(),
                self.config.max_object_id_size_bytes,
                status
            );
            status
        })?;

        if request.optype == ObjectOptype::Insert {
            validate_object_data(&request.object_data, &self.config).map_err(|status| {
                error!(
                    target: LOG_TARGET,
                    "Object operation failed; the object data stream is invalid. Optype={:?}, \
                     ObjectDataSizeBytes={}, MaxObjectDataSizeBytes={}, Status={}.",
                    request.optype,
                    request.object_data.len(),
                    self.config.max_object_data_size_bytes,
                    status
                );
                status
            })?;
        }

        Ok(())
    }

    /// Resolves the target container, failing when it is unknown or already
    /// in its deletion process.
    fn lookup_live_container(&self, request: &ObjectRequest) -> Result<Arc<Container>, Status> {
        match self.index.get(&request.container_name) {
            Some(container) if !container.is_deleted() => Ok(container),
            Some(_) | None => {
                error!(
                    target: LOG_TARGET,
                    "Container for object operation does not exist or is in deletion. \
                     Optype={:?}, ObjectId={}, ContainerName={}.",
                    request.optype,
                    request.object_id,
                    request.container_name
                );
                Err(Status::ContainerNotExists)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellar_common::shutdown::StopSource;
    use crate::container::ContainerRecord;
    use crate::engine::{Engine, MemoryEngine};

    struct Fixture {
        engine: Arc<MemoryEngine>,
        index: Arc<ContainerIndex>,
        cache: Arc<FrontlineCache>,
        service: ObjectManagementService,
        stop: StopSource,
        read_dispatcher: Arc<ReadIoDispatcher>,
        write_dispatcher: Arc<WriteIoDispatcher>,
    }

    fn fixture(config: StorageConfig) -> Fixture {
        let engine = Arc::new(MemoryEngine::new());
        let dyn_engine = Arc::clone(&engine) as Arc<dyn Engine>;
        let index = Arc::new(ContainerIndex::new(4));
        let cache = Arc::new(FrontlineCache::new(
            4,
            1024 * 1024,
            64 * 1024,
            Arc::clone(&index),
        ));

        let stop = StopSource::new();
        let read_dispatcher = Arc::new(ReadIoDispatcher::start(
            2,
            Arc::clone(&dyn_engine),
            Arc::clone(&cache),
            stop.token(),
        ));
        let write_dispatcher = Arc::new(WriteIoDispatcher::start(
            Arc::clone(&dyn_engine),
            Arc::clone(&cache),
            stop.token(),
        ));

        let service = ObjectManagementService::new(
            config,
            Arc::clone(&index),
            Arc::clone(&write_dispatcher),
            Arc::clone(&read_dispatcher),
            Arc::clone(&cache),
        );

        Fixture {
            engine,
            index,
            cache,
            service,
            stop,
            read_dispatcher,
            write_dispatcher,
        }
    }

    impl Fixture {
        fn add_container(&self, name: &str) -> Arc<Container> {
            let handle = self.engine.create_partition(name).unwrap();
            let container = Arc::new(Container::new(
                Arc::clone(&self.engine) as Arc<dyn Engine>,
                handle,
                ContainerRecord::new(name),
            ));
            self.index.insert(Arc::clone(&container)).unwrap();
            container
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            self.stop.request_stop();
            self.write_dispatcher.wait_for_stop();
            self.read_dispatcher.wait_for_stop();
        }
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let fixture = fixture(StorageConfig::default());
        fixture.add_container("c");

        let status = fixture
            .service
            .insert_object("c".to_string(), "k".to_string(), b"v".to_vec())
            .await;
        assert_eq!(status, Status::Success);

        let response = fixture
            .service
            .get_object("c".to_string(), "k".to_string())
            .await;
        assert_eq!(response.status, Status::Success);
        assert_eq!(response.object_data, Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn get_is_served_from_the_cache_without_the_engine() {
        let fixture = fixture(StorageConfig::default());
        fixture.add_container("c");
        fixture.cache.put("c", "k", b"cached".to_vec()).unwrap();

        let response = fixture
            .service
            .get_object("c".to_string(), "k".to_string())
            .await;
        assert_eq!(response.status, Status::Success);
        assert_eq!(response.object_data, Some(b"cached".to_vec()));
        // The object was never written to the engine, proving the fast path.
        assert_eq!(
            fixture
                .engine
                .get(&fixture.index.get("c").unwrap().handle(), "k")
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn remove_then_get_reports_retrieval_failure() {
        let fixture = fixture(StorageConfig::default());
        fixture.add_container("c");

        fixture
            .service
            .insert_object("c".to_string(), "k".to_string(), b"v".to_vec())
            .await;
        assert_eq!(
            fixture
                .service
                .remove_object("c".to_string(), "k".to_string())
                .await,
            Status::Success
        );

        // The cache invalidation runs on the write master just after the
        // reply; poll briefly until it lands.
        let mut status = Status::Success;
        for _ in 0..50 {
            status = fixture
                .service
                .get_object("c".to_string(), "k".to_string())
                .await
                .status;
            if status == Status::ObjectRetrievalFailed {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(status, Status::ObjectRetrievalFailed);
    }

    #[tokio::test]
    async fn operations_against_missing_containers_fail() {
        let fixture = fixture(StorageConfig::default());

        assert_eq!(
            fixture
                .service
                .insert_object("ghost".to_string(), "k".to_string(), b"v".to_vec())
                .await,
            Status::ContainerNotExists
        );
        assert_eq!(
            fixture
                .service
                .get_object("ghost".to_string(), "k".to_string())
                .await
                .status,
            Status::ContainerNotExists
        );
    }

    #[tokio::test]
    async fn operations_against_tombstoned_containers_fail() {
        let fixture = fixture(StorageConfig::default());
        let container = fixture.add_container("c");
        container.mark_deleted();

        assert_eq!(
            fixture
                .service
                .insert_object("c".to_string(), "k".to_string(), b"v".to_vec())
                .await,
            Status::ContainerNotExists
        );
    }

    #[tokio::test]
    async fn parameter_validation_rejects_bad_requests() {
        let config = StorageConfig {
            max_object_id_size_bytes: 4,
            max_object_data_size_bytes: 8,
            ..StorageConfig::default()
        };
        let fixture = fixture(config);
        fixture.add_container("c");

        assert_eq!(
            fixture
                .service
                .insert_object("c".to_string(), "".to_string(), b"v".to_vec())
                .await,
            Status::ObjectIdEmpty
        );
        assert_eq!(
            fixture
                .service
                .insert_object("c".to_string(), "too-long".to_string(), b"v".to_vec())
                .await,
            Status::ObjectIdExceedsSizeLimit
        );
        assert_eq!(
            fixture
                .service
                .insert_object("c".to_string(), "k".to_string(), Vec::new())
                .await,
            Status::ObjectDataEmpty
        );
        assert_eq!(
            fixture
                .service
                .insert_object("c".to_string(), "k".to_string(), vec![0u8; 9])
                .await,
            Status::ObjectDataExceedsSizeLimit
        );
        // Removes carry no data, so empty data does not apply to them.
        assert_eq!(
            fixture
                .service
                .remove_object("c".to_string(), "k".to_string())
                .await,
            Status::Success
        );
    }

    #[tokio::test]
    async fn oversized_for_cache_still_lands_in_the_engine() {
        let config = StorageConfig::default();
        let fixture = fixture(config);
        fixture.add_container("c");

        // Larger than the fixture cache's 64 KiB object cap, smaller than
        // the engine data cap.
        let data = vec![7u8; 100 * 1024];
        assert_eq!(
            fixture
                .service
                .insert_object("c".to_string(), "big".to_string(), data.clone())
                .await,
            Status::Success
        );

        assert_eq!(fixture.cache.get("c", "big"), None);
        let response = fixture
            .service
            .get_object("c".to_string(), "big".to_string())
            .await;
        assert_eq!(response.status, Status::Success);
        assert_eq!(response.object_data, Some(data));
    }
}
