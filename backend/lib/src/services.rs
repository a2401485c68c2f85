//! Service container shared with every request handler.

use std::sync::Arc;

use cellar_storage::container_service::ContainerManagementService;
use cellar_storage::object_service::ObjectManagementService;
use cellar_storage::DataStoreRuntime;

#[derive(Clone)]
pub struct Services {
    pub containers: Arc<ContainerManagementService>,
    pub objects: Arc<ObjectManagementService>,
}

impl Services {
    pub fn new(
        containers: Arc<ContainerManagementService>,
        objects: Arc<ObjectManagementService>,
    ) -> Self {
        Self {
            containers,
            objects,
        }
    }

    /// Convenience constructor over a started storage runtime.
    pub fn from_runtime(runtime: &DataStoreRuntime) -> Self {
        Self::new(
            Arc::clone(&runtime.container_service),
            Arc::clone(&runtime.object_service),
        )
    }
}
