//! Request parameter validations shared by the management services.

use cellar_common::config::StorageConfig;
use cellar_common::Status;

pub(crate) fn validate_container_name(name: &str, config: &StorageConfig) -> Result<(), Status> {
    if name.is_empty() {
        return Err(Status::ContainerNameEmpty);
    }
    if name.len() > config.max_container_name_size_bytes {
        return Err(Status::ContainerNameExceedsSizeLimit);
    }
    Ok(())
}

pub(crate) fn validate_object_id(object_id: &str, config: &StorageConfig) -> Result<(), Status> {
    if object_id.is_empty() {
        return Err(Status::ObjectIdEmpty);
    }
    if object_id.len() > config.max_object_id_size_bytes {
        return Err(Status::ObjectIdExceedsSizeLimit);
    }
    Ok(())
}

pub(crate) fn validate_object_data(data: &[u8], config: &StorageConfig) -> Result<(), Status> {
    if data.is_empty() {
        return Err(Status::ObjectDataEmpty);
    }
    if data.len() > config.max_object_data_size_bytes {
        return Err(Status::ObjectDataExceedsSizeLimit);
    }
    Ok(())
}
