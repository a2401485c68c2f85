//! Status codes for error handling across the data store.
//!
//! Every service and dispatcher entry point resolves to one of these codes.
//! A status carries a stable 32-bit internal code (high bit set means
//! failure), the HTTP status it maps to at the API surface, and a stable
//! name. Clients receive the internal code rendered as hex in the
//! `internal_status_code` response field.

use http::StatusCode;

/// System-wide operation status.
///
/// Equality is by internal code; the discriminant IS the internal code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Status {
    /// Operation succeeded.
    Success = 0x0000_0000,
    /// Generic operation failure.
    Fail = 0x8000_0001,
    /// Container already exists.
    ContainerAlreadyExists = 0x8000_0002,
    /// Invalid state for a given operation.
    InvalidOperation = 0x8000_0003,
    /// Storage engine failed to start.
    StorageEngineStartupFailed = 0x8000_0004,
    /// Failed to insert an object into a container.
    ObjectInsertionFailed = 0x8000_0005,
    /// Failed to retrieve an object from a container.
    ObjectRetrievalFailed = 0x8000_0006,
    /// Failed to create a container.
    ContainerCreationFailed = 0x8000_0007,
    /// Failed to retrieve all objects inside a container.
    ObjectsRetrievalFromContainerFailed = 0x8000_0008,
    /// Failed to enumerate the partitions on disk during startup.
    FetchContainersFromDiskFailed = 0x8000_0009,
    /// The internal-metadata partition was missing during startup.
    ContainersInternalMetadataLookupFailed = 0x8000_000a,
    /// Failed to parse a byte stream into a record.
    ParsingFailed = 0x8000_000b,
    /// No storage engine reference found for a container.
    MissingStorageEngineReference = 0x8000_000c,
    /// Failed to close a storage engine reference.
    StorageEngineReferenceCloseFailed = 0x8000_000d,
    /// Container does not exist.
    ContainerNotExists = 0x8000_000e,
    /// Failed to serialize a record into a byte stream.
    SerializationFailed = 0x8000_000f,
    /// Failed to remove an object from the storage engine.
    ObjectDeletionFailed = 0x8000_0010,
    /// Container is currently in its deletion process.
    ContainerInDeletionProcess = 0x8000_0011,
    /// The storage engine failed to drop a container partition.
    ContainerStorageEngineDeletionFailed = 0x8000_0012,
    /// Container name exceeds the maximum size limit.
    ContainerNameExceedsSizeLimit = 0x8000_0013,
    /// Unreachable code block was hit.
    Unreachable = 0x8000_0014,
    /// Maximum number of containers reached.
    MaxNumberContainersReached = 0x8000_0015,
    /// Given container name is empty.
    ContainerNameEmpty = 0x8000_0016,
    /// Given object id is empty.
    ObjectIdEmpty = 0x8000_0017,
    /// Given object data stream is empty.
    ObjectDataEmpty = 0x8000_0018,
    /// Object id exceeds the maximum size limit.
    ObjectIdExceedsSizeLimit = 0x8000_0019,
    /// Object data stream exceeds the maximum size limit.
    ObjectDataExceedsSizeLimit = 0x8000_001a,
    /// Two index insertions collided on the same container name.
    ContainerInsertionCollision = 0x8000_001b,
    /// Object data exceeds the per-object frontline cache limit.
    ObjectDataSizeExceedsCacheLimit = 0x8000_001c,
    /// An aggregated objects write batch failed to commit.
    ObjectWriteBatchFailed = 0x8000_001d,
}

impl Status {
    /// Stable internal code, surfaced to clients in hex.
    pub fn internal_code(self) -> u32 {
        self as u32
    }

    /// High bit of the internal code flags a failure.
    pub fn is_failure(self) -> bool {
        self.internal_code() & 0x8000_0000 != 0
    }

    pub fn is_success(self) -> bool {
        !self.is_failure()
    }

    /// Internal code rendered the way responses carry it.
    pub fn as_hex(self) -> String {
        format!("{:#x}", self.internal_code())
    }

    /// HTTP status this code maps to at the API surface.
    pub fn http_status(self) -> StatusCode {
        match self {
            Status::Success => StatusCode::OK,
            Status::ContainerAlreadyExists | Status::ContainerInDeletionProcess => {
                StatusCode::CONFLICT
            }
            Status::ContainerNotExists => StatusCode::NOT_FOUND,
            Status::MaxNumberContainersReached => StatusCode::TOO_MANY_REQUESTS,
            Status::InvalidOperation
            | Status::ContainerNameExceedsSizeLimit
            | Status::ContainerNameEmpty
            | Status::ObjectIdEmpty
            | Status::ObjectDataEmpty
            | Status::ObjectIdExceedsSizeLimit
            | Status::ObjectDataExceedsSizeLimit => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable snake_case name of the status.
    pub fn name(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Fail => "fail",
            Status::ContainerAlreadyExists => "container_already_exists",
            Status::InvalidOperation => "invalid_operation",
            Status::StorageEngineStartupFailed => "storage_engine_startup_failed",
            Status::ObjectInsertionFailed => "object_insertion_failed",
            Status::ObjectRetrievalFailed => "object_retrieval_failed",
            Status::ContainerCreationFailed => "container_creation_failed",
            Status::ObjectsRetrievalFromContainerFailed => {
                "objects_retrieval_from_container_failed"
            }
            Status::FetchContainersFromDiskFailed => "fetch_containers_from_disk_failed",
            Status::ContainersInternalMetadataLookupFailed => {
                "containers_internal_metadata_lookup_failed"
            }
            Status::ParsingFailed => "parsing_failed",
            Status::MissingStorageEngineReference => "missing_storage_engine_reference",
            Status::StorageEngineReferenceCloseFailed => "storage_engine_reference_close_failed",
            Status::ContainerNotExists => "container_not_exists",
            Status::SerializationFailed => "serialization_failed",
            Status::ObjectDeletionFailed => "object_deletion_failed",
            Status::ContainerInDeletionProcess => "container_in_deletion_process",
            Status::ContainerStorageEngineDeletionFailed => {
                "container_storage_engine_deletion_failed"
            }
            Status::ContainerNameExceedsSizeLimit => "container_name_exceeds_size_limit",
            Status::Unreachable => "unreachable",
            Status::MaxNumberContainersReached => "max_number_containers_reached",
            Status::ContainerNameEmpty => "container_name_empty",
            Status::ObjectIdEmpty => "object_id_empty",
            Status::ObjectDataEmpty => "object_data_empty",
            Status::ObjectIdExceedsSizeLimit => "object_id_exceeds_size_limit",
            Status::ObjectDataExceedsSizeLimit => "object_data_exceeds_size_limit",
            Status::ContainerInsertionCollision => "container_insertion_collision",
            Status::ObjectDataSizeExceedsCacheLimit => "object_data_size_exceeds_cache_limit",
            Status::ObjectWriteBatchFailed => "object_write_batch_failed",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_hex())
    }
}

impl std::error::Error for Status {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_not_a_failure() {
        assert!(Status::Success.is_success());
        assert!(!Status::Success.is_failure());
        assert_eq!(Status::Success.internal_code(), 0);
        assert_eq!(Status::Success.http_status(), StatusCode::OK);
    }

    #[test]
    fn failure_codes_have_high_bit_set() {
        let failures = [
            Status::Fail,
            Status::ContainerAlreadyExists,
            Status::ObjectWriteBatchFailed,
            Status::ObjectDataSizeExceedsCacheLimit,
        ];
        for status in failures {
            assert!(status.is_failure(), "{status} should be a failure");
            assert!(status.internal_code() & 0x8000_0000 != 0);
        }
    }

    #[test]
    fn http_mapping_follows_the_surface_table() {
        assert_eq!(
            Status::ContainerAlreadyExists.http_status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Status::ContainerInDeletionProcess.http_status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            Status::ContainerNotExists.http_status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Status::MaxNumberContainersReached.http_status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            Status::ContainerNameEmpty.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Status::ObjectDataExceedsSizeLimit.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Status::ObjectWriteBatchFailed.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn hex_rendering_matches_the_internal_code() {
        assert_eq!(Status::Success.as_hex(), "0x0");
        assert_eq!(Status::Fail.as_hex(), "0x80000001");
        assert_eq!(Status::ObjectWriteBatchFailed.as_hex(), "0x8000001d");
    }
}
