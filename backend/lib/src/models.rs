//! Request body models for the container and object endpoints.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ContainerRequestBody {
    pub object_container_name: String,
}

/// Body of an object insertion; `object_data` is the payload as UTF-8 text.
#[derive(Debug, Deserialize)]
pub struct ObjectWriteBody {
    pub container_name: String,
    pub object_id: String,
    pub object_data: String,
}

/// Body of an object retrieval or removal.
#[derive(Debug, Deserialize)]
pub struct ObjectKeyBody {
    pub container_name: String,
    pub object_id: String,
}
