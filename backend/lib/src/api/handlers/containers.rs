//! Handlers for the container management endpoints.

use axum::extract::State;
use axum::Json;
use tracing::debug;

use crate::models::ContainerRequestBody;
use crate::response::ApiResponse;
use crate::services::Services;

pub async fn create_container(
    State(services): State<Services>,
    Json(body): Json<ContainerRequestBody>,
) -> ApiResponse {
    debug!(
        container_name_size = body.object_container_name.len(),
        "container creation request received"
    );
    services
        .containers
        .create_container(&body.object_container_name)
        .await
        .into()
}

pub async fn remove_container(
    State(services): State<Services>,
    Json(body): Json<ContainerRequestBody>,
) -> ApiResponse {
    debug!(
        container_name_size = body.object_container_name.len(),
        "container removal request received"
    );
    services
        .containers
        .remove_container(&body.object_container_name)
        .await
        .into()
}
