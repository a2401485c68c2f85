//! Handlers for the object CRUD endpoints.

use axum::extract::State;
use axum::Json;
use tracing::debug;

use crate::models::{ObjectKeyBody, ObjectWriteBody};
use crate::response::ApiResponse;
use crate::services::Services;

pub async fn insert_object(
    State(services): State<Services>,
    Json(body): Json<ObjectWriteBody>,
) -> ApiResponse {
    debug!(
        object_id_size = body.object_id.len(),
        object_data_size = body.object_data.len(),
        "object insertion request received"
    );
    services
        .objects
        .insert_object(
            body.container_name,
            body.object_id,
            body.object_data.into_bytes(),
        )
        .await
        .into()
}

pub async fn get_object(
    State(services): State<Services>,
    Json(body): Json<ObjectKeyBody>,
) -> ApiResponse {
    debug!(object_id_size = body.object_id.len(), "object retrieval request received");
    let response = services
        .objects
        .get_object(body.container_name, body.object_id)
        .await;

    match response.object_data {
        Some(data) if response.status.is_success() => ApiResponse::with_data(data),
        _ => ApiResponse::status(response.status),
    }
}

pub async fn remove_object(
    State(services): State<Services>,
    Json(body): Json<ObjectKeyBody>,
) -> ApiResponse {
    debug!(object_id_size = body.object_id.len(), "object removal request received");
    services
        .objects
        .remove_object(body.container_name, body.object_id)
        .await
        .into()
}
