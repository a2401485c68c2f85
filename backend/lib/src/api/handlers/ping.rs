//! Liveness probe endpoint.

use crate::response::ApiResponse;

pub async fn ping() -> ApiResponse {
    ApiResponse::ok()
}
