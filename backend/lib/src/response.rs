//! Rendering of storage statuses into HTTP responses.
//!
//! Every response body carries the operation's `internal_status_code` in
//! hex; successful object retrievals add the `object_data` field.

use axum::response::{IntoResponse, Response};
use axum::Json;
use cellar_common::Status;
use serde_json::json;

pub struct ApiResponse {
    status: Status,
    object_data: Option<Vec<u8>>,
}

impl ApiResponse {
    pub fn status(status: Status) -> Self {
        Self {
            status,
            object_data: None,
        }
    }

    pub fn ok() -> Self {
        Self::status(Status::Success)
    }

    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            status: Status::Success,
            object_data: Some(data),
        }
    }
}

impl From<Status> for ApiResponse {
    fn from(status: Status) -> Self {
        Self::status(status)
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let mut body = json!({
            "internal_status_code": self.status.as_hex(),
        });
        if let Some(data) = self.object_data {
            body["object_data"] = json!(String::from_utf8_lossy(&data));
        }
        (self.status.http_status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn success_with_data_renders_both_fields() {
        let response = ApiResponse::with_data(b"payload".to_vec()).into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn failure_maps_to_its_http_status() {
        let response = ApiResponse::status(Status::ContainerNotExists).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
