//! API module: router construction and middleware.

pub mod handlers;
pub mod routes;

use axum::extract::DefaultBodyLimit;
use axum::http::header::CONTENT_TYPE;
use axum::http::Method;
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::services::Services;

/// Requests above this size are rejected before reaching a handler; object
/// payload limits are enforced separately by the object service.
const MAX_REQUEST_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Creates the axum application with all routes and middleware.
pub fn create_app(services: Services) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE]);

    routes::routes(services)
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
}
