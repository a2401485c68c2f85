//! Route definitions for the data store API.

use axum::routing::{get, post};
use axum::Router;

use super::handlers;
use crate::services::Services;

pub fn routes(services: Services) -> Router {
    Router::new()
        .route("/ping", get(handlers::ping::ping))
        .route(
            "/containers",
            post(handlers::containers::create_container)
                .put(handlers::containers::create_container)
                .delete(handlers::containers::remove_container),
        )
        .route(
            "/objects",
            post(handlers::objects::insert_object)
                .get(handlers::objects::get_object)
                .delete(handlers::objects::remove_object),
        )
        .with_state(services)
}
