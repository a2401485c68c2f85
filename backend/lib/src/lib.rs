//! HTTP surface of the Cellar data store.
//!
//! A thin axum layer: request bodies are decoded into the storage request
//! models, handed to the management services, and the resulting status is
//! rendered back with its HTTP mapping and the `internal_status_code` field.

pub mod api;
pub mod log;
pub mod models;
pub mod response;
pub mod services;
