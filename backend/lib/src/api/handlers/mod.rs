//! Request handlers for the data store endpoints.

pub mod containers;
pub mod objects;
pub mod ping;
