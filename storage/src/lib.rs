//! Storage subsystem of the Cellar data store.
//!
//! Containers are logical buckets of objects, each backed by an independent
//! partition of the underlying storage engine. The subsystem is built from:
//!
//! - the [`engine`] adapter, a partitioned key/value capability set with a
//!   RocksDB implementation and an in-memory twin for tests;
//! - the sharded, concurrently accessed [`index`] of open containers;
//! - the single-threaded [`serializer`] linearizing container create/remove;
//! - the sharded LRU [`cache`] fronting object reads;
//! - the read worker pool and the single-writer batching pipeline in
//!   [`read_dispatcher`] and [`write_dispatcher`];
//! - the [`gc`] thread sweeping soft-deleted containers;
//! - [`bootstrap`], which reconciles on-disk state into the index at startup
//!   and wires everything together.

pub mod bootstrap;
pub mod bucket;
pub mod cache;
pub mod container;
pub mod container_service;
pub mod engine;
pub mod gc;
pub mod index;
pub mod object_service;
pub mod read_dispatcher;
pub mod serializer;
pub mod task;
mod validation;
pub mod write_dispatcher;

pub(crate) const LOG_TARGET: &str = "cellar-storage";

pub use bootstrap::DataStoreRuntime;
pub use container::{Container, ContainerRecord};
pub use engine::{Engine, PartitionHandle};
pub use index::{ContainerExistence, ContainerIndex};
