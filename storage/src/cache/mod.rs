//! Frontline cache: a sharded LRU holding recently accessed objects so hot
//! reads never reach the storage engine.
//!
//! Shard selection hashes the object id only, so identical ids from
//! different containers land in the same shard (and still coexist, since
//! entries are keyed by container and id). The public wrapper consults the
//! container index before every call: objects of deleted or unknown
//! containers are neither served nor populated.

mod shard;

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use cellar_common::Status;

use crate::index::{ContainerExistence, ContainerIndex};

pub use shard::CacheShard;

pub struct FrontlineCache {
    shards: Vec<CacheShard>,
    index: Arc<ContainerIndex>,
}

impl FrontlineCache {
    pub fn new(
        number_shards: u16,
        max_shard_bytes: usize,
        max_object_bytes: usize,
        index: Arc<ContainerIndex>,
    ) -> Self {
        let number_shards = number_shards.max(1);
        Self {
            shards: (0..number_shards)
                .map(|_| CacheShard::new(max_shard_bytes, max_object_bytes))
                .collect(),
            index,
        }
    }

    fn shard_for(&self, object_id: &str) -> &CacheShard {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        object_id.hash(&mut hasher);
        let slot = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[slot]
    }

    fn container_is_live(&self, container_name: &str) -> bool {
        self.index.existence(container_name) == ContainerExistence::AlreadyExists
    }

    /// Inserts an object, rejecting the call when its container is unknown
    /// or in deletion so stale data can never be populated.
    pub fn put(
        &self,
        container_name: &str,
        object_id: &str,
        data: Vec<u8>,
    ) -> Result<(), Status> {
        if !self.container_is_live(container_name) {
            return Err(Status::ContainerNotExists);
        }
        self.shard_for(object_id).put(container_name, object_id, data)
    }

    /// Returns the cached object, or `None` on a miss or when the container
    /// is not live.
    pub fn get(&self, container_name: &str, object_id: &str) -> Option<Vec<u8>> {
        if !self.container_is_live(container_name) {
            return None;
        }
        self.shard_for(object_id).get(container_name, object_id)
    }

    /// Invalidates a cached object.
    pub fn remove(&self, container_name: &str, object_id: &str) {
        self.shard_for(object_id).remove(container_name, object_id);
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}
