//! Fundamental LRU cache shard unit for the frontline cache.

use cellar_common::Status;
use lru::LruCache;
use parking_lot::Mutex;

/// Entries are keyed by container name and object id so identical ids from
/// different containers coexist inside one shard.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    container_name: String,
    object_id: String,
}

impl CacheKey {
    fn new(container_name: &str, object_id: &str) -> Self {
        Self {
            container_name: container_name.to_string(),
            object_id: object_id.to_string(),
        }
    }
}

struct ShardInner {
    entries: LruCache<CacheKey, Vec<u8>>,
    current_bytes: usize,
}

/// Strict-LRU shard bounded by payload bytes rather than entry count.
pub struct CacheShard {
    max_shard_bytes: usize,
    max_object_bytes: usize,
    inner: Mutex<ShardInner>,
}

impl CacheShard {
    pub fn new(max_shard_bytes: usize, max_object_bytes: usize) -> Self {
        Self {
            max_shard_bytes,
            max_object_bytes,
            inner: Mutex::new(ShardInner {
                entries: LruCache::unbounded(),
                current_bytes: 0,
            }),
        }
    }

    /// Inserts an object at the head of the shard, evicting from the tail
    /// until the new payload fits.
    pub fn put(
        &self,
        container_name: &str,
        object_id: &str,
        data: Vec<u8>,
    ) -> Result<(), Status> {
        // Size sanity check happens before taking the lock.
        let data_size = data.len();
        if data_size > self.max_object_bytes {
            return Err(Status::ObjectDataSizeExceedsCacheLimit);
        }

        let key = CacheKey::new(container_name, object_id);
        let mut inner = self.inner.lock();

        if let Some(previous) = inner.entries.pop(&key) {
            inner.current_bytes -= previous.len();
        }

        // Evict as many old entries as needed for the new object to fit.
        // Keeping the max object size small relative to the shard size keeps
        // the number of removals per insert bounded.
        while inner.current_bytes + data_size > self.max_shard_bytes && !inner.entries.is_empty() {
            if let Some((_, evicted)) = inner.entries.pop_lru() {
                inner.current_bytes -= evicted.len();
            }
        }

        inner.entries.put(key, data);
        inner.current_bytes += data_size;

        Ok(())
    }

    /// Returns the object if cached, promoting it to most recently used.
    pub fn get(&self, container_name: &str, object_id: &str) -> Option<Vec<u8>> {
        let key = CacheKey::new(container_name, object_id);
        let mut inner = self.inner.lock();
        inner.entries.get(&key).cloned()
    }

    /// Invalidates a cached object, if present.
    pub fn remove(&self, container_name: &str, object_id: &str) {
        let key = CacheKey::new(container_name, object_id);
        let mut inner = self.inner.lock();
        if let Some(removed) = inner.entries.pop(&key) {
            inner.current_bytes -= removed.len();
        }
    }

    pub fn current_bytes(&self) -> usize {
        self.inner.lock().current_bytes
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Object id of the most recently used entry, for assertions.
    #[cfg(test)]
    pub(crate) fn most_recent_object_id(&self) -> Option<String> {
        self.inner
            .lock()
            .entries
            .iter()
            .next()
            .map(|(key, _)| key.object_id.clone())
    }
}
