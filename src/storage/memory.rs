// In-process cache storage: generations kept in insertion-ordered maps.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::RwLock;

use super::{check_storable, Cache, CacheStorage, StorageError};
use crate::message::{Method, Request, Response};

struct Entry {
    request: Request,
    response: Response,
}

/// One generation. Handles stay usable after the generation is deleted from
/// its storage; writes then land in the detached map only.
pub struct MemoryCache {
    name: String,
    entries: RwLock<IndexMap<String, Entry>>,
}

impl MemoryCache {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(IndexMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn lookup(&self, request: &Request) -> Option<Response> {
        if request.method != Method::Get {
            return None;
        }
        self.entries
            .read()
            .get(request.cache_key())
            .map(|e| e.response.duplicate())
    }
}

#[async_trait]
impl Cache for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>, StorageError> {
        Ok(self.lookup(request))
    }

    async fn put(&self, request: Request, response: Response) -> Result<(), StorageError> {
        check_storable(&request, &response)?;
        let key = request.cache_key().to_string();
        self.entries.write().insert(key, Entry { request, response });
        Ok(())
    }

    async fn put_all(&self, entries: Vec<(Request, Response)>) -> Result<(), StorageError> {
        for (request, response) in &entries {
            check_storable(request, response)?;
        }
        let mut map = self.entries.write();
        for (request, response) in entries {
            let key = request.cache_key().to_string();
            map.insert(key, Entry { request, response });
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<Request>, StorageError> {
        Ok(self
            .entries
            .read()
            .values()
            .map(|e| e.request.clone())
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<IndexMap<String, Arc<MemoryCache>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a generation, `None` if it does not exist.
    pub fn entry_count(&self, name: &str) -> Option<usize> {
        self.caches.read().get(name).map(|c| c.len())
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, StorageError> {
        if let Some(cache) = self.caches.read().get(name) {
            return Ok(cache.clone());
        }
        let mut caches = self.caches.write();
        let cache = caches
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCache::new(name)))
            .clone();
        Ok(cache)
    }

    async fn has(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.caches.read().contains_key(name))
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>, StorageError> {
        let caches = self.caches.read();
        Ok(caches.values().find_map(|c| c.lookup(request)))
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.caches.read().keys().cloned().collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.caches.write().shift_remove(name).is_some())
    }
}
