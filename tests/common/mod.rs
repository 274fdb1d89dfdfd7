// Test doubles: a scripted network and a storage wrapper that fails on demand.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use offline_cache_engine::source::traits::Network;
use offline_cache_engine::storage::{Cache, CacheStorage, MemoryCacheStorage, StorageError};
use offline_cache_engine::{Request, Response};

/// Network that answers from a fixed table and counts calls.
#[derive(Default)]
pub struct StubNetwork {
    routes: RwLock<HashMap<String, (u16, Bytes)>>,
    failing: RwLock<HashSet<String>>,
    delays: RwLock<HashMap<String, Duration>>,
    latency: RwLock<Option<Duration>>,
    offline: AtomicBool,
    calls: AtomicUsize,
    completed: AtomicUsize,
    in_flight: Arc<AtomicUsize>,
    peak: AtomicUsize,
}

/// Decrements the in-flight count even when the fetch future is dropped.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl StubNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_routes<'a>(routes: impl IntoIterator<Item = (&'a str, &'a str)>) -> Arc<Self> {
        let network = Self::new();
        for (key, body) in routes {
            network.serve(key, body);
        }
        network
    }

    pub fn serve(&self, key: &str, body: &str) {
        self.serve_status(key, 200, body);
    }

    pub fn serve_status(&self, key: &str, status: u16, body: &str) {
        self.routes
            .write()
            .insert(key.to_string(), (status, Bytes::copy_from_slice(body.as_bytes())));
    }

    pub fn fail(&self, key: &str) {
        self.failing.write().insert(key.to_string());
    }

    /// Delay every response by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write() = Some(latency);
    }

    /// Delay responses for `key` only; overrides the global latency.
    pub fn delay(&self, key: &str, delay: Duration) {
        self.delays.write().insert(key.to_string(), delay);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }

    /// Fetches that ran to the end instead of being dropped mid-flight.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Highest number of fetches in flight at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Network for StubNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _in_flight = InFlight(Arc::clone(&self.in_flight));
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = self
            .delays
            .read()
            .get(&request.url)
            .copied()
            .or(*self.latency.read());
        match delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
        self.completed.fetch_add(1, Ordering::SeqCst);

        if self.offline.load(Ordering::SeqCst) {
            return Err(anyhow!("network unreachable"));
        }
        if self.failing.read().contains(&request.url) {
            return Err(anyhow!("connection reset fetching {}", request.url));
        }
        let found = self.routes.read().get(&request.url).cloned();
        match found {
            Some((status, body)) => Ok(Response::new(status, body).with_url(request.url.clone())),
            None => Ok(Response::new(404, "not found").with_url(request.url.clone())),
        }
    }
}

/// Memory storage whose deletes and puts can be made to fail.
#[derive(Default)]
pub struct FlakyStorage {
    pub inner: MemoryCacheStorage,
    undeletable: RwLock<HashSet<String>>,
    puts_fail: Arc<AtomicBool>,
}

impl FlakyStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refuse_delete(&self, name: &str) {
        self.undeletable.write().insert(name.to_string());
    }

    pub fn fail_puts(&self, fail: bool) {
        self.puts_fail.store(fail, Ordering::SeqCst);
    }
}

struct FlakyCache {
    inner: Arc<dyn Cache>,
    puts_fail: Arc<AtomicBool>,
}

#[async_trait]
impl Cache for FlakyCache {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>, StorageError> {
        self.inner.match_request(request).await
    }

    async fn put(&self, request: Request, response: Response) -> Result<(), StorageError> {
        if self.puts_fail.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("quota exceeded".to_string()));
        }
        self.inner.put(request, response).await
    }

    async fn put_all(&self, entries: Vec<(Request, Response)>) -> Result<(), StorageError> {
        if self.puts_fail.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("quota exceeded".to_string()));
        }
        self.inner.put_all(entries).await
    }

    async fn keys(&self) -> Result<Vec<Request>, StorageError> {
        self.inner.keys().await
    }
}

#[async_trait]
impl CacheStorage for FlakyStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, StorageError> {
        let inner = self.inner.open(name).await?;
        Ok(Arc::new(FlakyCache {
            inner,
            puts_fail: Arc::clone(&self.puts_fail),
        }))
    }

    async fn has(&self, name: &str) -> Result<bool, StorageError> {
        self.inner.has(name).await
    }

    async fn match_request(&self, request: &Request) -> Result<Option<Response>, StorageError> {
        self.inner.match_request(request).await
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        self.inner.keys().await
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        if self.undeletable.read().contains(name) {
            return Err(StorageError::Backend(format!("{} is locked", name)));
        }
        self.inner.delete(name).await
    }
}
