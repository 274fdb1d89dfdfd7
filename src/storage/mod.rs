// Cache-storage capability: named generations of request -> response entries.

pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::message::{Method, Request, Response};

pub use memory::{MemoryCache, MemoryCacheStorage};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("{0} requests cannot be cached")]
    UnsupportedMethod(Method),

    #[error("partial (206) responses cannot be cached")]
    PartialResponse,

    #[error("cache storage backend error: {0}")]
    Backend(String),
}

/// Handle to one generation.
#[async_trait]
pub trait Cache: Send + Sync {
    fn name(&self) -> &str;

    async fn match_request(&self, request: &Request) -> Result<Option<Response>, StorageError>;

    /// Insert or replace one entry.
    async fn put(&self, request: Request, response: Response) -> Result<(), StorageError>;

    /// Insert every entry or none of them.
    async fn put_all(&self, entries: Vec<(Request, Response)>) -> Result<(), StorageError>;

    /// Requests currently stored, in insertion order.
    async fn keys(&self) -> Result<Vec<Request>, StorageError>;
}

/// The set of all generations for one origin.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open the named generation, creating it if absent.
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, StorageError>;

    async fn has(&self, name: &str) -> Result<bool, StorageError>;

    /// Look the request up in every generation, oldest first.
    async fn match_request(&self, request: &Request) -> Result<Option<Response>, StorageError>;

    /// Names of all generations, in creation order.
    async fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Remove a whole generation. `false` when it did not exist.
    async fn delete(&self, name: &str) -> Result<bool, StorageError>;
}

/// Rules every backend applies before storing an entry.
pub fn check_storable(request: &Request, response: &Response) -> Result<(), StorageError> {
    if request.method != Method::Get {
        return Err(StorageError::UnsupportedMethod(request.method));
    }
    if response.status == 206 {
        return Err(StorageError::PartialResponse);
    }
    Ok(())
}
