use anyhow::Result;
use async_trait::async_trait;

use crate::message::{Request, Response};

/// Network-fetch capability. Any HTTP status is a successful fetch; only
/// transport-level problems are errors.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response>;
}
