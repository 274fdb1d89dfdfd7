// Cache-storage helper operations. Every operation checks `is_enabled()` first
// and degrades to a logged no-op when no storage facility is available.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::precache;
use crate::error::{AgentError, Result};
use crate::message::{Request, Response};
use crate::source::traits::Network;
use crate::storage::{CacheStorage, StorageError};

/// Which generations `delete_generations` removes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeleteMode {
    /// Delete only the listed generations.
    #[default]
    IncludeListed,
    /// Delete every generation except the listed ones.
    ExcludeListed,
}

/// Outcome of a purge. Individual failures never abort the others.
#[derive(Debug, Default)]
pub struct PurgeReport {
    pub deleted: Vec<String>,
    /// Targeted but already gone by the time the delete ran.
    pub missing: Vec<String>,
    pub failed: Vec<(String, StorageError)>,
}

impl PurgeReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone)]
pub struct CacheManager {
    storage: Option<Arc<dyn CacheStorage>>,
}

impl CacheManager {
    pub fn new(storage: Arc<dyn CacheStorage>) -> Self {
        Self {
            storage: Some(storage),
        }
    }

    /// Manager for a runtime without cache storage.
    pub fn unavailable() -> Self {
        Self { storage: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.storage.is_some()
    }

    fn storage(&self) -> Option<&Arc<dyn CacheStorage>> {
        if self.storage.is_none() {
            warn!("cache is not enabled");
        }
        self.storage.as_ref()
    }

    pub async fn list_generation_ids(&self) -> Result<Vec<String>> {
        let Some(storage) = self.storage() else {
            return Ok(Vec::new());
        };
        Ok(storage.keys().await?)
    }

    pub async fn log_generations(&self) {
        match self.list_generation_ids().await {
            Ok(ids) => info!("cache generations: {:?}", ids),
            Err(e) => warn!("listing cache generations failed: {}", e),
        }
    }

    /// Open generation `id` and store every item, or none of them.
    ///
    /// A generation created by this call is removed again when the batch
    /// fails, so a failed install never leaves a partial generation behind.
    pub async fn create_generation(
        &self,
        id: &str,
        items: &[String],
        network: Arc<dyn Network>,
        max_concurrency: u32,
    ) -> Result<()> {
        let Some(storage) = self.storage() else {
            return Ok(());
        };

        info!("creating cache generation {} ({} items)", id, items.len());
        let existed = storage.has(id).await.map_err(|e| install_failed(id, e.into()))?;

        let populated = async {
            let cache = storage.open(id).await?;
            let entries = precache::fetch_all(network, items, max_concurrency).await?;
            cache.put_all(entries).await?;
            Ok::<_, AgentError>(())
        }
        .await;

        if let Err(e) = populated {
            if !existed {
                match storage.delete(id).await {
                    Ok(_) => debug!("rolled back partial generation {}", id),
                    Err(del) => warn!("rollback of generation {} failed: {}", id, del),
                }
            }
            return Err(install_failed(id, e));
        }

        info!("cache generation {} ready", id);
        Ok(())
    }

    /// Store one pair into generation `id`, creating it if absent.
    pub async fn add_entry(&self, id: &str, request: Request, response: Response) -> Result<()> {
        let Some(storage) = self.storage() else {
            return Ok(());
        };
        debug!("caching {} {} into {}", request.method, request.url, id);
        let cache = storage.open(id).await?;
        cache.put(request, response).await?;
        Ok(())
    }

    /// Duplicate `response` now and return the store of the copy as a future
    /// that owns everything it needs, so it can outlive the caller.
    pub fn cache_fetched_response(
        &self,
        id: &str,
        request: Request,
        response: &Response,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let copy = response.duplicate();
        let manager = self.clone();
        let id = id.to_string();
        async move { manager.add_entry(&id, request, copy).await }
    }

    pub async fn delete_generations(&self, ids: &[String], mode: DeleteMode) -> Result<PurgeReport> {
        let Some(storage) = self.storage() else {
            return Ok(PurgeReport::default());
        };

        let existing = storage.keys().await?;
        let targets: Vec<String> = existing
            .into_iter()
            .filter(|key| {
                let listed = ids.contains(key);
                match mode {
                    DeleteMode::IncludeListed => listed,
                    DeleteMode::ExcludeListed => !listed,
                }
            })
            .collect();

        let deletions = targets.iter().map(|key| async move {
            info!("clearing cache generation {}", key);
            (key.clone(), storage.delete(key).await)
        });

        let mut report = PurgeReport::default();
        for (key, outcome) in join_all(deletions).await {
            match outcome {
                Ok(true) => report.deleted.push(key),
                Ok(false) => report.missing.push(key),
                Err(e) => {
                    warn!("clearing cache generation {} failed: {}", key, e);
                    report.failed.push((key, e));
                }
            }
        }
        Ok(report)
    }

    pub async fn delete_all_except(&self, ids: &[String]) -> Result<PurgeReport> {
        self.delete_generations(ids, DeleteMode::ExcludeListed).await
    }

    /// Global lookup across all generations. Storage errors count as a miss.
    pub async fn match_request(&self, request: &Request) -> Option<Response> {
        let storage = self.storage()?;
        match storage.match_request(request).await {
            Ok(found) => found,
            Err(e) => {
                warn!("cache lookup of {} failed: {}", request.url, e);
                None
            }
        }
    }
}

fn install_failed(id: &str, source: AgentError) -> AgentError {
    AgentError::InstallFailed {
        generation: id.to_string(),
        source: Box::new(source),
    }
}
