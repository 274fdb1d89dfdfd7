// Cache lifecycle controller: install, activate and request resolution for one
// generation descriptor.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::cache::{CacheManager, PurgeReport};
use super::events::{ActivateEvent, BestEffort, FetchEvent, InstallEvent};
use super::stats::{ResolutionStats, StatsSnapshot};
use crate::config::{ActivationPolicy, AgentConfig, GenerationDescriptor};
use crate::error::{AgentError, Result};
use crate::message::{Request, Response};
use crate::source::traits::Network;

/// Where a resolved response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Cache,
    Network,
    Fallback,
}

pub struct Resolution {
    pub response: Response,
    pub source: ResolutionSource,
    /// Runtime store of a network response, if one was started. Safe to drop.
    pub store: Option<BestEffort>,
}

#[derive(Clone)]
pub struct LifecycleController {
    descriptor: Arc<GenerationDescriptor>,
    config: Arc<AgentConfig>,
    caches: CacheManager,
    network: Arc<dyn Network>,
    stats: Arc<ResolutionStats>,
}

impl LifecycleController {
    pub fn new(
        descriptor: GenerationDescriptor,
        config: AgentConfig,
        caches: CacheManager,
        network: Arc<dyn Network>,
    ) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            config: Arc::new(config),
            caches,
            network,
            stats: Arc::new(ResolutionStats::new()),
        }
    }

    pub fn descriptor(&self) -> &GenerationDescriptor {
        &self.descriptor
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn caches(&self) -> &CacheManager {
        &self.caches
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Install signal: populate the generation, deferring the signal until done.
    pub fn install(&self, event: &InstallEvent) {
        info!("install generation {}", self.descriptor.id);
        if self.config.activation == ActivationPolicy::ActivateImmediately {
            event.skip_waiting();
        }
        let this = self.clone();
        event.wait_until(async move { this.populate().await });
    }

    /// Open the current generation and store every eager item in it.
    pub async fn populate(&self) -> Result<()> {
        self.caches.log_generations().await;
        self.caches
            .create_generation(
                &self.descriptor.id,
                &self.descriptor.items,
                Arc::clone(&self.network),
                self.config.max_concurrency,
            )
            .await
    }

    /// Activate signal: purge every other generation. Never fails the signal.
    pub fn activate(&self, event: &ActivateEvent) {
        info!("activate generation {}", self.descriptor.id);
        let this = self.clone();
        event.wait_until(async move {
            this.purge_stale().await;
            Ok(())
        });
    }

    pub async fn purge_stale(&self) -> PurgeReport {
        let keep = [self.descriptor.id.clone()];
        match self.caches.delete_all_except(&keep).await {
            Ok(report) => {
                if !report.is_clean() {
                    warn!(
                        "{} stale generation(s) could not be cleared",
                        report.failed.len()
                    );
                }
                report
            }
            Err(e) => {
                warn!("purging stale generations failed: {}", e);
                PurgeReport::default()
            }
        }
    }

    /// Fetch signal: answer with cache-first resolution.
    pub fn resolve_request(&self, event: &FetchEvent) {
        let this = self.clone();
        let request = event.request.clone();
        event.respond_with(async move { this.resolve(request).await.map(|r| r.response) });
    }

    /// Cache first, then network, then the fallback asset.
    pub async fn resolve(&self, request: Request) -> Result<Resolution> {
        if let Some(response) = self.caches.match_request(&request).await {
            debug!("cache hit {} {}", request.method, request.url);
            self.stats.record_cache_hit(response.body.len() as u64);
            return Ok(Resolution {
                response,
                source: ResolutionSource::Cache,
                store: None,
            });
        }

        debug!("cache miss {} {}, fetching", request.method, request.url);
        match self.network.fetch(&request).await {
            Ok(response) => {
                self.stats.record_network(response.body.len() as u64);
                let store = if self.config.runtime_caching.is_enabled() {
                    Some(self.store_at_runtime(request, &response))
                } else {
                    None
                };
                Ok(Resolution {
                    response,
                    source: ResolutionSource::Network,
                    store,
                })
            }
            Err(e) => {
                warn!("fetch of {} failed: {:#}", request.url, e);
                self.fallback().await
            }
        }
    }

    fn store_at_runtime(&self, request: Request, response: &Response) -> BestEffort {
        let store = self
            .caches
            .cache_fetched_response(&self.descriptor.id, request, response);
        let stats = Arc::clone(&self.stats);
        BestEffort::spawn(async move {
            let outcome = store.await;
            if let Err(e) = &outcome {
                warn!("runtime caching failed: {}", e);
            }
            stats.record_runtime_store(outcome.is_ok());
            outcome
        })
    }

    async fn fallback(&self) -> Result<Resolution> {
        let Some(key) = self.config.fallback_key.as_deref() else {
            self.stats.record_failure();
            return Err(AgentError::FallbackNotConfigured);
        };
        match self.caches.match_request(&Request::get(key)).await {
            Some(response) => {
                debug!("serving fallback {}", key);
                self.stats.record_fallback(response.body.len() as u64);
                Ok(Resolution {
                    response,
                    source: ResolutionSource::Fallback,
                    store: None,
                })
            }
            None => {
                warn!("fallback {} is not cached", key);
                self.stats.record_failure();
                Err(AgentError::FallbackMissing {
                    key: key.to_string(),
                })
            }
        }
    }
}
