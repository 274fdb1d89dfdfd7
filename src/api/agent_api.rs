use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;

use super::simple::init_tracing;
use crate::config::AgentManifest;
use crate::engine::cache::CacheManager;
use crate::engine::controller::LifecycleController;
use crate::engine::stats::StatsSnapshot;
use crate::server::handler::AgentServer;
use crate::server::registration::Registration;
use crate::source::http_source::HttpNetwork;
use crate::source::traits::Network;
use crate::storage::{CacheStorage, MemoryCacheStorage};

/// What the embedding application needs to point its pages at the agent.
#[derive(Debug, Clone)]
pub struct AgentInfo {
    pub generation: String,
    pub base_url: String,
}

/// An agent served on a loopback port, backed by in-memory cache storage and
/// an HTTP origin.
pub struct AgentHost {
    server: AgentServer,
    network: Arc<HttpNetwork>,
    storage: Arc<MemoryCacheStorage>,
}

impl AgentHost {
    /// Install and activate the manifest's generation, then start serving.
    pub async fn start(manifest: AgentManifest, origin: &str) -> Result<Self> {
        init_tracing();

        let network = Arc::new(HttpNetwork::new(origin)?);
        let storage = Arc::new(MemoryCacheStorage::new());
        let registration = Arc::new(Registration::new(network.clone()));

        let host_network: Arc<dyn Network> = network.clone();
        let controller = controller_for(manifest, &storage, host_network);
        registration.register(controller).await?;

        let server = AgentServer::start(registration).await?;
        Ok(Self {
            server,
            network,
            storage,
        })
    }

    pub fn info(&self) -> Option<AgentInfo> {
        let active = self.server.registration().active()?;
        Some(AgentInfo {
            generation: active.generation().to_string(),
            base_url: self.server.url_for(""),
        })
    }

    /// Install a newer manifest. Depending on its activation policy it takes
    /// over now or after [`AgentHost::reload`].
    pub async fn update(&self, manifest: AgentManifest) -> Result<()> {
        let network: Arc<dyn Network> = self.network.clone();
        let controller = controller_for(manifest, &self.storage, network);
        self.server.registration().register(controller).await?;
        Ok(())
    }

    /// Every page has been closed or reloaded; hand control to a waiting agent.
    pub async fn reload(&self) -> bool {
        self.server.registration().release_clients().await.is_some()
    }

    pub fn set_origin(&self, origin: &str, headers: HashMap<String, String>) -> Result<()> {
        self.network.update_origin(origin, headers)
    }

    pub async fn generations(&self) -> Vec<String> {
        self.storage.keys().await.unwrap_or_default()
    }

    pub fn watch_stats(&self) -> Option<StatsSnapshot> {
        let active = self.server.registration().active()?;
        Some(active.controller().stats())
    }

    pub fn dispose(self) {
        self.server.shutdown();
    }
}

fn controller_for(
    manifest: AgentManifest,
    storage: &Arc<MemoryCacheStorage>,
    network: Arc<dyn Network>,
) -> LifecycleController {
    LifecycleController::new(
        manifest.generation,
        manifest.config,
        CacheManager::new(storage.clone()),
        network,
    )
}
