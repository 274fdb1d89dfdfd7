use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::AgentError;

/// Cached asset served when the network is unreachable and nothing is cached.
pub const DEFAULT_FALLBACK_KEY: &str = "/service-worker-boilerplate/gallery/myLittleVader.jpg";

/// Default bound on concurrent eager fetches during install.
pub const DEFAULT_MAX_CONCURRENCY: u32 = 6;

/// Identifier of the generation shipped with this build.
pub const DEFAULT_GENERATION_ID: &str = "v1";

const DEFAULT_ITEMS: &[&str] = &[
    "/service-worker-boilerplate/",
    "/service-worker-boilerplate/index.html",
    "/service-worker-boilerplate/style.css",
    "/service-worker-boilerplate/app.js",
    "/service-worker-boilerplate/image-list.js",
    "/service-worker-boilerplate/star-wars-logo.jpg",
    "/service-worker-boilerplate/gallery/bountyHunters.jpg",
    "/service-worker-boilerplate/gallery/myLittleVader.jpg",
    "/service-worker-boilerplate/gallery/snowTroopers.jpg",
    "/service-worker-boilerplate/gallery/sci.jpg",
    "/service-worker-boilerplate/gallery/tigri.jpg",
    "/service-worker-boilerplate/gallery/windsurf.jpg",
];

/// A named cache generation and the resources stored eagerly at install.
///
/// The `id` is the only thing activation looks at when deciding which
/// generation survives, so two builds that may run side by side must never
/// share one.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GenerationDescriptor {
    pub id: String,
    #[serde(default)]
    pub items: Vec<String>,
}

impl GenerationDescriptor {
    pub fn new(id: impl Into<String>, items: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            id: id.into(),
            items: items.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for GenerationDescriptor {
    fn default() -> Self {
        Self::new(DEFAULT_GENERATION_ID, DEFAULT_ITEMS.iter().copied())
    }
}

/// When a freshly installed agent takes control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivationPolicy {
    /// Stay installed until no page uses the previous agent.
    #[default]
    WaitForReload,
    /// Take control right after install, even over pages loaded by the old agent.
    ActivateImmediately,
}

/// Whether network responses for unmatched requests are written to the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeCaching {
    Disabled,
    /// Shipped setting: pages keep working offline for assets first seen online.
    #[default]
    Enabled,
}

impl RuntimeCaching {
    pub fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled)
    }
}

/// Process-wide agent settings, fixed at load time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub activation: ActivationPolicy,
    pub runtime_caching: RuntimeCaching,
    /// Cache key of the substitute response used when the network fails.
    pub fallback_key: Option<String>,
    /// Maximum number of eager items fetched at once during install.
    pub max_concurrency: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            activation: ActivationPolicy::WaitForReload,
            runtime_caching: RuntimeCaching::Enabled,
            fallback_key: Some(DEFAULT_FALLBACK_KEY.to_string()),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

/// Deployable content manifest: the generation plus the agent settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AgentManifest {
    #[serde(default)]
    pub generation: GenerationDescriptor,
    #[serde(default)]
    pub config: AgentConfig,
}

impl AgentManifest {
    pub fn from_json(json: &str) -> Result<Self, AgentError> {
        let manifest: Self = serde_json::from_str(json)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_file(path: &Path) -> Result<Self, AgentError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    fn validate(&self) -> Result<(), AgentError> {
        if self.generation.id.trim().is_empty() {
            return Err(AgentError::InvalidConfig(
                "generation id must not be empty".to_string(),
            ));
        }
        if self.config.max_concurrency == 0 {
            return Err(AgentError::InvalidConfig(
                "max_concurrency must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
