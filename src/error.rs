use thiserror::Error;

use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("install of generation {generation} failed: {source}")]
    InstallFailed {
        generation: String,
        #[source]
        source: Box<AgentError>,
    },

    #[error("fetch of {key} failed: {reason}")]
    Fetch { key: String, reason: String },

    #[error("fetch of {key} returned HTTP {status}")]
    BadStatus { key: String, status: u16 },

    #[error("fetch of {key} was cancelled")]
    Cancelled { key: String },

    #[error("fallback response {key} is not cached")]
    FallbackMissing { key: String },

    #[error("no fallback response configured")]
    FallbackNotConfigured,

    #[error("deferred task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AgentError {
    pub(crate) fn fetch(key: &str, err: &anyhow::Error) -> Self {
        Self::Fetch {
            key: key.to_string(),
            reason: format!("{:#}", err),
        }
    }

    /// True when the failure came from the network rather than the cache.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Fetch { .. } | Self::BadStatus { .. })
    }
}

pub type Result<T, E = AgentError> = std::result::Result<T, E>;
