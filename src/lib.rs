//! Cache-first request interception with versioned cache generations.
//!
//! A [`LifecycleController`] reacts to three signals delivered by its host:
//!
//! - install: open the descriptor's generation and store every eager item,
//!   all or nothing;
//! - activate: delete every other generation;
//! - fetch: answer from any generation, else from the network (optionally
//!   caching the response), else with the cached fallback asset.
//!
//! Cache storage and the network are injected capabilities
//! ([`storage::CacheStorage`], [`source::traits::Network`]). The `server`
//! module hosts a controller behind a local HTTP front.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod message;
pub mod server;
pub mod source;
pub mod storage;

pub use config::{ActivationPolicy, AgentConfig, AgentManifest, GenerationDescriptor, RuntimeCaching};
pub use engine::cache::{CacheManager, DeleteMode, PurgeReport};
pub use engine::controller::{LifecycleController, Resolution, ResolutionSource};
pub use engine::events::{ActivateEvent, BestEffort, FetchEvent, InstallEvent};
pub use error::AgentError;
pub use message::{Method, Request, Response};
