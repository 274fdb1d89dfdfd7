// Bounded parallel fetch of a generation's eager items.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{AgentError, Result};
use crate::message::{Request, Response};
use crate::source::traits::Network;

/// Fetch every item, at most `max_concurrency` at a time.
///
/// All-or-nothing: a transport failure or a non-2xx status cancels the
/// remaining fetches and fails the whole batch. On success the pairs come
/// back in the order of `items`.
pub async fn fetch_all(
    network: Arc<dyn Network>,
    items: &[String],
    max_concurrency: u32,
) -> Result<Vec<(Request, Response)>> {
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1) as usize));
    let cancel = CancellationToken::new();

    let mut tasks = Vec::with_capacity(items.len());
    for key in items {
        let network = Arc::clone(&network);
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();
        let key = key.clone();
        tasks.push(tokio::spawn(async move {
            let result = fetch_item(network, semaphore, &cancel, &key).await;
            if result.is_err() {
                cancel.cancel();
            }
            result
        }));
    }

    let mut entries = Vec::with_capacity(tasks.len());
    let mut root_cause: Option<AgentError> = None;
    let mut cancelled: Option<AgentError> = None;
    for task in tasks {
        let outcome = task
            .await
            .map_err(|e| AgentError::Task(e.to_string()))
            .and_then(|r| r);
        match outcome {
            Ok(entry) => entries.push(entry),
            Err(e @ AgentError::Cancelled { .. }) => {
                cancelled.get_or_insert(e);
            }
            Err(e) => {
                root_cause.get_or_insert(e);
            }
        }
    }

    // Report what triggered the cancellation, not its fallout.
    match root_cause.or(cancelled) {
        Some(e) => Err(e),
        None => Ok(entries),
    }
}

async fn fetch_item(
    network: Arc<dyn Network>,
    semaphore: Arc<Semaphore>,
    cancel: &CancellationToken,
    key: &str,
) -> Result<(Request, Response)> {
    let _permit = tokio::select! {
        permit = semaphore.acquire() => {
            permit.map_err(|e| AgentError::Task(e.to_string()))?
        }
        _ = cancel.cancelled() => {
            debug!("eager fetch of {} cancelled while queued", key);
            return Err(AgentError::Cancelled { key: key.to_string() });
        }
    };

    let request = Request::get(key);
    let response = tokio::select! {
        res = network.fetch(&request) => res,
        _ = cancel.cancelled() => {
            debug!("eager fetch of {} cancelled in flight", key);
            return Err(AgentError::Cancelled { key: key.to_string() });
        }
    };

    let response = match response {
        Ok(response) => response,
        Err(e) => {
            warn!("eager fetch of {} failed: {:#}", key, e);
            return Err(AgentError::fetch(key, &e));
        }
    };
    if !response.is_ok() {
        warn!("eager fetch of {} returned HTTP {}", key, response.status);
        return Err(AgentError::BadStatus {
            key: key.to_string(),
            status: response.status,
        });
    }

    debug!("eager fetch of {} done ({} bytes)", key, response.body.len());
    Ok((request, response))
}
