// Lifecycle and fetch signals with their deferral handles.
//
// Handlers register work on a signal and return immediately. The work is
// spawned on the tokio runtime right away; the host awaits `settle()` /
// `response()` to learn when (and how) it finished.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::{AgentError, Result};
use crate::message::{Request, Response};

/// Work the host must wait for before finalizing a lifecycle signal.
#[derive(Default)]
pub struct Deferral {
    tasks: Mutex<Vec<JoinHandle<Result<()>>>>,
}

impl Deferral {
    pub fn wait_until<F>(&self, work: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.tasks.lock().push(tokio::spawn(work));
    }

    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Wait for every registered task. All of them run to completion; the
    /// first failure (in registration order) is returned.
    pub async fn settle(&self) -> Result<()> {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        let mut first_err = None;
        for joined in join_all(tasks).await {
            let outcome = joined.map_err(|e| AgentError::Task(e.to_string())).and_then(|r| r);
            if let Err(e) = outcome {
                if first_err.is_none() {
                    first_err = Some(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct InstallEvent {
    deferral: Deferral,
    skip_waiting: AtomicBool,
}

impl InstallEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wait_until<F>(&self, work: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.deferral.wait_until(work);
    }

    /// Ask the host to activate this agent as soon as install succeeds.
    pub fn skip_waiting(&self) {
        self.skip_waiting.store(true, Ordering::Relaxed);
    }

    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::Relaxed)
    }

    pub async fn settle(&self) -> Result<()> {
        self.deferral.settle().await
    }
}

#[derive(Default)]
pub struct ActivateEvent {
    deferral: Deferral,
}

impl ActivateEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wait_until<F>(&self, work: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.deferral.wait_until(work);
    }

    pub async fn settle(&self) -> Result<()> {
        self.deferral.settle().await
    }
}

/// A request intercepted from a controlled page.
pub struct FetchEvent {
    pub request: Request,
    response: Mutex<Option<JoinHandle<Result<Response>>>>,
    responded: AtomicBool,
}

impl FetchEvent {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            response: Mutex::new(None),
            responded: AtomicBool::new(false),
        }
    }

    /// Supply the response for this request. Only the first call counts.
    pub fn respond_with<F>(&self, resolution: F)
    where
        F: Future<Output = Result<Response>> + Send + 'static,
    {
        if self.responded.swap(true, Ordering::AcqRel) {
            warn!("respond_with called twice for {}, ignoring", self.request.url);
            return;
        }
        *self.response.lock() = Some(tokio::spawn(resolution));
    }

    /// `None` when no handler responded; the host then fetches the request itself.
    pub async fn response(&self) -> Result<Option<Response>> {
        let handle = self.response.lock().take();
        match handle {
            Some(handle) => handle
                .await
                .map_err(|e| AgentError::Task(e.to_string()))?
                .map(Some),
            None => Ok(None),
        }
    }
}

/// Handle to a side effect whose failure must not reach the caller.
///
/// Dropping it detaches the task; awaiting [`BestEffort::outcome`] reports
/// what happened.
pub struct BestEffort(JoinHandle<Result<()>>);

impl BestEffort {
    pub fn spawn<F>(work: F) -> Self
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        Self(tokio::spawn(work))
    }

    pub async fn outcome(self) -> Result<()> {
        self.0.await.map_err(|e| AgentError::Task(e.to_string()))?
    }
}
