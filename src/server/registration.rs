// Host-side registration: drives a controller through install, waiting and
// activation, and routes fetches to whichever worker is in control.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::engine::controller::LifecycleController;
use crate::engine::events::{ActivateEvent, FetchEvent, InstallEvent};
use crate::error::{AgentError, Result};
use crate::message::{Request, Response};
use crate::source::traits::Network;

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    /// Installed and waiting for the previous worker's pages to go away.
    Installed,
    Activating,
    Activated,
    /// Failed to install or replaced; never used again.
    Redundant,
}

pub struct Worker {
    id: u64,
    controller: LifecycleController,
    state: RwLock<WorkerState>,
}

impl Worker {
    fn new(controller: LifecycleController) -> Self {
        Self {
            id: NEXT_WORKER_ID.fetch_add(1, Ordering::SeqCst),
            controller,
            state: RwLock::new(WorkerState::Installing),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    pub fn generation(&self) -> &str {
        &self.controller.descriptor().id
    }

    pub fn controller(&self) -> &LifecycleController {
        &self.controller
    }

    fn set_state(&self, state: WorkerState) {
        let old = std::mem::replace(&mut *self.state.write(), state);
        debug!("worker {} ({}) {:?} -> {:?}", self.id, self.generation(), old, state);
    }
}

#[derive(Default)]
struct Slots {
    waiting: Option<Arc<Worker>>,
    active: Option<Arc<Worker>>,
}

pub struct Registration {
    network: Arc<dyn Network>,
    slots: RwLock<Slots>,
    /// Serializes register and release jobs. Held across install and activation.
    jobs: Mutex<()>,
}

impl Registration {
    /// `network` serves requests while no worker is in control.
    pub fn new(network: Arc<dyn Network>) -> Self {
        Self {
            network,
            slots: RwLock::new(Slots::default()),
            jobs: Mutex::new(()),
        }
    }

    pub fn active(&self) -> Option<Arc<Worker>> {
        self.slots.read().active.clone()
    }

    pub fn waiting(&self) -> Option<Arc<Worker>> {
        self.slots.read().waiting.clone()
    }

    /// Install a new worker. On failure the worker is discarded and the
    /// current one keeps control. On success it activates right away when
    /// nothing is in control or it asked to skip waiting; otherwise it waits
    /// for [`Registration::release_clients`].
    ///
    /// Jobs run one at a time: a second `register` waits until the first has
    /// installed and either activated or settled into the waiting slot.
    pub async fn register(&self, controller: LifecycleController) -> Result<Arc<Worker>> {
        let _job = self.jobs.lock().await;
        let worker = Arc::new(Worker::new(controller));
        info!("registering worker {} for generation {}", worker.id, worker.generation());

        let event = InstallEvent::new();
        worker.controller.install(&event);
        if let Err(e) = event.settle().await {
            warn!("worker {} failed to install: {}", worker.id, e);
            worker.set_state(WorkerState::Redundant);
            return Err(e);
        }
        worker.set_state(WorkerState::Installed);

        let skip = event.skip_waiting_requested();
        let (activate_now, replaced) = {
            let mut slots = self.slots.write();
            let replaced = slots.waiting.take();
            let activate_now = slots.active.is_none() || skip;
            if !activate_now {
                slots.waiting = Some(Arc::clone(&worker));
            }
            (activate_now, replaced)
        };
        if let Some(old) = replaced {
            old.set_state(WorkerState::Redundant);
        }

        if activate_now {
            self.activate(Arc::clone(&worker)).await;
        } else {
            info!("worker {} waiting for clients of the current worker to close", worker.id);
        }
        Ok(worker)
    }

    /// Every page using the current worker has gone away; promote the waiting one.
    pub async fn release_clients(&self) -> Option<Arc<Worker>> {
        let _job = self.jobs.lock().await;
        let waiting = self.slots.write().waiting.take()?;
        self.activate(Arc::clone(&waiting)).await;
        Some(waiting)
    }

    async fn activate(&self, worker: Arc<Worker>) {
        worker.set_state(WorkerState::Activating);
        let event = ActivateEvent::new();
        worker.controller.activate(&event);
        if let Err(e) = event.settle().await {
            warn!("worker {} activation reported: {}", worker.id, e);
        }

        let previous = self.slots.write().active.replace(Arc::clone(&worker));
        if let Some(previous) = previous {
            previous.set_state(WorkerState::Redundant);
        }
        worker.set_state(WorkerState::Activated);
        info!("worker {} now controls generation {}", worker.id, worker.generation());
    }

    /// Route a request through the active worker, or straight to the network.
    pub async fn dispatch_fetch(&self, request: Request) -> Result<Response> {
        if let Some(worker) = self.active() {
            let event = FetchEvent::new(request);
            worker.controller.resolve_request(&event);
            if let Some(response) = event.response().await? {
                return Ok(response);
            }
            return self.passthrough(&event.request).await;
        }
        self.passthrough(&request).await
    }

    async fn passthrough(&self, request: &Request) -> Result<Response> {
        debug!("no controller for {}, going to network", request.url);
        self.network
            .fetch(request)
            .await
            .map_err(|e| AgentError::fetch(&request.url, &e))
    }
}
