//! How the coordinator reaches its workers.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::message::{WorkerEvent, WorkerId, WorkerRequest};
use super::worker::serve;
use crate::error::{BuildError, BuildResult};
use crate::toolchain::ToolchainFactory;

/// Events from every worker, tagged with the sender.
pub type EventSender = mpsc::UnboundedSender<(WorkerId, WorkerEvent)>;

/// Starts workers. A transport must emit [`WorkerEvent::Exited`] exactly
/// once per worker, whatever the reason it stopped.
pub trait WorkerTransport: Send + Sync + fmt::Debug {
    fn spawn(&self, id: WorkerId, events: EventSender) -> BuildResult<WorkerHandle>;
}

/// The coordinator's end of one worker.
pub struct WorkerHandle {
    requests: mpsc::UnboundedSender<WorkerRequest>,
    kill: Option<Box<dyn FnOnce() + Send>>,
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("closed", &self.requests.is_closed())
            .field("killable", &self.kill.is_some())
            .finish()
    }
}

impl WorkerHandle {
    pub fn new(requests: mpsc::UnboundedSender<WorkerRequest>) -> Self {
        Self {
            requests,
            kill: None,
        }
    }

    /// Hard stop used on teardown, on top of the shutdown request.
    pub fn with_kill(mut self, kill: impl FnOnce() + Send + 'static) -> Self {
        self.kill = Some(Box::new(kill));
        self
    }

    /// False when the worker is gone.
    pub fn send(&self, request: WorkerRequest) -> bool {
        self.requests.send(request).is_ok()
    }

    pub fn terminate(mut self) {
        let _ = self.requests.send(WorkerRequest::Shutdown);
        if let Some(kill) = self.kill.take() {
            kill();
        }
    }
}

/// Workers on OS threads inside this process, each with its own
/// single-threaded runtime and session.
///
/// A panic inside a worker is reported as an exit, like a crashed process.
#[derive(Clone)]
pub struct InProcessTransport {
    factory: ToolchainFactory,
    live: Arc<AtomicUsize>,
}

impl fmt::Debug for InProcessTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcessTransport")
            .field("live", &self.live_workers())
            .finish()
    }
}

impl InProcessTransport {
    pub fn new(factory: ToolchainFactory) -> Self {
        Self {
            factory,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Worker threads that have not finished yet.
    pub fn live_workers(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

impl WorkerTransport for InProcessTransport {
    fn spawn(&self, id: WorkerId, events: EventSender) -> BuildResult<WorkerHandle> {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let factory = self.factory.clone();
        let live = self.live.clone();

        live.fetch_add(1, Ordering::AcqRel);
        let spawned = std::thread::Builder::new()
            .name(format!("kiln-worker-{id}"))
            .spawn(move || {
                match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => {
                        let sink = events.clone();
                        let emit = move |event: WorkerEvent| sink.send((id, event)).is_ok();
                        let run = std::panic::catch_unwind(AssertUnwindSafe(|| {
                            runtime.block_on(serve(requests_rx, emit, factory))
                        }));
                        if run.is_err() {
                            warn!(worker = id, "worker panicked");
                        }
                    }
                    Err(e) => error!(worker = id, error = %e, "cannot start worker runtime"),
                }
                live.fetch_sub(1, Ordering::AcqRel);
                debug!(worker = id, "worker thread finished");
                let _ = events.send((id, WorkerEvent::Exited));
            });

        match spawned {
            Ok(_) => Ok(WorkerHandle::new(requests_tx)),
            Err(e) => {
                self.live.fetch_sub(1, Ordering::AcqRel);
                Err(BuildError::Worker(format!("cannot spawn worker thread: {e}")))
            }
        }
    }
}
