//! Worker pool.
//!
//! [`TaskScheduler`] is a handle to a coordinator task that owns the
//! workers. The coordinator is a single event loop over commands from the
//! handle and events from the workers:
//!
//! - an idle worker pulls the next queued unit; new workers are spawned up
//!   to the pool size, each initialised once with the build parameters;
//! - a compiled unit's staleness delta is merged into the owning session and
//!   persisted at once, and the epoch sent with later tasks moves on;
//! - a reported failure ends the run: dispatch stops, every worker is torn
//!   down and the error is returned once;
//! - a worker that exits with a task in flight is a crash: the task counts as
//!   done and the pool carries on;
//! - a worker idle for its whole window asks to retire and is shut down
//!   unless work is queued.
//!
//! The coordinator outlives a single run, so watch-mode rebuilds reuse warm
//! workers.

mod message;
mod process;
mod transport;
mod worker;

pub use message::{FailureReport, UnitTask, WorkerEvent, WorkerId, WorkerInit, WorkerRequest};
pub use process::{ProcessTransport, WORKER_COMMAND, serve_stdio};
pub use transport::{EventSender, InProcessTransport, WorkerHandle, WorkerTransport};
pub use worker::serve;

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kiln_config::KilnConfig;
use rustc_hash::FxHashSet;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::driver::UnitOutcome;
use crate::error::{BuildError, BuildResult};
use crate::session::BuildSession;

/// Lifecycle of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No run has started yet.
    Idle,
    /// Units are queued or in flight.
    Dispatching,
    /// The last run finished; workers wait out their idle window.
    Draining,
    /// No workers are left.
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub pool_size: usize,
}

impl SchedulerOptions {
    /// One worker per CPU, minus one for the coordinator, unless configured.
    pub fn from_config(config: &KilnConfig) -> Self {
        let pool_size = config
            .workers
            .pool_size
            .unwrap_or_else(|| num_cpus::get().saturating_sub(1))
            .max(1);
        Self { pool_size }
    }
}

/// Result of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub outcomes: Vec<UnitOutcome>,
    /// Units whose worker exited while compiling them.
    pub crashed: Vec<PathBuf>,
}

type Reply = oneshot::Sender<BuildResult<RunReport>>;

enum Command {
    Run { tasks: Vec<PathBuf>, reply: Reply },
    Shutdown { reply: oneshot::Sender<()> },
}

#[derive(Debug)]
pub struct TaskScheduler {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SchedulerState>,
    coordinator: JoinHandle<()>,
}

impl TaskScheduler {
    /// Start the coordinator on the current runtime. Workers start lazily.
    pub fn new(
        session: Arc<BuildSession>,
        transport: Arc<dyn WorkerTransport>,
        options: SchedulerOptions,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SchedulerState::Idle);
        let coordinator = Coordinator {
            session,
            transport,
            pool_size: options.pool_size.max(1),
            events: events_tx,
            workers: BTreeMap::new(),
            next_id: 0,
            queue: VecDeque::new(),
            active: None,
            waiting: VecDeque::new(),
            shutdown: None,
            state: state_tx,
        };
        Self {
            commands: commands_tx,
            state: state_rx,
            coordinator: tokio::spawn(coordinator.run(commands_rx, events_rx)),
        }
    }

    /// Compile `tasks` on the pool. Runs are served one at a time in order.
    pub async fn run(&self, tasks: Vec<PathBuf>) -> BuildResult<RunReport> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Run { tasks, reply })
            .map_err(|_| BuildError::Cancelled)?;
        response.await.map_err(|_| BuildError::Cancelled)?
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.clone()
    }

    /// Wait until the pool reaches `state`.
    pub async fn wait_for(&self, state: SchedulerState) -> BuildResult<()> {
        let mut rx = self.state.clone();
        rx.wait_for(|current| *current == state)
            .await
            .map(|_| ())
            .map_err(|_| BuildError::Cancelled)
    }

    /// Ask every worker to exit and stop the coordinator.
    ///
    /// Workers that do not exit within `grace` are left to the transport.
    pub async fn shutdown(self, grace: Duration) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Shutdown { reply }).is_ok()
            && tokio::time::timeout(grace, done).await.is_err()
        {
            warn!("workers did not exit in time");
            self.coordinator.abort();
        }
    }
}

#[derive(Debug)]
struct Worker {
    handle: WorkerHandle,
    /// Unit in flight.
    busy: Option<PathBuf>,
    /// Told to shut down; takes no more work.
    retiring: bool,
}

#[derive(Debug)]
struct ActiveRun {
    reply: Reply,
    remaining: usize,
    report: RunReport,
}

struct Coordinator {
    session: Arc<BuildSession>,
    transport: Arc<dyn WorkerTransport>,
    pool_size: usize,
    events: EventSender,
    workers: BTreeMap<WorkerId, Worker>,
    next_id: WorkerId,
    queue: VecDeque<PathBuf>,
    active: Option<ActiveRun>,
    waiting: VecDeque<(Vec<PathBuf>, Reply)>,
    shutdown: Option<oneshot::Sender<()>>,
    state: watch::Sender<SchedulerState>,
}

impl Coordinator {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<(WorkerId, WorkerEvent)>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv(), if self.shutdown.is_none() => match command {
                    Some(Command::Run { tasks, reply }) => self.submit(tasks, reply),
                    Some(Command::Shutdown { reply }) => self.begin_shutdown(reply),
                    None => {
                        self.cancel_all();
                        self.stop_workers();
                        break;
                    }
                },
                Some((id, event)) = events.recv() => self.handle(id, event),
            }
            if self.shutdown.is_some() && self.workers.is_empty() {
                if let Some(reply) = self.shutdown.take() {
                    let _ = reply.send(());
                }
                break;
            }
        }
        self.set_state(SchedulerState::Terminated);
        debug!("coordinator stopped");
    }

    fn set_state(&self, state: SchedulerState) {
        self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    /// State after a change in the worker set while no run is active.
    fn settle(&self) {
        if self.active.is_some() {
            return;
        }
        if self.workers.is_empty() {
            self.set_state(SchedulerState::Terminated);
        } else {
            self.set_state(SchedulerState::Draining);
        }
    }

    fn submit(&mut self, tasks: Vec<PathBuf>, reply: Reply) {
        if self.active.is_some() {
            self.waiting.push_back((tasks, reply));
        } else {
            self.start(tasks, reply);
        }
    }

    fn start(&mut self, tasks: Vec<PathBuf>, reply: Reply) {
        let mut seen = FxHashSet::default();
        let tasks: Vec<PathBuf> = tasks.into_iter().filter(|t| seen.insert(t.clone())).collect();
        if tasks.is_empty() {
            let _ = reply.send(Ok(RunReport::default()));
            self.settle();
            return;
        }

        info!(units = tasks.len(), pool = self.pool_size, "dispatching");
        self.active = Some(ActiveRun {
            reply,
            remaining: tasks.len(),
            report: RunReport::default(),
        });
        self.queue.extend(tasks);
        self.set_state(SchedulerState::Dispatching);
        self.dispatch();
    }

    fn start_next(&mut self) {
        if let Some((tasks, reply)) = self.waiting.pop_front() {
            self.start(tasks, reply);
        } else {
            self.settle();
        }
    }

    fn idle_worker(&self) -> Option<WorkerId> {
        self.workers
            .iter()
            .find(|(_, w)| w.busy.is_none() && !w.retiring)
            .map(|(id, _)| *id)
    }

    fn available_slots(&self) -> usize {
        let working = self.workers.values().filter(|w| !w.retiring).count();
        self.pool_size.saturating_sub(working)
    }

    fn spawn_worker(&mut self) -> BuildResult<WorkerId> {
        let id = self.next_id;
        self.next_id += 1;
        let handle = self.transport.spawn(id, self.events.clone())?;
        let init = WorkerInit {
            params: self.session.params().as_ref().clone(),
        };
        if !handle.send(WorkerRequest::Init(init)) {
            return Err(BuildError::Worker(format!("worker {id} closed before init")));
        }
        debug!(worker = id, "worker spawned");
        self.workers.insert(
            id,
            Worker {
                handle,
                busy: None,
                retiring: false,
            },
        );
        Ok(id)
    }

    /// Hand queued units to idle workers, spawning up to the pool size.
    fn dispatch(&mut self) {
        while !self.queue.is_empty() {
            let id = match self.idle_worker() {
                Some(id) => id,
                None if self.available_slots() > 0 => match self.spawn_worker() {
                    Ok(id) => id,
                    Err(e) => {
                        self.fail(e);
                        return;
                    }
                },
                None => return,
            };
            let Some(unit) = self.queue.pop_front() else {
                return;
            };
            let task = WorkerRequest::Task(UnitTask {
                unit: unit.clone(),
                epoch: self.session.epoch(),
            });
            let Some(worker) = self.workers.get_mut(&id) else {
                self.queue.push_front(unit);
                return;
            };
            if worker.handle.send(task) {
                debug!(worker = id, unit = %unit.display(), "task dispatched");
                worker.busy = Some(unit);
            } else {
                // Gone; its exit event removes it for good.
                worker.retiring = true;
                self.queue.push_front(unit);
            }
        }
    }

    fn handle(&mut self, id: WorkerId, event: WorkerEvent) {
        match event {
            WorkerEvent::Compiled { outcome, delta } => {
                let Some(worker) = self.workers.get_mut(&id) else {
                    return;
                };
                worker.busy = None;
                if self.active.is_none() {
                    return;
                }
                if let Err(e) = self.session.merge_delta(&delta) {
                    self.fail(e);
                    return;
                }
                if !delta.is_empty() {
                    self.session.bump_epoch();
                }
                if let Some(active) = self.active.as_mut() {
                    active.report.outcomes.push(outcome);
                }
                self.dispatch();
                self.complete_one();
            }
            WorkerEvent::Failed { error } => {
                if !self.workers.contains_key(&id) || self.active.is_none() {
                    return;
                }
                self.fail(error.into());
            }
            WorkerEvent::Idle => {
                let queue_empty = self.queue.is_empty();
                if let Some(worker) = self.workers.get_mut(&id)
                    && worker.busy.is_none()
                    && queue_empty
                    && !worker.retiring
                {
                    debug!(worker = id, "retiring idle worker");
                    worker.retiring = true;
                    worker.handle.send(WorkerRequest::Shutdown);
                }
            }
            WorkerEvent::Exited => {
                let Some(worker) = self.workers.remove(&id) else {
                    return;
                };
                match worker.busy {
                    Some(unit) => {
                        warn!(worker = id, unit = %unit.display(), "worker crashed, treating task as done");
                        if let Some(active) = self.active.as_mut() {
                            active.report.crashed.push(unit);
                        }
                        self.dispatch();
                        self.complete_one();
                    }
                    None => {
                        debug!(worker = id, "worker exited");
                        self.dispatch();
                        self.settle();
                    }
                }
            }
        }
    }

    fn complete_one(&mut self) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        active.remaining = active.remaining.saturating_sub(1);
        if active.remaining > 0 {
            return;
        }
        if let Some(active) = self.active.take() {
            info!(
                compiled = active.report.outcomes.len(),
                crashed = active.report.crashed.len(),
                "run finished"
            );
            self.start_next();
            let _ = active.reply.send(Ok(active.report));
        }
    }

    /// Stop every worker and answer the active run with `error`.
    ///
    /// Runs submitted meanwhile still start afterwards, on fresh workers.
    fn fail(&mut self, error: BuildError) {
        error!(error = %error, "build failed, stopping workers");
        self.stop_workers();
        self.set_state(SchedulerState::Terminated);
        if let Some(active) = self.active.take() {
            let _ = active.reply.send(Err(error));
        }
        self.start_next();
    }

    fn stop_workers(&mut self) {
        self.queue.clear();
        for (_, worker) in std::mem::take(&mut self.workers) {
            worker.handle.terminate();
        }
    }

    fn cancel_all(&mut self) {
        if let Some(active) = self.active.take() {
            let _ = active.reply.send(Err(BuildError::Cancelled));
        }
        for (_, reply) in self.waiting.drain(..) {
            let _ = reply.send(Err(BuildError::Cancelled));
        }
        self.queue.clear();
    }

    fn begin_shutdown(&mut self, reply: oneshot::Sender<()>) {
        self.cancel_all();
        for worker in self.workers.values_mut() {
            worker.retiring = true;
            worker.handle.send(WorkerRequest::Shutdown);
        }
        self.shutdown = Some(reply);
    }
}
