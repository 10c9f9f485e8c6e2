//! Workers as child processes speaking newline-delimited JSON.
//!
//! The child is the current executable run with a hidden subcommand; its
//! entry point is [`serve_stdio`]. Requests go to the child's stdin, events
//! come back on its stdout. Child logs go to stderr.

use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::message::{WorkerEvent, WorkerId, WorkerRequest};
use super::transport::{EventSender, WorkerHandle, WorkerTransport};
use super::worker::serve;
use crate::error::{BuildError, BuildResult};
use crate::toolchain::ToolchainFactory;

/// Hidden subcommand that turns the binary into a worker.
pub const WORKER_COMMAND: &str = "__worker";

#[derive(Debug, Clone)]
pub struct ProcessTransport {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessTransport {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Re-run the current executable as a worker.
    pub fn current_exe() -> BuildResult<Self> {
        let program = std::env::current_exe()
            .map_err(|e| BuildError::Worker(format!("cannot locate current executable: {e}")))?;
        Ok(Self::new(program, vec![WORKER_COMMAND.to_string()]))
    }
}

impl WorkerTransport for ProcessTransport {
    fn spawn(&self, id: WorkerId, events: EventSender) -> BuildResult<WorkerHandle> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                BuildError::Worker(format!("cannot start {}: {e}", self.program.display()))
            })?;
        let (Some(mut stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(BuildError::Worker("worker pipes unavailable".to_string()));
        };
        debug!(worker = id, pid = ?child.id(), "worker process started");

        let (requests_tx, mut requests_rx) = mpsc::unbounded_channel::<WorkerRequest>();
        tokio::spawn(async move {
            while let Some(request) = requests_rx.recv().await {
                let Ok(mut line) = serde_json::to_vec(&request) else {
                    continue;
                };
                line.push(b'\n');
                if stdin.write_all(&line).await.is_err() || stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        let (kill_tx, mut kill_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut armed = true;
            loop {
                tokio::select! {
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => match serde_json::from_str::<WorkerEvent>(&line) {
                            Ok(event) => {
                                if events.send((id, event)).is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!(worker = id, error = %e, "unreadable worker message"),
                        },
                        Ok(None) | Err(_) => break,
                    },
                    signal = &mut kill_rx, if armed => {
                        armed = false;
                        if signal.is_ok() {
                            let _ = child.start_kill();
                            break;
                        }
                    }
                }
            }
            match child.wait().await {
                Ok(status) if status.success() => debug!(worker = id, "worker process exited"),
                Ok(status) => warn!(worker = id, %status, "worker process died"),
                Err(e) => warn!(worker = id, error = %e, "cannot reap worker process"),
            }
            let _ = events.send((id, WorkerEvent::Exited));
        });

        Ok(WorkerHandle::new(requests_tx).with_kill(move || {
            let _ = kill_tx.send(());
        }))
    }
}

/// Worker entry point: requests on stdin, events on stdout.
///
/// Returns when stdin closes, on shutdown, or after the idle timeout.
pub async fn serve_stdio(factory: ToolchainFactory) {
    let (requests_tx, requests_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match serde_json::from_str::<WorkerRequest>(&line) {
                Ok(request) => {
                    if requests_tx.send(request).is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "unreadable request"),
            }
        }
    });

    let stdout = std::io::stdout();
    let emit = move |event: WorkerEvent| {
        let mut out = stdout.lock();
        serde_json::to_writer(&mut out, &event).is_ok()
            && out.write_all(b"\n").is_ok()
            && out.flush().is_ok()
    };
    serve(requests_rx, emit, factory).await;
}
