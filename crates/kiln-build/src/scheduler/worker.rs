//! The worker loop, shared by every transport.

use std::sync::Arc;
use std::time::Duration;

use kiln_config::KilnConfig;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error};

use super::message::{FailureReport, WorkerEvent, WorkerInit, WorkerRequest};
use crate::driver::UnitDriver;
use crate::error::{BuildError, BuildResult};
use crate::session::BuildSession;
use crate::toolchain::ToolchainFactory;

fn build_driver(init: WorkerInit, factory: &ToolchainFactory) -> BuildResult<UnitDriver> {
    let params = Arc::new(init.params);
    let toolchain = factory(&params)?;
    let session = Arc::new(BuildSession::new(params, toolchain.manifests.clone(), false));
    Ok(UnitDriver::new(session, toolchain))
}

fn failed(err: &BuildError) -> WorkerEvent {
    WorkerEvent::Failed {
        error: FailureReport::from(err),
    }
}

/// Serve requests until shutdown, a closed channel, or two idle windows.
///
/// `emit` returns false once the coordinator can no longer be reached.
/// After one idle window the worker emits [`WorkerEvent::Idle`]; if nothing
/// arrives during a second window it exits on its own.
pub async fn serve<F>(
    mut requests: mpsc::UnboundedReceiver<WorkerRequest>,
    mut emit: F,
    factory: ToolchainFactory,
) where
    F: FnMut(WorkerEvent) -> bool,
{
    let mut driver: Option<UnitDriver> = None;
    let mut idle_window: Duration = KilnConfig::default().idle_window();
    let mut asked_to_retire = false;

    loop {
        let request = match timeout(idle_window, requests.recv()).await {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(_) if asked_to_retire => {
                debug!("no reply to idle notice, exiting");
                break;
            }
            Err(_) => {
                asked_to_retire = true;
                if !emit(WorkerEvent::Idle) {
                    break;
                }
                continue;
            }
        };
        asked_to_retire = false;

        match request {
            WorkerRequest::Init(init) => match build_driver(init, &factory) {
                Ok(ready) => {
                    idle_window = ready.session().params().config.idle_window();
                    driver = Some(ready);
                }
                Err(e) => {
                    error!(error = %e, "worker initialisation failed");
                    if !emit(failed(&e)) {
                        break;
                    }
                }
            },
            WorkerRequest::Task(task) => {
                let Some(driver) = driver.as_ref() else {
                    let e = BuildError::Worker("task received before init".to_string());
                    if !emit(failed(&e)) {
                        break;
                    }
                    continue;
                };
                let session = driver.session();
                session.sync_epoch(task.epoch);
                let event = match driver.compile(&task.unit).await {
                    Ok(outcome) => WorkerEvent::Compiled {
                        outcome,
                        delta: session.take_delta(),
                    },
                    Err(e) => {
                        session.discard_delta();
                        failed(&e)
                    }
                };
                if !emit(event) {
                    break;
                }
            }
            WorkerRequest::Shutdown => break,
        }
    }
    debug!("worker loop finished");
}
