//! Coordinator/worker protocol.
//!
//! Serialized as one JSON object per line by the process transport.

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cache::StalenessDelta;
use crate::driver::UnitOutcome;
use crate::error::BuildError;
use crate::params::BuildParams;

pub type WorkerId = usize;

/// Sent once, before the first task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerInit {
    pub params: BuildParams,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitTask {
    pub unit: PathBuf,
    /// Coordinator staleness generation; a change makes the worker reload.
    pub epoch: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    Init(WorkerInit),
    Task(UnitTask),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerEvent {
    /// A task finished; `delta` holds what the worker recorded meanwhile.
    Compiled {
        outcome: UnitOutcome,
        delta: StalenessDelta,
    },
    Failed {
        error: FailureReport,
    },
    /// The idle window passed with no request; the worker asks to retire.
    Idle,
    /// Emitted by the transport once the worker is gone.
    Exited,
}

/// A [`BuildError`] in a form that crosses process boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReport {
    ModuleNotFound { reference: String, from: PathBuf },
    Compile { unit: PathBuf, diagnostic: String },
    Io { path: PathBuf, message: String },
    Config { message: String },
    Worker { message: String },
}

impl From<&BuildError> for FailureReport {
    fn from(err: &BuildError) -> Self {
        match err {
            BuildError::ModuleNotFound { reference, from } => FailureReport::ModuleNotFound {
                reference: reference.clone(),
                from: from.clone(),
            },
            BuildError::Compile { unit, diagnostic } => FailureReport::Compile {
                unit: unit.clone(),
                diagnostic: diagnostic.clone(),
            },
            BuildError::Io { path, source } => FailureReport::Io {
                path: path.clone(),
                message: source.to_string(),
            },
            BuildError::Config(_) | BuildError::UnknownCapability { .. } => FailureReport::Config {
                message: err.to_string(),
            },
            BuildError::Worker(message) => FailureReport::Worker {
                message: message.clone(),
            },
            BuildError::Cancelled => FailureReport::Worker {
                message: err.to_string(),
            },
        }
    }
}

impl From<FailureReport> for BuildError {
    fn from(report: FailureReport) -> Self {
        match report {
            FailureReport::ModuleNotFound { reference, from } => {
                BuildError::ModuleNotFound { reference, from }
            }
            FailureReport::Compile { unit, diagnostic } => BuildError::Compile { unit, diagnostic },
            FailureReport::Io { path, message } => BuildError::io(path, io::Error::other(message)),
            FailureReport::Config { message } => BuildError::Config(message),
            FailureReport::Worker { message } => BuildError::Worker(message),
        }
    }
}
