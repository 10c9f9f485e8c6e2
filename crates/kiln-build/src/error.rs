//! Error taxonomy for the build engine.
//!
//! Every error here is fatal for the build session once it reaches the
//! coordinator. Cache corruption never appears: the driver maps it to a miss.

use std::path::{Path, PathBuf};

use thiserror::Error;

pub type BuildResult<T> = std::result::Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    /// Resolution exhausted every candidate for `reference`.
    #[error("cannot resolve '{reference}' from {}", from.display())]
    ModuleNotFound { reference: String, from: PathBuf },

    /// A language compiler or plugin rejected the unit.
    #[error("failed to compile {}: {diagnostic}", unit.display())]
    Compile { unit: PathBuf, diagnostic: String },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    /// A compiler, plugin or other capability name with no registration.
    #[error("no {kind} registered under the name '{name}'")]
    UnknownCapability { kind: &'static str, name: String },

    /// The worker transport failed (spawn, pipe or protocol error).
    #[error("worker error: {0}")]
    Worker(String),

    /// The scheduler shut down before the session finished.
    #[error("build cancelled")]
    Cancelled,
}

impl BuildError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn compile(unit: impl AsRef<Path>, diagnostic: impl Into<String>) -> Self {
        BuildError::Compile {
            unit: unit.as_ref().to_path_buf(),
            diagnostic: diagnostic.into(),
        }
    }

    /// The unit this error is about, if any.
    pub fn unit(&self) -> Option<&Path> {
        match self {
            BuildError::ModuleNotFound { from, .. } => Some(from),
            BuildError::Compile { unit, .. } => Some(unit),
            BuildError::Io { path, .. } => Some(path),
            _ => None,
        }
    }
}

impl From<kiln_config::ConfigError> for BuildError {
    fn from(err: kiln_config::ConfigError) -> Self {
        match err.hint() {
            Some(hint) => BuildError::Config(format!("{err}: {hint}")),
            None => BuildError::Config(err.to_string()),
        }
    }
}

/// Attach a path to `std::io::Error` results.
pub(crate) trait IoResultExt<T> {
    fn at(self, path: impl AsRef<Path>) -> BuildResult<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at(self, path: impl AsRef<Path>) -> BuildResult<T> {
        self.map_err(|source| BuildError::io(path, source))
    }
}
