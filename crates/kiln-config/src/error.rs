//! Error types for configuration discovery and loading.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config not found")]
    NotFound,

    #[error("project root does not exist: {0}")]
    RootNotFound(PathBuf),

    #[error("invalid config value for `{field}`")]
    InvalidValue { field: String, hint: Option<String> },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, hint: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            hint: Some(hint.into()),
        }
    }

    /// Hint to show alongside the error, when there is one.
    pub fn hint(&self) -> Option<&str> {
        match self {
            ConfigError::InvalidValue { hint, .. } => hint.as_deref(),
            ConfigError::NotFound => Some("Create a kiln.toml or add a \"kiln\" field to package.json"),
            _ => None,
        }
    }
}
