//! Configuration for the kiln incremental build engine.
//!
//! A project is configured through `kiln.toml` or a `"kiln"` field in
//! `package.json`. [`ConfigLoader`] layers defaults, the discovered file,
//! `KILN_*` environment variables and command-line overrides.

pub mod config;
pub mod defaults;
pub mod discovery;
pub mod error;
pub mod loading;

pub use config::*;
pub use discovery::ConfigDiscovery;
pub use error::{ConfigError, Result};
pub use loading::{ConfigLoader, ConfigOverrides};
