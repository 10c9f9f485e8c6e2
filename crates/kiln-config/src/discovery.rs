//! File-based config discovery.
//!
//! Finds the kiln configuration for a project root: `kiln.toml` first, then a
//! `"kiln"` field in `package.json`.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::config::KilnConfig;
use crate::error::{ConfigError, Result};

pub const CONFIG_FILE: &str = "kiln.toml";
pub const PACKAGE_FIELD: &str = "kiln";

/// Where a project's configuration came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    Toml(PathBuf),
    /// The `"kiln"` field of a `package.json`, already extracted.
    PackageJson(PathBuf, Value),
}

impl ConfigSource {
    pub fn path(&self) -> &Path {
        match self {
            ConfigSource::Toml(path) | ConfigSource::PackageJson(path, _) => path,
        }
    }
}

pub struct ConfigDiscovery {
    root: PathBuf,
}

impl ConfigDiscovery {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Find a config source in the root directory.
    pub fn find(&self) -> Option<ConfigSource> {
        let toml_path = self.root.join(CONFIG_FILE);
        if toml_path.is_file() {
            return Some(ConfigSource::Toml(toml_path));
        }

        let pkg_path = self.root.join("package.json");
        let content = fs::read_to_string(&pkg_path).ok()?;
        let parsed = serde_json::from_str::<Value>(&content).ok()?;
        match parsed.get(PACKAGE_FIELD) {
            Some(value) if !value.is_null() => {
                Some(ConfigSource::PackageJson(pkg_path, value.clone()))
            }
            _ => None,
        }
    }

    /// Load config from the discovered source, without environment or CLI layers.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotFound` if no config source is found.
    pub fn load(&self) -> Result<KilnConfig> {
        match self.find().ok_or(ConfigError::NotFound)? {
            ConfigSource::Toml(path) => {
                let content = fs::read_to_string(&path)?;
                let config: KilnConfig = toml::from_str(&content)
                    .map_err(|e| ConfigError::invalid("toml", format!("Invalid TOML syntax: {e}")))?;
                config.normalized()
            }
            ConfigSource::PackageJson(_, value) => KilnConfig::from_value(value),
        }
    }
}
