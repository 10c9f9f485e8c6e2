//! Layered configuration loading.
//!
//! Priority: CLI overrides > `KILN_*` environment variables > config file > defaults.

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format as _, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::config::KilnConfig;
use crate::discovery::{ConfigDiscovery, ConfigSource};
use crate::error::{ConfigError, Result};

pub const ENV_PREFIX: &str = "KILN_";

/// Values given on the command line. `None` fields leave lower layers alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_ext: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<WorkerOverrides>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerOverrides {
    pub pool_size: usize,
}

impl ConfigOverrides {
    pub fn with_pool_size(mut self, pool_size: Option<usize>) -> Self {
        self.workers = pool_size.map(|pool_size| WorkerOverrides { pool_size });
        self
    }
}

pub struct ConfigLoader {
    root: PathBuf,
    overrides: ConfigOverrides,
    use_env: bool,
}

impl ConfigLoader {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            overrides: ConfigOverrides::default(),
            use_env: true,
        }
    }

    pub fn overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Skip the environment layer. Used by tests and worker processes, which
    /// receive their configuration from the coordinator.
    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    pub fn load(&self) -> Result<KilnConfig> {
        if !self.root.is_dir() {
            return Err(ConfigError::RootNotFound(self.root.clone()));
        }

        let mut figment = Figment::new().merge(Serialized::defaults(KilnConfig::default()));

        match ConfigDiscovery::new(&self.root).find() {
            Some(ConfigSource::Toml(path)) => {
                tracing::debug!(path = %path.display(), "loading config file");
                figment = figment.merge(Toml::file(path));
            }
            Some(ConfigSource::PackageJson(path, value)) => {
                tracing::debug!(path = %path.display(), "loading config from package.json");
                figment = figment.merge(Serialized::defaults(value));
            }
            None => tracing::debug!(root = %self.root.display(), "no config file, using defaults"),
        }

        if self.use_env {
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        figment = figment.merge(Serialized::defaults(&self.overrides));

        let config: KilnConfig = figment.extract().map_err(|e| ConfigError::InvalidValue {
            field: "configuration".to_string(),
            hint: Some(format!("{e}. Check kiln.toml syntax and field types")),
        })?;
        config.normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn defaults_without_config_file() {
        let dir = TempDir::new().unwrap();
        let config = ConfigLoader::new(dir.path()).without_env().load().unwrap();
        assert_eq!(config, KilnConfig::default());
    }

    #[test]
    fn file_layer_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("kiln.toml"),
            r#"
src = "app"
component_ext = "vue"

[workers]
idle_window_ms = 100
"#,
        )
        .unwrap();

        let config = ConfigLoader::new(dir.path()).without_env().load().unwrap();
        assert_eq!(config.src, PathBuf::from("app"));
        assert_eq!(config.component_ext, ".vue");
        assert_eq!(config.workers.idle_window_ms, 100);
        assert_eq!(config.target, PathBuf::from("dist"));
    }

    #[test]
    fn cli_layer_overrides_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("kiln.toml"), "output = \"ant\"\ncache = true\n").unwrap();

        let overrides = ConfigOverrides {
            output: Some("baidu".to_string()),
            cache: Some(false),
            ..Default::default()
        }
        .with_pool_size(Some(3));

        let config = ConfigLoader::new(dir.path())
            .without_env()
            .overrides(overrides)
            .load()
            .unwrap();
        assert_eq!(config.output, "baidu");
        assert!(!config.cache);
        assert_eq!(config.workers.pool_size, Some(3));
        assert_eq!(config.workers.idle_window_ms, 20_000);
    }

    #[test]
    fn missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            ConfigLoader::new(&missing).load(),
            Err(ConfigError::RootNotFound(_))
        ));
    }
}
