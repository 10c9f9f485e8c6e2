//! The project configuration model.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::defaults::*;
use crate::error::{ConfigError, Result as ConfigResult};

/// Script languages that never need a registered compiler.
pub const PASSTHROUGH_LANGS: &[&str] = &["wxml", "xml", "css", "js", "json"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KilnConfig {
    /// Source directory, relative to the project root.
    #[serde(default = "default_src")]
    pub src: PathBuf,

    /// Output directory, relative to the project root.
    #[serde(default = "default_target")]
    pub target: PathBuf,

    /// Extension of single-file components, with its leading dot.
    #[serde(default = "default_component_ext")]
    pub component_ext: String,

    /// Output platform tag. Part of every cache key.
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_cache")]
    pub cache: bool,

    #[serde(default = "default_components_dir")]
    pub components_dir: String,

    #[serde(default = "default_npm_dir")]
    pub npm_dir: String,

    /// Package providing the app and page registration calls.
    #[serde(default = "default_runtime")]
    pub runtime: String,

    #[serde(default = "default_template_ext")]
    pub template_ext: String,

    #[serde(default = "default_style_ext")]
    pub style_ext: String,

    #[serde(default)]
    pub resolve: ResolveOptions,

    /// Compiler options keyed by language name (`babel`, `typescript`, `less`, ...).
    #[serde(default)]
    pub compilers: BTreeMap<String, Value>,

    /// Plugins in application order.
    #[serde(default)]
    pub plugins: Vec<PluginSpec>,

    /// Extra fields merged into the app entry's config block.
    #[serde(default = "default_app_config")]
    pub app_config: Value,

    #[serde(default)]
    pub watch: WatchOptions,

    #[serde(default)]
    pub workers: WorkerOptions,

    /// Gitignore-style patterns excluded from file enumeration.
    #[serde(default)]
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveOptions {
    /// Reference prefix remapping, applied before resolution.
    #[serde(default)]
    pub alias: BTreeMap<String, String>,

    /// Directory names searched for packages in every ancestor directory.
    #[serde(default = "default_modules")]
    pub modules: Vec<String>,

    /// Manifest fields holding self-reference redirect rules.
    #[serde(default = "default_fields")]
    pub fields: Vec<String>,
}

/// A plugin entry: the registered name plus its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSpec {
    pub name: String,
    #[serde(default = "default_app_config")]
    pub options: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchOptions {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default)]
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerOptions {
    /// Number of worker processes. Defaults to available cores minus one.
    #[serde(default)]
    pub pool_size: Option<usize>,

    #[serde(default = "default_idle_window_ms")]
    pub idle_window_ms: u64,
}

impl Default for KilnConfig {
    fn default() -> Self {
        Self {
            src: default_src(),
            target: default_target(),
            component_ext: default_component_ext(),
            output: default_output(),
            cache: default_cache(),
            components_dir: default_components_dir(),
            npm_dir: default_npm_dir(),
            runtime: default_runtime(),
            template_ext: default_template_ext(),
            style_ext: default_style_ext(),
            resolve: ResolveOptions::default(),
            compilers: BTreeMap::new(),
            plugins: Vec::new(),
            app_config: default_app_config(),
            watch: WatchOptions::default(),
            workers: WorkerOptions::default(),
            ignore: Vec::new(),
        }
    }
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            alias: BTreeMap::new(),
            modules: default_modules(),
            fields: default_fields(),
        }
    }
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            ignore: Vec::new(),
        }
    }
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            pool_size: None,
            idle_window_ms: default_idle_window_ms(),
        }
    }
}

impl KilnConfig {
    /// Create from a JSON value, normalizing and validating the result.
    pub fn from_value(value: Value) -> ConfigResult<Self> {
        let config: KilnConfig = serde_json::from_value(value)
            .map_err(|e| ConfigError::invalid("config", e.to_string()))?;
        config.normalized()
    }

    pub fn to_value(&self) -> ConfigResult<Value> {
        serde_json::to_value(self).map_err(|e| ConfigError::invalid("config", e.to_string()))
    }

    /// Normalize extensions and check field consistency.
    ///
    /// The component extension always carries a leading dot, while the
    /// template and style extensions never do.
    pub fn normalized(mut self) -> ConfigResult<Self> {
        if self.component_ext.trim_start_matches('.').is_empty() {
            return Err(ConfigError::invalid(
                "component_ext",
                "component extension cannot be empty",
            ));
        }
        if !self.component_ext.starts_with('.') {
            self.component_ext = format!(".{}", self.component_ext);
        }
        self.template_ext = self.template_ext.trim_start_matches('.').to_string();
        self.style_ext = self.style_ext.trim_start_matches('.').to_string();

        if self.src == self.target {
            return Err(ConfigError::invalid(
                "target",
                format!(
                    "output directory `{}` must differ from the source directory",
                    self.target.display()
                ),
            ));
        }
        if self.workers.pool_size == Some(0) {
            return Err(ConfigError::invalid(
                "workers.pool_size",
                "pool size must be at least 1",
            ));
        }
        if self.resolve.modules.is_empty() {
            return Err(ConfigError::invalid(
                "resolve.modules",
                "at least one module directory is required",
            ));
        }
        Ok(self)
    }

    /// Stable BLAKE3 hex digest of the options that affect build output.
    ///
    /// Watch and worker settings are excluded: they change how a build runs,
    /// never what it produces.
    pub fn config_hash(&self) -> String {
        let mut hashed = self.clone();
        hashed.watch = WatchOptions::default();
        hashed.workers = WorkerOptions::default();
        let bytes = serde_json::to_vec(&hashed).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }

    pub fn idle_window(&self) -> Duration {
        Duration::from_millis(self.workers.idle_window_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.watch.debounce_ms)
    }

    /// Compiler options for `lang`, if the language is configured.
    pub fn compiler_options(&self, lang: &str) -> Option<&Value> {
        self.compilers.get(lang)
    }

    /// Whether `lang` can be compiled, either by passthrough or by a configured compiler.
    pub fn supports_lang(&self, lang: &str) -> bool {
        PASSTHROUGH_LANGS.contains(&lang) || self.compilers.contains_key(lang)
    }
}
