//! Output plugins.
//!
//! Plugins see every script, config and asset output just before it is
//! written. They are named in configuration and looked up in a static
//! [`PluginCatalog`]; an unknown name is a configuration error.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use kiln_config::PluginSpec;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::{BuildError, BuildResult};

/// What kind of output a plugin is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    Script,
    /// Script copied from an installed package.
    Npm,
    Config,
    Asset,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PluginInput {
    pub kind: OutputKind,
    /// Source file the output came from.
    pub file: PathBuf,
    /// Where the output will be written.
    pub output: PathBuf,
    /// Output text. `None` for assets copied verbatim.
    pub code: Option<String>,
}

pub type PluginOutput = PluginInput;

pub trait Plugin: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn apply(&self, input: PluginInput) -> Result<PluginOutput, String>;
}

/// Constructor for a plugin from its configured options.
pub type PluginFactory = fn(&Value) -> Result<Arc<dyn Plugin>, String>;

/// Static mapping from plugin name to constructor.
#[derive(Debug, Clone)]
pub struct PluginCatalog {
    factories: FxHashMap<String, PluginFactory>,
}

impl Default for PluginCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PluginCatalog {
    pub fn empty() -> Self {
        Self {
            factories: FxHashMap::default(),
        }
    }

    /// Catalog with the bundled `replace` and `banner` plugins.
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        catalog.register("replace", ReplacePlugin::from_options);
        catalog.register("banner", BannerPlugin::from_options);
        catalog
    }

    pub fn register(&mut self, name: impl Into<String>, factory: PluginFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn create(&self, spec: &PluginSpec) -> BuildResult<Arc<dyn Plugin>> {
        let factory = self
            .factories
            .get(&spec.name)
            .ok_or_else(|| BuildError::UnknownCapability {
                kind: "plugin",
                name: spec.name.clone(),
            })?;
        factory(&spec.options)
            .map_err(|e| BuildError::Config(format!("plugin '{}': {e}", spec.name)))
    }
}

/// Configured plugins in application order.
#[derive(Debug, Clone, Default)]
pub struct PluginChain {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginChain {
    pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    pub fn from_config(specs: &[PluginSpec], catalog: &PluginCatalog) -> BuildResult<Self> {
        let plugins = specs
            .iter()
            .map(|spec| catalog.create(spec))
            .collect::<BuildResult<Vec<_>>>()?;
        Ok(Self { plugins })
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Run every plugin in order. A failure names the plugin that failed.
    pub fn apply(&self, mut input: PluginInput) -> BuildResult<PluginOutput> {
        for plugin in &self.plugins {
            let file = input.file.clone();
            input = plugin.apply(input).map_err(|e| {
                BuildError::compile(&file, format!("plugin '{}': {e}", plugin.name()))
            })?;
        }
        Ok(input)
    }
}

fn optional_regex(options: &Value, key: &str) -> Result<Option<Regex>, String> {
    match options.get(key).and_then(Value::as_str) {
        Some(pattern) => Regex::new(pattern).map(Some).map_err(|e| e.to_string()),
        None => Ok(None),
    }
}

fn matches_filter(filter: &Option<Regex>, input: &PluginInput) -> bool {
    filter
        .as_ref()
        .is_none_or(|re| re.is_match(&input.output.to_string_lossy()))
}

/// Regex search and replace over output text.
///
/// Options: `find` (regex, required), `replace` (string), `filter` (regex
/// matched against the output path).
#[derive(Debug)]
pub struct ReplacePlugin {
    find: Regex,
    replace: String,
    filter: Option<Regex>,
}

impl ReplacePlugin {
    pub fn from_options(options: &Value) -> Result<Arc<dyn Plugin>, String> {
        let find = options
            .get("find")
            .and_then(Value::as_str)
            .ok_or("missing `find` pattern")?;
        Ok(Arc::new(Self {
            find: Regex::new(find).map_err(|e| e.to_string())?,
            replace: options
                .get("replace")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            filter: optional_regex(options, "filter")?,
        }))
    }
}

impl Plugin for ReplacePlugin {
    fn name(&self) -> &str {
        "replace"
    }

    fn apply(&self, mut input: PluginInput) -> Result<PluginOutput, String> {
        if !matches_filter(&self.filter, &input) {
            return Ok(input);
        }
        if let Some(code) = input.code.take() {
            input.code = Some(self.find.replace_all(&code, self.replace.as_str()).into_owned());
        }
        Ok(input)
    }
}

/// Prepends a fixed banner to script outputs.
///
/// Options: `text` (required), `filter` (regex matched against the output path).
#[derive(Debug)]
pub struct BannerPlugin {
    text: String,
    filter: Option<Regex>,
}

impl BannerPlugin {
    pub fn from_options(options: &Value) -> Result<Arc<dyn Plugin>, String> {
        let text = options
            .get("text")
            .and_then(Value::as_str)
            .ok_or("missing `text`")?;
        Ok(Arc::new(Self {
            text: text.to_string(),
            filter: optional_regex(options, "filter")?,
        }))
    }
}

impl Plugin for BannerPlugin {
    fn name(&self) -> &str {
        "banner"
    }

    fn apply(&self, mut input: PluginInput) -> Result<PluginOutput, String> {
        let is_script = matches!(input.kind, OutputKind::Script | OutputKind::Npm);
        if !is_script || !matches_filter(&self.filter, &input) {
            return Ok(input);
        }
        if let Some(code) = input.code.as_mut() {
            code.insert_str(0, &format!("{}\n", self.text));
        }
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(name: &str, options: Value) -> PluginSpec {
        PluginSpec {
            name: name.to_string(),
            options,
        }
    }

    fn script(code: &str) -> PluginInput {
        PluginInput {
            kind: OutputKind::Script,
            file: PathBuf::from("/p/src/a.js"),
            output: PathBuf::from("/p/dist/a.js"),
            code: Some(code.to_string()),
        }
    }

    #[test]
    fn chain_runs_in_configured_order() {
        let chain = PluginChain::from_config(
            &[
                spec("replace", json!({ "find": "__VERSION__", "replace": "1.0" })),
                spec("banner", json!({ "text": "/* v__VERSION__ */" })),
            ],
            &PluginCatalog::builtin(),
        )
        .unwrap();
        assert_eq!(chain.len(), 2);

        let out = chain.apply(script("var v = '__VERSION__';")).unwrap();
        // The banner runs after the replacement, so its placeholder survives.
        assert_eq!(out.code.unwrap(), "/* v__VERSION__ */\nvar v = '1.0';");
    }

    #[test]
    fn unknown_plugin_is_capability_error() {
        let err = PluginChain::from_config(&[spec("minify", json!({}))], &PluginCatalog::builtin())
            .unwrap_err();
        assert!(matches!(err, BuildError::UnknownCapability { kind: "plugin", .. }));
    }

    #[test]
    fn bad_options_are_config_errors() {
        let err = PluginChain::from_config(&[spec("replace", json!({}))], &PluginCatalog::builtin())
            .unwrap_err();
        assert!(matches!(err, BuildError::Config(_)));
    }

    #[test]
    fn filter_limits_outputs() {
        let chain = PluginChain::from_config(
            &[spec("replace", json!({ "find": "a", "replace": "b", "filter": "\\.json$" }))],
            &PluginCatalog::builtin(),
        )
        .unwrap();
        assert_eq!(chain.apply(script("a")).unwrap().code.unwrap(), "a");
    }

    #[test]
    fn banner_skips_assets() {
        let chain = PluginChain::from_config(
            &[spec("banner", json!({ "text": "//" }))],
            &PluginCatalog::builtin(),
        )
        .unwrap();
        let asset = PluginInput {
            kind: OutputKind::Asset,
            code: None,
            ..script("")
        };
        assert_eq!(chain.apply(asset.clone()).unwrap(), asset);
    }
}
