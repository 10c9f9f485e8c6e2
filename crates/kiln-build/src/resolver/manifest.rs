//! Package manifest (`package.json`) reading.
//!
//! Only the parts resolution needs: the declared main file and the
//! self-reference fields (`browser` style maps) that redirect requests made
//! to or inside a package.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::{BuildResult, IoResultExt};

/// Maximum size of a manifest we are willing to parse (10MB).
const MAX_MANIFEST_SIZE: u64 = 10 * 1024 * 1024;

/// Outcome of a self-reference lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// Use this package-relative path instead.
    Path(String),
    /// The package stubs the request out (`false` in the map).
    Disabled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PackageManifest {
    pub name: Option<String>,
    pub main: Option<String>,
    /// Directory holding the manifest.
    pub dir: PathBuf,
    fields: serde_json::Map<String, Value>,
}

impl PackageManifest {
    pub fn from_value(dir: impl Into<PathBuf>, value: Value) -> Self {
        let fields = match value {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        let text = |key: &str| fields.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            name: text("name"),
            main: text("main"),
            dir: dir.into(),
            fields,
        }
    }

    /// Whether any of `active` names a redirect map or entry override.
    pub fn has_self_fields(&self, active: &[String]) -> bool {
        active.iter().any(|field| {
            matches!(self.fields.get(field), Some(Value::Object(_) | Value::String(_)))
        })
    }

    /// The entry file, package-relative, without a leading `./`.
    ///
    /// A string-valued self field replaces `main`; otherwise `main` is used,
    /// falling back to `index.js`.
    pub fn entry(&self, active: &[String]) -> String {
        let declared = active
            .iter()
            .find_map(|field| self.fields.get(field).and_then(Value::as_str))
            .or(self.main.as_deref())
            .unwrap_or("index.js");
        let entry = declared.trim_start_matches("./");
        if entry.is_empty() {
            "index.js".to_string()
        } else {
            entry.to_string()
        }
    }

    /// Look `request` up in the object-valued self fields.
    ///
    /// `request` is either a bare package name or a path relative to the
    /// package root. Keys are matched with and without a leading `./` and a
    /// trailing `.js`.
    pub fn redirect(&self, request: &str, active: &[String]) -> Option<Redirect> {
        let request = request.replace('\\', "/");
        let bare = request.trim_start_matches("./");
        let mut candidates = vec![bare.to_string(), format!("./{bare}")];
        if let Some(stem) = bare.strip_suffix(".js") {
            candidates.push(stem.to_string());
            candidates.push(format!("./{stem}"));
        } else {
            candidates.push(format!("{bare}.js"));
            candidates.push(format!("./{bare}.js"));
        }

        for field in active {
            let Some(Value::Object(map)) = self.fields.get(field) else {
                continue;
            };
            for candidate in &candidates {
                match map.get(candidate) {
                    Some(Value::String(target)) => {
                        return Some(Redirect::Path(target.trim_start_matches("./").to_string()));
                    }
                    Some(Value::Bool(false)) => return Some(Redirect::Disabled),
                    _ => {}
                }
            }
        }
        None
    }
}

/// Reads manifests for PathResolver.
pub trait ManifestReader: Send + Sync + fmt::Debug {
    /// Manifest in `dir`, or `None` when the directory has no `package.json`.
    fn read(&self, dir: &Path) -> BuildResult<Option<Arc<PackageManifest>>>;
}

/// Reads `package.json` from disk, caching every lookup for the process lifetime.
#[derive(Debug, Default)]
pub struct FsManifestReader {
    cache: RwLock<FxHashMap<PathBuf, Option<Arc<PackageManifest>>>>,
}

impl FsManifestReader {
    pub fn new() -> Self {
        Self::default()
    }

    fn load(dir: &Path) -> BuildResult<Option<Arc<PackageManifest>>> {
        let path = dir.join("package.json");
        let metadata = match fs::metadata(&path) {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => return Ok(None),
        };
        if metadata.len() > MAX_MANIFEST_SIZE {
            tracing::warn!(path = %path.display(), "package.json too large, ignoring its fields");
            return Ok(Some(Arc::new(PackageManifest::from_value(dir, Value::Null))));
        }

        let content = fs::read_to_string(&path).at(&path)?;
        let value = serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "invalid package.json, ignoring its fields");
            Value::Null
        });
        Ok(Some(Arc::new(PackageManifest::from_value(dir, value))))
    }
}

impl ManifestReader for FsManifestReader {
    fn read(&self, dir: &Path) -> BuildResult<Option<Arc<PackageManifest>>> {
        if let Some(cached) = self.cache.read().get(dir) {
            return Ok(cached.clone());
        }
        let manifest = Self::load(dir)?;
        self.cache.write().insert(dir.to_path_buf(), manifest.clone());
        Ok(manifest)
    }
}
