//! Global build parameters shared by the coordinator and every worker.

use std::path::{Path, PathBuf};

use kiln_config::KilnConfig;
use serde::{Deserialize, Serialize};

use crate::unit::PackageInfo;

/// Name of the staleness store file at the project root.
pub const STALENESS_FILE: &str = ".kilncache";

/// Bumped whenever the shape of cached output changes.
const CACHE_FORMAT_VERSION: u32 = 1;

/// Immutable parameters of one build session.
///
/// Sent once to every worker in its init message. The salt folds everything
/// that changes output for identical input into each cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildParams {
    pub root: PathBuf,
    pub config: KilnConfig,
    pub node_env: Option<String>,
    salt: String,
}

impl BuildParams {
    pub fn new(root: impl AsRef<Path>, config: KilnConfig) -> Self {
        let mut params = Self {
            root: path_clean::clean(root.as_ref()),
            config,
            node_env: None,
            salt: String::new(),
        };
        params.salt = params.compute_salt();
        params
    }

    /// Read `NODE_ENV` from the process environment.
    pub fn from_env(root: impl AsRef<Path>, config: KilnConfig) -> Self {
        Self::new(root, config).with_node_env(std::env::var("NODE_ENV").ok())
    }

    pub fn with_node_env(mut self, node_env: Option<String>) -> Self {
        self.node_env = node_env;
        self.salt = self.compute_salt();
        self
    }

    fn compute_salt(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&CACHE_FORMAT_VERSION.to_le_bytes());
        hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
        hasher.update(self.config.output.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.node_env.as_deref().unwrap_or("").as_bytes());
        hasher.update(&[0]);
        hasher.update(self.config.config_hash().as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    /// Digest of every parameter that affects output.
    pub fn salt(&self) -> &str {
        &self.salt
    }

    pub fn src_dir(&self) -> PathBuf {
        self.root.join(&self.config.src)
    }

    pub fn target_dir(&self) -> PathBuf {
        self.root.join(&self.config.target)
    }

    /// `<target>/<npm_dir>`. Its presence marks an incremental environment.
    pub fn npm_output_dir(&self) -> PathBuf {
        self.target_dir().join(&self.config.npm_dir)
    }

    pub fn entry_path(&self) -> PathBuf {
        self.src_dir()
            .join(format!("app{}", self.config.component_ext))
    }

    pub fn staleness_file(&self) -> PathBuf {
        self.root.join(STALENESS_FILE)
    }

    pub fn content_store_dir(&self) -> PathBuf {
        self.root.join("node_modules").join(".cache").join("kiln")
    }

    pub fn is_component(&self, path: &Path) -> bool {
        path.to_string_lossy().ends_with(&self.config.component_ext)
    }

    pub fn is_entry(&self, path: &Path) -> bool {
        path == self.entry_path()
    }

    /// Output location of a project file, optionally with a new extension.
    ///
    /// Files outside the source directory keep their path relative to the
    /// project root.
    pub fn output_path(&self, source: &Path, ext: Option<&str>) -> PathBuf {
        let src = self.src_dir();
        let relative = source
            .strip_prefix(&src)
            .or_else(|_| source.strip_prefix(&self.root))
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| source.file_name().map(PathBuf::from).unwrap_or_default());
        let out = self.target_dir().join(relative);
        match ext {
            Some(ext) => replace_extension(&out, ext, &self.config.component_ext),
            None => out,
        }
    }

    /// Output location of a project file pulled in by `require`.
    ///
    /// Components and TypeScript compile to `.js`; everything else keeps its name.
    pub fn script_output_path(&self, source: &Path) -> PathBuf {
        let name = source.to_string_lossy();
        if name.ends_with(".ts") || name.ends_with(&self.config.component_ext) {
            self.output_path(source, Some("js"))
        } else {
            self.output_path(source, None)
        }
    }

    /// Output location of a file inside an installed package.
    ///
    /// Scripts and components are flattened to `.js`.
    pub fn npm_output_path(&self, package: &PackageInfo, source: &Path) -> PathBuf {
        let relative = source
            .strip_prefix(&package.module_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| Path::new(&package.name).join(source.file_name().unwrap_or_default()));
        let out = self.npm_output_dir().join(relative);
        let name = out.to_string_lossy();
        if name.ends_with(".ts") || name.ends_with(&self.config.component_ext) {
            replace_extension(&out, "js", &self.config.component_ext)
        } else {
            out
        }
    }
}

/// Swap the extension of `path`, treating `component_ext` as a single
/// extension even when it contains dots.
fn replace_extension(path: &Path, ext: &str, component_ext: &str) -> PathBuf {
    let name = path.to_string_lossy();
    match name.strip_suffix(component_ext) {
        Some(stem) => PathBuf::from(format!("{stem}.{ext}")),
        None => path.with_extension(ext),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> BuildParams {
        BuildParams::new("/proj", KilnConfig::default())
    }

    #[test]
    fn output_path_maps_src_to_target() {
        let p = params();
        assert_eq!(
            p.output_path(Path::new("/proj/src/pages/home.wpy"), Some("js")),
            PathBuf::from("/proj/dist/pages/home.js")
        );
        assert_eq!(
            p.output_path(Path::new("/proj/src/img/a.png"), None),
            PathBuf::from("/proj/dist/img/a.png")
        );
        assert_eq!(
            p.output_path(Path::new("/proj/src/styles/a.less"), Some("wxss")),
            PathBuf::from("/proj/dist/styles/a.wxss")
        );
    }

    #[test]
    fn npm_output_path_flattens_scripts() {
        let p = params();
        let pkg = PackageInfo {
            name: "lodash".to_string(),
            root: PathBuf::from("/proj/node_modules/lodash"),
            module_root: PathBuf::from("/proj/node_modules"),
        };
        assert_eq!(
            p.npm_output_path(&pkg, Path::new("/proj/node_modules/lodash/lib/a.ts")),
            PathBuf::from("/proj/dist/npm/lodash/lib/a.js")
        );
        assert_eq!(
            p.npm_output_path(&pkg, Path::new("/proj/node_modules/lodash/index.js")),
            PathBuf::from("/proj/dist/npm/lodash/index.js")
        );
    }

    #[test]
    fn salt_depends_on_node_env_and_output() {
        let a = params();
        let b = params().with_node_env(Some("production".to_string()));
        assert_ne!(a.salt(), b.salt());

        let mut config = KilnConfig::default();
        config.output = "ant".to_string();
        assert_ne!(a.salt(), BuildParams::new("/proj", config).salt());
        assert_eq!(a.salt(), params().salt());
    }

    #[test]
    fn entry_is_app_component() {
        let p = params();
        assert!(p.is_entry(Path::new("/proj/src/app.wpy")));
        assert!(!p.is_entry(Path::new("/proj/src/pages/app.wpy")));
    }
}
