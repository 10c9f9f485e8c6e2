//! Source units: one file the engine knows about.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::error::{BuildResult, IoResultExt};

/// File kind, decided by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitKind {
    Component,
    Script,
    Style,
    Template,
    Config,
    Asset,
}

impl UnitKind {
    pub fn from_path(path: &Path, component_ext: &str) -> Self {
        if path.to_string_lossy().ends_with(component_ext) {
            return UnitKind::Component;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some("js" | "ts") => UnitKind::Script,
            Some("less" | "sass" | "scss" | "css" | "wxss" | "acss") => UnitKind::Style,
            Some("wxml" | "axml" | "html") => UnitKind::Template,
            Some("json") => UnitKind::Config,
            _ => UnitKind::Asset,
        }
    }
}

/// Location of an installed package a unit belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Package name as referenced, e.g. `lodash` or `@scope/name`.
    pub name: String,
    /// Package root directory (the one holding `package.json`).
    pub root: PathBuf,
    /// Search-root directory the package was found in, e.g. `<dir>/node_modules`.
    pub module_root: PathBuf,
}

/// A file plus its kind, owning package, and lazily loaded content.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    path: PathBuf,
    kind: UnitKind,
    package: Option<PackageInfo>,
    content: Arc<OnceCell<Arc<str>>>,
}

impl SourceUnit {
    pub fn new(path: impl Into<PathBuf>, component_ext: &str) -> Self {
        let path = path.into();
        let kind = UnitKind::from_path(&path, component_ext);
        Self {
            path,
            kind,
            package: None,
            content: Arc::new(OnceCell::new()),
        }
    }

    pub fn in_package(mut self, package: PackageInfo) -> Self {
        self.package = Some(package);
        self
    }

    /// A unit whose content is already known.
    pub fn with_content(self, content: impl Into<Arc<str>>) -> Self {
        let _ = self.content.set(content.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn package(&self) -> Option<&PackageInfo> {
        self.package.as_ref()
    }

    pub fn is_npm(&self) -> bool {
        self.package.is_some()
    }

    /// Directory holding the unit.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("/"))
    }

    /// Read the content once; later calls return the same text.
    pub fn content(&self) -> BuildResult<Arc<str>> {
        self.content
            .get_or_try_init(|| {
                fs::read_to_string(&self.path)
                    .map(Arc::from)
                    .at(&self.path)
            })
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn kind_follows_extension() {
        let kind = |p: &str| UnitKind::from_path(Path::new(p), ".wpy");
        assert_eq!(kind("/a/app.wpy"), UnitKind::Component);
        assert_eq!(kind("/a/util.js"), UnitKind::Script);
        assert_eq!(kind("/a/util.ts"), UnitKind::Script);
        assert_eq!(kind("/a/base.less"), UnitKind::Style);
        assert_eq!(kind("/a/page.wxml"), UnitKind::Template);
        assert_eq!(kind("/a/data.json"), UnitKind::Config);
        assert_eq!(kind("/a/logo.png"), UnitKind::Asset);
    }

    #[test]
    fn content_is_read_once() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.js");
        fs::write(&file, "first").unwrap();

        let unit = SourceUnit::new(&file, ".wpy");
        assert_eq!(&*unit.content().unwrap(), "first");

        fs::write(&file, "second").unwrap();
        assert_eq!(&*unit.content().unwrap(), "first");
    }

    #[test]
    fn missing_file_is_io_error() {
        let unit = SourceUnit::new("/definitely/not/here.js", ".wpy");
        assert!(matches!(unit.content(), Err(crate::BuildError::Io { .. })));
    }
}
