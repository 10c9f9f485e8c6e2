//! Source tree enumeration.

use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use walkdir::WalkDir;

use crate::error::{BuildError, BuildResult};
use crate::params::BuildParams;

/// `.gitignore`-style patterns rooted at the source directory.
#[derive(Debug, Clone)]
pub struct IgnoreSet {
    matcher: Gitignore,
}

impl IgnoreSet {
    pub fn new(root: &Path, patterns: &[String]) -> BuildResult<Self> {
        let mut builder = GitignoreBuilder::new(root);
        for pattern in patterns {
            builder
                .add_line(None, pattern)
                .map_err(|e| BuildError::Config(format!("ignore pattern '{pattern}': {e}")))?;
        }
        let matcher = builder
            .build()
            .map_err(|e| BuildError::Config(format!("ignore patterns: {e}")))?;
        Ok(Self { matcher })
    }

    /// Patterns from `config.ignore`, rooted at `src`.
    pub fn from_params(params: &BuildParams) -> BuildResult<Self> {
        Self::new(&params.src_dir(), &params.config.ignore)
    }

    /// Whether `path` or one of its parent directories is ignored.
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        if !path.starts_with(self.matcher.path()) {
            return false;
        }
        self.matcher
            .matched_path_or_any_parents(path, is_dir)
            .is_ignore()
    }
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.') && name != "." && name != ".."
}

/// Whether a watch event on `path` should be skipped.
pub fn is_hidden_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(is_hidden)
}

/// Every file under `src`, skipping hidden and ignored entries.
///
/// Sorted, with the entry unit moved to the front.
pub fn collect_sources(params: &BuildParams) -> BuildResult<Vec<PathBuf>> {
    let src = params.src_dir();
    let ignore = IgnoreSet::from_params(params)?;
    let mut files = Vec::new();

    let walker = WalkDir::new(&src).sort_by_file_name().into_iter().filter_entry(|e| {
        if e.depth() == 0 {
            return true;
        }
        let name = e.file_name().to_string_lossy();
        !is_hidden(&name) && !ignore.is_ignored(e.path(), e.file_type().is_dir())
    });
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(&src).to_path_buf();
            match e.into_io_error() {
                Some(source) => BuildError::io(path, source),
                None => BuildError::Config(format!("filesystem loop at {}", path.display())),
            }
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }

    let entry = params.entry_path();
    if let Some(index) = files.iter().position(|f| *f == entry) {
        let app = files.remove(index);
        files.insert(0, app);
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_config::KilnConfig;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn collects_with_entry_first_and_ignores() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("pages")).unwrap();
        fs::create_dir_all(src.join("mock")).unwrap();
        for file in ["app.wpy", "a.js", "pages/home.wpy", "mock/data.json", ".DS_Store", "x.bak"] {
            fs::write(src.join(file), "").unwrap();
        }

        let mut config = KilnConfig::default();
        config.ignore = vec!["mock/".to_string(), "*.bak".to_string()];
        let params = BuildParams::new(dir.path(), config);

        let files = collect_sources(&params).unwrap();
        assert_eq!(
            files,
            vec![src.join("app.wpy"), src.join("a.js"), src.join("pages/home.wpy")]
        );
    }

    #[test]
    fn ignore_set_matches_nested_paths() {
        let set = IgnoreSet::new(Path::new("/p/src"), &["mock/".to_string()]).unwrap();
        assert!(set.is_ignored(Path::new("/p/src/mock/a.json"), false));
        assert!(!set.is_ignored(Path::new("/p/src/pages/a.wpy"), false));
        assert!(!set.is_ignored(Path::new("/elsewhere/mock/a.json"), false));
        assert!(is_hidden_path(Path::new("/p/src/.a.swp")));
    }
}
