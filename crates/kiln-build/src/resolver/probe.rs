//! Extension probing for candidate paths.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Append `suffix` to the file name of `base`.
pub fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Candidate files for `base`, in probing order.
///
/// Component extension, `.js`, `.ts`, a directory's `index.js`, then the
/// literal path.
pub fn candidates(base: &Path, component_ext: &str) -> [PathBuf; 5] {
    [
        with_suffix(base, component_ext),
        with_suffix(base, ".js"),
        with_suffix(base, ".ts"),
        base.join("index.js"),
        base.to_path_buf(),
    ]
}

/// First existing candidate file for `base`.
pub fn probe(base: &Path, component_ext: &str) -> Option<PathBuf> {
    candidates(base, component_ext)
        .into_iter()
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn component_extension_wins_over_js() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.wpy"), "").unwrap();
        fs::write(dir.path().join("a.js"), "").unwrap();
        assert_eq!(
            probe(&dir.path().join("a"), ".wpy"),
            Some(dir.path().join("a.wpy"))
        );
    }

    #[test]
    fn directory_index_before_literal() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/index.js"), "").unwrap();
        assert_eq!(
            probe(&dir.path().join("lib"), ".wpy"),
            Some(dir.path().join("lib/index.js"))
        );
    }

    #[test]
    fn literal_path_with_extension() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("data.json"), "{}").unwrap();
        assert_eq!(
            probe(&dir.path().join("data.json"), ".wpy"),
            Some(dir.path().join("data.json"))
        );
        assert_eq!(probe(&dir.path().join("missing"), ".wpy"), None);
    }
}
