//! Path helpers shared by resolution and output rewriting.

use std::path::{Component, Path, PathBuf};

/// Relative path from directory `from` to `to`. Both must be absolute and clean.
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component<'_>> = from.components().collect();
    let to: Vec<Component<'_>> = to.components().collect();
    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for component in &to[common..] {
        out.push(component.as_os_str());
    }
    out
}

/// Path text with `/` separators.
pub fn to_slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// A `require` argument reaching `to` from a file in directory `from`.
///
/// Always starts with `./` or `../`.
pub fn require_path(from: &Path, to: &Path) -> String {
    let relative = to_slash(&relative_path(from, to));
    if relative.starts_with("../") {
        relative
    } else {
        format!("./{relative}")
    }
}
