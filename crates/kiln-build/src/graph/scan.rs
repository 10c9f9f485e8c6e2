//! Static scanning of import statements.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::resolver::with_suffix;

static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?:^|[^.\w$])(?:import\s+(?:[\w*{}\s,$]+?\s+from\s+)?|export\s+[\w*{}\s,$]+?\s+from\s+|require\s*\(\s*)['"]([^'"\n]+)['"]"#,
    )
    .expect("valid regex")
});

static STYLE_IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"@import\s+(?:url\(\s*)?['"]([^'"\n]+)['"]"#).expect("valid regex")
});

/// Module references named by `import`, `export ... from` and `require`.
pub fn import_references(code: &str) -> Vec<&str> {
    IMPORT_RE
        .captures_iter(code)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

/// Files named by `@import` in a style sheet.
pub fn style_imports(code: &str) -> Vec<&str> {
    STYLE_IMPORT_RE
        .captures_iter(code)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

/// Locate a style `@import` relative to `from`.
///
/// Tries the literal path, then with the importer's extension, then as a
/// `_`-prefixed partial.
pub fn locate_style(reference: &str, from: &Path) -> Option<PathBuf> {
    if reference.starts_with("http:") || reference.starts_with("https:") || reference.starts_with("//") {
        return None;
    }
    let base = path_clean::clean(from.parent()?.join(reference));
    let ext = from.extension().and_then(|e| e.to_str()).unwrap_or("css");
    let mut candidates = vec![base.clone(), with_suffix(&base, &format!(".{ext}"))];
    if let Some(name) = base.file_name().and_then(|n| n.to_str()) {
        let partial = base.with_file_name(format!("_{name}"));
        candidates.push(with_suffix(&partial, &format!(".{ext}")));
        candidates.push(partial);
    }
    candidates.into_iter().find(|candidate| candidate.is_file())
}
