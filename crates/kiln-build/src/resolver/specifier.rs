//! Classification of module references.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::Path;

/// Reference meaning "stub this dependency out".
pub const STUB: &str = "false";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Specifier<'a> {
    Stub,
    Absolute(&'a str),
    /// `./x` or `../x`.
    Relative(&'a str),
    /// `pkg`, `pkg/` or `@scope/pkg`.
    Package(&'a str),
    /// `pkg/sub/path` or `@scope/pkg/sub/path`.
    Deep { package: &'a str, subpath: &'a str },
}

impl<'a> Specifier<'a> {
    pub fn parse(reference: &'a str) -> Self {
        if reference == STUB {
            return Specifier::Stub;
        }
        if Path::new(reference).is_absolute() {
            return Specifier::Absolute(reference);
        }
        if reference.starts_with('.') {
            return Specifier::Relative(reference);
        }
        let package = extract_package_name(reference);
        let subpath = reference[package.len()..].trim_start_matches('/');
        if subpath.is_empty() {
            Specifier::Package(package)
        } else {
            Specifier::Deep { package, subpath }
        }
    }
}

/// Package name from a bare specifier.
///
/// `lodash/fp` gives `lodash`, `@org/pkg/sub` gives `@org/pkg`.
pub fn extract_package_name(specifier: &str) -> &str {
    if specifier.is_empty() {
        return specifier;
    }

    if specifier.starts_with('@') {
        if let Some(first_slash) = specifier.find('/') {
            if let Some(second_slash) = specifier[first_slash + 1..].find('/') {
                return &specifier[..first_slash + 1 + second_slash];
            }
        }
        return specifier;
    }

    match specifier.find('/') {
        Some(slash_idx) => &specifier[..slash_idx],
        None => specifier,
    }
}

/// Apply the longest alias whose key equals `reference` or prefixes it at a `/`.
pub fn apply_alias<'a>(reference: &'a str, aliases: &BTreeMap<String, String>) -> Cow<'a, str> {
    let matched = aliases
        .iter()
        .filter(|(key, _)| {
            reference == key.as_str()
                || (reference.starts_with(key.as_str())
                    && reference[key.len()..].starts_with('/'))
        })
        .max_by_key(|(key, _)| key.len());

    match matched {
        Some((key, value)) => Cow::Owned(format!("{value}{}", &reference[key.len()..])),
        None => Cow::Borrowed(reference),
    }
}
