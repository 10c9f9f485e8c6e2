//! Serializable cache entries.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::unit::PackageInfo;

/// Current cache format version. Increment when the entry layout changes.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// A package file a cached unit pulled in. Replayed on every cache hit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CopyDependency {
    pub source: PathBuf,
    pub package: PackageInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub metadata: CacheMetadata,
    /// Final output text, written verbatim on a hit.
    pub code: String,
    pub target: PathBuf,
    pub deps: Vec<CopyDependency>,
    /// Project files the unit required; reported again on a hit.
    pub requires: Vec<PathBuf>,
}

impl CacheEntry {
    pub fn new(code: String, target: PathBuf, deps: Vec<CopyDependency>) -> Self {
        Self {
            metadata: CacheMetadata::current(),
            code,
            target,
            deps,
            requires: Vec::new(),
        }
    }

    pub fn with_requires(mut self, requires: Vec<PathBuf>) -> Self {
        self.requires = requires;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// kiln-build version that wrote the entry.
    pub kiln_version: String,
    pub format_version: u32,
}

impl CacheMetadata {
    pub fn current() -> Self {
        Self {
            kiln_version: env!("CARGO_PKG_VERSION").to_string(),
            format_version: CACHE_FORMAT_VERSION,
        }
    }

    pub fn is_compatible(&self) -> bool {
        self.format_version == CACHE_FORMAT_VERSION
            && self.kiln_version == env!("CARGO_PKG_VERSION")
    }
}
