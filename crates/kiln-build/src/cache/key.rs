//! Cache key computation using BLAKE3 content-addressed hashing.

use std::path::Path;

use serde::Serialize;

/// Content-addressed cache key (BLAKE3 hex digest).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

#[derive(Serialize)]
struct KeyMaterial<'a> {
    params: &'a str,
    output: &'a str,
    content: &'a str,
}

impl CacheKey {
    /// Key for compiling `content` to `output` under parameters digested into `salt`.
    ///
    /// Changing any one of the three inputs changes the key.
    pub fn compute(salt: &str, output: &Path, content: &[u8]) -> Self {
        let output = output.to_string_lossy();
        let content = content_hash(content);
        let material = KeyMaterial {
            params: salt,
            output: &output,
            content: &content,
        };
        // Serializing a struct of strings cannot fail.
        let bytes = serde_json::to_vec(&material).unwrap_or_default();
        Self(blake3::hash(&bytes).to_hex().to_string())
    }

    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// BLAKE3 hex digest of raw content.
pub fn content_hash(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}
