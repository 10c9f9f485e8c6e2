//! The two build caches.
//!
//! - **Staleness store** ([`StalenessStore`]): absolute path to last seen
//!   modification time. Gates copying of package files. Persisted as one JSON
//!   file at the project root, written only by the coordinating process.
//! - **Result store** ([`ContentStore`]): content-addressed compiled output.
//!   Keys are BLAKE3 digests of build parameters, output path and input
//!   content, so invalidation is automatic.

mod entry;
mod key;
pub mod staleness;
mod store;

pub use entry::{CACHE_FORMAT_VERSION, CacheEntry, CacheMetadata, CopyDependency};
pub use key::{CacheKey, content_hash};
pub use staleness::{StalenessDelta, StalenessStore};
pub use store::{ContentStore, DiskStore, MemoryStore};

/// Error types for result store operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache miss")]
    CacheMiss,

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("cache version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    /// Stored bytes do not decode to an entry.
    #[error("cache corrupted: {0}")]
    Corrupted(String),
}

pub type CacheResult<T> = Result<T, CacheError>;
