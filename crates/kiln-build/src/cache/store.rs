//! Content-addressable result stores.
//!
//! [`DiskStore`] keeps one bincode-encoded file per key, sharded by the first
//! two hex digits. Writes go through a temp file and an atomic rename, so
//! several worker processes may write to the same directory at once.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tempfile::NamedTempFile;

use super::entry::{CACHE_FORMAT_VERSION, CacheEntry};
use super::key::CacheKey;
use super::{CacheError, CacheResult};

/// Backing store for compiled results.
pub trait ContentStore: Send + Sync + fmt::Debug {
    /// Fetch an entry. Returns `CacheMiss` when the key was never stored.
    fn get(&self, key: &CacheKey) -> CacheResult<CacheEntry>;

    fn put(&self, key: &CacheKey, entry: &CacheEntry) -> CacheResult<()>;

    /// Drop every entry.
    fn clear(&self) -> CacheResult<()>;
}

fn encode(entry: &CacheEntry) -> CacheResult<Vec<u8>> {
    bincode::serialize(entry).map_err(|e| CacheError::SerializationError(e.to_string()))
}

fn decode(bytes: &[u8]) -> CacheResult<CacheEntry> {
    let entry: CacheEntry =
        bincode::deserialize(bytes).map_err(|e| CacheError::Corrupted(e.to_string()))?;
    if !entry.metadata.is_compatible() {
        return Err(CacheError::VersionMismatch {
            expected: CACHE_FORMAT_VERSION,
            found: entry.metadata.format_version,
        });
    }
    Ok(entry)
}

#[derive(Debug)]
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    /// Open a store rooted at `dir`. The directory is created on first write.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        let hex = key.as_hex();
        let (shard, rest) = hex.split_at(hex.len().min(2));
        self.dir.join(shard).join(rest)
    }
}

impl ContentStore for DiskStore {
    fn get(&self, key: &CacheKey) -> CacheResult<CacheEntry> {
        let bytes = match fs::read(self.path_for(key)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(CacheError::CacheMiss),
            Err(e) => return Err(e.into()),
        };
        decode(&bytes)
    }

    fn put(&self, key: &CacheKey, entry: &CacheEntry) -> CacheResult<()> {
        let path = self.path_for(key);
        let shard = path.parent().unwrap_or(&self.dir);
        fs::create_dir_all(shard)?;

        let mut file = NamedTempFile::new_in(shard)?;
        file.write_all(&encode(entry)?)?;
        file.persist(&path).map_err(|e| CacheError::IoError(e.error))?;
        Ok(())
    }

    fn clear(&self) -> CacheResult<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store. Entries are kept encoded so decoding behaves like disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<FxHashMap<CacheKey, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Store raw bytes under `key`, bypassing encoding.
    pub fn put_raw(&self, key: &CacheKey, bytes: Vec<u8>) {
        self.entries.lock().insert(key.clone(), bytes);
    }
}

impl ContentStore for MemoryStore {
    fn get(&self, key: &CacheKey) -> CacheResult<CacheEntry> {
        let entries = self.entries.lock();
        let bytes = entries.get(key).ok_or(CacheError::CacheMiss)?;
        decode(bytes)
    }

    fn put(&self, key: &CacheKey, entry: &CacheEntry) -> CacheResult<()> {
        let bytes = encode(entry)?;
        self.entries.lock().insert(key.clone(), bytes);
        Ok(())
    }

    fn clear(&self) -> CacheResult<()> {
        self.entries.lock().clear();
        Ok(())
    }
}
