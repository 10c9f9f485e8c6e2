//! Modification-time staleness store.
//!
//! Maps absolute source paths to the modification time seen when the file was
//! last copied. A path whose recorded time equals its current time is
//! unchanged; anything else (including absence) is stale.
//!
//! Every process holds its own store. Workers report what they recorded as a
//! [`StalenessDelta`]; only the owning process writes the file.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{BuildResult, IoResultExt};

/// Records appended by one process since its last report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalenessDelta(pub BTreeMap<PathBuf, u64>);

impl StalenessDelta {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Current modification time in nanoseconds since the epoch.
pub fn modified_nanos(path: &Path) -> io::Result<u64> {
    let modified = fs::metadata(path)?.modified()?;
    let since = modified
        .duration_since(UNIX_EPOCH)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(since.as_nanos() as u64)
}

#[derive(Debug)]
pub struct StalenessStore {
    file: PathBuf,
    owner: bool,
    /// `None` until first use; loaded lazily from `file`.
    records: Option<FxHashMap<PathBuf, u64>>,
    appended: BTreeMap<PathBuf, u64>,
    dirty: bool,
}

impl StalenessStore {
    /// Store backed by `file`. Only an `owner` ever writes it.
    pub fn new(file: impl Into<PathBuf>, owner: bool) -> Self {
        Self {
            file: file.into(),
            owner,
            records: None,
            appended: BTreeMap::new(),
            dirty: false,
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn records(&mut self) -> &mut FxHashMap<PathBuf, u64> {
        let file = &self.file;
        self.records.get_or_insert_with(|| load(file))
    }

    /// True iff the recorded time equals the file's current time.
    pub fn check(&mut self, path: &Path) -> bool {
        let Ok(current) = modified_nanos(path) else {
            return false;
        };
        self.records().get(path) == Some(&current)
    }

    /// Store the file's current time and mark the store dirty.
    pub fn record(&mut self, path: &Path) -> BuildResult<()> {
        let current = modified_nanos(path).at(path)?;
        self.records().insert(path.to_path_buf(), current);
        self.appended.insert(path.to_path_buf(), current);
        self.dirty = true;
        Ok(())
    }

    /// Hand over everything recorded since the last call.
    pub fn take_delta(&mut self) -> StalenessDelta {
        StalenessDelta(std::mem::take(&mut self.appended))
    }

    /// Drop everything recorded since the last report, so those files count
    /// as stale again. Used when the unit that recorded them failed.
    pub fn rollback(&mut self) -> StalenessDelta {
        let appended = std::mem::take(&mut self.appended);
        if let Some(records) = self.records.as_mut() {
            for path in appended.keys() {
                records.remove(path);
            }
        }
        StalenessDelta(appended)
    }

    /// Merge a delta reported by another process.
    pub fn merge(&mut self, delta: &StalenessDelta) {
        if delta.is_empty() {
            return;
        }
        let records = self.records();
        for (path, time) in &delta.0 {
            records.insert(path.clone(), *time);
        }
        self.dirty = true;
    }

    /// Forget the in-memory view; the next query reloads from disk.
    pub fn reload(&mut self) {
        self.records = None;
    }

    /// Full invalidation: empty the store and delete its file.
    pub fn clear(&mut self) -> BuildResult<()> {
        self.records = Some(FxHashMap::default());
        self.appended.clear();
        self.dirty = false;
        if self.owner {
            match fs::remove_file(&self.file) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e).at(&self.file),
            }
        }
        Ok(())
    }

    /// Write the store if dirty and owned. Returns whether a write happened.
    pub fn save(&mut self) -> BuildResult<bool> {
        if !self.owner || !self.dirty {
            return Ok(false);
        }
        let file = self.file.clone();
        let sorted: BTreeMap<&PathBuf, &u64> = self.records().iter().collect();
        let json = serde_json::to_vec_pretty(&sorted)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
            .at(&file)?;

        let dir = self.file.parent().unwrap_or(Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir).at(&self.file)?;
        tmp.write_all(&json).at(&self.file)?;
        tmp.persist(&self.file).map_err(|e| e.error).at(&self.file)?;

        self.dirty = false;
        tracing::debug!(path = %self.file.display(), "staleness store saved");
        Ok(true)
    }
}

fn load(file: &Path) -> FxHashMap<PathBuf, u64> {
    let content = match fs::read_to_string(file) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return FxHashMap::default(),
        Err(e) => {
            tracing::warn!(path = %file.display(), error = %e, "cannot read staleness store, starting empty");
            return FxHashMap::default();
        }
    };
    match serde_json::from_str::<FxHashMap<PathBuf, u64>>(&content) {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(path = %file.display(), error = %e, "corrupt staleness store, starting empty");
            FxHashMap::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{FileTime, set_file_mtime};
    use tempfile::TempDir;

    fn fixture() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("dep.js");
        fs::write(&file, "x").unwrap();
        set_file_mtime(&file, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();
        let store = dir.path().join(".kilncache");
        (dir, file, store)
    }

    #[test]
    fn unknown_path_is_stale() {
        let (_dir, file, store_path) = fixture();
        let mut store = StalenessStore::new(store_path, true);
        assert!(!store.check(&file));
        assert!(!store.check(Path::new("/does/not/exist")));
    }

    #[test]
    fn record_then_check_is_idempotent() {
        let (_dir, file, store_path) = fixture();
        let mut store = StalenessStore::new(store_path, true);
        store.record(&file).unwrap();
        for _ in 0..5 {
            assert!(store.check(&file));
        }
    }

    #[test]
    fn touching_the_file_flips_check() {
        let (_dir, file, store_path) = fixture();
        let mut store = StalenessStore::new(store_path, true);
        store.record(&file).unwrap();
        assert!(store.check(&file));

        set_file_mtime(&file, FileTime::from_unix_time(1_600_000_100, 0)).unwrap();
        assert!(!store.check(&file));

        store.record(&file).unwrap();
        assert!(store.check(&file));
    }

    #[test]
    fn save_writes_once_when_dirty() {
        let (_dir, file, store_path) = fixture();
        let mut store = StalenessStore::new(&store_path, true);
        assert!(!store.save().unwrap());

        store.record(&file).unwrap();
        assert!(store.save().unwrap());
        assert!(!store.save().unwrap());

        let mut reloaded = StalenessStore::new(&store_path, false);
        assert!(reloaded.check(&file));
    }

    #[test]
    fn non_owner_never_writes() {
        let (_dir, file, store_path) = fixture();
        let mut store = StalenessStore::new(&store_path, false);
        store.record(&file).unwrap();
        assert!(!store.save().unwrap());
        assert!(!store_path.exists());
    }

    #[test]
    fn delta_merges_into_owner() {
        let (_dir, file, store_path) = fixture();
        let mut worker = StalenessStore::new(&store_path, false);
        worker.record(&file).unwrap();
        let delta = worker.take_delta();
        assert_eq!(delta.len(), 1);
        assert!(worker.take_delta().is_empty());

        let mut owner = StalenessStore::new(&store_path, true);
        assert!(!owner.check(&file));
        owner.merge(&delta);
        assert!(owner.check(&file));
        assert!(owner.is_dirty());
    }

    #[test]
    fn rollback_forgets_unreported_records() {
        let (dir, file, store_path) = fixture();
        let saved = dir.path().join("saved.js");
        fs::write(&saved, "y").unwrap();

        let mut store = StalenessStore::new(&store_path, true);
        store.record(&saved).unwrap();
        store.take_delta();
        store.record(&file).unwrap();

        assert_eq!(store.rollback().len(), 1);
        assert!(!store.check(&file));
        assert!(store.check(&saved));
        assert!(store.take_delta().is_empty());

        store.save().unwrap();
        let mut reloaded = StalenessStore::new(&store_path, false);
        assert!(!reloaded.check(&file));
        assert!(reloaded.check(&saved));
    }

    #[test]
    fn reload_picks_up_saved_records() {
        let (_dir, file, store_path) = fixture();
        let mut worker = StalenessStore::new(&store_path, false);
        assert!(!worker.check(&file));

        let mut owner = StalenessStore::new(&store_path, true);
        owner.record(&file).unwrap();
        owner.save().unwrap();

        assert!(!worker.check(&file));
        worker.reload();
        assert!(worker.check(&file));
    }

    #[test]
    fn clear_removes_file_and_records() {
        let (_dir, file, store_path) = fixture();
        let mut store = StalenessStore::new(&store_path, true);
        store.record(&file).unwrap();
        store.save().unwrap();
        assert!(store_path.exists());

        store.clear().unwrap();
        assert!(!store_path.exists());
        assert!(!store.check(&file));
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let (_dir, file, store_path) = fixture();
        fs::write(&store_path, "{ not json").unwrap();
        let mut store = StalenessStore::new(&store_path, true);
        assert!(!store.check(&file));
    }
}
