//! Output writers.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{BuildResult, IoResultExt};

pub trait OutputWriter: Send + Sync + fmt::Debug {
    /// Write `content` to `path`, creating parent directories.
    fn write(&self, path: &Path, content: &[u8]) -> BuildResult<()>;

    /// Copy `from` to `to` verbatim.
    fn copy(&self, from: &Path, to: &Path) -> BuildResult<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsWriter;

impl FsWriter {
    fn ensure_parent(path: &Path) -> BuildResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).at(parent)?;
        }
        Ok(())
    }
}

impl OutputWriter for FsWriter {
    fn write(&self, path: &Path, content: &[u8]) -> BuildResult<()> {
        Self::ensure_parent(path)?;
        fs::write(path, content).at(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> BuildResult<()> {
        Self::ensure_parent(to)?;
        fs::copy(from, to).at(from)?;
        Ok(())
    }
}

/// Keeps outputs in memory. Copies read the source file.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    files: Mutex<BTreeMap<PathBuf, Vec<u8>>>,
    writes: Mutex<usize>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &Path) -> Option<String> {
        self.files
            .lock()
            .get(path)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.lock().keys().cloned().collect()
    }

    /// Number of write and copy calls so far.
    pub fn write_count(&self) -> usize {
        *self.writes.lock()
    }
}

impl OutputWriter for MemoryWriter {
    fn write(&self, path: &Path, content: &[u8]) -> BuildResult<()> {
        self.files.lock().insert(path.to_path_buf(), content.to_vec());
        *self.writes.lock() += 1;
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> BuildResult<()> {
        let bytes = fs::read(from).at(from)?;
        self.write(to, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn fs_writer_creates_directories() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("dist/pages/a.js");
        FsWriter.write(&out, b"x").unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), "x");

        let copied = dir.path().join("dist/img/b.png");
        FsWriter.copy(&out, &copied).unwrap();
        assert_eq!(fs::read(&copied).unwrap(), b"x");
    }

    #[test]
    fn memory_writer_counts_writes() {
        let writer = MemoryWriter::new();
        writer.write(Path::new("/a"), b"1").unwrap();
        writer.write(Path::new("/a"), b"2").unwrap();
        assert_eq!(writer.get(Path::new("/a")).as_deref(), Some("2"));
        assert_eq!(writer.write_count(), 2);
        assert_eq!(writer.paths(), vec![PathBuf::from("/a")]);
    }
}
