//! Watch mode: rebuild what a changed file affects.
//!
//! A `notify` watcher on the source directory feeds created and modified
//! files, debounced per path, into the same [`Builder`] that ran the first
//! build. Its workers stay alive across rebuilds inside their idle window.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use kiln_build::sources::is_hidden_path;
use kiln_build::{BuildParams, Builder, IgnoreSet};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::commands::build::summarize;
use crate::error::{CliError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Created(PathBuf),
    Modified(PathBuf),
}

impl FileChange {
    pub fn path(&self) -> &Path {
        match self {
            FileChange::Created(p) | FileChange::Modified(p) => p,
        }
    }
}

/// Decides which paths under the source directory are worth a rebuild.
#[derive(Debug, Clone)]
pub struct ChangeFilter {
    src: PathBuf,
    ignore: IgnoreSet,
}

impl ChangeFilter {
    pub fn new(src: PathBuf, ignore: IgnoreSet) -> Self {
        Self { src, ignore }
    }

    /// `config.ignore` plus `watch.ignore`.
    pub fn from_params(params: &BuildParams) -> Result<Self> {
        let src = params.src_dir();
        let patterns: Vec<String> = params
            .config
            .ignore
            .iter()
            .chain(&params.config.watch.ignore)
            .cloned()
            .collect();
        let ignore = IgnoreSet::new(&src, &patterns)?;
        Ok(Self::new(src, ignore))
    }

    pub fn accepts(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.src) else {
            return false;
        };
        if relative.ancestors().any(is_hidden_path) {
            return false;
        }
        !self.ignore.is_ignored(path, false)
    }
}

/// Drops repeats of the same path inside the debounce window.
#[derive(Debug)]
struct Debouncer {
    window: Duration,
    seen: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self {
            window,
            seen: HashMap::new(),
        }
    }

    fn admit(&mut self, path: &Path, now: Instant) -> bool {
        if let Some(last) = self.seen.get(path)
            && now.duration_since(*last) < self.window
        {
            return false;
        }
        self.seen.insert(path.to_path_buf(), now);
        self.seen
            .retain(|_, last| now.duration_since(*last) < self.window);
        true
    }
}

/// Recursive watcher over the source directory.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FileWatcher {
    pub fn new(
        filter: ChangeFilter,
        debounce: Duration,
    ) -> Result<(Self, mpsc::Receiver<FileChange>)> {
        let root = filter.src.clone();
        if !root.is_dir() {
            return Err(CliError::DirectoryNotFound(root));
        }

        let (tx, rx) = mpsc::channel(100);
        let mut debouncer = Debouncer::new(debounce);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    error!(error = %e, "watch error");
                    return;
                }
            };
            for path in &event.paths {
                if !filter.accepts(path) || !path.is_file() {
                    continue;
                }
                let change = match event.kind {
                    EventKind::Create(_) => FileChange::Created(path.clone()),
                    EventKind::Modify(_) => FileChange::Modified(path.clone()),
                    _ => continue,
                };
                if !debouncer.admit(path, Instant::now()) {
                    continue;
                }
                let _ = tx.blocking_send(change);
            }
        })?;

        watcher.watch(&root, RecursiveMode::Recursive)?;

        Ok((
            Self {
                _watcher: watcher,
                root,
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Rebuild on every change until Ctrl-C.
///
/// A failed rebuild is logged and watching goes on.
pub async fn run(builder: &Builder) -> Result<()> {
    let params = builder.session().params().clone();
    let filter = ChangeFilter::from_params(&params)?;
    let (watcher, mut changes) = FileWatcher::new(filter, params.config.debounce())?;
    info!(src = %watcher.root().display(), "watching for changes");

    loop {
        tokio::select! {
            change = changes.recv() => {
                let Some(change) = change else {
                    break;
                };
                debug!(change = ?change, "file changed");
                // Imports may have changed along with the file.
                builder.session().invalidate_graph();
                match builder.build_file(change.path()).await {
                    Ok(report) => summarize(&report),
                    Err(e) => error!(file = %change.path().display(), error = %e, "rebuild failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("stopping watch");
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(patterns: &[&str]) -> ChangeFilter {
        let src = PathBuf::from("/project/src");
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        ChangeFilter::new(src.clone(), IgnoreSet::new(&src, &patterns).unwrap())
    }

    #[test]
    fn accepts_source_files() {
        assert!(filter(&[]).accepts(Path::new("/project/src/pages/home.wpy")));
    }

    #[test]
    fn skips_outside_source() {
        let f = filter(&[]);
        assert!(!f.accepts(Path::new("/project/dist/app.js")));
        assert!(!f.accepts(Path::new("/other/src/app.wpy")));
    }

    #[test]
    fn skips_hidden_paths() {
        let f = filter(&[]);
        assert!(!f.accepts(Path::new("/project/src/.DS_Store")));
        assert!(!f.accepts(Path::new("/project/src/.cache/a.js")));
        assert!(!f.accepts(Path::new("/project/src/pages/.home.wpy.swp")));
    }

    #[test]
    fn skips_ignored_patterns() {
        let f = filter(&["*.bak", "mock/"]);
        assert!(!f.accepts(Path::new("/project/src/a.bak")));
        assert!(!f.accepts(Path::new("/project/src/mock/data.js")));
        assert!(f.accepts(Path::new("/project/src/a.js")));
    }

    #[test]
    fn debounce_is_per_path() {
        let mut debouncer = Debouncer::new(Duration::from_millis(500));
        let start = Instant::now();
        let a = Path::new("/p/src/a.js");
        let b = Path::new("/p/src/b.js");

        assert!(debouncer.admit(a, start));
        assert!(!debouncer.admit(a, start + Duration::from_millis(100)));
        assert!(debouncer.admit(b, start + Duration::from_millis(100)));
        assert!(debouncer.admit(a, start + Duration::from_millis(600)));
    }

    #[test]
    fn change_exposes_its_path() {
        let path = PathBuf::from("/p/src/a.js");
        assert_eq!(FileChange::Created(path.clone()).path(), path.as_path());
        assert_eq!(FileChange::Modified(path.clone()).path(), path.as_path());
    }
}
