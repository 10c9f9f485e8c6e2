//! Per-process build state.
//!
//! A [`BuildSession`] owns the staleness store, the path resolver and the
//! lazily built dependency graph. The coordinator holds the owning session;
//! each worker builds its own non-owning one from the same parameters.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::cache::{StalenessDelta, StalenessStore};
use crate::error::BuildResult;
use crate::graph::DependencyGraph;
use crate::params::BuildParams;
use crate::resolver::{ManifestReader, PathResolver};
use crate::sources::collect_sources;
use crate::toolchain::ComponentParser;

#[derive(Debug)]
pub struct BuildSession {
    params: Arc<BuildParams>,
    staleness: Mutex<StalenessStore>,
    resolver: PathResolver,
    graph: RwLock<Option<Arc<DependencyGraph>>>,
    epoch: AtomicU64,
}

impl BuildSession {
    /// Session for `params`. Only the `owner` writes the staleness file.
    pub fn new(params: Arc<BuildParams>, manifests: Arc<dyn ManifestReader>, owner: bool) -> Self {
        Self {
            staleness: Mutex::new(StalenessStore::new(params.staleness_file(), owner)),
            resolver: PathResolver::new(params.clone(), manifests),
            graph: RwLock::new(None),
            epoch: AtomicU64::new(0),
            params,
        }
    }

    pub fn params(&self) -> &Arc<BuildParams> {
        &self.params
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Generation of the owning staleness store as last seen by this process.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    pub fn bump_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Adopt `epoch` from the coordinator, reloading the staleness store
    /// when it moved.
    pub fn sync_epoch(&self, epoch: u64) {
        let previous = self.epoch.swap(epoch, Ordering::AcqRel);
        if previous != epoch {
            debug!(from = previous, to = epoch, "staleness epoch changed, reloading");
            self.staleness.lock().reload();
        }
    }

    /// Copy gate: true when `path` changed since it was last recorded, in
    /// which case it is recorded now and the caller must copy it.
    pub fn claim_copy(&self, path: &Path) -> BuildResult<bool> {
        let mut store = self.staleness.lock();
        if store.check(path) {
            return Ok(false);
        }
        store.record(path)?;
        Ok(true)
    }

    pub fn take_delta(&self) -> StalenessDelta {
        self.staleness.lock().take_delta()
    }

    /// Forget the copies claimed since the last delta; their outputs may
    /// never have been written.
    pub fn discard_delta(&self) {
        let dropped = self.staleness.lock().rollback();
        if !dropped.is_empty() {
            debug!(records = dropped.len(), "discarded staleness records of a failed unit");
        }
    }

    /// Merge a worker's delta and persist it immediately.
    pub fn merge_delta(&self, delta: &StalenessDelta) -> BuildResult<()> {
        if delta.is_empty() {
            return Ok(());
        }
        let mut store = self.staleness.lock();
        store.merge(delta);
        store.save()?;
        Ok(())
    }

    /// Persist the staleness store if this session owns it and it changed.
    pub fn save_staleness(&self) -> BuildResult<bool> {
        self.staleness.lock().save()
    }

    pub fn reload_staleness(&self) {
        self.staleness.lock().reload();
    }

    /// Full staleness invalidation.
    pub fn clear_staleness(&self, reason: &str) -> BuildResult<()> {
        info!(reason, "clearing staleness store");
        self.staleness.lock().clear()
    }

    /// The dependency graph, scanning the source tree on first use.
    pub fn graph(&self, parser: &dyn ComponentParser) -> BuildResult<Arc<DependencyGraph>> {
        if let Some(graph) = self.graph.read().as_ref() {
            return Ok(graph.clone());
        }
        let mut slot = self.graph.write();
        if let Some(graph) = slot.as_ref() {
            return Ok(graph.clone());
        }
        let files = collect_sources(&self.params)?;
        let graph = Arc::new(DependencyGraph::scan(
            &self.params,
            &files,
            &self.resolver,
            parser,
        )?);
        *slot = Some(graph.clone());
        Ok(graph)
    }

    /// Drop the graph; the next query rescans.
    pub fn invalidate_graph(&self) {
        self.graph.write().take();
    }
}
