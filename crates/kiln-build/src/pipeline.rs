//! Build sessions end to end: cache preparation, enumeration, the entry
//! unit in-process, everything else on the worker pool.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::driver::{UnitDriver, UnitOutcome};
use crate::error::{BuildError, BuildResult, IoResultExt};
use crate::params::BuildParams;
use crate::scheduler::{SchedulerOptions, TaskScheduler, WorkerTransport};
use crate::session::BuildSession;
use crate::sources::collect_sources;
use crate::toolchain::ToolchainFactory;

/// Totals for one build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Units compiled from scratch.
    pub compiled: usize,
    /// Units written from the result store.
    pub from_cache: usize,
    /// Package files compiled or copied.
    pub copied: usize,
    /// Units whose worker crashed.
    pub crashed: usize,
    pub elapsed: Duration,
    /// Units in completion order.
    pub units: Vec<PathBuf>,
}

impl BuildReport {
    fn absorb(&mut self, outcome: UnitOutcome) {
        if outcome.from_cache {
            self.from_cache += 1;
        } else {
            self.compiled += 1;
        }
        self.copied += outcome.copied;
        self.units.push(outcome.unit);
    }

    pub fn total(&self) -> usize {
        self.compiled + self.from_cache + self.crashed
    }
}

/// Remove the output directory.
pub fn clear_output(params: &BuildParams) -> BuildResult<()> {
    let target = params.target_dir();
    match fs::remove_dir_all(&target) {
        Ok(()) => {
            info!(target = %target.display(), "output cleared");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BuildError::io(target, e)),
    }
}

#[derive(Debug)]
pub struct Builder {
    driver: UnitDriver,
    scheduler: TaskScheduler,
}

impl Builder {
    /// Prepare the caches and start the coordinator.
    ///
    /// The staleness store is cleared when caching is off or the output
    /// scaffolding is missing; the result store only when caching is off.
    pub fn new(
        params: BuildParams,
        factory: ToolchainFactory,
        transport: Arc<dyn WorkerTransport>,
    ) -> BuildResult<Self> {
        let params = Arc::new(params);
        let toolchain = factory(&params)?;
        let session = Arc::new(BuildSession::new(
            params.clone(),
            toolchain.manifests.clone(),
            true,
        ));

        if !params.config.cache {
            session.clear_staleness("caching disabled")?;
            if let Err(e) = toolchain.store.clear() {
                warn!(error = %e, "cannot clear result store");
            }
        } else if !params.npm_output_dir().is_dir() {
            session.clear_staleness("output scaffolding missing")?;
        }

        let scheduler = TaskScheduler::new(
            session.clone(),
            transport,
            SchedulerOptions::from_config(&params.config),
        );
        Ok(Self {
            driver: UnitDriver::new(session, toolchain),
            scheduler,
        })
    }

    pub fn session(&self) -> &Arc<BuildSession> {
        self.driver.session()
    }

    pub fn scheduler(&self) -> &TaskScheduler {
        &self.scheduler
    }

    fn params(&self) -> &BuildParams {
        self.session().params()
    }

    /// Build every standalone unit under the source directory.
    pub async fn build_all(&self) -> BuildResult<BuildReport> {
        let params = self.params();
        let files = collect_sources(params)?;
        if !params.entry_path().is_file() {
            warn!(entry = %params.entry_path().display(), "no entry unit");
        }
        let graph = self.session().graph(self.driver.toolchain().parser.as_ref())?;
        let units: Vec<PathBuf> = files.into_iter().filter(|f| graph.is_standalone(f)).collect();
        info!(units = units.len(), "full build");
        self.build_units(units).await
    }

    /// Rebuild after `path` changed: its roots, itself when standalone, and
    /// the style sheets that import it.
    pub async fn build_file(&self, path: &Path) -> BuildResult<BuildReport> {
        let path = path_clean::clean(self.params().root.join(path));
        if !path.is_file() {
            return Err(BuildError::io(
                &path,
                io::Error::new(io::ErrorKind::NotFound, "no such file"),
            ));
        }

        let parser = self.driver.toolchain().parser.clone();
        let mut graph = self.session().graph(parser.as_ref())?;
        if !graph.contains(&path) {
            self.session().invalidate_graph();
            graph = self.session().graph(parser.as_ref())?;
        }
        let plan = graph.plan_rebuild(&path);
        info!(changed = %path.display(), units = plan.len(), "incremental build");
        self.build_units(plan).await
    }

    /// Compile `units`: the entry unit here and first, the rest on the pool.
    pub async fn build_units(&self, units: Vec<PathBuf>) -> BuildResult<BuildReport> {
        let started = Instant::now();
        let entry = self.params().entry_path();
        let (entry_units, rest): (Vec<PathBuf>, Vec<PathBuf>) =
            units.into_iter().partition(|u| *u == entry);
        let mut report = BuildReport::default();

        if !entry_units.is_empty() {
            let session = self.session();
            let outcome = match self.driver.compile(&entry).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    session.discard_delta();
                    return Err(e);
                }
            };
            if !session.take_delta().is_empty() {
                session.bump_epoch();
            }
            session.save_staleness()?;
            report.absorb(outcome);
        }

        if !rest.is_empty() {
            let run = self.scheduler.run(rest).await?;
            report.crashed = run.crashed.len();
            for outcome in run.outcomes {
                report.absorb(outcome);
            }
        }

        let scaffolding = self.params().npm_output_dir();
        fs::create_dir_all(&scaffolding).at(&scaffolding)?;
        report.elapsed = started.elapsed();
        info!(
            compiled = report.compiled,
            cached = report.from_cache,
            copied = report.copied,
            crashed = report.crashed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "build finished"
        );
        Ok(report)
    }

    /// Stop the worker pool.
    pub async fn shutdown(self, grace: Duration) {
        self.scheduler.shutdown(grace).await;
    }
}
