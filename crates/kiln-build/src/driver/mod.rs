//! Per-unit compilation.
//!
//! [`UnitDriver::compile`] turns one source file into its outputs. It
//! consults the result store, calls collaborators on a miss, rewrites
//! `require` calls through the [`PathResolver`](crate::resolver::PathResolver),
//! and copies every package file it pulls in whose staleness record is out of
//! date. Failure policy belongs to the caller.

mod asset;
mod component;
mod script;
mod sourcemap;
mod style;

pub use script::{Registration, rewrite_node_env};
pub use sourcemap::append_inline;

use std::collections::{BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::{CacheEntry, CacheError, CacheKey, CopyDependency};
use crate::error::BuildResult;
use crate::params::BuildParams;
use crate::session::BuildSession;
use crate::toolchain::Toolchain;
use crate::unit::{SourceUnit, UnitKind};

/// What compiling one unit did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOutcome {
    pub unit: PathBuf,
    /// The unit's compiled output came from the result store.
    pub from_cache: bool,
    /// Every file the unit pulled in, project and package alike.
    pub dependencies: Vec<PathBuf>,
    /// Package files compiled or copied into the npm output tree.
    pub copied: usize,
}

/// State gathered while compiling one unit.
#[derive(Debug, Default)]
pub(crate) struct UnitContext {
    dependencies: BTreeSet<PathBuf>,
    pending: VecDeque<CopyDependency>,
    from_cache: bool,
}

impl UnitContext {
    fn depend(&mut self, path: impl Into<PathBuf>) {
        self.dependencies.insert(path.into());
    }
}

#[derive(Debug, Clone)]
pub struct UnitDriver {
    session: Arc<BuildSession>,
    toolchain: Toolchain,
}

impl UnitDriver {
    pub fn new(session: Arc<BuildSession>, toolchain: Toolchain) -> Self {
        Self { session, toolchain }
    }

    pub fn session(&self) -> &Arc<BuildSession> {
        &self.session
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    fn params(&self) -> &BuildParams {
        self.session.params()
    }

    fn component_ext(&self) -> &str {
        &self.params().config.component_ext
    }

    /// Compile `path` and every stale package file it pulls in.
    pub async fn compile(&self, path: &Path) -> BuildResult<UnitOutcome> {
        let unit = SourceUnit::new(path, self.component_ext());
        let mut ctx = UnitContext::default();

        match unit.kind() {
            UnitKind::Component => self.compile_component(&unit, &mut ctx).await?,
            UnitKind::Script => self.compile_script_unit(&unit, &mut ctx).await?,
            UnitKind::Style => self.compile_style_unit(&unit).await?,
            _ => self.compile_asset(&unit)?,
        }
        // Package scripts compiled below may hit the cache on their own.
        let from_cache = ctx.from_cache;
        let copied = self.drain_copies(&mut ctx).await?;

        Ok(UnitOutcome {
            unit: path.to_path_buf(),
            from_cache,
            dependencies: ctx.dependencies.into_iter().collect(),
            copied,
        })
    }

    /// Work through package copy obligations until none are left.
    ///
    /// Compiling a package script can queue further obligations.
    async fn drain_copies(&self, ctx: &mut UnitContext) -> BuildResult<usize> {
        let mut copied = 0;
        while let Some(dep) = ctx.pending.pop_front() {
            let unit = SourceUnit::new(&dep.source, self.component_ext())
                .in_package(dep.package.clone());
            match unit.kind() {
                UnitKind::Script => self.compile_script_unit(&unit, ctx).await?,
                UnitKind::Component => self.compile_component(&unit, ctx).await?,
                _ => {
                    let target = self.params().npm_output_path(&dep.package, &dep.source);
                    self.toolchain.writer.copy(&dep.source, &target)?;
                }
            }
            info!(dependency = %dep.source.display(), "copy");
            copied += 1;
        }
        Ok(copied)
    }

    /// Take a package dependency through the staleness gate.
    fn claim(&self, dep: &CopyDependency, ctx: &mut UnitContext) -> BuildResult<()> {
        ctx.depend(&dep.source);
        if self.session.claim_copy(&dep.source)? {
            ctx.pending.push_back(dep.clone());
        }
        Ok(())
    }

    /// Look up a result; corrupt or incompatible entries are misses.
    fn cached(&self, key: &CacheKey) -> Option<CacheEntry> {
        if !self.params().config.cache {
            return None;
        }
        match self.toolchain.store.get(key) {
            Ok(entry) => Some(entry),
            Err(CacheError::CacheMiss) => None,
            Err(e) => {
                debug!(key = %key, error = %e, "unusable cache entry, recompiling");
                None
            }
        }
    }

    /// Replay a hit: re-trigger its copy obligations and write its output.
    fn replay(&self, entry: CacheEntry, ctx: &mut UnitContext) -> BuildResult<()> {
        for dep in &entry.deps {
            self.claim(dep, ctx)?;
        }
        for required in entry.requires {
            ctx.depend(required);
        }
        self.toolchain.writer.write(&entry.target, entry.code.as_bytes())?;
        info!(output = %entry.target.display(), "cache write");
        Ok(())
    }

    fn store(&self, key: &CacheKey, entry: &CacheEntry) {
        if !self.params().config.cache {
            return;
        }
        if let Err(e) = self.toolchain.store.put(key, entry) {
            debug!(key = %key, error = %e, "cannot store compiled result");
        }
    }

    /// Output path for `unit` with extension `ext`.
    fn output_for(&self, unit: &SourceUnit, ext: &str) -> PathBuf {
        match unit.package() {
            Some(package) => self
                .params()
                .npm_output_path(package, unit.path())
                .with_extension(ext),
            None => self.params().output_path(unit.path(), Some(ext)),
        }
    }
}

#[cfg(test)]
mod tests;
