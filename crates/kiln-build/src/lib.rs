//! # kiln-build
//!
//! Incremental build engine for single-file component projects.
//!
//! The engine resolves `require` references to files, decides what is stale,
//! compiles only what changed and spreads the work over a pool of worker
//! processes. Two caches survive between runs: a content-addressed result
//! store and a modification-time staleness store that gates copying of
//! installed packages.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use kiln_build::{BuildParams, Builder, ProcessTransport, default_factory};
//! use kiln_config::ConfigLoader;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::new(".").load()?;
//! let params = BuildParams::from_env(".", config);
//! let builder = Builder::new(
//!     params,
//!     default_factory(),
//!     Arc::new(ProcessTransport::current_exe()?),
//! )?;
//!
//! let report = builder.build_all().await?;
//! println!("{} compiled, {} from cache", report.compiled, report.from_cache);
//! # Ok(()) }
//! ```

pub mod cache;
pub mod driver;
pub mod error;
pub mod graph;
pub mod params;
pub mod paths;
pub mod pipeline;
pub mod resolver;
pub mod scheduler;
pub mod session;
pub mod sources;
pub mod toolchain;
pub mod unit;

pub use cache::{CacheEntry, CacheKey, ContentStore, DiskStore, MemoryStore, StalenessStore};
pub use driver::{UnitDriver, UnitOutcome};
pub use error::{BuildError, BuildResult};
pub use graph::{DependencyGraph, EdgeKind, UnitRole};
pub use params::BuildParams;
pub use pipeline::{BuildReport, Builder, clear_output};
pub use resolver::{PathResolver, Resolved, ResolvedFile};
pub use scheduler::{
    InProcessTransport, ProcessTransport, RunReport, SchedulerOptions, SchedulerState,
    TaskScheduler, WORKER_COMMAND, WorkerTransport, serve_stdio,
};
pub use session::BuildSession;
pub use sources::{IgnoreSet, collect_sources};
pub use toolchain::{Toolchain, ToolchainFactory, default_factory};
pub use unit::{SourceUnit, UnitKind};
