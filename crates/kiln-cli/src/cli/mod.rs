//! Command-line interface definition.
//!
//! - `kiln build` - full build, a single-file rebuild, or watch mode
//! - `kiln __worker` - hidden; a worker process serving the coordinator

mod validation;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use kiln_build::WORKER_COMMAND;
use kiln_config::ConfigOverrides;

pub use validation::parse_pool_size;

/// kiln - incremental builds for single-file component projects
#[derive(Parser, Debug)]
#[command(
    name = "kiln",
    version,
    about = "Incremental builds for single-file component projects",
    long_about = "kiln compiles a source tree of components, scripts, styles and assets into\n\
                  an output tree. Results are cached by content, installed packages are\n\
                  copied only when they change, and work is spread over worker processes."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Arguments that start a worker process with the same logging flags.
    pub fn worker_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.verbose {
            args.push("--verbose".to_string());
        }
        if self.quiet {
            args.push("--quiet".to_string());
        }
        if self.no_color {
            args.push("--no-color".to_string());
        }
        args.push(WORKER_COMMAND.to_string());
        args
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the project
    ///
    /// Without FILE every unit under the source directory is built. With
    /// FILE only the units affected by that file are rebuilt.
    Build(BuildArgs),

    /// Serve compile requests over stdin/stdout
    #[command(name = "__worker", hide = true)]
    Worker,
}

#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Rebuild only what depends on this file (relative to the project root)
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Source directory
    #[arg(short, long, value_name = "DIR")]
    pub source: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    pub target: Option<PathBuf>,

    /// Component file extension
    #[arg(long, value_name = "EXT")]
    pub ext: Option<String>,

    /// Output platform
    #[arg(short, long, value_name = "PLATFORM")]
    pub output: Option<String>,

    /// Ignore and reset both caches
    #[arg(long)]
    pub no_cache: bool,

    /// Keep running and rebuild on changes
    #[arg(short, long)]
    pub watch: bool,

    /// Remove the output directory first
    #[arg(long)]
    pub clear: bool,

    /// Number of worker processes
    #[arg(long, value_name = "N", value_parser = parse_pool_size)]
    pub workers: Option<usize>,

    /// Run workers as threads of this process
    #[arg(long)]
    pub inline_workers: bool,

    /// Project root (defaults to the current directory)
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,
}

impl BuildArgs {
    /// Configuration layer for the flags that were given.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            src: self.source.clone(),
            target: self.target.clone(),
            component_ext: self.ext.clone(),
            output: self.output.clone(),
            cache: self.no_cache.then_some(false),
            ..ConfigOverrides::default()
        }
        .with_pool_size(self.workers)
    }
}
