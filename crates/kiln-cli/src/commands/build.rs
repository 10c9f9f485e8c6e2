//! `kiln build`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use kiln_build::{
    BuildParams, BuildReport, Builder, InProcessTransport, ProcessTransport, WorkerTransport,
    clear_output, default_factory,
};
use kiln_config::ConfigLoader;
use tracing::{info, warn};

use crate::cli::BuildArgs;
use crate::error::{CliError, Result};
use crate::watch;

/// How long workers get to exit once the command is done.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Execute the build command.
///
/// 1. Load configuration (flags > `KILN_*` env > config file > defaults)
/// 2. Clear the output directory if asked
/// 3. Build everything, or what depends on FILE
/// 4. With `--watch`, keep rebuilding on changes
///
/// `worker_args` are the arguments a worker process is started with.
pub async fn execute(args: BuildArgs, worker_args: Vec<String>) -> Result<()> {
    let root = resolve_root(args.cwd.as_deref())?;
    let config = ConfigLoader::new(&root).overrides(args.overrides()).load()?;
    let params = BuildParams::from_env(&root, config);
    info!(
        root = %params.root.display(),
        src = %params.src_dir().display(),
        target = %params.target_dir().display(),
        "loaded configuration"
    );

    if args.clear {
        clear_output(&params)?;
    }

    let factory = default_factory();
    let transport: Arc<dyn WorkerTransport> = if args.inline_workers {
        Arc::new(InProcessTransport::new(factory.clone()))
    } else {
        Arc::new(ProcessTransport::new(std::env::current_exe()?, worker_args))
    };
    let builder = Builder::new(params, factory, transport)?;

    let built = match &args.file {
        Some(file) => builder.build_file(file).await,
        None => builder.build_all().await,
    };
    let outcome = match built {
        Ok(report) => {
            summarize(&report);
            if args.watch {
                watch::run(&builder).await
            } else {
                Ok(())
            }
        }
        Err(e) => Err(e.into()),
    };

    builder.shutdown(SHUTDOWN_GRACE).await;
    outcome
}

fn resolve_root(cwd: Option<&Path>) -> Result<PathBuf> {
    let current = std::env::current_dir()?;
    let root = match cwd {
        Some(dir) => current.join(dir),
        None => current,
    };
    if !root.is_dir() {
        return Err(CliError::DirectoryNotFound(root));
    }
    Ok(root)
}

/// One-line summary of a build.
pub fn summarize(report: &BuildReport) {
    info!(
        "{} units in {} ({} compiled, {} from cache, {} dependencies copied)",
        report.total(),
        format_duration(report.elapsed),
        report.compiled,
        report.from_cache,
        report.copied
    );
    if report.crashed > 0 {
        warn!(crashed = report.crashed, "some units were lost to crashed workers");
    }
}

pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms < 1000 {
        format!("{ms}ms")
    } else {
        format!("{:.2}s", duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_switch_to_seconds() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }

    #[test]
    fn missing_root_is_reported() {
        let err = resolve_root(Some(Path::new("/definitely/not/here"))).unwrap_err();
        assert!(matches!(err, CliError::DirectoryNotFound(_)));
    }
}
