//! Error handling for the kiln CLI.
//!
//! Library errors convert into [`CliError`] through `#[from]`; at the binary
//! boundary [`cli_error_to_miette`] turns it into a report with a hint line.

use std::path::PathBuf;

use kiln_build::BuildError;
use kiln_config::ConfigError;
use miette::{MietteDiagnostic, Report};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Build failed: {0}")]
    Build(#[from] BuildError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File watcher error: {0}")]
    Watch(#[from] notify::Error),
}

pub type Result<T, E = CliError> = std::result::Result<T, E>;

impl CliError {
    /// What the user can do about it, when there is something to say.
    pub fn hint(&self) -> Option<String> {
        match self {
            CliError::Config(e) => e.hint().map(str::to_string),
            CliError::Build(e) => build_hint(e),
            CliError::DirectoryNotFound(_) => {
                Some("Pass --cwd with the project root".to_string())
            }
            CliError::Watch(_) => {
                Some("Check the watch limit of your system, or build without --watch".to_string())
            }
            CliError::InvalidArgument(_) | CliError::Io(_) => None,
        }
    }
}

fn build_hint(err: &BuildError) -> Option<String> {
    let hint = match err {
        BuildError::ModuleNotFound { reference, .. } => format!(
            "Install '{reference}' or fix the path. Aliases live under [resolve.alias] in kiln.toml"
        ),
        BuildError::Compile { .. } => {
            "Fix the reported error. Units still queued were not built".to_string()
        }
        BuildError::UnknownCapability { kind: "compiler", name } => format!(
            "Configure a command for it, e.g. [compilers.{name}] command = [\"...\"]"
        ),
        BuildError::UnknownCapability { kind, name } => {
            format!("Remove the {kind} '{name}' from kiln.toml or use a bundled one")
        }
        BuildError::Worker(_) => {
            "Retry with --inline-workers to compile inside this process".to_string()
        }
        BuildError::Io { .. } | BuildError::Config(_) | BuildError::Cancelled => return None,
    };
    Some(hint)
}

/// Convert to a `miette` report, carrying the hint as help text.
pub fn cli_error_to_miette(err: CliError) -> Report {
    let diagnostic = MietteDiagnostic::new(err.to_string());
    match err.hint() {
        Some(hint) => Report::new(diagnostic.with_help(hint)),
        None => Report::new(diagnostic),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_not_found_names_the_reference() {
        let err = CliError::from(BuildError::ModuleNotFound {
            reference: "lodash".to_string(),
            from: PathBuf::from("src/a.js"),
        });
        assert!(err.to_string().contains("cannot resolve 'lodash'"));
        assert!(err.hint().unwrap().contains("Install 'lodash'"));
    }

    #[test]
    fn unknown_compiler_hint_shows_config() {
        let err = CliError::from(BuildError::UnknownCapability {
            kind: "compiler",
            name: "less".to_string(),
        });
        assert!(err.hint().unwrap().contains("[compilers.less]"));
    }

    #[test]
    fn config_hint_is_forwarded() {
        let err = CliError::from(ConfigError::NotFound);
        assert!(err.hint().unwrap().contains("kiln.toml"));
    }

    #[test]
    fn report_keeps_message_and_help() {
        let report = cli_error_to_miette(CliError::DirectoryNotFound(PathBuf::from("/nope")));
        assert_eq!(report.to_string(), "Directory not found: /nope");
        assert!(report.help().is_some());
    }
}
