//! Logging setup for the kiln CLI.
//!
//! Every event goes to stderr. Worker processes use stdout as their message
//! channel, so the same setup is safe in both roles.
//!
//! # Example
//!
//! ```rust,no_run
//! use kiln_cli::logger::init_logger;
//! use tracing::info;
//!
//! init_logger(false, false, false);
//! info!("Starting build");
//! ```

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const CRATES: &[&str] = &["kiln", "kiln_cli", "kiln_build", "kiln_config"];

/// Filter directives giving every kiln crate the same `level`.
pub fn kiln_directives(level: &str) -> String {
    CRATES
        .iter()
        .map(|krate| format!("{krate}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Pick the filter for the global flags.
///
/// 1. `--verbose`: debug for kiln crates
/// 2. `--quiet`: errors only
/// 3. `RUST_LOG`, when set
/// 4. info for kiln crates
pub fn filter_for(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(kiln_directives("debug"))
    } else if quiet {
        EnvFilter::new(kiln_directives("error"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(kiln_directives("info")))
    }
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    init_logger_with_filter(filter_for(verbose, quiet), no_color);
}

pub fn init_logger_with_filter(filter: EnvFilter, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_cover_every_crate() {
        assert_eq!(
            kiln_directives("debug"),
            "kiln=debug,kiln_cli=debug,kiln_build=debug,kiln_config=debug"
        );
    }

    #[test]
    fn flags_pick_the_level() {
        assert!(filter_for(true, false).to_string().contains("kiln_build=debug"));
        assert!(filter_for(false, true).to_string().contains("kiln_build=error"));
    }
}
