//! kiln CLI.
//!
//! The command-line front end of the kiln build engine:
//!
//! - [`cli`] - argument definitions
//! - [`commands`] - `build` and the hidden worker entry point
//! - [`watch`] - file watching for `kiln build --watch`
//! - [`error`] - CLI errors and their conversion to `miette` reports
//! - [`logger`] - `tracing` subscriber setup

pub mod cli;
pub mod commands;
pub mod error;
pub mod logger;
pub mod watch;

pub use error::{CliError, Result};
