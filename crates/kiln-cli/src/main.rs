//! kiln CLI - incremental builds for single-file component projects.
//!
//! Parses arguments, installs logging and dispatches to a command. The hidden
//! `__worker` command is how the build coordinator starts worker processes.

use clap::Parser;
use kiln_cli::{cli, commands, error, logger};
use miette::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    logger::init_logger(args.verbose, args.quiet, args.no_color);

    let worker_args = args.worker_args();
    let result = match args.command {
        cli::Command::Build(build_args) => commands::build_execute(build_args, worker_args).await,
        cli::Command::Worker => {
            commands::worker_execute().await;
            // The stdin reader may still be parked in a blocking read.
            std::process::exit(0);
        }
    };

    result.map_err(error::cli_error_to_miette)
}
