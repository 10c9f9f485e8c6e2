//! Worker process entry point.
//!
//! Started by the coordinator as `kiln __worker`. Requests arrive as JSON
//! lines on stdin and events leave as JSON lines on stdout.

use kiln_build::{default_factory, serve_stdio};
use tracing::debug;

/// Serve until the coordinator says shutdown, closes stdin, or the idle
/// window passes twice without work.
pub async fn execute() {
    debug!(pid = std::process::id(), "worker started");
    serve_stdio(default_factory()).await;
    debug!(pid = std::process::id(), "worker finished");
}
