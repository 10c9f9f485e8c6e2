//! Command implementations.
//!
//! - [`build`] - full, single-file and watch-mode builds
//! - [`worker`] - the worker process entry point

pub mod build;
pub mod worker;

pub use build::execute as build_execute;
pub use worker::execute as worker_execute;
