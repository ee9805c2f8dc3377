//! iRODS authentication plugin test hook.
//!
//! The binary wraps these modules; they are a library so the end-to-end
//! scenarios under `tests/` can drive a whole invocation in-process.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod cli;
pub mod config;
pub mod gather;
pub mod hook;
pub mod logging;

pub use cli::Cli;
pub use config::{HookConfig, LoggingConfig};
pub use hook::run_hook;
