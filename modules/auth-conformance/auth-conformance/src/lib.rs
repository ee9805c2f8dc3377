//! Auth Conformance Harness
//!
//! Installs an authentication plugin, provisions the identities its
//! conformance tests need, runs a test selection as the service account, and
//! tears the identities down again however the run ends.
//!
//! - [`Provisioner`] - plugin install, identity setup and teardown
//! - [`Runner`] - the `SelectionExecutor` running the test command
//! - [`Lifecycle`] - the run state machine tying both together
//!
//! ## Configuration
//!
//! ```yaml
//! service:
//!   user: irods
//!   home: /var/lib/irods
//! plugin:
//!   package_name: irods-auth-plugin-nop
//! runner:
//!   timeout: 45m
//! ```
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod config;
pub mod domain;

pub use config::ConformanceConfig;
pub use domain::{DomainError, Lifecycle, Provisioner, RunOptions, RunReport, RunState, Runner};
