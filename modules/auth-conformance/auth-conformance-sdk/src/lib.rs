//! Auth Conformance SDK
//!
//! Shared vocabulary of the authentication plugin conformance harness:
//!
//! - [`SelectionExecutor`] - API trait for running a test selection
//! - [`CommandExecutor`], [`IdentityStoreClient`], [`PackageManagerClient`],
//!   [`OsDescriptorProvider`] - collaborator traits implemented by backends
//! - [`Identity`], [`IdentityGraph`], [`TestSelection`], [`ExecutionResult`] - models
//! - [`HarnessError`] - error taxonomy of a conformance run
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod api;
pub mod error;
pub mod models;
pub mod plugin_api;

// Re-export main types at crate root
pub use api::SelectionExecutor;
pub use error::{CommandError, HarnessError, IdentityGraphError, InvalidSelection, RemovalFailure};
pub use models::{
    CommandOutput, DEFAULT_TEST_SELECTION, ExecutionResult, Identity, IdentityGraph, IdentityRole,
    OsDescriptor, PackageSuffix, RemovalOutcome, RunAs, TestSelection,
};
pub use plugin_api::{
    CommandExecutor, IdentityStoreClient, OsDescriptorProvider, PackageManagerClient,
};
