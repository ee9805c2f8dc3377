//! Error types for the auth conformance harness.

use std::path::PathBuf;

use thiserror::Error;

use crate::models::{ExecutionResult, IdentityRole};

/// Errors surfaced by a conformance run.
///
/// `SelectionFailed` is an expected outcome (the tests ran and reported a
/// failure); every other variant means the harness could not get a verdict.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// No artifact in the package directory matched the plugin's naming convention.
    #[error("no plugin package matching '{pattern}' found in {}", directory.display())]
    PackageNotFound { directory: PathBuf, pattern: String },

    /// The package manager could not install the selected artifacts.
    #[error("plugin package installation failed: {message}")]
    InstallationFailed {
        /// Package manager exit status, if it ran at all.
        status: Option<i32>,
        message: String,
    },

    /// An identity could not be created during setup.
    #[error("failed to create {role} identity '{name}': {reason}")]
    IdentityCreationFailed {
        name: String,
        role: IdentityRole,
        reason: String,
    },

    /// The test process could not be started as the requested principal.
    #[error("failed to launch tests as '{principal}': {reason}")]
    ProcessLaunchFailed { principal: String, reason: String },

    /// The selection ran and exited non-zero.
    #[error("test selection '{selection}' failed with status {}", result.exit_status)]
    SelectionFailed {
        selection: String,
        result: Box<ExecutionResult>,
    },

    /// The selection was cancelled or timed out before it finished.
    #[error("test selection '{selection}' aborted: {reason}")]
    ExecutionAborted {
        selection: String,
        reason: String,
        /// Output captured up to the moment of cancellation.
        partial_output: Vec<u8>,
    },

    /// One or more identities could not be removed during teardown.
    #[error("teardown failed to remove {} identities", failures.len())]
    TeardownPartialFailure { failures: Vec<RemovalFailure> },
}

impl HarnessError {
    /// Execution result carried by the error, if the tests actually ran to completion.
    #[must_use]
    pub fn execution_result(&self) -> Option<&ExecutionResult> {
        match self {
            Self::SelectionFailed { result, .. } => Some(result.as_ref()),
            _ => None,
        }
    }
}

/// One identity teardown could not remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalFailure {
    pub name: String,
    pub role: IdentityRole,
    pub reason: String,
}

/// Errors reported by the external collaborators (command boundary, identity
/// store, package manager, OS descriptor provider).
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with status {status}: {output}")]
    NonZeroExit {
        program: String,
        status: i32,
        output: String,
    },

    #[error("empty command line")]
    EmptyCommand,

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Violations of the identity graph invariants.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityGraphError {
    #[error("identity name '{0}' is used more than once")]
    DuplicateName(String),

    #[error("expected exactly one administrator, found {0}")]
    AdministratorCount(usize),

    #[error("external identity '{0}' is not mapped to an internal identity")]
    UnmappedExternal(String),

    #[error("external identity '{external}' maps to '{target}', which is not an internal identity created before it")]
    MappingTargetMissing { external: String, target: String },

    #[error("no internal/external identity pair present")]
    MissingIdentityPair,
}

/// A test selection that cannot be passed to the test command.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("test selection must not be empty")]
pub struct InvalidSelection;
