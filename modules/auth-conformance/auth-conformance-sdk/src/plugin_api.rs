//! Collaborator traits the harness drives.
//!
//! Backends implement these to connect the harness to a concrete system:
//! how commands are executed, how identities are created, how packages are
//! installed and how the current platform is described.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::CommandError;
use crate::models::{CommandOutput, Identity, OsDescriptor, RemovalOutcome};

/// Opaque administrative command boundary: command in, status and output out.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `argv` to completion.
    ///
    /// A non-zero exit status is reported through `CommandOutput::status`,
    /// not as an error.
    ///
    /// # Errors
    ///
    /// - `EmptyCommand` if `argv` is empty
    /// - `Spawn` if the program could not be started
    async fn run(&self, argv: &[String]) -> Result<CommandOutput, CommandError>;
}

/// Creates and removes principals in the system under test.
#[async_trait]
pub trait IdentityStoreClient: Send + Sync {
    /// Create `identity` (and its mapping, for external identities).
    ///
    /// # Errors
    ///
    /// Returns an error if the system refused or the command could not run.
    async fn create_identity(&self, identity: &Identity) -> Result<(), CommandError>;

    /// Remove `identity`. Must be idempotent: an identity that does not exist
    /// yields `RemovalOutcome::AlreadyAbsent`.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing identity could not be removed.
    async fn remove_identity(&self, identity: &Identity) -> Result<RemovalOutcome, CommandError>;

    /// Whether `identity` is currently known to the system.
    ///
    /// # Errors
    ///
    /// Returns an error if the system could not be queried.
    async fn identity_exists(&self, identity: &Identity) -> Result<bool, CommandError>;
}

/// Installs package artifacts by path.
#[async_trait]
pub trait PackageManagerClient: Send + Sync {
    /// Install every artifact in `artifacts`.
    ///
    /// # Errors
    ///
    /// Returns an error if the package manager could not be started or the
    /// artifacts are not installable on this platform. A package manager that
    /// ran and failed is reported via the returned status.
    async fn install(&self, artifacts: &[PathBuf]) -> Result<CommandOutput, CommandError>;
}

/// Describes the current OS for package selection.
#[async_trait]
pub trait OsDescriptorProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the platform cannot be identified or is unsupported.
    async fn describe(&self) -> Result<OsDescriptor, CommandError>;
}
