//! Domain models for the auth conformance harness.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::{IdentityGraphError, InvalidSelection};

/// Selection run when the caller does not name one.
pub const DEFAULT_TEST_SELECTION: &str = "test_auth_plugin_project_template_cpp";

/// Role of a principal in the system under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityRole {
    /// Administrative principal able to manage other identities.
    Administrator,
    /// Ordinary internal user; the target of external mappings.
    InternalUser,
    /// Principal authenticated by the plugin and mapped to an internal user.
    ExternalUser,
}

impl IdentityRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Administrator => "administrator",
            Self::InternalUser => "internal-user",
            Self::ExternalUser => "external-user",
        }
    }
}

impl fmt::Display for IdentityRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A principal in the system under test.
///
/// `credential` is wrapped in `SecretString` so `Debug` redacts it.
#[derive(Debug, Clone)]
pub struct Identity {
    name: String,
    role: IdentityRole,
    credential: Option<SecretString>,
    mapped_to: Option<String>,
}

impl Identity {
    #[must_use]
    pub fn administrator(name: impl Into<String>, credential: Option<SecretString>) -> Self {
        Self {
            name: name.into(),
            role: IdentityRole::Administrator,
            credential,
            mapped_to: None,
        }
    }

    #[must_use]
    pub fn internal_user(name: impl Into<String>, credential: Option<SecretString>) -> Self {
        Self {
            name: name.into(),
            role: IdentityRole::InternalUser,
            credential,
            mapped_to: None,
        }
    }

    /// External principal authenticating as the internal user `mapped_to`.
    #[must_use]
    pub fn external_user(
        name: impl Into<String>,
        credential: Option<SecretString>,
        mapped_to: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            role: IdentityRole::ExternalUser,
            credential,
            mapped_to: Some(mapped_to.into()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn role(&self) -> IdentityRole {
        self.role
    }

    #[must_use]
    pub fn credential(&self) -> Option<&SecretString> {
        self.credential.as_ref()
    }

    /// Name of the internal identity this one is mapped to (external users only).
    #[must_use]
    pub fn mapped_to(&self) -> Option<&str> {
        self.mapped_to.as_deref()
    }
}

/// Identities created for one run, kept in creation order.
///
/// Returned by setup and threaded into teardown; teardown walks it backwards so
/// mapping targets always outlive the identities mapped onto them.
#[derive(Debug, Clone, Default)]
pub struct IdentityGraph {
    identities: Vec<Identity>,
}

impl IdentityGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an identity whose creation is about to be attempted.
    pub fn record(&mut self, identity: Identity) {
        self.identities.push(identity);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.identities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Identities in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.identities.iter()
    }

    /// Identities in teardown (reverse creation) order.
    pub fn teardown_order(&self) -> impl Iterator<Item = &Identity> {
        self.identities.iter().rev()
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Identity> {
        self.identities.iter().find(|i| i.name == name)
    }

    #[must_use]
    pub fn administrator(&self) -> Option<&Identity> {
        self.first_with_role(IdentityRole::Administrator)
    }

    #[must_use]
    pub fn internal_user(&self) -> Option<&Identity> {
        self.first_with_role(IdentityRole::InternalUser)
    }

    #[must_use]
    pub fn external_user(&self) -> Option<&Identity> {
        self.first_with_role(IdentityRole::ExternalUser)
    }

    fn first_with_role(&self, role: IdentityRole) -> Option<&Identity> {
        self.identities.iter().find(|i| i.role == role)
    }

    /// Checks the invariants a fully provisioned graph must hold.
    ///
    /// # Errors
    ///
    /// - `DuplicateName` if two identities share a name
    /// - `AdministratorCount` unless exactly one administrator exists
    /// - `UnmappedExternal` / `MappingTargetMissing` if an external identity
    ///   does not map to an internal identity created before it
    /// - `MissingIdentityPair` if no internal/external pair exists
    pub fn validate(&self) -> Result<(), IdentityGraphError> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut admins = 0usize;
        let mut pairs = 0usize;

        for identity in &self.identities {
            if !seen.insert(identity.name.as_str()) {
                return Err(IdentityGraphError::DuplicateName(identity.name.clone()));
            }
            match identity.role {
                IdentityRole::Administrator => admins += 1,
                IdentityRole::InternalUser => {}
                IdentityRole::ExternalUser => {
                    let target = identity
                        .mapped_to
                        .as_deref()
                        .ok_or_else(|| IdentityGraphError::UnmappedExternal(identity.name.clone()))?;
                    // Only identities already seen count: the target must be created first.
                    let target_ok = seen.contains(target)
                        && self
                            .find(target)
                            .is_some_and(|t| t.role == IdentityRole::InternalUser);
                    if !target_ok {
                        return Err(IdentityGraphError::MappingTargetMissing {
                            external: identity.name.clone(),
                            target: target.to_owned(),
                        });
                    }
                    pairs += 1;
                }
            }
        }

        if admins != 1 {
            return Err(IdentityGraphError::AdministratorCount(admins));
        }
        if pairs == 0 {
            return Err(IdentityGraphError::MissingIdentityPair);
        }
        Ok(())
    }
}

/// Opaque identifier naming one test or a group of tests.
///
/// The harness never interprets it; it is handed verbatim to the test command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TestSelection(String);

impl TestSelection {
    /// # Errors
    ///
    /// Returns `InvalidSelection` if the selection is empty or only whitespace.
    pub fn new(selection: impl Into<String>) -> Result<Self, InvalidSelection> {
        let selection = selection.into();
        if selection.trim().is_empty() {
            return Err(InvalidSelection);
        }
        Ok(Self(selection))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TestSelection {
    fn default() -> Self {
        Self(DEFAULT_TEST_SELECTION.to_owned())
    }
}

impl fmt::Display for TestSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TestSelection {
    type Err = InvalidSelection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TestSelection {
    type Error = InvalidSelection;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TestSelection> for String {
    fn from(value: TestSelection) -> Self {
        value.0
    }
}

/// Principal the test selection runs as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RunAs {
    /// Run as the invoking user without switching principals.
    CurrentUser,
    /// Switch to the system's own service account with a login environment.
    ServiceAccount { user: String },
}

impl RunAs {
    /// Human-readable principal name for logs and errors.
    #[must_use]
    pub fn principal(&self) -> &str {
        match self {
            Self::CurrentUser => "<current user>",
            Self::ServiceAccount { user } => user,
        }
    }
}

/// Outcome of running a test selection to completion.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Exit status of the test process itself; zero means every selected test passed.
    pub exit_status: i32,
    /// Interleaved stdout/stderr of the test process.
    pub combined_output: Vec<u8>,
    /// Log file the output was persisted to, if persisting succeeded.
    pub log_path: Option<PathBuf>,
    /// Why persisting the output failed, if it did. Never affects `exit_status`.
    pub capture_error: Option<String>,
}

impl ExecutionResult {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.exit_status == 0
    }

    #[must_use]
    pub fn output_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.combined_output)
    }
}

/// Native package format of a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageSuffix {
    Deb,
    Rpm,
}

impl PackageSuffix {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deb => "deb",
            Self::Rpm => "rpm",
        }
    }
}

impl fmt::Display for PackageSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current OS as seen by the package selection logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsDescriptor {
    /// Distribution identifier, e.g. `ubuntu`.
    pub id: String,
    /// Distribution version, e.g. `22.04`.
    pub version_id: String,
    /// Subdirectory of the built-packages root holding this platform's
    /// artifacts, e.g. `Ubuntu_22`.
    pub platform_dir: String,
    pub package_suffix: PackageSuffix,
}

/// Result of one command run through the administrative command boundary.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub status: i32,
    /// Stdout followed by stderr.
    pub output: Vec<u8>,
}

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == 0
    }

    #[must_use]
    pub fn output_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.output)
    }
}

/// What a removal actually did. Removing an absent identity is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalOutcome {
    Removed,
    AlreadyAbsent,
}
