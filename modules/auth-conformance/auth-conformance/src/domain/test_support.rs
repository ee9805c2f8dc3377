#![allow(clippy::unwrap_used, clippy::expect_used, clippy::must_use_candidate)]

//! In-memory collaborators for unit tests.

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;

use auth_conformance_sdk::{
    CommandError, CommandOutput, Identity, IdentityStoreClient, OsDescriptor,
    OsDescriptorProvider, PackageManagerClient, PackageSuffix, RemovalOutcome,
};

/// Identity store keeping names in a list, with scripted failures.
#[derive(Default)]
pub struct InMemoryIdentityStore {
    existing: Mutex<Vec<String>>,
    operations: Mutex<Vec<String>>,
    fail_create: Option<String>,
    panic_create: Option<String>,
    fail_remove: HashSet<String>,
}

impl InMemoryIdentityStore {
    pub fn with_existing(names: &[&str]) -> Self {
        Self {
            existing: Mutex::new(names.iter().map(|n| (*n).to_owned()).collect()),
            ..Self::default()
        }
    }

    pub fn failing_create(name: &str) -> Self {
        Self {
            fail_create: Some(name.to_owned()),
            ..Self::default()
        }
    }

    /// Panics while creating `name`, after `existing` names are in place.
    pub fn panicking_create(name: &str, existing: &[&str]) -> Self {
        Self {
            panic_create: Some(name.to_owned()),
            ..Self::with_existing(existing)
        }
    }

    pub fn failing_remove(name: &str) -> Self {
        Self {
            fail_remove: HashSet::from([name.to_owned()]),
            ..Self::default()
        }
    }

    pub fn existing(&self) -> Vec<String> {
        self.existing.lock().clone()
    }

    pub fn operations(&self) -> Vec<String> {
        self.operations.lock().clone()
    }
}

#[async_trait]
impl IdentityStoreClient for InMemoryIdentityStore {
    async fn create_identity(&self, identity: &Identity) -> Result<(), CommandError> {
        self.operations
            .lock()
            .push(format!("create:{}", identity.name()));
        if self.panic_create.as_deref() == Some(identity.name()) {
            panic!("identity store crashed creating {}", identity.name());
        }
        if self.fail_create.as_deref() == Some(identity.name()) {
            return Err(CommandError::NonZeroExit {
                program: "iadmin".to_owned(),
                status: 3,
                output: "CAT_INVALID_USER".to_owned(),
            });
        }
        self.existing.lock().push(identity.name().to_owned());
        Ok(())
    }

    async fn remove_identity(&self, identity: &Identity) -> Result<RemovalOutcome, CommandError> {
        self.operations
            .lock()
            .push(format!("remove:{}", identity.name()));
        if self.fail_remove.contains(identity.name()) {
            return Err(CommandError::NonZeroExit {
                program: "iadmin".to_owned(),
                status: 4,
                output: "SYS_INTERNAL_ERR".to_owned(),
            });
        }
        let mut existing = self.existing.lock();
        match existing.iter().position(|n| n == identity.name()) {
            Some(idx) => {
                existing.remove(idx);
                Ok(RemovalOutcome::Removed)
            }
            None => Ok(RemovalOutcome::AlreadyAbsent),
        }
    }

    async fn identity_exists(&self, identity: &Identity) -> Result<bool, CommandError> {
        Ok(self.existing.lock().iter().any(|n| n == identity.name()))
    }
}

/// Package manager that records installs and answers with a fixed status.
pub struct FakePackageManager {
    status: i32,
    output: String,
    installs: Mutex<Vec<Vec<PathBuf>>>,
}

impl FakePackageManager {
    pub fn succeeding() -> Self {
        Self::exiting(0, "")
    }

    pub fn exiting(status: i32, output: &str) -> Self {
        Self {
            status,
            output: output.to_owned(),
            installs: Mutex::new(Vec::new()),
        }
    }

    pub fn installs(&self) -> Vec<Vec<PathBuf>> {
        self.installs.lock().clone()
    }
}

#[async_trait]
impl PackageManagerClient for FakePackageManager {
    async fn install(&self, artifacts: &[PathBuf]) -> Result<CommandOutput, CommandError> {
        self.installs.lock().push(artifacts.to_vec());
        Ok(CommandOutput {
            status: self.status,
            output: self.output.clone().into_bytes(),
        })
    }
}

/// OS provider returning a fixed descriptor.
pub struct FixedOs(pub Option<OsDescriptor>);

impl FixedOs {
    pub fn ubuntu() -> Self {
        Self(Some(OsDescriptor {
            id: "ubuntu".to_owned(),
            version_id: "22.04".to_owned(),
            platform_dir: "Ubuntu_22".to_owned(),
            package_suffix: PackageSuffix::Deb,
        }))
    }

    pub fn unsupported() -> Self {
        Self(None)
    }
}

#[async_trait]
impl OsDescriptorProvider for FixedOs {
    async fn describe(&self) -> Result<OsDescriptor, CommandError> {
        self.0
            .clone()
            .ok_or_else(|| CommandError::UnsupportedPlatform("plan9".to_owned()))
    }
}
