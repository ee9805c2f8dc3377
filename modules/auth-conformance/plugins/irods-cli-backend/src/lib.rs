#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! iRODS Command-Line Backend
//!
//! Implements the auth conformance collaborator traits on a real iRODS host:
//!
//! - identities through `iadmin`, run in the service account's environment
//! - plugin packages through `apt-get` or `dnf`
//! - the platform from `/etc/os-release`
//!
//! ## Configuration
//!
//! ```yaml
//! backend:
//!   iadmin_user: irods
//!   iadmin_program: iadmin
//!   sudo_for_packages: true
//!   os_release_path: /etc/os-release
//! ```

use std::sync::Arc;

use auth_conformance_sdk::{IdentityStoreClient, OsDescriptorProvider, PackageManagerClient};

pub mod config;
pub mod domain;

pub use config::IrodsCliBackendConfig;
pub use domain::{
    IadminIdentityStore, NativePackageManager, OsReleaseProvider, Privilege,
    ProcessCommandExecutor,
};

/// The backend's three collaborators, wired from one configuration.
#[derive(Clone)]
pub struct IrodsCliBackend {
    identity_store: Arc<IadminIdentityStore>,
    package_manager: Arc<NativePackageManager>,
    os_provider: Arc<OsReleaseProvider>,
}

impl IrodsCliBackend {
    #[must_use]
    pub fn from_config(cfg: &IrodsCliBackendConfig) -> Self {
        let admin_privilege = cfg
            .iadmin_user
            .clone()
            .map_or(Privilege::Inherit, Privilege::User);
        let package_privilege = if cfg.sudo_for_packages {
            Privilege::Root
        } else {
            Privilege::Inherit
        };

        Self {
            identity_store: Arc::new(IadminIdentityStore::new(
                Arc::new(ProcessCommandExecutor::new(admin_privilege)),
                cfg.iadmin_program.clone(),
            )),
            package_manager: Arc::new(NativePackageManager::new(Arc::new(
                ProcessCommandExecutor::new(package_privilege),
            ))),
            os_provider: Arc::new(OsReleaseProvider::new(cfg.os_release_path.clone())),
        }
    }

    #[must_use]
    pub fn identity_store(&self) -> Arc<dyn IdentityStoreClient> {
        self.identity_store.clone()
    }

    #[must_use]
    pub fn package_manager(&self) -> Arc<dyn PackageManagerClient> {
        self.package_manager.clone()
    }

    #[must_use]
    pub fn os_provider(&self) -> Arc<dyn OsDescriptorProvider> {
        self.os_provider.clone()
    }
}
