//! Plugin installation and identity lifecycle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, warn};

use auth_conformance_sdk::{
    HarnessError, Identity, IdentityGraph, IdentityStoreClient, OsDescriptor,
    PackageManagerClient, RemovalFailure, RemovalOutcome,
};

use super::DomainError;
use super::installer::select_artifacts;
use crate::config::{ConformanceConfig, IdentitiesConfig};

/// What teardown did with each identity.
#[derive(Debug, Default, Clone)]
pub struct TeardownReport {
    pub removed: Vec<String>,
    pub already_absent: Vec<String>,
    pub failures: Vec<RemovalFailure>,
}

impl TeardownReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// # Errors
    ///
    /// Returns `TeardownPartialFailure` listing every identity left behind.
    pub fn into_result(self) -> Result<(), HarnessError> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::TeardownPartialFailure {
                failures: self.failures,
            })
        }
    }
}

/// Installs the plugin and manages the identity graph of a run.
pub struct Provisioner {
    store: Arc<dyn IdentityStoreClient>,
    packages: Arc<dyn PackageManagerClient>,
    package_name: String,
    plan: IdentityGraph,
}

impl Provisioner {
    /// # Errors
    ///
    /// Returns `DomainError::InvalidGraph` if the configured identities do not
    /// form a valid graph.
    pub fn new(
        store: Arc<dyn IdentityStoreClient>,
        packages: Arc<dyn PackageManagerClient>,
        cfg: &ConformanceConfig,
    ) -> Result<Self, DomainError> {
        let plan = identity_plan(&cfg.identities);
        plan.validate()?;

        Ok(Self {
            store,
            packages,
            package_name: cfg.plugin.package_name.clone(),
            plan,
        })
    }

    /// Installs the plugin artifacts built for `os`.
    ///
    /// Mutates system-wide package state; nothing here is undone by teardown.
    ///
    /// # Errors
    ///
    /// - `PackageNotFound` if no artifact matches; nothing is installed
    /// - `InstallationFailed` if the package manager failed
    #[tracing::instrument(skip_all, fields(package = %self.package_name, platform = %os.platform_dir))]
    pub async fn install_plugin(
        &self,
        packages_root: &Path,
        os: &OsDescriptor,
    ) -> Result<Vec<PathBuf>, HarnessError> {
        let artifacts = select_artifacts(packages_root, &self.package_name, os)?;
        info!(count = artifacts.len(), "Installing plugin packages");

        let output = self
            .packages
            .install(&artifacts)
            .await
            .map_err(|e| HarnessError::InstallationFailed {
                status: None,
                message: e.to_string(),
            })?;

        if !output.success() {
            error!(status = output.status, "Package manager reported failure");
            return Err(HarnessError::InstallationFailed {
                status: Some(output.status),
                message: output.output_lossy().trim().to_owned(),
            });
        }

        info!("Plugin packages installed");
        Ok(artifacts)
    }

    /// Creates administrator, internal user, then the mapped external user.
    ///
    /// Every identity this run is responsible for is recorded in `created`,
    /// including one whose creation started but failed halfway. An identity
    /// that already exists is never recorded: teardown must not remove what
    /// the run did not create. `created` is therefore complete even if this
    /// future is dropped or panics.
    ///
    /// # Errors
    ///
    /// Returns `IdentityCreationFailed` when an identity already exists, its
    /// existence cannot be checked, or its creation fails.
    #[tracing::instrument(skip_all)]
    pub async fn setup(&self, created: &mut IdentityGraph) -> Result<(), HarnessError> {
        for identity in self.plan.iter() {
            match self.store.identity_exists(identity).await {
                Ok(false) => {}
                Ok(true) => {
                    error!(
                        identity = identity.name(),
                        role = %identity.role(),
                        "Identity exists before setup; leaving it untouched"
                    );
                    return Err(creation_failed(identity, "already exists before setup"));
                }
                Err(e) => {
                    error!(identity = identity.name(), error = %e, "Existence check failed");
                    return Err(creation_failed(
                        identity,
                        format!("cannot check for an existing identity: {e}"),
                    ));
                }
            }

            // Recorded before creation so a half-created identity is still torn down.
            created.record(identity.clone());

            if let Err(e) = self.store.create_identity(identity).await {
                error!(
                    identity = identity.name(),
                    role = %identity.role(),
                    error = %e,
                    "Identity creation failed"
                );
                return Err(creation_failed(identity, e.to_string()));
            }

            info!(identity = identity.name(), role = %identity.role(), "Created identity");
        }

        Ok(())
    }

    /// Removes every identity of `graph` in reverse creation order.
    ///
    /// Each removal is attempted regardless of earlier failures.
    #[tracing::instrument(skip_all, fields(identities = graph.len()))]
    pub async fn teardown(&self, graph: &IdentityGraph) -> TeardownReport {
        let mut report = TeardownReport::default();

        for identity in graph.teardown_order() {
            match self.store.remove_identity(identity).await {
                Ok(RemovalOutcome::Removed) => {
                    info!(identity = identity.name(), "Removed identity");
                    report.removed.push(identity.name().to_owned());
                }
                Ok(RemovalOutcome::AlreadyAbsent) => {
                    info!(identity = identity.name(), "Identity already absent");
                    report.already_absent.push(identity.name().to_owned());
                }
                Err(e) => {
                    warn!(identity = identity.name(), error = %e, "Identity removal failed");
                    report.failures.push(RemovalFailure {
                        name: identity.name().to_owned(),
                        role: identity.role(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        report
    }
}

fn creation_failed(identity: &Identity, reason: impl Into<String>) -> HarnessError {
    HarnessError::IdentityCreationFailed {
        name: identity.name().to_owned(),
        role: identity.role(),
        reason: reason.into(),
    }
}

fn identity_plan(cfg: &IdentitiesConfig) -> IdentityGraph {
    let mut plan = IdentityGraph::new();
    plan.record(Identity::administrator(
        cfg.administrator.name.clone(),
        cfg.administrator.credential.clone(),
    ));
    plan.record(Identity::internal_user(
        cfg.internal_user.name.clone(),
        cfg.internal_user.credential.clone(),
    ));
    plan.record(Identity::external_user(
        cfg.external_user.name.clone(),
        cfg.external_user.credential.clone(),
        cfg.internal_user.name.clone(),
    ));
    plan
}
