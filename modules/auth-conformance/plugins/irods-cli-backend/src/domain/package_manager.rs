//! Native package installation (`apt-get` / `dnf`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use auth_conformance_sdk::{
    CommandError, CommandExecutor, CommandOutput, PackageManagerClient, PackageSuffix,
};

/// Installs local package files with the platform's package manager.
///
/// The manager is inferred from the artifacts' extension; a mix of `.deb`
/// and `.rpm` files is rejected.
pub struct NativePackageManager {
    executor: Arc<dyn CommandExecutor>,
}

impl NativePackageManager {
    #[must_use]
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }
}

fn suffix_of(path: &Path) -> Result<PackageSuffix, CommandError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("deb") => Ok(PackageSuffix::Deb),
        Some("rpm") => Ok(PackageSuffix::Rpm),
        _ => Err(CommandError::InvalidRequest(format!(
            "{} is not a .deb or .rpm package",
            path.display()
        ))),
    }
}

/// Command line installing `artifacts`.
///
/// # Errors
///
/// Returns `InvalidRequest` for an empty list, an unknown extension, or mixed formats.
pub fn install_command(artifacts: &[PathBuf]) -> Result<Vec<String>, CommandError> {
    let (first, rest) = artifacts
        .split_first()
        .ok_or_else(|| CommandError::InvalidRequest("no packages to install".to_owned()))?;

    let suffix = suffix_of(first)?;
    for path in rest {
        if suffix_of(path)? != suffix {
            return Err(CommandError::InvalidRequest(
                "cannot install .deb and .rpm packages together".to_owned(),
            ));
        }
    }

    let base: &[&str] = match suffix {
        PackageSuffix::Deb => &[
            "env",
            "DEBIAN_FRONTEND=noninteractive",
            "apt-get",
            "install",
            "-y",
            "--allow-downgrades",
        ],
        PackageSuffix::Rpm => &["dnf", "install", "-y"],
    };

    Ok(base
        .iter()
        .map(|s| (*s).to_owned())
        .chain(artifacts.iter().map(|p| p.display().to_string()))
        .collect())
}

#[async_trait]
impl PackageManagerClient for NativePackageManager {
    async fn install(&self, artifacts: &[PathBuf]) -> Result<CommandOutput, CommandError> {
        let argv = install_command(artifacts)?;
        tracing::info!(count = artifacts.len(), "Installing packages");
        self.executor.run(&argv).await
    }
}
