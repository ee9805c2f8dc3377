//! Plugin artifact selection.

use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;

use auth_conformance_sdk::{HarnessError, OsDescriptor, PackageSuffix};

/// File-name pattern plugin artifacts must match on a platform.
#[must_use]
pub fn artifact_pattern(package_name: &str, suffix: PackageSuffix) -> String {
    format!("{}*.{suffix}", Pattern::escape(package_name))
}

/// Finds the plugin artifacts for `os` under `packages_root`.
///
/// Artifacts live in the platform subdirectory (`<packages_root>/<platform_dir>`)
/// and are matched on file name only. The result is sorted.
///
/// # Errors
///
/// Returns `PackageNotFound` if the directory is missing or holds no matching file.
pub fn select_artifacts(
    packages_root: &Path,
    package_name: &str,
    os: &OsDescriptor,
) -> Result<Vec<PathBuf>, HarnessError> {
    let directory = packages_root.join(&os.platform_dir);
    let pattern_str = artifact_pattern(package_name, os.package_suffix);
    let not_found = || HarnessError::PackageNotFound {
        directory: directory.clone(),
        pattern: pattern_str.clone(),
    };

    let pattern = Pattern::new(&pattern_str).map_err(|e| {
        tracing::error!(pattern = %pattern_str, error = %e, "Invalid artifact pattern");
        not_found()
    })?;

    let entries = fs::read_dir(&directory).map_err(|e| {
        tracing::warn!(directory = %directory.display(), error = %e, "Cannot read package directory");
        not_found()
    })?;

    let mut artifacts: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .is_some_and(|name| pattern.matches(&name.to_string_lossy()))
        })
        .collect();

    if artifacts.is_empty() {
        return Err(not_found());
    }

    artifacts.sort();
    Ok(artifacts)
}
