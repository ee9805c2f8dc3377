//! OS descriptor from `os-release(5)`.

use std::collections::HashMap;
use std::hash::BuildHasher;
use std::path::PathBuf;

use async_trait::async_trait;

use auth_conformance_sdk::{CommandError, OsDescriptor, OsDescriptorProvider, PackageSuffix};

const DEB_FAMILY: &[&str] = &["debian", "ubuntu"];
const RPM_FAMILY: &[&str] = &[
    "rhel", "centos", "fedora", "almalinux", "rocky", "suse", "opensuse",
];

/// Reads and classifies an `os-release` file.
#[derive(Debug, Clone)]
pub struct OsReleaseProvider {
    path: PathBuf,
}

impl OsReleaseProvider {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl OsDescriptorProvider for OsReleaseProvider {
    async fn describe(&self) -> Result<OsDescriptor, CommandError> {
        let contents = tokio::fs::read_to_string(&self.path).await?;
        let descriptor = describe_os(&parse_os_release(&contents))?;
        tracing::info!(
            id = %descriptor.id,
            version = %descriptor.version_id,
            platform_dir = %descriptor.platform_dir,
            suffix = %descriptor.package_suffix,
            "Detected platform"
        );
        Ok(descriptor)
    }
}

/// `KEY=value` pairs, with shell quoting removed.
#[must_use]
pub fn parse_os_release(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim();
            let unquoted = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            (key.trim().to_owned(), unquoted.to_owned())
        })
        .collect()
}

/// Classifies parsed `os-release` fields.
///
/// The platform directory is the first word of `NAME` and the major part of
/// `VERSION_ID`, e.g. `Ubuntu_22` or `AlmaLinux_9`.
///
/// # Errors
///
/// Returns `UnsupportedPlatform` if a required field is missing or the
/// distribution is neither deb- nor rpm-based.
pub fn describe_os<S: BuildHasher>(
    fields: &HashMap<String, String, S>,
) -> Result<OsDescriptor, CommandError> {
    let field = |key: &str| {
        fields
            .get(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CommandError::UnsupportedPlatform(format!("os-release has no {key}")))
    };

    let id = field("ID")?.to_lowercase();
    let version_id = field("VERSION_ID")?.clone();
    let name = field("NAME")?;

    let mut family = vec![id.clone()];
    if let Some(like) = fields.get("ID_LIKE") {
        family.extend(like.split_whitespace().map(str::to_lowercase));
    }
    let in_family = |members: &[&str]| family.iter().any(|f| members.contains(&f.as_str()));
    let package_suffix = if in_family(DEB_FAMILY) {
        PackageSuffix::Deb
    } else if in_family(RPM_FAMILY) {
        PackageSuffix::Rpm
    } else {
        return Err(CommandError::UnsupportedPlatform(format!(
            "{id} is neither deb- nor rpm-based"
        )));
    };

    let distro = name.split_whitespace().next().unwrap_or(name.as_str());
    let major = version_id.split('.').next().unwrap_or(version_id.as_str());

    let platform_dir = format!("{distro}_{major}");

    Ok(OsDescriptor {
        id,
        version_id,
        platform_dir,
        package_suffix,
    })
}
