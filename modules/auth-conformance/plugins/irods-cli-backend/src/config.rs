//! Configuration for the iRODS command-line backend.

use std::path::PathBuf;

use serde::Deserialize;

/// Backend configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IrodsCliBackendConfig {
    /// OS user whose iRODS environment `iadmin` runs in; `None` runs it as the
    /// invoking user.
    pub iadmin_user: Option<String>,

    /// `iadmin` executable.
    pub iadmin_program: String,

    /// Run the package manager through `sudo`.
    pub sudo_for_packages: bool,

    /// Source of the OS descriptor.
    pub os_release_path: PathBuf,
}

impl Default for IrodsCliBackendConfig {
    fn default() -> Self {
        Self {
            iadmin_user: Some("irods".to_owned()),
            iadmin_program: "iadmin".to_owned(),
            sudo_for_packages: true,
            os_release_path: PathBuf::from("/etc/os-release"),
        }
    }
}
