//! Configuration for the conformance harness.
//!
//! Defaults reproduce the iRODS CI test hook: service account `irods` homed
//! at `/var/lib/irods`, combined output in `log/test_output.log`, and the
//! `otherrods` / `my_auth_user` identities used by the plugin test suite.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use auth_conformance_sdk::RunAs;

use crate::domain::DomainError;

/// Harness configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ConformanceConfig {
    /// Service account that owns the system under test.
    pub service: ServiceAccountConfig,

    /// Plugin package naming.
    pub plugin: PluginPackageConfig,

    /// Identities provisioned before the tests run.
    pub identities: IdentitiesConfig,

    /// How the test selection is executed.
    pub runner: RunnerConfig,
}

impl ConformanceConfig {
    /// Absolute path of the combined-output log file.
    #[must_use]
    pub fn log_file_path(&self) -> PathBuf {
        self.service.home.join(&self.runner.log_file)
    }

    /// Absolute path of the directory gathered after the run.
    #[must_use]
    pub fn log_dir_path(&self) -> PathBuf {
        self.service.home.join(&self.service.log_dir)
    }

    /// Principal the test selection runs as.
    #[must_use]
    pub fn run_as(&self) -> RunAs {
        if self.runner.switch_user {
            RunAs::ServiceAccount {
                user: self.service.user.clone(),
            }
        } else {
            RunAs::CurrentUser
        }
    }

    /// Check the configuration before anything touches the system.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.service.user.trim().is_empty() {
            return Err(DomainError::invalid_config("service.user", "must not be empty"));
        }
        if self.plugin.package_name.trim().is_empty() {
            return Err(DomainError::invalid_config(
                "plugin.package_name",
                "must not be empty",
            ));
        }
        if self.runner.test_command.is_empty() {
            return Err(DomainError::invalid_config(
                "runner.test_command",
                "must name a program",
            ));
        }
        if self.runner.log_file.is_absolute() {
            return Err(DomainError::invalid_config(
                "runner.log_file",
                "must be relative to service.home",
            ));
        }
        self.runner.timeout()?;
        self.runner.drain_grace()?;
        self.runner.kill_grace()?;
        self.identities.validate()
    }
}

/// Service account of the system under test.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceAccountConfig {
    /// OS user the system runs as.
    pub user: String,

    /// Home directory of the service account; relative paths resolve against it.
    pub home: PathBuf,

    /// Log directory gathered into the output root after the run.
    pub log_dir: PathBuf,
}

impl Default for ServiceAccountConfig {
    fn default() -> Self {
        Self {
            user: "irods".to_owned(),
            home: PathBuf::from("/var/lib/irods"),
            log_dir: PathBuf::from("log"),
        }
    }
}

/// Plugin package naming convention.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PluginPackageConfig {
    /// Artifact name prefix; artifacts match `<package_name>*.<suffix>`.
    pub package_name: String,
}

impl Default for PluginPackageConfig {
    fn default() -> Self {
        Self {
            package_name: "irods-auth-plugin-nop".to_owned(),
        }
    }
}

/// The identity graph to provision.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentitiesConfig {
    pub administrator: IdentityConfig,
    /// Internal user the external identity maps to.
    pub internal_user: IdentityConfig,
    /// Externally authenticated identity; its credential is supplied by the caller.
    pub external_user: IdentityConfig,
}

impl Default for IdentitiesConfig {
    fn default() -> Self {
        Self {
            administrator: IdentityConfig::new("otherrods", Some("rods")),
            internal_user: IdentityConfig::new("my_auth_user", None),
            external_user: IdentityConfig::new("my_external_auth_user", Some("my_auth_pass")),
        }
    }
}

impl IdentitiesConfig {
    fn validate(&self) -> Result<(), DomainError> {
        let entries = [
            ("identities.administrator.name", &self.administrator),
            ("identities.internal_user.name", &self.internal_user),
            ("identities.external_user.name", &self.external_user),
        ];
        let mut names = HashSet::new();
        for (field, identity) in entries {
            if identity.name.trim().is_empty() {
                return Err(DomainError::invalid_config(field, "must not be empty"));
            }
            if !names.insert(identity.name.as_str()) {
                return Err(DomainError::invalid_config(
                    field,
                    format!("'{}' is already used by another identity", identity.name),
                ));
            }
        }
        Ok(())
    }
}

/// One identity entry.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    pub name: String,
    /// Password or token; omitted for identities that never authenticate directly.
    pub credential: Option<SecretString>,
}

impl IdentityConfig {
    fn new(name: &str, credential: Option<&str>) -> Self {
        Self {
            name: name.to_owned(),
            credential: credential.map(SecretString::from),
        }
    }
}

/// Test execution settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    /// Test command; the selection is appended as the last argument.
    pub test_command: Vec<String>,

    /// Working directory for the test command when not switching users.
    /// Defaults to `service.home`.
    pub working_dir: Option<PathBuf>,

    /// Combined-output log, relative to `service.home`.
    pub log_file: PathBuf,

    /// Run the tests as the service account (`true`) or as the invoking user.
    pub switch_user: bool,

    /// Echo test output to the harness's stdout while capturing it.
    pub echo_output: bool,

    /// Optional overall time limit, e.g. `45m`.
    pub timeout: Option<String>,

    /// How long to keep draining output after the test process exits.
    pub drain_grace: String,

    /// How long an aborted test gets between SIGTERM and SIGKILL.
    pub kill_grace: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            test_command: ["python3", "scripts/run_tests.py", "--xml_output", "--run_s"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            working_dir: None,
            log_file: PathBuf::from("log/test_output.log"),
            switch_user: true,
            echo_output: true,
            timeout: None,
            drain_grace: "10s".to_owned(),
            kill_grace: "5s".to_owned(),
        }
    }
}

impl RunnerConfig {
    /// Parsed `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidConfig` if the value is not a humantime duration.
    pub fn timeout(&self) -> Result<Option<Duration>, DomainError> {
        self.timeout
            .as_deref()
            .map(|raw| parse_duration("runner.timeout", raw))
            .transpose()
    }

    /// Parsed `drain_grace`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidConfig` if the value is not a humantime duration.
    pub fn drain_grace(&self) -> Result<Duration, DomainError> {
        parse_duration("runner.drain_grace", &self.drain_grace)
    }

    /// Parsed `kill_grace`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidConfig` if the value is not a humantime duration.
    pub fn kill_grace(&self) -> Result<Duration, DomainError> {
        parse_duration("runner.kill_grace", &self.kill_grace)
    }
}

fn parse_duration(field: &str, raw: &str) -> Result<Duration, DomainError> {
    humantime::parse_duration(raw).map_err(|e| DomainError::invalid_config(field, e.to_string()))
}
