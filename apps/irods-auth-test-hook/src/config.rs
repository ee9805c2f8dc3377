//! Layered configuration of the test hook.
//!
//! Defaults, then the YAML file given with `--config`, then environment
//! variables prefixed with `IRODS_AUTH_HOOK__` (`__` separates nesting
//! levels, e.g. `IRODS_AUTH_HOOK__HARNESS__RUNNER__TIMEOUT=45m`).

use std::path::Path;

use anyhow::{Context, ensure};
use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use serde::Deserialize;

use auth_conformance::ConformanceConfig;
use irods_cli_backend::IrodsCliBackendConfig;

pub const ENV_PREFIX: &str = "IRODS_AUTH_HOOK__";

/// Complete hook configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct HookConfig {
    /// Service account, identities and runner settings.
    pub harness: ConformanceConfig,

    /// How the iRODS and OS commands are run.
    pub backend: IrodsCliBackendConfig,

    pub logging: LoggingConfig,
}

/// Log output of the hook itself. Test output goes to stdout; logs go to stderr.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            json: false,
        }
    }
}

impl HookConfig {
    /// Loads and validates the configuration.
    ///
    /// # Errors
    ///
    /// Fails if `path` does not exist, a value does not deserialize, or the
    /// harness settings are invalid.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            ensure!(path.is_file(), "config file {} not found", path.display());
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Self = figment
            .extract()
            .context("failed to load hook configuration")?;
        config
            .harness
            .validate()
            .context("invalid harness configuration")?;
        Ok(config)
    }
}
