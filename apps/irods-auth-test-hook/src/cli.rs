//! Command line of the test hook.
//!
//! Flag names match the CI hook interface the iRODS build infrastructure
//! already calls, underscores included.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};

use auth_conformance_sdk::TestSelection;

#[derive(Debug, Clone, Parser)]
#[command(name = "irods-auth-test-hook")]
#[command(about = "Install an iRODS authentication plugin and run its conformance tests", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Copy the service account's log directory here after the run
    #[arg(long = "output_root_directory", value_name = "DIR")]
    pub output_root_directory: Option<PathBuf>,

    /// Root of the built plugin packages (one subdirectory per platform)
    #[arg(long = "built_packages_root_directory", value_name = "DIR")]
    pub built_packages_root_directory: Option<PathBuf>,

    #[arg(
        long,
        value_name = "dotted name",
        help = "Test selection to run [default: test_auth_plugin_project_template_cpp]"
    )]
    pub test: Option<TestSelection>,

    /// Skip plugin installation and identity provisioning
    #[arg(long = "skip-setup", action = ArgAction::SetFalse)]
    pub do_setup: bool,

    /// YAML configuration file
    #[arg(short, long, env = "IRODS_AUTH_HOOK_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Abort the test selection after this long, e.g. `45m`
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,
}

impl Cli {
    /// Selection to run, falling back to the plugin's default suite.
    #[must_use]
    pub fn selection(&self) -> TestSelection {
        self.test.clone().unwrap_or_default()
    }
}
