//! One hook invocation: provision, run the selection, tear down, gather logs.

use std::sync::Arc;

use anyhow::bail;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use auth_conformance::domain::{EXIT_CONFIG, Lifecycle, Provisioner, RunOptions, RunReport, Runner};
use auth_conformance_sdk::HarnessError;
use irods_cli_backend::IrodsCliBackend;

use crate::cli::Cli;
use crate::config::HookConfig;
use crate::gather::gather_logs;

/// Runs the hook and returns the process exit code.
///
/// The code is the selection's own status whenever the selection ran;
/// see [`auth_conformance::domain::exit_code_for`] for the other outcomes.
pub async fn run_hook(cli: &Cli, config: &HookConfig, cancel: &CancellationToken) -> i32 {
    let lifecycle = match build_lifecycle(cli, config) {
        Ok(lifecycle) => lifecycle,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Cannot start the run");
            return EXIT_CONFIG;
        }
    };

    let options = RunOptions {
        selection: cli.selection(),
        run_as: config.harness.run_as(),
        do_setup: cli.do_setup,
        packages_root: cli.built_packages_root_directory.clone(),
    };
    let report = lifecycle.run(&options, cancel).await;
    log_outcome(&report);

    if let Some(output_root) = &cli.output_root_directory
        && let Err(e) = gather_logs(&config.harness.log_dir_path(), output_root)
    {
        warn!(error = %format!("{e:#}"), "Log gathering failed");
    }

    report.exit_code()
}

fn build_lifecycle(cli: &Cli, config: &HookConfig) -> anyhow::Result<Lifecycle> {
    if cli.do_setup && cli.built_packages_root_directory.is_none() {
        bail!("--built_packages_root_directory is required unless --skip-setup is given");
    }

    let harness = &config.harness;
    harness.validate()?;

    let backend = IrodsCliBackend::from_config(&config.backend);
    let provisioner = Provisioner::new(backend.identity_store(), backend.package_manager(), harness)?;
    let mut runner = Runner::from_config(harness)?;
    if let Some(limit) = cli.timeout {
        runner = runner.with_timeout(Some(limit));
    }

    Ok(Lifecycle::new(
        Arc::new(provisioner),
        Arc::new(runner),
        backend.os_provider(),
    ))
}

fn log_outcome(report: &RunReport) {
    match &report.outcome {
        Ok(result) => info!(
            status = result.exit_status,
            log = ?result.log_path,
            "Test selection passed"
        ),
        Err(HarnessError::SelectionFailed { selection, result }) => warn!(
            selection = %selection,
            status = result.exit_status,
            log = ?result.log_path,
            "Test selection failed"
        ),
        Err(e) => error!(error = %e, "Run did not produce a verdict"),
    }

    if let Some(capture_error) = report
        .execution_result()
        .and_then(|r| r.capture_error.as_deref())
    {
        warn!(error = capture_error, "Test output was not fully persisted");
    }
    if !report.teardown.is_clean() {
        for failure in &report.teardown.failures {
            warn!(
                identity = %failure.name,
                role = %failure.role,
                reason = %failure.reason,
                "Identity left behind; remove it manually"
            );
        }
    }
}
