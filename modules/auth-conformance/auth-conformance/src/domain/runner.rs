//! Conformance runner: executes a test selection as the run-as principal.
//!
//! The child's exit status comes from `wait()` and nothing else; its output is
//! captured by an [`OutputTee`]. A failed log write therefore never changes
//! the reported status, and the status never turns into a pipe status.
//! The test runs in its own process group, which an abort stops as a whole.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use auth_conformance_sdk::{
    ExecutionResult, HarnessError, IdentityGraph, RunAs, SelectionExecutor, TestSelection,
};

use super::DomainError;
use super::capture::OutputTee;
use crate::config::ConformanceConfig;

pub const ENV_ADMIN_USER: &str = "AUTH_CONFORMANCE_ADMIN_USER";
pub const ENV_INTERNAL_USER: &str = "AUTH_CONFORMANCE_INTERNAL_USER";
pub const ENV_EXTERNAL_USER: &str = "AUTH_CONFORMANCE_EXTERNAL_USER";

/// Runs the configured test command with the selection appended.
#[derive(Debug, Clone)]
pub struct Runner {
    test_command: Vec<String>,
    working_dir: PathBuf,
    log_path: PathBuf,
    echo_output: bool,
    timeout: Option<Duration>,
    drain_grace: Duration,
    kill_grace: Duration,
}

enum Ended {
    Exited(std::io::Result<ExitStatus>),
    Aborted(String),
}

impl Runner {
    /// # Errors
    ///
    /// Returns `DomainError::InvalidConfig` if the test command is empty or a
    /// duration does not parse.
    pub fn from_config(cfg: &ConformanceConfig) -> Result<Self, DomainError> {
        if cfg.runner.test_command.is_empty() {
            return Err(DomainError::invalid_config(
                "runner.test_command",
                "must name a program",
            ));
        }

        Ok(Self {
            test_command: cfg.runner.test_command.clone(),
            working_dir: cfg
                .runner
                .working_dir
                .clone()
                .unwrap_or_else(|| cfg.service.home.clone()),
            log_path: cfg.log_file_path(),
            echo_output: cfg.runner.echo_output,
            timeout: cfg.runner.timeout()?,
            drain_grace: cfg.runner.drain_grace()?,
            kill_grace: cfg.runner.kill_grace()?,
        })
    }

    /// Overrides the configured time limit.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn build_command(
        &self,
        selection: &TestSelection,
        run_as: &RunAs,
        env: &[(&'static str, String)],
    ) -> Result<Command, HarnessError> {
        let Some((program, args)) = self.test_command.split_first() else {
            return Err(launch_failed(run_as.principal(), "empty test command"));
        };

        let command = match run_as {
            RunAs::CurrentUser => {
                let mut cmd = Command::new(program);
                cmd.args(args)
                    .arg(selection.as_str())
                    .envs(env.iter().map(|(k, v)| (*k, v.as_str())))
                    .current_dir(&self.working_dir);
                cmd
            }
            RunAs::ServiceAccount { user } => {
                // Login shell of the service account; it starts in the account's home.
                let mut cmd = Command::new("sudo");
                cmd.args(["-u", user.as_str(), "-i", "--", "env"])
                    .args(env.iter().map(|(k, v)| format!("{k}={v}")))
                    .arg(program)
                    .args(args)
                    .arg(selection.as_str());
                cmd
            }
        };
        Ok(command)
    }
}

#[async_trait]
impl SelectionExecutor for Runner {
    #[tracing::instrument(skip_all, fields(selection = %selection, principal = run_as.principal()))]
    async fn execute(
        &self,
        selection: &TestSelection,
        run_as: &RunAs,
        graph: &IdentityGraph,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, HarnessError> {
        if cancel.is_cancelled() {
            warn!("Run cancelled before the test selection started");
            return Err(HarnessError::ExecutionAborted {
                selection: selection.to_string(),
                reason: "cancelled before launch".to_owned(),
                partial_output: Vec::new(),
            });
        }

        if let RunAs::ServiceAccount { user } = run_as {
            verify_principal(user).await?;
        }

        let mut command = self.build_command(selection, run_as, &identity_env(graph))?;
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so an abort reaches everything the test starts.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| {
            launch_failed(run_as.principal(), format!("cannot start test command: {e}"))
        })?;
        let group = child.id();
        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            if let Err(e) = child.start_kill() {
                warn!(error = %e, "Failed to kill test process");
            }
            return Err(launch_failed(run_as.principal(), "test output pipes unavailable"));
        };
        let tee = OutputTee::spawn(stdout, stderr, &self.log_path, self.echo_output);
        info!(log = %self.log_path.display(), "Test selection started");

        let time_limit = self.timeout;
        let deadline = async move {
            if let Some(limit) = time_limit {
                tokio::time::sleep(limit).await;
                limit
            } else {
                std::future::pending().await
            }
        };

        let ended = tokio::select! {
            status = child.wait() => Ended::Exited(status),
            () = cancel.cancelled() => Ended::Aborted("cancelled".to_owned()),
            limit = deadline => Ended::Aborted(format!(
                "timed out after {}",
                humantime::format_duration(limit)
            )),
        };

        let status = match ended {
            Ended::Exited(Ok(status)) => status,
            Ended::Exited(Err(e)) => {
                let reason = format!("waiting for test process failed: {e}");
                warn!(reason = %reason, "Stopping test selection");
                terminate(&mut child, group, self.kill_grace).await;
                return Err(aborted(tee, selection, reason).await);
            }
            Ended::Aborted(reason) => {
                warn!(reason = %reason, "Stopping test selection");
                terminate(&mut child, group, self.kill_grace).await;
                return Err(aborted(tee, selection, reason).await);
            }
        };

        let captured = tee.finish(self.drain_grace).await;
        let result = ExecutionResult {
            exit_status: exit_code(status),
            combined_output: captured.bytes,
            log_path: captured.log_path,
            capture_error: captured.capture_error,
        };

        if result.passed() {
            info!(bytes = result.combined_output.len(), "Test selection passed");
            Ok(result)
        } else {
            warn!(status = result.exit_status, "Test selection failed");
            Err(HarnessError::SelectionFailed {
                selection: selection.to_string(),
                result: Box::new(result),
            })
        }
    }
}

/// Identity names exported to the test command. Credentials are never exported.
fn identity_env(graph: &IdentityGraph) -> Vec<(&'static str, String)> {
    [
        (ENV_ADMIN_USER, graph.administrator()),
        (ENV_INTERNAL_USER, graph.internal_user()),
        (ENV_EXTERNAL_USER, graph.external_user()),
    ]
    .into_iter()
    .filter_map(|(key, identity)| identity.map(|i| (key, i.name().to_owned())))
    .collect()
}

/// Collects whatever the stopped test printed so far.
async fn aborted(tee: OutputTee, selection: &TestSelection, reason: String) -> HarnessError {
    let captured = tee.abort().await;

    HarnessError::ExecutionAborted {
        selection: selection.to_string(),
        reason,
        partial_output: captured.bytes,
    }
}

/// Stops the test's process group: SIGTERM, then SIGKILL once `grace` runs out.
///
/// The group is killed even when the direct child exits on SIGTERM, so no
/// background process of the test outlives the run.
#[cfg(unix)]
async fn terminate(child: &mut Child, group: Option<u32>, grace: Duration) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(group) = group.and_then(|id| i32::try_from(id).ok()).map(Pid::from_raw) else {
        kill_child(child).await;
        return;
    };

    if let Err(e) = killpg(group, Signal::SIGTERM) {
        warn!(error = %e, "Failed to send SIGTERM to the test process group");
    }
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => warn!(error = %e, "Failed to reap test process"),
        Err(_) => warn!(
            grace = %humantime::format_duration(grace),
            "Test process ignored SIGTERM; killing it"
        ),
    }

    match killpg(group, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!(error = %e, "Failed to send SIGKILL to the test process group"),
    }
    kill_child(child).await;
}

#[cfg(not(unix))]
async fn terminate(child: &mut Child, _group: Option<u32>, _grace: Duration) {
    kill_child(child).await;
}

async fn kill_child(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "Test process already gone");
    }
    if let Err(e) = child.wait().await {
        warn!(error = %e, "Failed to reap test process");
    }
}

async fn verify_principal(user: &str) -> Result<(), HarnessError> {
    let output = Command::new("id")
        .arg("-u")
        .arg(user)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| launch_failed(user, format!("cannot run 'id': {e}")))?;

    if output.status.success() {
        Ok(())
    } else {
        let detail = String::from_utf8_lossy(&output.stderr);
        Err(launch_failed(
            user,
            format!("principal does not exist: {}", detail.trim()),
        ))
    }
}

fn launch_failed(principal: &str, reason: impl Into<String>) -> HarnessError {
    HarnessError::ProcessLaunchFailed {
        principal: principal.to_owned(),
        reason: reason.into(),
    }
}

/// Shell convention: a signal-terminated process reports `128 + signal`.
fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    status.code().unwrap_or(1)
}
