//! Run lifecycle: provision, execute, tear down.
//!
//! ```text
//! Idle -> Provisioning -> Executing -> TearingDown -> Completed
//!              |              |             |
//!              +--------------+-----> TearingDown -> Failed
//! ```
//!
//! Teardown runs on every path out of `Provisioning`, including a panic in
//! the executor; the panic is re-raised once the identities are gone.

use std::fmt;
use std::panic::{AssertUnwindSafe, resume_unwind};
use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use auth_conformance_sdk::{
    ExecutionResult, HarnessError, IdentityGraph, OsDescriptorProvider, RunAs,
    SelectionExecutor, TestSelection,
};

use super::DomainError;
use super::provisioner::{Provisioner, TeardownReport};

/// Environment never became ready (`EX_UNAVAILABLE`).
pub const EXIT_PROVISIONING_FAILED: i32 = 69;
/// Outcome the harness has no verdict for (`EX_SOFTWARE`).
pub const EXIT_INTERNAL: i32 = 70;
/// Bad configuration or command line (`EX_CONFIG`).
pub const EXIT_CONFIG: i32 = 78;
pub const EXIT_ABORTED: i32 = 124;
pub const EXIT_LAUNCH_FAILED: i32 = 126;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunState {
    Idle,
    Provisioning,
    Executing,
    TearingDown,
    Completed,
    Failed,
}

impl RunState {
    #[must_use]
    pub fn can_transition_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Provisioning)
                | (Self::Provisioning, Self::Executing | Self::TearingDown)
                | (Self::Executing, Self::TearingDown)
                | (Self::TearingDown, Self::Completed | Self::Failed)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Provisioning => "provisioning",
            Self::Executing => "executing",
            Self::TearingDown => "tearing-down",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Current state plus every state visited, starting at `Idle`.
#[derive(Debug, Clone)]
pub struct StateMachine {
    history: Vec<RunState>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self {
            history: vec![RunState::Idle],
        }
    }
}

impl StateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current(&self) -> RunState {
        self.history.last().copied().unwrap_or(RunState::Idle)
    }

    #[must_use]
    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` and stays put if `next` is not
    /// reachable from the current state.
    pub fn transition(&mut self, next: RunState) -> Result<(), DomainError> {
        let from = self.current();
        if !from.can_transition_to(next) {
            return Err(DomainError::InvalidTransition { from, to: next });
        }
        info!(from = %from, to = %next, "Run state changed");
        self.history.push(next);
        Ok(())
    }

    // Lifecycle paths are fixed; a rejected step is a bug in this module.
    fn enter(&mut self, next: RunState) {
        if let Err(e) = self.transition(next) {
            error!(error = %e, "Rejected run state transition");
            debug_assert!(false, "{e}");
        }
    }
}

/// Inputs of one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub selection: TestSelection,
    pub run_as: RunAs,
    /// Install the plugin and provision identities before executing.
    pub do_setup: bool,
    /// Root of the built plugin packages; installation is skipped when absent.
    pub packages_root: Option<PathBuf>,
}

/// What a run produced.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: Result<ExecutionResult, HarnessError>,
    pub teardown: TeardownReport,
    pub states: Vec<RunState>,
}

impl RunReport {
    #[must_use]
    pub fn final_state(&self) -> RunState {
        self.states.last().copied().unwrap_or(RunState::Idle)
    }

    /// Process exit code for this run. Teardown never influences it.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match &self.outcome {
            Ok(result) => result.exit_status,
            Err(e) => exit_code_for(e),
        }
    }

    /// Captured output, whether the selection passed or failed.
    #[must_use]
    pub fn execution_result(&self) -> Option<&ExecutionResult> {
        match &self.outcome {
            Ok(result) => Some(result),
            Err(e) => e.execution_result(),
        }
    }
}

/// Maps a run error to the process exit code.
///
/// A failed selection keeps its own status even when it collides with one of
/// the `EXIT_*` codes; the outcome, not the number, tells them apart.
#[must_use]
pub fn exit_code_for(err: &HarnessError) -> i32 {
    match err {
        HarnessError::SelectionFailed { result, .. } => result.exit_status,
        HarnessError::PackageNotFound { .. }
        | HarnessError::InstallationFailed { .. }
        | HarnessError::IdentityCreationFailed { .. } => EXIT_PROVISIONING_FAILED,
        HarnessError::ProcessLaunchFailed { .. } => EXIT_LAUNCH_FAILED,
        HarnessError::ExecutionAborted { .. } => EXIT_ABORTED,
        HarnessError::TeardownPartialFailure { .. } => EXIT_INTERNAL,
    }
}

/// Drives one run through the state machine.
pub struct Lifecycle {
    provisioner: Arc<Provisioner>,
    executor: Arc<dyn SelectionExecutor>,
    os_provider: Arc<dyn OsDescriptorProvider>,
}

impl Lifecycle {
    #[must_use]
    pub fn new(
        provisioner: Arc<Provisioner>,
        executor: Arc<dyn SelectionExecutor>,
        os_provider: Arc<dyn OsDescriptorProvider>,
    ) -> Self {
        Self {
            provisioner,
            executor,
            os_provider,
        }
    }

    /// Runs provisioning, the selection, and teardown.
    ///
    /// # Panics
    ///
    /// Re-raises a panic from provisioning or the executor after teardown.
    #[tracing::instrument(skip_all, fields(selection = %options.selection, setup = options.do_setup))]
    pub async fn run(&self, options: &RunOptions, cancel: &CancellationToken) -> RunReport {
        let mut machine = StateMachine::new();
        machine.enter(RunState::Provisioning);

        let mut graph = IdentityGraph::new();
        let provisioned = AssertUnwindSafe(self.provision(options, &mut graph))
            .catch_unwind()
            .await;
        let provisioned = match provisioned {
            Ok(provisioned) => provisioned,
            Err(panic) => {
                error!("Provisioning panicked");
                self.teardown_after_panic(&mut machine, &graph).await;
                resume_unwind(panic);
            }
        };

        let outcome = match provisioned {
            Ok(()) => {
                machine.enter(RunState::Executing);
                let executed = AssertUnwindSafe(self.executor.execute(
                    &options.selection,
                    &options.run_as,
                    &graph,
                    cancel,
                ))
                .catch_unwind()
                .await;
                match executed {
                    Ok(outcome) => outcome,
                    Err(panic) => {
                        error!("Test execution panicked");
                        self.teardown_after_panic(&mut machine, &graph).await;
                        resume_unwind(panic);
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Provisioning failed");
                Err(e)
            }
        };

        machine.enter(RunState::TearingDown);
        let teardown = self.provisioner.teardown(&graph).await;
        warn_leftovers(&teardown);

        let terminal = if outcome.is_ok() {
            RunState::Completed
        } else {
            RunState::Failed
        };
        machine.enter(terminal);

        RunReport {
            outcome,
            teardown,
            states: machine.history().to_vec(),
        }
    }

    /// Installs the plugin and creates identities, recording each into `graph`.
    async fn provision(
        &self,
        options: &RunOptions,
        graph: &mut IdentityGraph,
    ) -> Result<(), HarnessError> {
        if !options.do_setup {
            info!("Setup skipped; no plugin install and no identities");
            return Ok(());
        }

        if let Some(root) = &options.packages_root {
            let os = self.os_provider.describe().await.map_err(|e| {
                HarnessError::InstallationFailed {
                    status: None,
                    message: format!("cannot determine platform: {e}"),
                }
            })?;
            self.provisioner.install_plugin(root, &os).await?;
        } else {
            info!("No package root given; plugin installation skipped");
        }

        self.provisioner.setup(graph).await
    }

    async fn teardown_after_panic(&self, machine: &mut StateMachine, graph: &IdentityGraph) {
        machine.enter(RunState::TearingDown);
        let report = self.provisioner.teardown(graph).await;
        warn_leftovers(&report);
        machine.enter(RunState::Failed);
    }
}

fn warn_leftovers(report: &TeardownReport) {
    if let Err(e) = report.clone().into_result() {
        let left: Vec<&str> = report.failures.iter().map(|f| f.name.as_str()).collect();
        warn!(error = %e, identities = ?left, "Teardown left identities behind");
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tracing_test::traced_test;

    use super::*;
    use crate::config::ConformanceConfig;
    use crate::domain::test_support::{FakePackageManager, FixedOs, InMemoryIdentityStore};

    enum Behavior {
        Pass,
        Fail(i32),
        Abort,
        Panic,
    }

    struct ScriptedExecutor {
        behavior: Behavior,
        seen_graph_sizes: Mutex<Vec<usize>>,
    }

    impl ScriptedExecutor {
        fn new(behavior: Behavior) -> Self {
            Self {
                behavior,
                seen_graph_sizes: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<usize> {
            self.seen_graph_sizes.lock().clone()
        }
    }

    fn result(status: i32, output: &str) -> ExecutionResult {
        ExecutionResult {
            exit_status: status,
            combined_output: output.as_bytes().to_vec(),
            log_path: None,
            capture_error: None,
        }
    }

    #[async_trait]
    impl SelectionExecutor for ScriptedExecutor {
        async fn execute(
            &self,
            selection: &TestSelection,
            _run_as: &RunAs,
            graph: &IdentityGraph,
            _cancel: &CancellationToken,
        ) -> Result<ExecutionResult, HarnessError> {
            self.seen_graph_sizes.lock().push(graph.len());
            match self.behavior {
                Behavior::Pass => Ok(result(0, "test_basic_login OK\n")),
                Behavior::Fail(status) => Err(HarnessError::SelectionFailed {
                    selection: selection.to_string(),
                    result: Box::new(result(status, "AUTH_FAILED\n")),
                }),
                Behavior::Abort => Err(HarnessError::ExecutionAborted {
                    selection: selection.to_string(),
                    reason: "cancelled".to_owned(),
                    partial_output: b"partial".to_vec(),
                }),
                Behavior::Panic => panic!("executor exploded"),
            }
        }
    }

    struct Fixture {
        store: Arc<InMemoryIdentityStore>,
        packages: Arc<FakePackageManager>,
        executor: Arc<ScriptedExecutor>,
        lifecycle: Lifecycle,
    }

    fn fixture(store: InMemoryIdentityStore, behavior: Behavior) -> Fixture {
        let store = Arc::new(store);
        let packages = Arc::new(FakePackageManager::succeeding());
        let executor = Arc::new(ScriptedExecutor::new(behavior));
        let provisioner =
            Provisioner::new(store.clone(), packages.clone(), &ConformanceConfig::default())
                .unwrap();
        let lifecycle = Lifecycle::new(
            Arc::new(provisioner),
            executor.clone(),
            Arc::new(FixedOs::ubuntu()),
        );
        Fixture {
            store,
            packages,
            executor,
            lifecycle,
        }
    }

    fn options() -> RunOptions {
        RunOptions {
            selection: TestSelection::new("test_basic_login").unwrap(),
            run_as: RunAs::CurrentUser,
            do_setup: true,
            packages_root: None,
        }
    }

    #[test]
    fn only_lifecycle_edges_are_allowed() {
        use RunState::{Completed, Executing, Failed, Idle, Provisioning, TearingDown};
        let allowed = [
            (Idle, Provisioning),
            (Provisioning, Executing),
            (Provisioning, TearingDown),
            (Executing, TearingDown),
            (TearingDown, Completed),
            (TearingDown, Failed),
        ];
        let all = [Idle, Provisioning, Executing, TearingDown, Completed, Failed];
        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn machine_rejects_skipping_teardown() {
        let mut machine = StateMachine::new();
        machine.transition(RunState::Provisioning).unwrap();
        machine.transition(RunState::Executing).unwrap();

        let err = machine.transition(RunState::Completed).unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidTransition {
                from: RunState::Executing,
                to: RunState::Completed
            }
        ));
        assert_eq!(machine.current(), RunState::Executing);
    }

    #[tokio::test]
    async fn passing_run_completes_and_restores_the_store() {
        let f = fixture(InMemoryIdentityStore::default(), Behavior::Pass);

        let report = f.lifecycle.run(&options(), &CancellationToken::new()).await;

        assert_eq!(report.exit_code(), 0);
        assert_eq!(
            report.states,
            [
                RunState::Idle,
                RunState::Provisioning,
                RunState::Executing,
                RunState::TearingDown,
                RunState::Completed
            ]
        );
        assert_eq!(f.executor.calls(), [3]);
        assert!(f.store.existing().is_empty());
        assert_eq!(report.teardown.removed.len(), 3);
        assert!(f.packages.installs().is_empty());
    }

    #[tokio::test]
    async fn failing_selection_propagates_its_status() {
        let f = fixture(InMemoryIdentityStore::default(), Behavior::Fail(1));

        let report = f.lifecycle.run(&options(), &CancellationToken::new()).await;

        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.final_state(), RunState::Failed);
        assert!(
            report
                .execution_result()
                .unwrap()
                .output_lossy()
                .contains("AUTH_FAILED")
        );
        assert!(f.store.existing().is_empty());
    }

    #[tokio::test]
    async fn provisioning_failure_skips_execution_but_tears_down() {
        let f = fixture(
            InMemoryIdentityStore::failing_create("my_auth_user"),
            Behavior::Pass,
        );

        let report = f.lifecycle.run(&options(), &CancellationToken::new()).await;

        assert_eq!(report.exit_code(), EXIT_PROVISIONING_FAILED);
        assert!(f.executor.calls().is_empty());
        assert_eq!(
            report.states,
            [
                RunState::Idle,
                RunState::Provisioning,
                RunState::TearingDown,
                RunState::Failed
            ]
        );
        assert!(f.store.existing().is_empty());
        assert_eq!(report.teardown.removed, ["otherrods"]);
    }

    #[tokio::test]
    async fn missing_package_fails_before_identities() {
        let f = fixture(InMemoryIdentityStore::default(), Behavior::Pass);
        let packages_root = tempfile::tempdir().unwrap();
        let options = RunOptions {
            packages_root: Some(packages_root.path().to_path_buf()),
            ..options()
        };

        let report = f.lifecycle.run(&options, &CancellationToken::new()).await;

        assert!(matches!(
            report.outcome,
            Err(HarnessError::PackageNotFound { .. })
        ));
        assert_eq!(report.exit_code(), EXIT_PROVISIONING_FAILED);
        assert!(f.packages.installs().is_empty());
        assert!(f.store.operations().is_empty());
    }

    #[tokio::test]
    async fn unsupported_platform_is_installation_failure() {
        let store = Arc::new(InMemoryIdentityStore::default());
        let provisioner = Provisioner::new(
            store.clone(),
            Arc::new(FakePackageManager::succeeding()),
            &ConformanceConfig::default(),
        )
        .unwrap();
        let lifecycle = Lifecycle::new(
            Arc::new(provisioner),
            Arc::new(ScriptedExecutor::new(Behavior::Pass)),
            Arc::new(FixedOs::unsupported()),
        );
        let packages_root = tempfile::tempdir().unwrap();
        let options = RunOptions {
            packages_root: Some(packages_root.path().to_path_buf()),
            ..options()
        };

        let report = lifecycle.run(&options, &CancellationToken::new()).await;

        assert!(matches!(
            report.outcome,
            Err(HarnessError::InstallationFailed { status: None, .. })
        ));
        assert!(store.operations().is_empty());
    }

    #[tokio::test]
    async fn aborted_execution_still_tears_down() {
        let f = fixture(InMemoryIdentityStore::default(), Behavior::Abort);

        let report = f.lifecycle.run(&options(), &CancellationToken::new()).await;

        assert_eq!(report.exit_code(), EXIT_ABORTED);
        assert_eq!(report.final_state(), RunState::Failed);
        assert!(f.store.existing().is_empty());
    }

    #[tokio::test]
    async fn panicking_executor_tears_down_then_repanics() {
        let f = fixture(InMemoryIdentityStore::default(), Behavior::Panic);
        let options = options();
        let cancel = CancellationToken::new();

        let caught = AssertUnwindSafe(f.lifecycle.run(&options, &cancel))
            .catch_unwind()
            .await;

        assert!(caught.is_err());
        assert!(f.store.existing().is_empty());
        assert_eq!(
            f.store.operations(),
            [
                "create:otherrods",
                "create:my_auth_user",
                "create:my_external_auth_user",
                "remove:my_external_auth_user",
                "remove:my_auth_user",
                "remove:otherrods",
            ]
        );
    }

    #[tokio::test]
    async fn panicking_setup_removes_only_what_it_created() {
        let f = fixture(
            InMemoryIdentityStore::panicking_create("my_auth_user", &["rods"]),
            Behavior::Pass,
        );
        let options = options();
        let cancel = CancellationToken::new();

        let caught = AssertUnwindSafe(f.lifecycle.run(&options, &cancel))
            .catch_unwind()
            .await;

        assert!(caught.is_err());
        assert!(f.executor.calls().is_empty());
        assert_eq!(f.store.existing(), ["rods"]);
        assert_eq!(
            f.store.operations(),
            [
                "create:otherrods",
                "create:my_auth_user",
                "remove:my_auth_user",
                "remove:otherrods",
            ]
        );
    }

    #[tokio::test]
    async fn preexisting_identity_survives_the_run() {
        let f = fixture(
            InMemoryIdentityStore::with_existing(&["my_auth_user"]),
            Behavior::Pass,
        );

        let report = f.lifecycle.run(&options(), &CancellationToken::new()).await;

        assert!(matches!(
            report.outcome,
            Err(HarnessError::IdentityCreationFailed { ref name, .. }) if name == "my_auth_user"
        ));
        assert_eq!(report.exit_code(), EXIT_PROVISIONING_FAILED);
        assert!(f.executor.calls().is_empty());
        assert_eq!(report.teardown.removed, ["otherrods"]);
        assert_eq!(f.store.existing(), ["my_auth_user"]);
    }

    #[tokio::test]
    async fn skip_setup_runs_against_an_empty_graph() {
        let f = fixture(InMemoryIdentityStore::default(), Behavior::Pass);
        let options = RunOptions {
            do_setup: false,
            ..options()
        };

        let report = f.lifecycle.run(&options, &CancellationToken::new()).await;

        assert_eq!(report.exit_code(), 0);
        assert_eq!(f.executor.calls(), [0]);
        assert!(f.store.operations().is_empty());
        assert_eq!(report.final_state(), RunState::Completed);
    }

    #[tokio::test]
    #[traced_test]
    async fn teardown_failure_never_overrides_the_outcome() {
        let f = fixture(InMemoryIdentityStore::failing_remove("otherrods"), Behavior::Pass);

        let report = f.lifecycle.run(&options(), &CancellationToken::new()).await;

        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.final_state(), RunState::Completed);
        assert_eq!(report.teardown.failures.len(), 1);
        assert_eq!(report.teardown.removed.len(), 2);
        assert!(logs_contain("Teardown left identities behind"));
        assert!(logs_contain("teardown failed to remove 1 identities"));
    }

    #[test]
    fn exit_codes_follow_the_outcome_table() {
        let launch = HarnessError::ProcessLaunchFailed {
            principal: "irods".to_owned(),
            reason: "no such user".to_owned(),
        };
        let teardown = HarnessError::TeardownPartialFailure { failures: vec![] };
        let failed = HarnessError::SelectionFailed {
            selection: "test_basic_login".to_owned(),
            result: Box::new(result(2, "")),
        };

        assert_eq!(exit_code_for(&launch), EXIT_LAUNCH_FAILED);
        assert_eq!(exit_code_for(&teardown), EXIT_INTERNAL);
        assert_eq!(exit_code_for(&failed), 2);
    }

    #[tokio::test]
    async fn selection_status_is_reported_verbatim_even_when_it_matches_a_harness_code() {
        let f = fixture(InMemoryIdentityStore::default(), Behavior::Fail(EXIT_LAUNCH_FAILED));

        let report = f.lifecycle.run(&options(), &CancellationToken::new()).await;

        assert_eq!(report.exit_code(), EXIT_LAUNCH_FAILED);
        assert!(matches!(
            report.outcome,
            Err(HarnessError::SelectionFailed { .. })
        ));
    }
}
