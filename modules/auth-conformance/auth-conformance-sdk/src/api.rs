//! Public API trait for executing a test selection.
//!
//! The conformance runner implements this trait; the run lifecycle consumes
//! it, so the lifecycle can be exercised against any executor.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::HarnessError;
use crate::models::{ExecutionResult, IdentityGraph, RunAs, TestSelection};

/// Executes a named test selection against a provisioned environment.
///
/// ```ignore
/// let result = executor
///     .execute(&selection, &RunAs::ServiceAccount { user: "irods".into() }, &graph, &cancel)
///     .await?;
/// assert!(result.passed());
/// ```
#[async_trait]
pub trait SelectionExecutor: Send + Sync {
    /// Run `selection` as `run_as`, capturing its combined output.
    ///
    /// The identity graph is read-only here. Cancelling `cancel` stops the
    /// test process and closes its output capture.
    ///
    /// # Errors
    ///
    /// - `ProcessLaunchFailed` if the principal does not exist or the process
    ///   could not be started
    /// - `SelectionFailed` if the selection exited non-zero (carries the full
    ///   captured output and the selection's own status)
    /// - `ExecutionAborted` if the run was cancelled or timed out
    async fn execute(
        &self,
        selection: &TestSelection,
        run_as: &RunAs,
        graph: &IdentityGraph,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, HarnessError>;
}
