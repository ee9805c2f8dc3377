//! Domain layer for the conformance harness.

mod capture;
pub mod error;
pub mod installer;
pub mod lifecycle;
pub mod provisioner;
pub mod runner;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::DomainError;
pub use lifecycle::{
    EXIT_ABORTED, EXIT_CONFIG, EXIT_INTERNAL, EXIT_LAUNCH_FAILED, EXIT_PROVISIONING_FAILED,
    Lifecycle, RunOptions, RunReport, RunState, StateMachine, exit_code_for,
};
pub use provisioner::{Provisioner, TeardownReport};
pub use runner::Runner;
