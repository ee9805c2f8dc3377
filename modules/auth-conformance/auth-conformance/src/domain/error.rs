//! Domain errors for the conformance harness.

use auth_conformance_sdk::IdentityGraphError;

use super::lifecycle::RunState;

/// Internal domain errors.
#[derive(thiserror::Error, Debug)]
pub enum DomainError {
    #[error("invalid configuration for '{field}': {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("identity graph violates its invariants: {0}")]
    InvalidGraph(#[from] IdentityGraphError),

    #[error("run cannot move from {from} to {to}")]
    InvalidTransition { from: RunState, to: RunState },
}

impl DomainError {
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
