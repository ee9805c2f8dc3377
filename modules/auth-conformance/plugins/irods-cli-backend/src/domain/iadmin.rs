//! Identity store backed by `iadmin`.
//!
//! | role           | create                                   | remove                     |
//! |----------------|------------------------------------------|----------------------------|
//! | administrator  | `mkuser <name> rodsadmin` (+ password)   | `rmuser <name>`            |
//! | internal user  | `mkuser <name> rodsuser` (+ password)    | `rmuser <name>`            |
//! | external user  | `aua <internal> <name>`                  | `rua <internal> <name>`    |
//!
//! Passwords are set with `moduser <name> password <secret>`. External
//! identities are auth-name mappings on their internal user; their credential
//! belongs to the external system and is never written to iRODS.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::{debug, info};

use auth_conformance_sdk::{
    CommandError, CommandExecutor, CommandOutput, Identity, IdentityRole, IdentityStoreClient,
    RemovalOutcome,
};

use super::executor::require_success;

const NO_ROWS: &str = "No rows found";

/// `IdentityStoreClient` driving the iRODS admin CLI.
pub struct IadminIdentityStore {
    executor: Arc<dyn CommandExecutor>,
    program: String,
}

impl IadminIdentityStore {
    #[must_use]
    pub fn new(executor: Arc<dyn CommandExecutor>, program: impl Into<String>) -> Self {
        Self {
            executor,
            program: program.into(),
        }
    }

    async fn query(&self, args: &[&str]) -> Result<CommandOutput, CommandError> {
        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push(self.program.clone());
        argv.extend(args.iter().map(|a| (*a).to_owned()));
        self.executor.run(&argv).await
    }

    async fn iadmin(&self, args: &[&str]) -> Result<CommandOutput, CommandError> {
        let output = self.query(args).await?;
        require_success(&self.program, output)
    }

    async fn user_exists(&self, name: &str) -> Result<bool, CommandError> {
        let output = self.query(&["lu", name]).await?;
        if output.output_lossy().contains(NO_ROWS) {
            return Ok(false);
        }
        require_success(&self.program, output).map(|_| true)
    }

    /// Whether `internal` carries the auth name `external`.
    async fn has_auth_name(&self, internal: &str, external: &str) -> Result<bool, CommandError> {
        let output = self.query(&["lua", internal]).await?;
        if output.output_lossy().contains(NO_ROWS) {
            return Ok(false);
        }
        let output = require_success(&self.program, output)?;

        // Lines look like `<user>#<zone> <auth name>`; auth names may contain spaces.
        Ok(output.output_lossy().lines().any(|line| {
            line.split_once(char::is_whitespace)
                .is_some_and(|(_, auth_name)| auth_name.trim() == external)
        }))
    }
}

fn mapping_target(identity: &Identity) -> Result<&str, CommandError> {
    identity.mapped_to().ok_or_else(|| {
        CommandError::InvalidRequest(format!(
            "external identity '{}' has no internal user to map to",
            identity.name()
        ))
    })
}

#[async_trait]
impl IdentityStoreClient for IadminIdentityStore {
    async fn create_identity(&self, identity: &Identity) -> Result<(), CommandError> {
        let name = identity.name();
        let user_type = match identity.role() {
            IdentityRole::Administrator => "rodsadmin",
            IdentityRole::InternalUser => "rodsuser",
            IdentityRole::ExternalUser => {
                let internal = mapping_target(identity)?;
                self.iadmin(&["aua", internal, name]).await?;
                info!(identity = name, internal, "Mapped external auth name");
                return Ok(());
            }
        };

        self.iadmin(&["mkuser", name, user_type]).await?;
        if let Some(credential) = identity.credential() {
            debug!(identity = name, "Setting password");
            self.iadmin(&["moduser", name, "password", credential.expose_secret()])
                .await?;
        }
        info!(identity = name, user_type, "Created iRODS user");
        Ok(())
    }

    async fn remove_identity(&self, identity: &Identity) -> Result<RemovalOutcome, CommandError> {
        if !self.identity_exists(identity).await? {
            return Ok(RemovalOutcome::AlreadyAbsent);
        }

        let name = identity.name();
        match identity.role() {
            IdentityRole::ExternalUser => {
                self.iadmin(&["rua", mapping_target(identity)?, name]).await?;
            }
            IdentityRole::Administrator | IdentityRole::InternalUser => {
                self.iadmin(&["rmuser", name]).await?;
            }
        }
        Ok(RemovalOutcome::Removed)
    }

    async fn identity_exists(&self, identity: &Identity) -> Result<bool, CommandError> {
        match identity.role() {
            IdentityRole::ExternalUser => {
                self.has_auth_name(mapping_target(identity)?, identity.name())
                    .await
            }
            IdentityRole::Administrator | IdentityRole::InternalUser => {
                self.user_exists(identity.name()).await
            }
        }
    }
}
