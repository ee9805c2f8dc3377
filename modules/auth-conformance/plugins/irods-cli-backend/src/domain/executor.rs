//! Process-backed command executor.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use auth_conformance_sdk::{CommandError, CommandExecutor, CommandOutput};

/// Principal a command is run as.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Privilege {
    /// The invoking user, unchanged.
    #[default]
    Inherit,
    /// `sudo --`
    Root,
    /// `sudo -u <user> -i --`, with that user's login environment.
    User(String),
}

impl Privilege {
    fn prefix(&self) -> Vec<String> {
        match self {
            Self::Inherit => Vec::new(),
            Self::Root => vec!["sudo".to_owned(), "--".to_owned()],
            Self::User(user) => ["sudo", "-u", user.as_str(), "-i", "--"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
        }
    }
}

/// Runs commands as child processes, optionally behind `sudo`.
#[derive(Debug, Clone, Default)]
pub struct ProcessCommandExecutor {
    privilege: Privilege,
}

impl ProcessCommandExecutor {
    #[must_use]
    pub fn new(privilege: Privilege) -> Self {
        Self { privilege }
    }

    /// Full argument vector actually spawned for `argv`.
    #[must_use]
    pub fn command_line(&self, argv: &[String]) -> Vec<String> {
        let mut line = self.privilege.prefix();
        line.extend_from_slice(argv);
        line
    }
}

#[async_trait]
impl CommandExecutor for ProcessCommandExecutor {
    async fn run(&self, argv: &[String]) -> Result<CommandOutput, CommandError> {
        // Arguments may carry passwords; only the program is logged.
        let Some(program) = argv.first() else {
            return Err(CommandError::EmptyCommand);
        };
        let line = self.command_line(argv);
        let (spawned, args) = line.split_first().ok_or(CommandError::EmptyCommand)?;

        tracing::debug!(program = %program, privilege = ?self.privilege, "Running command");
        let output = Command::new(spawned)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| CommandError::Spawn {
                program: spawned.clone(),
                source,
            })?;

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        Ok(CommandOutput {
            status: status_code(output.status),
            output: combined,
        })
    }
}

/// Turns a non-zero status into `CommandError::NonZeroExit`.
///
/// # Errors
///
/// Returns `NonZeroExit` carrying the trimmed output.
pub fn require_success(program: &str, output: CommandOutput) -> Result<CommandOutput, CommandError> {
    if output.success() {
        Ok(output)
    } else {
        Err(CommandError::NonZeroExit {
            program: program.to_owned(),
            status: output.status,
            output: output.output_lossy().trim().to_owned(),
        })
    }
}

fn status_code(status: std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    status.code().unwrap_or(1)
}
