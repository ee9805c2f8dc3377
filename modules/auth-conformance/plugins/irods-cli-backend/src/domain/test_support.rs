#![allow(clippy::unwrap_used, clippy::expect_used, clippy::must_use_candidate)]

//! Scripted command executor for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;

use auth_conformance_sdk::{CommandError, CommandExecutor, CommandOutput};

type Responder = Box<dyn Fn(&[String]) -> CommandOutput + Send + Sync>;

/// Records every command line and answers through a closure.
pub struct ScriptedExecutor {
    calls: Mutex<Vec<Vec<String>>>,
    respond: Responder,
}

impl ScriptedExecutor {
    pub fn new(respond: impl Fn(&[String]) -> CommandOutput + Send + Sync + 'static) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        }
    }

    /// Answers every command with status 0 and no output.
    pub fn succeeding() -> Self {
        Self::new(|_| CommandOutput::default())
    }

    /// Command lines joined with spaces, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().iter().map(|argv| argv.join(" ")).collect()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn run(&self, argv: &[String]) -> Result<CommandOutput, CommandError> {
        if argv.is_empty() {
            return Err(CommandError::EmptyCommand);
        }
        self.calls.lock().push(argv.to_vec());
        Ok((self.respond)(argv))
    }
}

pub fn output(status: i32, text: &str) -> CommandOutput {
    CommandOutput {
        status,
        output: text.as_bytes().to_vec(),
    }
}
