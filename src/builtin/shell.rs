//! Shell participant: runs `fields.command` and streams its output.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::WorkerConfig;
use crate::error::{ActionError, ShellError};
use crate::shell::Shell;
use crate::sink::MessageSink;
use crate::worker::{Action, Participant, Worker};

/// Context output holding the command's exit code.
pub const EXIT_CODE_OUTPUT: &str = "exit_code";

/// The `execute` action.
#[derive(Debug, Clone, Default)]
pub struct ShellAction {
    timeout: Option<Duration>,
    env_removed: Vec<String>,
}

impl ShellAction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_env_removed(mut self, name: impl Into<String>) -> Self {
        self.env_removed.push(name.into());
        self
    }

    fn shell(&self) -> Shell {
        let mut shell = Shell::new();
        if let Some(timeout) = self.timeout {
            shell = shell.with_timeout(timeout);
        }
        for name in &self.env_removed {
            shell = shell.with_env_removed(name.clone());
        }
        shell
    }
}

#[async_trait]
impl Action for ShellAction {
    async fn run(&self, worker: &mut Worker) -> Result<(), ActionError> {
        let command = match worker.get_field("command") {
            Some(Value::String(command)) if !command.trim().is_empty() => command.clone(),
            _ => return Err(ActionError::plugin("Missing field: command")),
        };

        let mut shell = self.shell();
        shell.create_script(&command)?;

        let code = match shell.run_script_with_output(worker).await {
            Ok(code) => code,
            Err(e @ ShellError::Timeout(_)) => return Err(ActionError::plugin(e.to_string())),
            Err(e) => return Err(e.into()),
        };

        worker.save_output_value(EXIT_CODE_OUTPUT, code.code);
        if !code.success() {
            return Err(ActionError::plugin(format!(
                "Command failed with exit code {}",
                code.code
            )));
        }
        Ok(())
    }
}

/// Participant exposing [`ShellAction`] as `execute`.
pub fn shell_participant(sink: Arc<dyn MessageSink>, config: WorkerConfig) -> Participant {
    Participant::new("shell", sink, config).action("execute", ShellAction::new())
}
