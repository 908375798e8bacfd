//! Shell runner for participants that drive external commands.
//!
//! Provides:
//! - Script files written to a temporary location
//! - Output capture, optionally streamed into a worker as it arrives
//! - Timeout enforcement
//! - Platform helpers for composing command lines

use std::io::Write;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::error::ShellError;
use crate::worker::Worker;

/// Size of a single read from the child's pipes.
const CHUNK_SIZE: usize = 8 * 1024;

/// Default command timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Exit status of a finished script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode {
    pub code: i32,
}

impl ExitCode {
    pub fn new(code: i32) -> Self {
        Self { code }
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Runs a script through the platform shell.
#[derive(Debug)]
pub struct Shell {
    /// Interpreter and leading arguments.
    interpreter: Vec<&'static str>,
    script_extension: &'static str,
    script: Option<NamedTempFile>,
    /// Environment variables removed from the child's environment.
    env_remove: Vec<String>,
    timeout: Duration,
    output: Vec<u8>,
    exit_code: Option<ExitCode>,
}

impl Shell {
    /// Create a shell runner with default settings.
    pub fn new() -> Self {
        let (interpreter, script_extension) = if Self::windows() {
            (vec!["cmd", "/C"], ".bat")
        } else {
            (vec!["bash"], ".sh")
        };

        Self {
            interpreter,
            script_extension,
            script: None,
            env_remove: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            output: Vec::new(),
            exit_code: None,
        }
    }

    /// Set the command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Drop an inherited environment variable before running the script.
    pub fn with_env_removed(mut self, name: impl Into<String>) -> Self {
        self.env_remove.push(name.into());
        self
    }

    pub fn windows() -> bool {
        cfg!(target_os = "windows")
    }

    pub fn move_command() -> &'static str {
        if Self::windows() { "move" } else { "mv" }
    }

    pub fn environment_export_command() -> &'static str {
        if Self::windows() { "set" } else { "export" }
    }

    pub fn command_separator() -> &'static str {
        "&&"
    }

    /// Run `command` as a script and return its exit code and output.
    pub async fn run_command(command: &str) -> Result<(ExitCode, String), ShellError> {
        let mut shell = Shell::new();
        shell.create_script(command)?;
        let code = shell.run_script().await?;
        Ok((code, shell.output()))
    }

    /// Write `contents` to a fresh temporary script file.
    pub fn create_script(&mut self, contents: &str) -> Result<(), ShellError> {
        if contents.trim().is_empty() {
            return Err(ShellError::EmptyScript);
        }

        let mut file = tempfile::Builder::new()
            .prefix("script")
            .suffix(self.script_extension)
            .tempfile()?;
        file.write_all(contents.as_bytes())?;
        file.flush()?;

        tracing::debug!(path = %file.path().display(), "Wrote script file");
        self.script = Some(file);
        self.output.clear();
        self.exit_code = None;
        Ok(())
    }

    /// Path of the current script file.
    pub fn script_path(&self) -> Option<&Path> {
        self.script.as_ref().map(|f| f.path())
    }

    /// Run the script, capturing its output.
    pub async fn run_script(&mut self) -> Result<ExitCode, ShellError> {
        self.execute(None).await
    }

    /// Run the script, streaming output chunks into `worker` as buffered
    /// output. Whatever is still buffered is flushed once the script exits.
    pub async fn run_script_with_output(
        &mut self,
        worker: &mut Worker,
    ) -> Result<ExitCode, ShellError> {
        let result = self.execute(Some(&mut *worker)).await;
        worker.flush_output().await;
        result
    }

    /// Combined stdout and stderr of the last run.
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    pub fn exit_code(&self) -> Option<ExitCode> {
        self.exit_code
    }

    async fn execute(&mut self, mut worker: Option<&mut Worker>) -> Result<ExitCode, ShellError> {
        let script = self
            .script
            .as_ref()
            .ok_or(ShellError::NoScript)?
            .path()
            .to_path_buf();

        let mut command = Command::new(self.interpreter[0]);
        command
            .args(&self.interpreter[1..])
            .arg(&script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for name in &self.env_remove {
            command.env_remove(name);
        }

        let mut child = command
            .spawn()
            .map_err(|e| ShellError::Spawn(e.to_string()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ShellError::Spawn("stdout not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ShellError::Spawn("stderr not captured".to_string()))?;

        self.output.clear();
        let output = &mut self.output;
        let timeout = self.timeout;

        let result = tokio::time::timeout(timeout, async {
            let mut out_buf = vec![0u8; CHUNK_SIZE];
            let mut err_buf = vec![0u8; CHUNK_SIZE];
            let mut out_done = false;
            let mut err_done = false;

            while !(out_done && err_done) {
                let (from_stdout, n) = tokio::select! {
                    n = stdout.read(&mut out_buf), if !out_done => (true, n?),
                    n = stderr.read(&mut err_buf), if !err_done => (false, n?),
                };
                let chunk = if from_stdout {
                    out_done = n == 0;
                    &out_buf[..n]
                } else {
                    err_done = n == 0;
                    &err_buf[..n]
                };
                if chunk.is_empty() {
                    continue;
                }

                output.extend_from_slice(chunk);
                if let Some(worker) = worker.as_mut() {
                    worker.write_output(chunk, true).await;
                }
            }

            let status = child.wait().await?;
            Ok::<_, std::io::Error>(status.code().unwrap_or(-1))
        })
        .await;

        match result {
            Ok(Ok(code)) => {
                let exit_code = ExitCode::new(code);
                tracing::debug!(code, "Script finished");
                self.exit_code = Some(exit_code);
                Ok(exit_code)
            }
            Ok(Err(e)) => Err(ShellError::Io(e)),
            Err(_) => {
                let _ = child.kill().await;
                Err(ShellError::Timeout(timeout))
            }
        }
    }
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}
