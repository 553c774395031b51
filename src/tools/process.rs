//! Subprocess execution for external tool adapters.
//!
//! Every adapter funnels its invocations through [`CommandSpec`], which
//! captures stdout/stderr, enforces an optional timeout and turns failures
//! into structured [`ToolError`]s carrying the captured output.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, trace};

use crate::error::{KdeployError, Result, ToolError};

/// Captured output of a finished process.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

/// A single external command invocation.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// Tool name used in errors and logs.
    tool: String,
    /// Binary to execute.
    program: String,
    /// Arguments.
    args: Vec<String>,
    /// Working directory.
    cwd: Option<PathBuf>,
    /// Extra environment variables.
    env: Vec<(String, String)>,
    /// Kill the process after this long.
    timeout: Option<Duration>,
}

impl CommandSpec {
    /// Creates a command for the given tool and binary.
    #[must_use]
    pub fn new(tool: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            timeout: None,
        }
    }

    /// Appends arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Sets a timeout after which the process is killed.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Renders the command line for logs and errors.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Runs the command and returns its output if it exits successfully.
    ///
    /// # Errors
    ///
    /// Returns `NotInstalled` if the binary is missing, `Timeout` if the
    /// timeout elapsed, and `CommandFailed` with the captured output for a
    /// non-zero exit.
    pub async fn run(&self) -> Result<CommandOutput> {
        let rendered = self.display();
        debug!("Running: {rendered}");

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }
        for (key, value) in &self.env {
            command.env(key, value);
        }

        let child = command.spawn().map_err(|e| self.spawn_error(&e))?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| {
                    KdeployError::Tool(ToolError::Timeout {
                        tool: self.tool.clone(),
                        command: rendered.clone(),
                        timeout_secs: limit.as_secs(),
                    })
                })?,
            None => child.wait_with_output().await,
        }
        .map_err(|e| {
            KdeployError::Tool(ToolError::SpawnFailed {
                tool: self.tool.clone(),
                message: format!("failed to wait for process: {e}"),
            })
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        trace!("{} stdout: {stdout}", self.tool);

        if output.status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            Err(KdeployError::Tool(ToolError::CommandFailed {
                tool: self.tool.clone(),
                command: rendered,
                exit_code: output.status.code(),
                stdout,
                stderr,
            }))
        }
    }

    /// Returns true if the command runs and exits successfully.
    pub async fn succeeds(&self) -> bool {
        match self.run().await {
            Ok(_) => true,
            Err(e) => {
                debug!("{} check failed: {e}", self.tool);
                false
            }
        }
    }

    /// Maps a spawn failure, distinguishing a missing binary.
    fn spawn_error(&self, e: &std::io::Error) -> KdeployError {
        if e.kind() == std::io::ErrorKind::NotFound {
            KdeployError::Tool(ToolError::NotInstalled {
                tool: self.tool.clone(),
            })
        } else {
            KdeployError::Tool(ToolError::SpawnFailed {
                tool: self.tool.clone(),
                message: e.to_string(),
            })
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout() {
        let output = CommandSpec::new("sh", "sh")
            .args(["-c", "echo hello"])
            .run()
            .await
            .expect("command should succeed");
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_failure_carries_output() {
        let err = CommandSpec::new("sh", "sh")
            .args(["-c", "echo boom >&2; exit 3"])
            .run()
            .await
            .unwrap_err();

        match err {
            KdeployError::Tool(ToolError::CommandFailed {
                exit_code, stderr, ..
            }) => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(stderr.trim(), "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let err = CommandSpec::new("nope", "kdeploy-definitely-missing-binary")
            .run()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            KdeployError::Tool(ToolError::NotInstalled { .. })
        ));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let err = CommandSpec::new("sleep", "sleep")
            .arg("5")
            .timeout(Duration::from_millis(100))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, KdeployError::Tool(ToolError::Timeout { .. })));
    }
}
