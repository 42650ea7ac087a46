//! External command execution.
//!
//! [`ExternalCommand`] wraps a program invocation with arguments and an
//! optional timeout. The LVM volume manager and the hdparm drive monitor are
//! both built on top of it.
//!
//! ```rust
//! use backuptasks::ExternalCommand;
//! use std::time::Duration;
//!
//! let cmd = ExternalCommand::builder("lvs")
//!     .args(["--noheadings", "-o", "lv_name,origin", "vg0"])
//!     .timeout(Duration::from_secs(30))
//!     .build();
//!
//! assert_eq!(cmd.to_string(), "lvs --noheadings -o lv_name,origin vg0");
//! ```
//!
//! # Error Handling
//!
//! - **Non-zero exit code**: [`CommandError::Failed`] with the exit code and
//!   stderr output
//! - **Timeout**: [`CommandError::Timeout`]; the child is killed when the
//!   pending future is dropped
//! - **Spawn failure**: [`CommandError::Spawn`] if the program cannot be
//!   started (e.g. not installed)

use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// Errors that can occur when running an external command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The program could not be started.
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command did not finish in time.
    #[error("{command} timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    /// The command exited with a non-zero status.
    #[error("{command} exited with code {code}: {stderr}")]
    Failed {
        command: String,
        code: i32,
        stderr: String,
    },
}

/// Captured output of a successful command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// A program invocation.
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl ExternalCommand {
    /// Create a new builder for a command.
    pub fn builder(program: impl Into<String>) -> ExternalCommandBuilder {
        ExternalCommandBuilder::new(program)
    }

    /// Get the program being executed.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Get the command arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Get the timeout duration.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run the command to completion and capture its output.
    pub async fn output(&self) -> Result<CommandOutput, CommandError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let spawn_error = |source| CommandError::Spawn {
            command: self.program.clone(),
            source,
        };

        let output = match self.timeout {
            Some(duration) => timeout(duration, cmd.output())
                .await
                .map_err(|_| CommandError::Timeout {
                    command: self.program.clone(),
                    timeout: duration,
                })?
                .map_err(spawn_error)?,
            None => cmd.output().await.map_err(spawn_error)?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            Err(CommandError::Failed {
                command: self.program.clone(),
                code: output.status.code().unwrap_or(-1),
                stderr: stderr.trim().to_string(),
            })
        }
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Builder for creating `ExternalCommand` instances.
#[derive(Debug, Clone)]
pub struct ExternalCommandBuilder {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl ExternalCommandBuilder {
    /// Create a new builder with the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the execution timeout.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Set or clear the execution timeout.
    pub fn maybe_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout = duration;
        self
    }

    /// Build the `ExternalCommand`.
    pub fn build(self) -> ExternalCommand {
        ExternalCommand {
            program: self.program,
            args: self.args,
            timeout: self.timeout,
        }
    }
}
