//! Shell command execution for the `execute_shell` tool.
//!
//! [`ShellRunner`] decouples the self-repair subroutine from real
//! subprocesses. Tests use scripted runners that return predetermined outputs.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::io::process::run_with_timeout;

/// Exit status shells use when the command cannot be found.
const COMMAND_NOT_FOUND_EXIT: i32 = 127;

/// Parameters for one shell invocation.
#[derive(Debug, Clone)]
pub struct ShellRequest {
    pub command: String,
    /// Working directory; the project root.
    pub workdir: PathBuf,
    pub timeout: Duration,
    /// Extra environment variables for the child.
    pub env: Vec<(String, String)>,
    /// Bytes kept per output stream.
    pub output_limit_bytes: usize,
}

/// Why a shell command did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShellFailure {
    #[error("command exited with status {0}")]
    NonZeroExit(i32),
    #[error("command not found")]
    CommandNotFound,
    #[error("command timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
    #[error("command terminated by signal")]
    Terminated,
}

/// Result of a shell invocation. `failure` is `None` on exit status 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub failure: Option<ShellFailure>,
}

impl ShellOutput {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }

    /// Failure reason plus captured output, for summaries and engineer prompts.
    pub fn describe(&self) -> String {
        let reason = match &self.failure {
            Some(failure) => failure.to_string(),
            None => "command succeeded".to_string(),
        };
        format!(
            "{reason}\n--- stdout ---\n{}\n--- stderr ---\n{}",
            self.stdout.trim_end(),
            self.stderr.trim_end()
        )
    }
}

/// Abstraction over shell execution backends.
pub trait ShellRunner {
    /// Run `request.command`. `Err` means the shell itself could not be started.
    fn run(&self, request: &ShellRequest) -> Result<ShellOutput>;
}

/// Runs commands through the platform shell.
pub struct SystemShell;

impl ShellRunner for SystemShell {
    #[instrument(skip_all, fields(command = %request.command, timeout_secs = request.timeout.as_secs()))]
    fn run(&self, request: &ShellRequest) -> Result<ShellOutput> {
        info!(workdir = %request.workdir.display(), "running shell command");
        let mut cmd = platform_shell(&request.command);
        cmd.current_dir(&request.workdir);
        for (key, value) in &request.env {
            cmd.env(key, value);
        }

        let output = run_with_timeout(cmd, None, request.timeout, request.output_limit_bytes)
            .with_context(|| format!("run shell command {:?}", request.command))?;

        let exit_code = output.status.code();
        let failure = if output.timed_out {
            Some(ShellFailure::TimedOut(request.timeout))
        } else {
            match exit_code {
                Some(0) => None,
                Some(COMMAND_NOT_FOUND_EXIT) => Some(ShellFailure::CommandNotFound),
                Some(code) => Some(ShellFailure::NonZeroExit(code)),
                None => Some(ShellFailure::Terminated),
            }
        };
        debug!(?exit_code, ?failure, "shell command finished");

        Ok(ShellOutput {
            exit_code,
            stdout: output.stdout_text(),
            stderr: output.stderr_text(),
            failure,
        })
    }
}

#[cfg(unix)]
fn platform_shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn platform_shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}
