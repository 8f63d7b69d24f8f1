// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External command execution.
//!
//! Nearly everything siteprov does is a call out to a standard system tool,
//! e.g., `apt-get`, `systemctl`, `a2ensite`. This module is the one place
//! those calls go through.
//!
//! # Required vs Optional
//!
//! Each [`CommandSpec`] is either [`Requirement::Required`] or
//! [`Requirement::Optional`]. A failing required command aborts the current
//! flow by returning [`ExecError`]. A failing optional command is logged as a
//! warning and the flow continues. There are no retries.
//!
//! # Runners
//!
//! The [`Executor`] decides what a failure means, while a [`CommandRunner`]
//! actually runs the command. [`SystemRunner`] spawns real processes with a
//! wall-clock timeout. Swapping the runner is how the provisioning flow is
//! exercised without touching the host system.

use indicatif::{ProgressBar, ProgressStyle};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    future::Future,
    process::Stdio,
    time::Duration,
};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// Whether failure of a command aborts the flow.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    /// Failure aborts the flow.
    #[default]
    Required,

    /// Failure is logged and ignored.
    Optional,
}

/// Description of an external command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    requirement: Requirement,
}

impl CommandSpec {
    /// Construct command whose failure aborts the flow.
    pub fn required(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            envs: Vec::new(),
            requirement: Requirement::Required,
        }
    }

    /// Construct command whose failure is only warned about.
    pub fn optional(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            requirement: Requirement::Optional,
            ..Self::required(program, args)
        }
    }

    /// Add environment variable to command.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        self.program.as_str()
    }

    pub fn args(&self) -> &[String] {
        self.args.as_slice()
    }

    pub fn envs(&self) -> &[(String, String)] {
        self.envs.as_slice()
    }

    pub fn is_required(&self) -> bool {
        self.requirement == Requirement::Required
    }
}

impl Display for CommandSpec {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.program.as_str())?;
        for arg in &self.args {
            write!(fmt, " {arg}")?;
        }

        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, absent if the process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with given exit code and stderr.
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// Combined stdout and stderr for logging.
    pub fn message(&self) -> String {
        let mut message = String::new();

        if !self.stdout.is_empty() {
            message.push_str(format!("stdout: {}", self.stdout).as_str());
        }

        if !self.stderr.is_empty() {
            if !message.is_empty() && !message.ends_with('\n') {
                message.push('\n');
            }
            message.push_str(format!("stderr: {}", self.stderr).as_str());
        }

        // INVARIANT: Chomp trailing newlines.
        message.trim_end_matches(['\r', '\n']).to_string()
    }
}

/// Layer of indirection for running external commands.
pub trait CommandRunner {
    /// Run command to completion and capture its output.
    ///
    /// A non-zero exit is not an error at this level, it is reported through
    /// [`CommandOutput::code`]. Only failure to run the command at all is.
    fn run(&self, command: &CommandSpec) -> impl Future<Output = Result<CommandOutput>>;
}

/// Run commands as real child processes.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    /// Construct new runner that kills commands running longer than `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for SystemRunner {
    async fn run(&self, command: &CommandSpec) -> Result<CommandOutput> {
        let child = Command::new(command.program())
            .args(command.args())
            .envs(command.envs().iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecError::Spawn {
                command: command.to_string(),
                source,
            })?;

        // INVARIANT: Dropping the wait future on timeout drops the child, which kills it.
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ExecError::Timeout {
                command: command.to_string(),
                timeout: self.timeout,
            })?
            .map_err(|source| ExecError::Spawn {
                command: command.to_string(),
                source,
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(output.stdout.as_slice()).into_owned(),
            stderr: String::from_utf8_lossy(output.stderr.as_slice()).into_owned(),
        })
    }
}

/// Execute commands according to their [`Requirement`].
#[derive(Debug)]
pub struct Executor<R>
where
    R: CommandRunner,
{
    runner: R,
}

impl<R> Executor<R>
where
    R: CommandRunner,
{
    /// Construct new executor.
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    /// Access underlying runner.
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run command, enforcing its requirement.
    ///
    /// Returns `Some` output when the command succeeded, and `None` when an
    /// optional command failed and the failure was logged instead.
    ///
    /// # Errors
    ///
    /// - Return [`ExecError::Failed`] if a required command exits non-zero.
    /// - Return [`ExecError::Spawn`] if a required command cannot run.
    /// - Return [`ExecError::Timeout`] if a required command runs too long.
    #[instrument(skip(self, command), fields(command = %command), level = "debug")]
    pub async fn run(&self, command: &CommandSpec) -> Result<Option<CommandOutput>> {
        match self.attempt(command).await {
            Ok(output) => Ok(Some(output)),
            Err(error) if !command.is_required() => {
                warn!("optional command failed, continuing: {error}");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    /// Run command as a query, ignoring its requirement.
    ///
    /// Meant for queries like `which` or `dpkg-query`, where failure is an
    /// answer rather than a problem. Nothing is warned about. Returns output
    /// only if the command succeeded.
    pub async fn query(&self, command: &CommandSpec) -> Option<CommandOutput> {
        match self.attempt(command).await {
            Ok(output) => Some(output),
            Err(error) => {
                debug!("query failed: {error}");
                None
            }
        }
    }

    /// Run command as a query and only report whether it succeeded.
    pub async fn succeeds(&self, command: &CommandSpec) -> bool {
        self.query(command).await.is_some()
    }

    async fn attempt(&self, command: &CommandSpec) -> Result<CommandOutput> {
        debug!("run {command}");
        let spinner = spinner(command);
        let result = self.runner.run(command).await;
        spinner.finish_and_clear();

        let output = result?;
        let message = output.message();
        if !message.is_empty() {
            debug!("{message}");
        }

        if !output.is_success() {
            return Err(ExecError::Failed {
                command: command.to_string(),
                code: output.code,
                message,
            });
        }

        Ok(output)
    }
}

fn spinner(command: &CommandSpec) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {elapsed:>4.yellow}  {msg}") {
        bar.set_style(style);
    }
    bar.set_message(command.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Command execution error types.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// Command could not be started or waited on.
    #[error("failed to run {command:?}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Command exited unsuccessfully.
    #[error(
        "command {command:?} failed with exit code {}:\n{message}",
        .code.map_or_else(|| "none".to_string(), |code| code.to_string())
    )]
    Failed {
        command: String,
        code: Option<i32>,
        message: String,
    },

    /// Command did not finish within the time limit.
    #[error("command {command:?} timed out after {}s", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },
}

/// Friendly result alias :3
pub type Result<T, E = ExecError> = std::result::Result<T, E>;
