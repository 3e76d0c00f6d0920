//! # Tool Execution
//!
//! Runs assembled [`ToolCommand`]s as child processes, either waiting for
//! their output or detaching them with output redirected into the result
//! directory.
//!
//! ## Design
//!
//! [`CommandExecutor`] is the seam between request handling and process
//! spawning. [`ProcessExecutor`] is the production implementation; tests use
//! recording executors that never start a process.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use crate::command::ToolCommand;
use crate::errors::{ServiceError, ServiceResult};

/// Captured result of a synchronous run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Where and how long a detached run may go.
#[derive(Debug, Clone)]
pub struct BackgroundJob {
    pub working_dir: PathBuf,
    /// Receives both stdout and stderr.
    pub log_path: PathBuf,
    pub timeout: Option<Duration>,
}

/// Handle returned once a detached run has started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTicket {
    pub pid: Option<u32>,
    pub log_path: PathBuf,
}

/// Process execution seam.
#[async_trait]
pub trait CommandExecutor: Send + Sync + std::fmt::Debug {
    /// Run to completion, capturing output. The child is killed on timeout.
    async fn run(
        &self,
        command: &ToolCommand,
        working_dir: &Path,
        timeout: Duration,
    ) -> ServiceResult<CommandOutput>;

    /// Start without waiting for completion.
    async fn spawn_background(
        &self,
        command: &ToolCommand,
        job: &BackgroundJob,
    ) -> ServiceResult<JobTicket>;
}

/// Executes commands as real child processes, without a shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    fn command(command: &ToolCommand, working_dir: &Path) -> Command {
        let mut process = Command::new(command.program());
        process
            .args(command.args())
            .current_dir(working_dir)
            .stdin(Stdio::null());
        process
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn run(
        &self,
        command: &ToolCommand,
        working_dir: &Path,
        timeout: Duration,
    ) -> ServiceResult<CommandOutput> {
        let start = Instant::now();
        let mut process = Self::command(command, working_dir);
        process.kill_on_drop(true);

        debug!(command = %command, "Running tool");
        let output = match tokio::time::timeout(timeout, process.output()).await {
            Ok(result) => result.map_err(|e| ServiceError::Spawn {
                program: command.program().to_string(),
                source: e,
            })?,
            Err(_elapsed) => {
                error!(
                    program = command.program(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Tool run timed out"
                );
                return Err(ServiceError::Timeout {
                    program: command.program().to_string(),
                    seconds: timeout.as_secs(),
                });
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            warn!(
                program = command.program(),
                code = ?output.status.code(),
                duration_ms,
                "Tool exited unsuccessfully"
            );
            return Err(ServiceError::NonZeroExit {
                program: command.program().to_string(),
                code: output.status.code(),
                stderr,
            });
        }

        info!(program = command.program(), duration_ms, "Tool run completed");
        Ok(CommandOutput {
            stdout,
            stderr,
            duration_ms,
        })
    }

    async fn spawn_background(
        &self,
        command: &ToolCommand,
        job: &BackgroundJob,
    ) -> ServiceResult<JobTicket> {
        let staging_error = |e| ServiceError::FileStaging {
            path: job.log_path.clone(),
            source: e,
        };
        let log = tokio::fs::File::create(&job.log_path)
            .await
            .map_err(staging_error)?
            .into_std()
            .await;
        let log_stderr = log.try_clone().map_err(staging_error)?;

        let mut process = Self::command(command, &job.working_dir);
        process
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_stderr));

        let child = process.spawn().map_err(|e| ServiceError::Spawn {
            program: command.program().to_string(),
            source: e,
        })?;
        let pid = child.id();
        info!(command = %command, pid = ?pid, "Started background tool run");

        tokio::spawn(supervise(
            child,
            command.program().to_string(),
            job.timeout,
        ));

        Ok(JobTicket {
            pid,
            log_path: job.log_path.clone(),
        })
    }
}

/// Reap a detached child, enforcing the optional timeout.
async fn supervise(mut child: Child, program: String, timeout: Option<Duration>) {
    let waited = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(result) => result,
            Err(_elapsed) => {
                warn!(
                    program = %program,
                    timeout_ms = limit.as_millis() as u64,
                    "Background tool run timed out, killing"
                );
                if let Err(e) = child.kill().await {
                    error!(program = %program, error = %e, "Failed to kill background tool run");
                }
                return;
            }
        },
        None => child.wait().await,
    };

    match waited {
        Ok(status) if status.success() => {
            info!(program = %program, "Background tool run completed");
        }
        Ok(status) => {
            warn!(program = %program, code = ?status.code(), "Background tool run failed");
        }
        Err(e) => {
            error!(program = %program, error = %e, "Failed to wait for background tool run");
        }
    }
}
