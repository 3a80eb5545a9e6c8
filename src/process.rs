//! External process execution.
//!
//! `ProcessExecutor` is the seam between the orchestrator and the OS: the
//! real implementation spawns tools with `tokio::process`, tests swap in a
//! scripted double.

use crate::commands::StageCommand;
use crate::errors::ExecError;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Exit status and merged stdout/stderr of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResult {
    pub exit_code: i32,
    pub output: String,
}

impl StageResult {
    pub fn new(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Abstraction over tool execution for testability.
/// Real implementation: `SystemExecutor`.
#[async_trait]
pub trait ProcessExecutor: Send + Sync {
    /// Run `command` in `working_dir` to completion.
    ///
    /// A non-zero exit is a normal `Ok` result. `Err` means the tool never
    /// produced one: it could not be started, timed out, or `cancel` fired.
    async fn execute(
        &self,
        command: &StageCommand,
        working_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<StageResult, ExecError>;
}

/// Spawns real processes.
#[derive(Debug, Clone, Default)]
pub struct SystemExecutor {
    timeout: Option<Duration>,
}

impl SystemExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill any tool that runs longer than `timeout`.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ProcessExecutor for SystemExecutor {
    async fn execute(
        &self,
        command: &StageCommand,
        working_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<StageResult, ExecError> {
        let program = command.program_name();
        let start = Instant::now();

        let child = Command::new(&command.program)
            .args(&command.args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecError::from_spawn(program.clone(), e))?;

        debug!(program = %program, pid = child.id().unwrap_or(0), "Process spawned");

        let timeout = self.timeout;
        let wait_program = program.clone();
        let wait = async move {
            let output = match timeout {
                Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                    .await
                    .map_err(|_| ExecError::TimedOut {
                        program: wait_program.clone(),
                        secs: limit.as_secs(),
                    })?,
                None => child.wait_with_output().await,
            };
            output.map_err(|source| ExecError::SpawnFailed {
                program: wait_program,
                source,
            })
        };

        // Dropping `wait` on cancellation drops the child, which kills it.
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(program = %program, "Cancelled while waiting for process");
                return Err(ExecError::Cancelled);
            }
            result = wait => result?,
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        info!(
            program = %program,
            exit_code,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Process finished"
        );

        Ok(StageResult::new(exit_code, text))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sh(script: &str) -> StageCommand {
        StageCommand::new("sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn test_captures_stdout_and_stderr() {
        let dir = tempdir().unwrap();
        let result = SystemExecutor::new()
            .execute(
                &sh("echo out; echo err 1>&2"),
                dir.path(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(result.success());
        assert!(result.output.contains("out\n"));
        assert!(result.output.contains("err\n"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_ok_result() {
        let dir = tempdir().unwrap();
        let result = SystemExecutor::new()
            .execute(&sh("echo broken 1>&2; exit 3"), dir.path(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.exit_code, 3);
        assert!(!result.success());
        assert_eq!(result.output, "broken\n");
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
        let result = SystemExecutor::new()
            .execute(&sh("cat marker.txt"), dir.path(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(result.output, "here");
    }

    #[tokio::test]
    async fn test_missing_program_is_tool_not_found() {
        let dir = tempdir().unwrap();
        let err = SystemExecutor::new()
            .execute(
                &StageCommand::new("/definitely/not/a/tool-xyz"),
                dir.path(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::ToolNotFound { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn test_cancellation_stops_waiting() {
        let dir = tempdir().unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = SystemExecutor::new()
            .execute(&sh("sleep 30"), dir.path(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_timeout() {
        let dir = tempdir().unwrap();
        let err = SystemExecutor::with_timeout(Some(Duration::from_millis(100)))
            .execute(&sh("sleep 30"), dir.path(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::TimedOut { .. }), "{err:?}");
    }
}
