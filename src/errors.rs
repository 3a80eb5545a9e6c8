//! Typed error hierarchy for the pipeline.
//!
//! Three enums cover the three layers:
//! - `ExecError`: a single external tool could not be run to completion
//! - `WorkspaceError`: preparing or scanning the run directory failed
//! - `PipelineError`: anything that stops a run before a stage result exists

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the process executor.
///
/// A tool that runs and exits non-zero is *not* an error here; that is a
/// regular `StageResult` with a non-zero exit code.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("{program}: tool not found")]
    ToolNotFound { program: String },

    #[error("Failed to run {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs}s")]
    TimedOut { program: String, secs: u64 },

    #[error("Run cancelled")]
    Cancelled,
}

impl ExecError {
    /// Build the right variant for an I/O failure raised while spawning `program`.
    pub fn from_spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        let program = program.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            ExecError::ToolNotFound { program }
        } else {
            ExecError::SpawnFailed { program, source }
        }
    }
}

/// Errors from workspace preparation and artifact scanning.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Failed to create workspace at {path}: {source}")]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove stale artifact {path}: {source}")]
    CleanupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid artifact pattern for {dir}: {message}")]
    BadPattern { dir: PathBuf, message: String },

    #[error("Workspace path is not valid UTF-8: {}", path.display())]
    NonUtf8Path { path: PathBuf },

    #[error("Failed to scan {path}: {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that abort a run without a stage result.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("Pipeline worker stopped unexpectedly: {0}")]
    WorkerPanicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_spawn_not_found_is_tool_not_found() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = ExecError::from_spawn("kotlinc", io_err);
        match &err {
            ExecError::ToolNotFound { program } => assert_eq!(program, "kotlinc"),
            other => panic!("Expected ToolNotFound, got {other:?}"),
        }
        assert_eq!(err.to_string(), "kotlinc: tool not found");
    }

    #[test]
    fn from_spawn_other_kind_is_spawn_failed() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ExecError::from_spawn("adb", io_err);
        match &err {
            ExecError::SpawnFailed { program, source } => {
                assert_eq!(program, "adb");
                assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
            }
            other => panic!("Expected SpawnFailed, got {other:?}"),
        }
    }

    #[test]
    fn workspace_error_carries_path() {
        let err = WorkspaceError::CleanupFailed {
            path: PathBuf::from("/tmp/ws/A.class"),
            source: std::io::Error::other("busy"),
        };
        assert!(err.to_string().contains("/tmp/ws/A.class"));
    }

    #[test]
    fn pipeline_error_converts_from_exec_error() {
        let err: PipelineError = ExecError::Cancelled.into();
        assert!(matches!(err, PipelineError::Exec(ExecError::Cancelled)));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&ExecError::Cancelled);
        assert_std_error(&WorkspaceError::BadPattern {
            dir: PathBuf::from("."),
            message: "x".into(),
        });
        assert_std_error(&PipelineError::WorkerPanicked("boom".into()));
    }
}
