use crate::orchestrator::PipelineState;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Record of one pipeline run, written with `dexplorer run --report`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub generation: u64,
    pub workspace: PathBuf,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub stages: Vec<StageRecord>,
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub state: PipelineState,
    pub command: String,
    /// `None` when the tool never ran to completion
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub output_chars: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    InProgress,
    Completed,
    StageFailed {
        state: PipelineState,
        exit_code: i32,
    },
    ToolNotFound {
        state: PipelineState,
        program: String,
    },
    TimedOut {
        state: PipelineState,
        program: String,
        secs: u64,
    },
    SpawnFailed {
        state: PipelineState,
        message: String,
    },
    Cancelled {
        state: Option<PipelineState>,
    },
}

impl RunOutcome {
    /// The state the run stopped in, if it stopped early.
    pub fn failed_state(&self) -> Option<PipelineState> {
        match self {
            RunOutcome::StageFailed { state, .. }
            | RunOutcome::ToolNotFound { state, .. }
            | RunOutcome::TimedOut { state, .. }
            | RunOutcome::SpawnFailed { state, .. } => Some(*state),
            RunOutcome::Cancelled { state } => *state,
            RunOutcome::InProgress | RunOutcome::Completed => None,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::InProgress => f.write_str("in progress"),
            RunOutcome::Completed => f.write_str("completed"),
            RunOutcome::StageFailed { state, exit_code } => {
                write!(f, "stage {state} failed with exit code {exit_code}")
            }
            RunOutcome::ToolNotFound { state, program } => {
                write!(f, "stage {state} failed: {program}: tool not found")
            }
            RunOutcome::TimedOut {
                state,
                program,
                secs,
            } => write!(f, "stage {state} failed: {program} timed out after {secs}s"),
            RunOutcome::SpawnFailed { state, message } => {
                write!(f, "stage {state} failed: {message}")
            }
            RunOutcome::Cancelled { state: Some(state) } => {
                write!(f, "cancelled during stage {state}")
            }
            RunOutcome::Cancelled { state: None } => f.write_str("cancelled before start"),
        }
    }
}

impl RunReport {
    pub fn new(generation: u64, workspace: &Path) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generation,
            workspace: workspace.to_path_buf(),
            started_at: Utc::now(),
            ended_at: None,
            stages: Vec::new(),
            outcome: RunOutcome::InProgress,
        }
    }

    pub fn record_stage(
        &mut self,
        state: PipelineState,
        command: String,
        exit_code: Option<i32>,
        duration: Duration,
        output_chars: usize,
    ) {
        self.stages.push(StageRecord {
            state,
            command,
            exit_code,
            duration_ms: duration.as_millis() as u64,
            output_chars,
        });
    }

    pub fn finish(mut self, outcome: RunOutcome) -> Self {
        self.ended_at = Some(Utc::now());
        self.outcome = outcome;
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Completed
    }

    pub fn executed_states(&self) -> Vec<PipelineState> {
        self.stages.iter().map(|s| s.state).collect()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write run report: {}", path.display()))?;
        Ok(())
    }
}
