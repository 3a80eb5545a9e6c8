use super::events::EventSink;
use super::gate::RunGate;
use super::machine::{Emission, Transition, abort, advance, enter};
use super::state::PipelineState;
use crate::commands::build_stage_command;
use crate::config::ToolPaths;
use crate::errors::{ExecError, PipelineError};
use crate::process::ProcessExecutor;
use crate::report::{RunOutcome, RunReport};
use crate::workspace::Workspace;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drives one submission through every stage.
pub struct PipelineRunner {
    executor: Arc<dyn ProcessExecutor>,
    tools: Arc<ToolPaths>,
}

impl PipelineRunner {
    pub fn new(executor: Arc<dyn ProcessExecutor>, tools: ToolPaths) -> Self {
        Self {
            executor,
            tools: Arc::new(tools),
        }
    }

    /// Run the whole pipeline for `source` inside `workspace`.
    ///
    /// Stage failures are reported through the returned report's outcome;
    /// `Err` is reserved for runs that break down outside any tool.
    pub async fn run(
        &self,
        source: &str,
        workspace: &Workspace,
        sink: &dyn EventSink,
        generation: u64,
        cancel: &CancellationToken,
    ) -> Result<RunReport, PipelineError> {
        let mut report = RunReport::new(generation, workspace.root());
        let mut state = PipelineState::Compiling;

        if cancel.is_cancelled() {
            debug!(generation, "Run superseded before it started");
            return Ok(report.finish(RunOutcome::Cancelled { state: None }));
        }

        info!(generation, workspace = %workspace.root().display(), "Pipeline run started");
        if !deliver(sink, generation, cancel, enter(state)) {
            return Ok(report.finish(RunOutcome::Cancelled { state: Some(state) }));
        }
        workspace.prepare(source)?;

        loop {
            if cancel.is_cancelled() {
                return Ok(report.finish(RunOutcome::Cancelled { state: Some(state) }));
            }

            let Some(command) = build_stage_command(state, workspace, &self.tools)? else {
                break;
            };
            let command_line = command.to_string();
            debug!(generation, stage = %state, command = %command_line, "Running stage");

            let started = Instant::now();
            let result = self
                .executor
                .execute(&command, workspace.root(), cancel)
                .await;

            let (transition, halt_outcome) = match result {
                Ok(result) => {
                    report.record_stage(
                        state,
                        command_line,
                        Some(result.exit_code),
                        started.elapsed(),
                        result.output.len(),
                    );
                    let outcome = RunOutcome::StageFailed {
                        state,
                        exit_code: result.exit_code,
                    };
                    (advance(state, &result), outcome)
                }
                Err(ExecError::Cancelled) => {
                    report.record_stage(state, command_line, None, started.elapsed(), 0);
                    return Ok(report.finish(RunOutcome::Cancelled { state: Some(state) }));
                }
                Err(err) => {
                    report.record_stage(state, command_line, None, started.elapsed(), 0);
                    warn!(generation, stage = %state, error = %err, "Stage could not run");
                    let outcome = exec_outcome(state, &err);
                    (abort(state, err.to_string()), outcome)
                }
            };

            let Transition { next, emissions } = transition;
            if !deliver(sink, generation, cancel, emissions) {
                return Ok(report.finish(RunOutcome::Cancelled { state: Some(state) }));
            }

            match next {
                None => {
                    info!(generation, stage = %state, "Pipeline halted");
                    return Ok(report.finish(halt_outcome));
                }
                Some(next) if next.is_terminal() => break,
                Some(next) => state = next,
            }
        }

        info!(generation, stages = report.stages.len(), "Pipeline completed");
        Ok(report.finish(RunOutcome::Completed))
    }
}

fn exec_outcome(state: PipelineState, err: &ExecError) -> RunOutcome {
    match err {
        ExecError::ToolNotFound { program } => RunOutcome::ToolNotFound {
            state,
            program: program.clone(),
        },
        ExecError::TimedOut { program, secs } => RunOutcome::TimedOut {
            state,
            program: program.clone(),
            secs: *secs,
        },
        ExecError::SpawnFailed { .. } => RunOutcome::SpawnFailed {
            state,
            message: err.to_string(),
        },
        ExecError::Cancelled => RunOutcome::Cancelled { state: Some(state) },
    }
}

/// Emit in order, stopping at the first point cancellation is observed.
fn deliver(
    sink: &dyn EventSink,
    generation: u64,
    cancel: &CancellationToken,
    emissions: Vec<Emission>,
) -> bool {
    for emission in emissions {
        if cancel.is_cancelled() {
            return false;
        }
        sink.emit(generation, emission);
    }
    true
}

/// A run in flight.
pub struct RunHandle {
    pub generation: u64,
    cancel: CancellationToken,
    join: JoinHandle<Result<RunReport, PipelineError>>,
}

impl RunHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn wait(self) -> Result<RunReport, PipelineError> {
        self.join
            .await
            .map_err(|e| PipelineError::WorkerPanicked(e.to_string()))?
    }
}

/// Start a run on the tokio runtime, superseding any run `gate` knows of.
pub fn run_pipeline(
    gate: &RunGate,
    runner: Arc<PipelineRunner>,
    source: impl Into<String>,
    workspace: Arc<Workspace>,
    sink: Arc<dyn EventSink>,
) -> RunHandle {
    let ticket = gate.begin();
    let generation = ticket.generation;
    let cancel = ticket.cancel.clone();
    let source = source.into();

    let join = tokio::spawn(async move {
        let _guard = ticket.acquire().await;
        runner
            .run(
                &source,
                &workspace,
                sink.as_ref(),
                ticket.generation,
                &ticket.cancel,
            )
            .await
    });

    RunHandle {
        generation,
        cancel,
        join,
    }
}
