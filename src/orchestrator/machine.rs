//! Pure transition function of the pipeline.
//!
//! `advance` maps (state, stage result) to the next state and the ordered
//! notifications to deliver. It never touches processes or the file
//! system, so every sequencing rule is testable with plain values.

use super::state::{OutputChannel, OutputPolicy, PipelineState};
use crate::process::StageResult;
use serde::{Deserialize, Serialize};

/// One notification for the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Emission {
    Status { text: String },
    Output { channel: OutputChannel, text: String },
}

impl Emission {
    pub fn status(text: impl Into<String>) -> Self {
        Emission::Status { text: text.into() }
    }

    pub fn output(channel: OutputChannel, text: impl Into<String>) -> Self {
        Emission::Output {
            channel,
            text: text.into(),
        }
    }
}

/// Outcome of one step. `next == None` means the run halts here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: Option<PipelineState>,
    pub emissions: Vec<Emission>,
}

impl Transition {
    pub fn halts(&self) -> bool {
        self.next.is_none()
    }
}

/// Notifications produced by entering `state`.
pub fn enter(state: PipelineState) -> Vec<Emission> {
    state
        .status_label()
        .map(|label| vec![Emission::status(label)])
        .unwrap_or_default()
}

/// Step after `state`'s tool finished with `result`.
pub fn advance(state: PipelineState, result: &StageResult) -> Transition {
    let failed = !result.success();
    let mut emissions = Vec::new();

    if let Some(channel) = state.output_channel()
        && (failed || state.output_policy() == OutputPolicy::Always)
    {
        emissions.push(Emission::output(channel, result.output.clone()));
    }

    if failed {
        return Transition {
            next: None,
            emissions,
        };
    }

    let next = state.next();
    if let Some(next) = next {
        emissions.extend(enter(next));
    }
    Transition { next, emissions }
}

/// Step after `state`'s tool could not produce a result at all.
///
/// The diagnostic goes to the stage's channel, like a tool's own error
/// output would, and the run halts.
pub fn abort(state: PipelineState, diagnostic: impl Into<String>) -> Transition {
    let emissions = state
        .output_channel()
        .map(|channel| vec![Emission::output(channel, diagnostic)])
        .unwrap_or_default();
    Transition {
        next: None,
        emissions,
    }
}
