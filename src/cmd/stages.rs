//! `dexplorer stages`

use console::style;
use dexplorer::orchestrator::{OutputPolicy, PipelineState};

pub fn cmd_stages() {
    println!();
    println!(
        "{}",
        style(format!(
            "{:<3} {:<22} {:<26} {:<10} {}",
            "#", "STATE", "STATUS", "CHANNEL", "OUTPUT"
        ))
        .bold()
    );
    for (i, state) in PipelineState::STAGES.iter().enumerate() {
        let label = state.status_label().unwrap_or("(no status)");
        let channel = state
            .output_channel()
            .map(|c| c.to_string())
            .unwrap_or_default();
        let policy = match state.output_policy() {
            OutputPolicy::Always => "always",
            OutputPolicy::OnFailure => "on failure",
        };
        println!(
            "{:<3} {:<22} {:<26} {:<10} {}",
            i + 1,
            state.as_str(),
            label,
            channel,
            policy
        );
    }
    println!();
}
