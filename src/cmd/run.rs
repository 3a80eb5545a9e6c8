//! Pipeline execution, `dexplorer run <SOURCE>`.

use anyhow::{Context, Result};
use console::style;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::super::{Cli, RunArgs};
use dexplorer::config::{Config, ConfigOverrides};
use dexplorer::orchestrator::{
    Callbacks, ChannelSink, OutputChannel, PipelineRunner, RunGate, dispatch_events, run_pipeline,
};
use dexplorer::process::SystemExecutor;
use dexplorer::report::RunOutcome;
use dexplorer::ui::PipelineUI;
use dexplorer::workspace::Workspace;

const CHANNELS: [OutputChannel; 3] = [
    OutputChannel::Bytecode,
    OutputChannel::Optimized,
    OutputChannel::Native,
];

/// File written under `--out-dir` for each channel.
pub fn output_file_name(channel: OutputChannel) -> &'static str {
    match channel {
        OutputChannel::Bytecode => "bytecode.txt",
        OutputChannel::Optimized => "dex.txt",
        OutputChannel::Native => "oat.txt",
    }
}

/// Last text delivered to each channel.
#[derive(Debug, Default)]
struct CapturedOutputs {
    bytecode: Option<String>,
    optimized: Option<String>,
    native: Option<String>,
}

impl CapturedOutputs {
    fn slot(&mut self, channel: OutputChannel) -> &mut Option<String> {
        match channel {
            OutputChannel::Bytecode => &mut self.bytecode,
            OutputChannel::Optimized => &mut self.optimized,
            OutputChannel::Native => &mut self.native,
        }
    }

    fn get(&self, channel: OutputChannel) -> Option<&str> {
        match channel {
            OutputChannel::Bytecode => self.bytecode.as_deref(),
            OutputChannel::Optimized => self.optimized.as_deref(),
            OutputChannel::Native => self.native.as_deref(),
        }
    }
}

fn read_source(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .context("Failed to read source from stdin")?;
        return Ok(source);
    }
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read source file: {}", path.display()))
}

fn output_callback(
    channel: OutputChannel,
    ui: &Arc<PipelineUI>,
    outputs: &Arc<Mutex<CapturedOutputs>>,
) -> impl FnMut(&str) + Send + 'static {
    let ui = Arc::clone(ui);
    let outputs = Arc::clone(outputs);
    move |text: &str| {
        ui.output(channel, text);
        if let Ok(mut outputs) = outputs.lock() {
            *outputs.slot(channel) = Some(text.to_string());
        }
    }
}

pub async fn cmd_run(cli: &Cli, args: &RunArgs) -> Result<()> {
    let source = read_source(&args.source)?;

    let overrides = ConfigOverrides {
        workspace: args.workspace.clone(),
        isolated: args.isolated,
        stage_timeout_secs: args.timeout,
    };
    let config = Config::load(cli.config.as_deref(), &overrides)?;
    match &config.source {
        Some(path) => debug!(config = %path.display(), "Loaded configuration file"),
        None => debug!("No configuration file found, using defaults"),
    }
    let tools = config.tool_paths()?;

    let workspace = if config.isolated {
        Workspace::ephemeral()?
    } else {
        Workspace::at(&config.workspace_dir)?
    };
    info!(
        workspace = %workspace.root().display(),
        isolated = workspace.is_ephemeral(),
        "Workspace ready"
    );

    let executor = Arc::new(SystemExecutor::with_timeout(config.stage_timeout));
    let runner = Arc::new(PipelineRunner::new(executor, tools));
    let gate = Arc::new(RunGate::new());
    let (sink, rx) = ChannelSink::new();

    let ui = Arc::new(PipelineUI::new(cli.verbose));
    let outputs = Arc::new(Mutex::new(CapturedOutputs::default()));
    let status_ui = Arc::clone(&ui);
    let mut callbacks = Callbacks::new()
        .on_status(move |text| status_ui.status(text))
        .on_bytecode_output(output_callback(OutputChannel::Bytecode, &ui, &outputs))
        .on_optimized_output(output_callback(OutputChannel::Optimized, &ui, &outputs))
        .on_native_output(output_callback(OutputChannel::Native, &ui, &outputs));

    let started = Instant::now();
    let handle = run_pipeline(
        &gate,
        runner,
        source,
        Arc::new(workspace),
        Arc::new(sink),
    );

    let interrupt_gate = Arc::clone(&gate);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            interrupt_gate.cancel_current();
        }
    });

    dispatch_events(rx, gate.watch(), &mut callbacks).await;
    let report = handle.wait().await;
    interrupt.abort();
    let report = report?;

    match &report.outcome {
        RunOutcome::Completed => ui.finish_success(started.elapsed()),
        RunOutcome::Cancelled { .. } => ui.finish_cancelled(),
        outcome => ui.finish_failure(&outcome.to_string()),
    }

    if let Some(path) = &args.report {
        report.save(path)?;
        info!(path = %path.display(), "Run report written");
    }

    drop(callbacks);
    let outputs = outputs
        .lock()
        .map_err(|_| anyhow::anyhow!("Output buffer lock poisoned"))?;
    match &args.out_dir {
        Some(dir) => write_outputs(dir, &outputs, &ui)?,
        None => print_outputs(&outputs),
    }

    if !report.is_success() {
        anyhow::bail!("Pipeline {}", report.outcome);
    }
    Ok(())
}

fn write_outputs(dir: &Path, outputs: &CapturedOutputs, ui: &PipelineUI) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
    for channel in CHANNELS {
        if let Some(text) = outputs.get(channel) {
            let path: PathBuf = dir.join(output_file_name(channel));
            std::fs::write(&path, text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            ui.output_written(&path);
        }
    }
    Ok(())
}

fn print_outputs(outputs: &CapturedOutputs) {
    for channel in CHANNELS {
        if let Some(text) = outputs.get(channel) {
            println!();
            println!(
                "{}",
                style(format!("── {} ──", output_file_name(channel))).cyan().bold()
            );
            println!("{}", text.trim_end());
        }
    }
}
