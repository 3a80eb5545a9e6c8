use crate::orchestrator::{OutputChannel, PipelineState};
use crate::ui::icons::{CHECK, CLOCK, CROSS, FILE_NEW, STOP};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Terminal UI for a pipeline run, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Stage bar, tracking how far through the seven stages the run is
/// - Status spinner, showing the latest status text
///
/// Every method only draws; it is safe to call from the event dispatcher.
pub struct PipelineUI {
    multi: MultiProgress,
    stage_bar: ProgressBar,
    spinner: ProgressBar,
    verbose: bool,
}

impl PipelineUI {
    pub fn new(verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let stage_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:30.cyan/blue}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░");
        let stage_bar = multi.add(ProgressBar::new(PipelineState::STAGES.len() as u64));
        stage_bar.set_style(stage_style);
        stage_bar.set_prefix("Stages");

        let spinner_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        let spinner = multi.add(ProgressBar::new_spinner());
        spinner.set_style(spinner_style);
        spinner.set_prefix("Status");
        spinner.enable_steady_tick(Duration::from_millis(100));

        Self {
            multi,
            stage_bar,
            spinner,
            verbose,
        }
    }

    /// Print a line above the bars, falling back to stderr if drawing fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Show a status text and move the stage bar to the stage it announces.
    pub fn status(&self, text: &str) {
        if let Some(position) = stage_position(text) {
            self.stage_bar.set_position(position);
        }
        self.spinner.set_message(text.to_string());
        if self.verbose {
            self.print_line(format!("  {} {}", style("→").dim(), style(text).dim()));
        }
    }

    /// Note that a channel received text.
    pub fn output(&self, channel: OutputChannel, text: &str) {
        if self.verbose {
            self.print_line(format!(
                "  {}{} output: {} lines",
                FILE_NEW,
                style(channel).cyan(),
                text.lines().count()
            ));
        }
    }

    pub fn output_written(&self, path: &Path) {
        self.print_line(format!("  {}{}", FILE_NEW, style(path.display()).green()));
    }

    pub fn finish_success(&self, elapsed: Duration) {
        self.stage_bar.finish();
        self.spinner.finish_with_message(format!(
            "{}Ready {}{:.1}s",
            CHECK,
            CLOCK,
            elapsed.as_secs_f64()
        ));
    }

    pub fn finish_failure(&self, reason: &str) {
        self.stage_bar.abandon();
        self.spinner
            .abandon_with_message(format!("{}{}", CROSS, style(reason).red()));
    }

    pub fn finish_cancelled(&self) {
        self.stage_bar.abandon();
        self.spinner
            .abandon_with_message(format!("{}{}", STOP, style("Cancelled").yellow()));
    }
}

/// Position on the stage bar for a status text, counting stages entered.
fn stage_position(text: &str) -> Option<u64> {
    if Some(text) == PipelineState::Ready.status_label() {
        return Some(PipelineState::STAGES.len() as u64);
    }
    PipelineState::STAGES
        .iter()
        .position(|s| s.status_label() == Some(text))
        .map(|i| i as u64 + 1)
}
