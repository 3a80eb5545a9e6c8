//! Delivery of pipeline notifications to the caller.
//!
//! The worker emits into an [`EventSink`]. [`ChannelSink`] forwards events
//! over an mpsc channel so the caller's own task delivers them, via
//! [`dispatch_events`], to a [`Callbacks`] bundle.

use super::gate::GenerationWatch;
use super::machine::Emission;
use super::state::OutputChannel;
use tokio::sync::mpsc;
use tracing::debug;

/// An emission tagged with the run that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineEvent {
    pub generation: u64,
    pub emission: Emission,
}

/// Receives emissions synchronously on the worker, in stage order.
pub trait EventSink: Send + Sync {
    fn emit(&self, generation: u64, emission: Emission);
}

/// Forwards emissions to the caller's context.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, generation: u64, emission: Emission) {
        if self
            .tx
            .send(PipelineEvent {
                generation,
                emission,
            })
            .is_err()
        {
            debug!(generation, "Event receiver dropped; discarding emission");
        }
    }
}

type TextCallback = Box<dyn FnMut(&str) + Send>;

/// The four caller notifications.
pub struct Callbacks {
    on_status: TextCallback,
    on_bytecode_output: TextCallback,
    on_optimized_output: TextCallback,
    on_native_output: TextCallback,
}

impl Default for Callbacks {
    fn default() -> Self {
        Self {
            on_status: Box::new(|_| {}),
            on_bytecode_output: Box::new(|_| {}),
            on_optimized_output: Box::new(|_| {}),
            on_native_output: Box::new(|_| {}),
        }
    }
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_status(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_status = Box::new(f);
        self
    }

    pub fn on_bytecode_output(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_bytecode_output = Box::new(f);
        self
    }

    pub fn on_optimized_output(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_optimized_output = Box::new(f);
        self
    }

    pub fn on_native_output(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_native_output = Box::new(f);
        self
    }

    pub fn deliver(&mut self, emission: &Emission) {
        match emission {
            Emission::Status { text } => (self.on_status)(text),
            Emission::Output { channel, text } => match channel {
                OutputChannel::Bytecode => (self.on_bytecode_output)(text),
                OutputChannel::Optimized => (self.on_optimized_output)(text),
                OutputChannel::Native => (self.on_native_output)(text),
            },
        }
    }
}

/// Drain `rx` on the caller's task, dropping events from superseded runs.
///
/// Returns once every sender is gone.
pub async fn dispatch_events(
    mut rx: mpsc::UnboundedReceiver<PipelineEvent>,
    watch: GenerationWatch,
    callbacks: &mut Callbacks,
) {
    while let Some(event) = rx.recv().await {
        if !watch.is_current(event.generation) {
            debug!(generation = event.generation, "Dropping event from superseded run");
            continue;
        }
        callbacks.deliver(&event.emission);
    }
}
