pub mod events;
pub mod gate;
pub mod machine;
pub mod runner;
pub mod state;

pub use events::{Callbacks, ChannelSink, EventSink, PipelineEvent, dispatch_events};
pub use gate::{GenerationWatch, RunGate, RunTicket};
pub use machine::{Emission, Transition, advance, enter};
pub use runner::{PipelineRunner, RunHandle, run_pipeline};
pub use state::{OutputChannel, OutputPolicy, PipelineState};
