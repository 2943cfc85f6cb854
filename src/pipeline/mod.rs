//! Decision Pipeline
//!
//! ```text
//! EventSource ──► ProcessingLoop ──► PlantWorkers ──┬─► worker RJ01 ─┐
//!       ▲               ▲                           ├─► worker GJ01 ─┼─► DecisionEmitter ─► Publisher
//!       │               │                           └─► worker TN01 ─┘
//!   (synthetic,    POST /events
//!   replay, stdin)
//! ```
//!
//! Each worker owns one plant's [`PlantState`] and runs the chain
//! normalizer → forecaster → policy → compliance gate → emitter for every
//! event, with the anomaly detector reading the same pre-update band.

mod coordinator;
pub mod processing_loop;
pub mod source;
mod state;
pub mod workers;

pub use coordinator::{EventOutcome, PipelineContext, PipelineCoordinator, PipelineStats, PlantPipeline};
pub use processing_loop::{ControlSender, ProcessingLoop};
pub use source::{EventSource, ReplaySource, SourceEvent, StdinSource, SyntheticSource};
pub use state::*;
pub use workers::{PlantWorkers, SubmitError};
