//! Monitoring Module
//!
//! Provides the run lifecycle event stream and an execution timeline
//! built from it.
//!
//! # Components
//!
//! - [`EventBus`]: Best-effort broadcast of [`RunEvent`]s
//! - [`ExecutionTimeline`]: Per-step spans, attempts and spend for the run chart

pub mod events;
pub mod timeline;

pub use events::{EventBus, EventKind, RunEvent, DEFAULT_EVENT_CAPACITY};
pub use timeline::{ExecutionTimeline, StepSpan};
