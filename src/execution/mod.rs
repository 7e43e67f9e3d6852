//! Workflow Execution Module
//!
//! Runs prompt chains against a completion provider, one step at a time,
//! with per-step retries and acceptance criteria.
//!
//! # Architecture
//!
//! - [`engine`]: Run orchestration, persistence and lifecycle events
//! - [`step`]: The attempt loop of a single step
//! - [`criteria`]: Acceptance criterion evaluation
//! - [`context`]: Derivation of the context passed to the next step
//! - [`registry`]: In-flight run tracking

pub mod context;
pub mod criteria;
pub mod engine;
pub mod registry;
pub mod step;

pub use context::extract;
pub use criteria::{evaluate, Judge, Verdict};
pub use engine::{Engine, EngineError, DEFAULT_JUDGE_MODEL, DEFAULT_RETRY_DELAY};
pub use registry::{ActiveRun, RunRegistry};
pub use step::render_prompt;
