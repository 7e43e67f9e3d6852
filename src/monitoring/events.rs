//! Run Lifecycle Events
//!
//! The engine publishes a [`RunEvent`] at every step and run transition.
//! Delivery is best effort: [`EventBus`] wraps a `tokio::sync::broadcast`
//! channel, publishing never waits, events with no subscriber are dropped,
//! and a subscriber that falls behind loses the oldest events.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::provider::TokenUsage;
use crate::workflow::RunStatus;

/// Default number of buffered events per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// One lifecycle event of a run.
///
/// Serializes flat: `{"run_id": ..., "type": "step_started", ..., "timestamp": ...}`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RunEvent {
    pub run_id: String,
    #[serde(flatten)]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
}

impl RunEvent {
    pub fn new(run_id: impl Into<String>, kind: EventKind) -> Self {
        Self {
            run_id: run_id.into(),
            kind,
            timestamp: Utc::now(),
        }
    }

    /// The wire name of this event's type.
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }
}

/// Event payloads.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    StepStarted {
        step_id: String,
        step_name: String,
        step_index: usize,
        input_context: String,
    },
    StepAttempt {
        step_id: String,
        attempt: u32,
        max_attempts: u32,
    },
    StepResponse {
        step_id: String,
        attempt: u32,
        output: String,
        tokens: TokenUsage,
        cost: f64,
    },
    StepEvaluated {
        step_id: String,
        attempt: u32,
        passed: bool,
        reason: String,
    },
    StepError {
        step_id: String,
        attempt: u32,
        error: String,
    },
    StepCompleted {
        step_id: String,
        step_name: String,
        passed: bool,
        attempts: u32,
        reason: Option<String>,
        tokens: u64,
        cost: f64,
    },
    RunCompleted {
        status: RunStatus,
        total_cost: f64,
        total_tokens: u64,
        error: Option<String>,
    },
}

impl EventKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::StepStarted { .. } => "step_started",
            Self::StepAttempt { .. } => "step_attempt",
            Self::StepResponse { .. } => "step_response",
            Self::StepEvaluated { .. } => "step_evaluated",
            Self::StepError { .. } => "step_error",
            Self::StepCompleted { .. } => "step_completed",
            Self::RunCompleted { .. } => "run_completed",
        }
    }
}

/// Multi-subscriber, fire-and-forget event channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl EventBus {
    /// Create a new event bus with the given per-subscriber capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Never blocks; with no subscribers the event is dropped.
    pub fn publish(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}
