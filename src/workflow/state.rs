//! Run State Records
//!
//! A [`Run`] is one execution of a workflow; each run owns one
//! [`StepExecution`] per step, created up front as `pending`.
//!
//! Records are only ever mutated through the partial updates
//! [`RunUpdate`] and [`StepExecutionUpdate`], whose `Some` fields
//! overwrite the stored value.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a run. Terminal once it leaves `Running`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Lifecycle of one step within a run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepExecutionStatus {
    Pending,
    Running,
    Passed,
    Failed,
}

impl fmt::Display for StepExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One execution instance of a workflow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Run {
    pub id: String,
    pub workflow_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Accumulated spend across every attempt of every step
    pub total_cost: f64,
    pub total_tokens: u64,
    /// Terminal failure message, naming the step and reason
    pub error: Option<String>,
}

impl Run {
    /// Creates a new running run for a workflow.
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            total_cost: 0.0,
            total_tokens: 0,
            error: None,
        }
    }

    /// Applies a partial update.
    pub fn apply(&mut self, update: RunUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(completed_at) = update.completed_at {
            self.completed_at = Some(completed_at);
        }
        if let Some(cost) = update.total_cost {
            self.total_cost = cost;
        }
        if let Some(tokens) = update.total_tokens {
            self.total_tokens = tokens;
        }
        if let Some(error) = update.error {
            self.error = Some(error);
        }
    }
}

/// Partial field set for [`Run`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunUpdate {
    pub status: Option<RunStatus>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_cost: Option<f64>,
    pub total_tokens: Option<u64>,
    pub error: Option<String>,
}

impl RunUpdate {
    /// Terminal update for a run that reached `status`.
    pub fn finished(status: RunStatus) -> Self {
        Self {
            status: Some(status),
            completed_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    pub fn with_totals(mut self, cost: f64, tokens: u64) -> Self {
        self.total_cost = Some(cost);
        self.total_tokens = Some(tokens);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// The per-step record of one run's attempts.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StepExecution {
    pub id: String,
    pub run_id: String,
    pub step_id: String,
    pub status: StepExecutionStatus,
    pub attempts: u32,
    /// Context actually handed to the step
    pub input_context: Option<String>,
    /// Text of the last attempt that produced output
    pub output: Option<String>,
    /// Last failure reason, `None` once passed
    pub error: Option<String>,
    pub tokens_used: u64,
    pub cost: f64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepExecution {
    /// Creates a pending execution record.
    pub fn new(run_id: impl Into<String>, step_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.into(),
            step_id: step_id.into(),
            status: StepExecutionStatus::Pending,
            attempts: 0,
            input_context: None,
            output: None,
            error: None,
            tokens_used: 0,
            cost: 0.0,
            started_at: None,
            completed_at: None,
        }
    }

    /// Applies a partial update.
    pub fn apply(&mut self, update: StepExecutionUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(attempts) = update.attempts {
            self.attempts = attempts;
        }
        if let Some(input_context) = update.input_context {
            self.input_context = Some(input_context);
        }
        if let Some(output) = update.output {
            self.output = output;
        }
        if let Some(error) = update.error {
            self.error = error;
        }
        if let Some(tokens) = update.tokens_used {
            self.tokens_used = tokens;
        }
        if let Some(cost) = update.cost {
            self.cost = cost;
        }
        if let Some(started_at) = update.started_at {
            self.started_at = Some(started_at);
        }
        if let Some(completed_at) = update.completed_at {
            self.completed_at = Some(completed_at);
        }
    }
}

/// Partial field set for [`StepExecution`].
///
/// `output` and `error` are doubly optional so an update can clear them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepExecutionUpdate {
    pub status: Option<StepExecutionStatus>,
    pub attempts: Option<u32>,
    pub input_context: Option<String>,
    pub output: Option<Option<String>>,
    pub error: Option<Option<String>>,
    pub tokens_used: Option<u64>,
    pub cost: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StepExecutionUpdate {
    /// Marks the step running with the context it was given.
    pub fn started(input_context: impl Into<String>) -> Self {
        Self {
            status: Some(StepExecutionStatus::Running),
            input_context: Some(input_context.into()),
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_creation() {
        let run = Run::new("wf-1");
        assert_eq!(run.workflow_id, "wf-1");
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.completed_at.is_none());
        assert_eq!(run.total_tokens, 0);
    }

    #[test]
    fn test_run_apply_partial() {
        let mut run = Run::new("wf-1");
        run.apply(RunUpdate::finished(RunStatus::Failed).with_error("Step 'a' failed"));

        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.completed_at.is_some());
        assert_eq!(run.error.as_deref(), Some("Step 'a' failed"));
        // Totals untouched when not supplied
        assert_eq!(run.total_cost, 0.0);

        run.apply(RunUpdate::default().with_totals(0.25, 120));
        assert_eq!(run.total_cost, 0.25);
        assert_eq!(run.total_tokens, 120);
        assert_eq!(run.status, RunStatus::Failed);
    }

    #[test]
    fn test_status_terminal() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn test_step_execution_lifecycle() {
        let mut exec = StepExecution::new("run", "step");
        assert_eq!(exec.status, StepExecutionStatus::Pending);

        exec.apply(StepExecutionUpdate::started("ctx"));
        assert_eq!(exec.status, StepExecutionStatus::Running);
        assert_eq!(exec.input_context.as_deref(), Some("ctx"));
        assert!(exec.started_at.is_some());

        exec.apply(StepExecutionUpdate {
            status: Some(StepExecutionStatus::Failed),
            error: Some(Some("missing XYZ".to_string())),
            attempts: Some(2),
            ..Default::default()
        });
        assert_eq!(exec.error.as_deref(), Some("missing XYZ"));

        exec.apply(StepExecutionUpdate {
            status: Some(StepExecutionStatus::Passed),
            error: Some(None),
            ..Default::default()
        });
        assert!(exec.error.is_none());
        assert_eq!(exec.attempts, 2);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&StepExecutionStatus::Passed).unwrap();
        assert_eq!(json, "\"passed\"");
        assert_eq!(RunStatus::Completed.to_string(), "completed");
    }
}
