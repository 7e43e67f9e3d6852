//! Run Execution Engine
//!
//! The core engine that executes a workflow's steps strictly in order:
//! - Run and step execution records are created up front
//! - Each run is processed by its own spawned task
//! - Step outputs pass forward as derived context
//! - Cost and token totals are accumulated per step and per run
//! - Lifecycle events are broadcast without waiting on listeners
//!
//! Runs progress concurrently with each other; suspension happens only on
//! provider calls and the delay between attempts.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{error, info};
use thiserror::Error;
use tokio::sync::broadcast;

use super::context::extract;
use super::registry::{ActiveRun, RunRegistry};
use super::step::{execute_step, StepEnv};
use crate::monitoring::{EventBus, EventKind, RunEvent};
use crate::provider::{CompletionProvider, ProviderJudge};
use crate::storage::{Store, StoreError};
use crate::workflow::{RunStatus, RunUpdate, Step, StepExecutionStatus, StepExecutionUpdate};

/// Wait between two attempts of the same step.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Low-cost model used to judge `llm` criteria.
pub const DEFAULT_JUDGE_MODEL: &str = "gpt-4o-mini";

/// Errors returned by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Workflow has no steps: {0}")]
    EmptyWorkflow(String),

    #[error("No step execution for step '{step_id}' in run '{run_id}'")]
    MissingStepExecution { run_id: String, step_id: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Workflow run execution engine.
///
/// Cloning is cheap; clones share the store, provider, event bus and
/// active-run registry.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use promptchain::execution::Engine;
/// use promptchain::provider::CommandProvider;
/// use promptchain::storage::InMemoryStore;
/// use promptchain::workflow::load_workflow;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = Arc::new(InMemoryStore::new());
///     let workflow_id = store.save_workflow(load_workflow("chain.yaml")?)?;
///
///     let engine = Engine::new(store, Arc::new(CommandProvider::new("llm -m {model}")));
///     let mut events = engine.subscribe();
///     let run_id = engine.execute(&workflow_id)?;
///
///     while let Ok(event) = events.recv().await {
///         if event.run_id == run_id && event.type_name() == "run_completed" {
///             break;
///         }
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn Store>,
    provider: Arc<dyn CompletionProvider>,
    events: EventBus,
    registry: Arc<RunRegistry>,
    retry_delay: Duration,
    judge_model: String,
}

impl Engine {
    /// Creates a new engine over a store and a completion provider.
    pub fn new(store: Arc<dyn Store>, provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            store,
            provider,
            events: EventBus::default(),
            registry: Arc::new(RunRegistry::new()),
            retry_delay: DEFAULT_RETRY_DELAY,
            judge_model: DEFAULT_JUDGE_MODEL.to_string(),
        }
    }

    /// Sets the delay between attempts of a step.
    pub fn set_retry_delay(&mut self, delay: Duration) {
        self.retry_delay = delay;
    }

    /// Sets the model used to judge `llm` criteria.
    pub fn set_judge_model(&mut self, model: impl Into<String>) {
        self.judge_model = model.into();
    }

    /// Replaces the event bus, e.g. to share one across engines.
    pub fn set_event_bus(&mut self, events: EventBus) {
        self.events = events;
    }

    /// Subscribes to lifecycle events of all runs.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    /// Status of an in-flight run; `None` once it has terminated.
    pub fn get_run_status(&self, run_id: &str) -> Option<ActiveRun> {
        self.registry.get(run_id)
    }

    /// Number of runs still in flight.
    pub fn active_runs(&self) -> usize {
        self.registry.len()
    }

    /// Starts a run of a workflow and returns its id without waiting.
    ///
    /// Fails before creating any record if the workflow is missing or has
    /// no steps. Must be called from within a Tokio runtime.
    pub fn execute(&self, workflow_id: &str) -> Result<String, EngineError> {
        let workflow = self
            .store
            .get_workflow(workflow_id)?
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;

        let steps = self.store.get_workflow_steps(workflow_id)?;
        if steps.is_empty() {
            return Err(EngineError::EmptyWorkflow(workflow_id.to_string()));
        }

        let run = self.store.create_run(workflow_id)?;
        if let Err(e) = self.create_step_executions(&run.id, &steps) {
            let update = RunUpdate::finished(RunStatus::Failed).with_error(e.to_string());
            if let Err(update_err) = self.store.update_run(&run.id, update) {
                error!("Failed to mark run '{}' failed: {}", run.id, update_err);
            }
            return Err(e);
        }

        self.registry.register(&run.id, workflow_id);

        info!(
            "Starting run '{}' of workflow '{}' ({} steps)",
            run.id,
            workflow.name,
            steps.len()
        );

        let engine = self.clone();
        let run_id = run.id.clone();
        tokio::spawn(async move { engine.supervise(run_id, steps).await });

        Ok(run.id)
    }

    fn create_step_executions(&self, run_id: &str, steps: &[Step]) -> Result<(), EngineError> {
        for step in steps {
            self.store.create_step_execution(run_id, &step.id)?;
        }
        Ok(())
    }

    fn emit(&self, run_id: &str, kind: EventKind) {
        self.events.publish(RunEvent::new(run_id, kind));
    }

    /// Runs the step sequence in its own task and turns any error or panic
    /// into a failed run.
    async fn supervise(self, run_id: String, steps: Vec<Step>) {
        let worker = self.clone();
        let id = run_id.clone();
        let result = tokio::spawn(async move { worker.process_run(&id, &steps).await }).await;

        let failure = match result {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(e) => format!("Run task aborted: {}", e),
        };

        error!("Run '{}' failed unexpectedly: {}", run_id, failure);
        self.abort_run(&run_id, &failure);
    }

    /// Records an unexpected failure. Every step of this is best effort.
    fn abort_run(&self, run_id: &str, message: &str) {
        let update = RunUpdate::finished(RunStatus::Failed).with_error(message);
        if let Err(e) = self.store.update_run(run_id, update) {
            error!("Failed to record failure of run '{}': {}", run_id, e);
        }

        if self.registry.deregister(run_id).is_none() {
            return;
        }

        let (total_cost, total_tokens) = match self.store.get_run(run_id) {
            Ok(Some(run)) => (run.total_cost, run.total_tokens),
            _ => (0.0, 0),
        };

        self.emit(
            run_id,
            EventKind::RunCompleted {
                status: RunStatus::Failed,
                total_cost,
                total_tokens,
                error: Some(message.to_string()),
            },
        );
    }

    /// Executes every step in order, stopping at the first failed step.
    async fn process_run(&self, run_id: &str, steps: &[Step]) -> Result<(), EngineError> {
        let judge = ProviderJudge::new(Arc::clone(&self.provider), self.judge_model.clone());
        let env = StepEnv {
            run_id,
            provider: self.provider.as_ref(),
            judge: &judge,
            events: &self.events,
            retry_delay: self.retry_delay,
        };

        let mut context = String::new();
        let mut total_cost = 0.0;
        let mut total_tokens = 0u64;

        for (index, step) in steps.iter().enumerate() {
            let execution = self
                .store
                .get_step_execution(run_id, &step.id)?
                .ok_or_else(|| EngineError::MissingStepExecution {
                    run_id: run_id.to_string(),
                    step_id: step.id.clone(),
                })?;

            self.store
                .update_step_execution(&execution.id, StepExecutionUpdate::started(context.clone()))?;

            info!(
                "Run '{}': step {}/{} '{}' ({})",
                run_id,
                index + 1,
                steps.len(),
                step.name,
                step.model
            );

            self.emit(
                run_id,
                EventKind::StepStarted {
                    step_id: step.id.clone(),
                    step_name: step.name.clone(),
                    step_index: index,
                    input_context: context.clone(),
                },
            );

            let outcome = execute_step(step, &context, &env).await;

            let status = if outcome.passed {
                StepExecutionStatus::Passed
            } else {
                StepExecutionStatus::Failed
            };
            self.store.update_step_execution(
                &execution.id,
                StepExecutionUpdate {
                    status: Some(status),
                    attempts: Some(outcome.attempts),
                    output: Some(outcome.output.clone()),
                    error: Some(outcome.error.clone()),
                    tokens_used: Some(outcome.tokens),
                    cost: Some(outcome.cost),
                    completed_at: Some(Utc::now()),
                    ..Default::default()
                },
            )?;

            total_cost += outcome.cost;
            total_tokens += outcome.tokens;
            self.store
                .update_run(run_id, RunUpdate::default().with_totals(total_cost, total_tokens))?;

            if !outcome.passed {
                let reason = outcome
                    .error
                    .unwrap_or_else(|| "no reason recorded".to_string());

                self.emit(
                    run_id,
                    EventKind::StepCompleted {
                        step_id: step.id.clone(),
                        step_name: step.name.clone(),
                        passed: false,
                        attempts: outcome.attempts,
                        reason: Some(reason.clone()),
                        tokens: outcome.tokens,
                        cost: outcome.cost,
                    },
                );

                let message = format!(
                    "Step '{}' failed after {} attempt(s): {}",
                    step.name, outcome.attempts, reason
                );
                return self.finish_run(run_id, RunStatus::Failed, total_cost, total_tokens, Some(message));
            }

            context = extract(outcome.output.as_deref().unwrap_or_default(), step.context_mode);

            self.emit(
                run_id,
                EventKind::StepCompleted {
                    step_id: step.id.clone(),
                    step_name: step.name.clone(),
                    passed: true,
                    attempts: outcome.attempts,
                    reason: None,
                    tokens: outcome.tokens,
                    cost: outcome.cost,
                },
            );
        }

        self.finish_run(run_id, RunStatus::Completed, total_cost, total_tokens, None)
    }

    /// Persists the terminal run state, deregisters, and announces it.
    fn finish_run(
        &self,
        run_id: &str,
        status: RunStatus,
        total_cost: f64,
        total_tokens: u64,
        error: Option<String>,
    ) -> Result<(), EngineError> {
        let mut update = RunUpdate::finished(status).with_totals(total_cost, total_tokens);
        if let Some(ref message) = error {
            update = update.with_error(message.clone());
        }
        self.store.update_run(run_id, update)?;

        match &error {
            Some(message) => error!("Run '{}' failed: {}", run_id, message),
            None => info!(
                "Run '{}' completed: {} tokens, ${:.4}",
                run_id, total_tokens, total_cost
            ),
        }

        if self.registry.deregister(run_id).is_some() {
            self.emit(
                run_id,
                EventKind::RunCompleted {
                    status,
                    total_cost,
                    total_tokens,
                    error,
                },
            );
        }

        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("active_runs", &self.registry.len())
            .field("retry_delay", &self.retry_delay)
            .field("judge_model", &self.judge_model)
            .finish()
    }
}
