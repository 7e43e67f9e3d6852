//! Persistence Module
//!
//! The engine reads workflow definitions and records run progress through
//! the [`Store`] trait. Calls are synchronous from the engine's point of
//! view; any error is fatal to the calling operation.
//!
//! - [`memory`]: In-memory store with optional JSON snapshot file

pub mod memory;

use thiserror::Error;

use crate::workflow::{Run, RunUpdate, Step, StepExecution, StepExecutionUpdate, Workflow};

pub use memory::InMemoryStore;

/// Errors raised by a [`Store`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Store lock poisoned")]
    Poisoned,

    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Persistence collaborator used by the execution engine.
pub trait Store: Send + Sync {
    fn get_workflow(&self, id: &str) -> Result<Option<Workflow>, StoreError>;

    /// Steps of a workflow, in execution order.
    fn get_workflow_steps(&self, id: &str) -> Result<Vec<Step>, StoreError>;

    fn create_run(&self, workflow_id: &str) -> Result<Run, StoreError>;

    fn get_run(&self, id: &str) -> Result<Option<Run>, StoreError>;

    fn update_run(&self, id: &str, update: RunUpdate) -> Result<(), StoreError>;

    fn create_step_execution(&self, run_id: &str, step_id: &str)
        -> Result<StepExecution, StoreError>;

    fn get_step_execution(
        &self,
        run_id: &str,
        step_id: &str,
    ) -> Result<Option<StepExecution>, StoreError>;

    fn update_step_execution(
        &self,
        id: &str,
        update: StepExecutionUpdate,
    ) -> Result<(), StoreError>;
}
