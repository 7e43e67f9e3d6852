//! In-Memory Store
//!
//! Keeps workflows and run records in memory. When a snapshot path is
//! configured, the whole state is written to it as JSON after every
//! mutation, enabling inspection of run history after the process exits.
//! Snapshot writes are best effort: a failed write is logged, never
//! surfaced to the engine.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::{Store, StoreError};
use crate::workflow::{Run, RunUpdate, Step, StepExecution, StepExecutionUpdate, Workflow};

/// Serializable store contents.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
struct StoreState {
    workflows: HashMap<String, Workflow>,
    runs: HashMap<String, Run>,
    /// Kept in creation order, which is step order within a run
    step_executions: Vec<StepExecution>,
}

/// Thread-safe in-memory [`Store`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
    snapshot_path: Option<PathBuf>,
    /// Held while a snapshot is serialized and written
    snapshot_lock: Mutex<()>,
}

impl InMemoryStore {
    /// Creates an empty store without snapshotting.
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a JSON snapshot to `path` after every mutation.
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    /// Restores a store from a snapshot file and keeps snapshotting to it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let state: StoreState = serde_json::from_str(&content)?;

        info!(
            "Loaded store snapshot from {} ({} workflows, {} runs)",
            path.display(),
            state.workflows.len(),
            state.runs.len()
        );

        Ok(Self {
            state: RwLock::new(state),
            snapshot_path: Some(path.to_path_buf()),
            snapshot_lock: Mutex::new(()),
        })
    }

    /// Adds or replaces a workflow definition, returning its id.
    ///
    /// Runs already in flight keep the steps they started with.
    pub fn save_workflow(&self, workflow: Workflow) -> Result<String, StoreError> {
        let id = workflow.id.clone();
        {
            let mut state = self.write()?;
            state.workflows.insert(id.clone(), workflow);
        }
        self.persist();
        Ok(id)
    }

    /// All runs, oldest first.
    pub fn list_runs(&self) -> Result<Vec<Run>, StoreError> {
        let state = self.read()?;
        let mut runs: Vec<Run> = state.runs.values().cloned().collect();
        runs.sort_by_key(|r| r.started_at);
        Ok(runs)
    }

    /// Step executions of a run, in step order.
    pub fn list_step_executions(&self, run_id: &str) -> Result<Vec<StepExecution>, StoreError> {
        let state = self.read()?;
        Ok(state
            .step_executions
            .iter()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>, StoreError> {
        self.state.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>, StoreError> {
        self.state.write().map_err(|_| StoreError::Poisoned)
    }

    /// Overwrites the snapshot file, if any. Failures are only logged.
    fn persist(&self) {
        let Some(ref path) = self.snapshot_path else {
            return;
        };

        if let Err(e) = self.write_snapshot(path) {
            warn!("Failed to write store snapshot {}: {}", path.display(), e);
        }
    }

    /// Serializes and writes the snapshot under `snapshot_lock`, so writes
    /// land in the order their state was read and the file never goes
    /// backwards. The file is replaced atomically through a sibling temp file.
    fn write_snapshot(&self, path: &Path) -> Result<(), StoreError> {
        let _guard = self.snapshot_lock.lock().map_err(|_| StoreError::Poisoned)?;

        let json = {
            let state = self.read()?;
            serde_json::to_string_pretty(&*state)?
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
        temp_name.push(".tmp");
        let temp_path = path.with_file_name(temp_name);

        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, path)?;

        debug!("Saved store snapshot to {}", path.display());
        Ok(())
    }
}

impl Store for InMemoryStore {
    fn get_workflow(&self, id: &str) -> Result<Option<Workflow>, StoreError> {
        Ok(self.read()?.workflows.get(id).cloned())
    }

    fn get_workflow_steps(&self, id: &str) -> Result<Vec<Step>, StoreError> {
        let state = self.read()?;
        let workflow = state
            .workflows
            .get(id)
            .ok_or_else(|| StoreError::not_found("Workflow", id))?;
        Ok(workflow.steps.clone())
    }

    fn create_run(&self, workflow_id: &str) -> Result<Run, StoreError> {
        let run = Run::new(workflow_id);
        {
            let mut state = self.write()?;
            state.runs.insert(run.id.clone(), run.clone());
        }
        self.persist();
        Ok(run)
    }

    fn get_run(&self, id: &str) -> Result<Option<Run>, StoreError> {
        Ok(self.read()?.runs.get(id).cloned())
    }

    fn update_run(&self, id: &str, update: RunUpdate) -> Result<(), StoreError> {
        {
            let mut state = self.write()?;
            let run = state
                .runs
                .get_mut(id)
                .ok_or_else(|| StoreError::not_found("Run", id))?;
            run.apply(update);
        }
        self.persist();
        Ok(())
    }

    fn create_step_execution(
        &self,
        run_id: &str,
        step_id: &str,
    ) -> Result<StepExecution, StoreError> {
        let execution = StepExecution::new(run_id, step_id);
        {
            let mut state = self.write()?;
            if !state.runs.contains_key(run_id) {
                return Err(StoreError::not_found("Run", run_id));
            }
            state.step_executions.push(execution.clone());
        }
        self.persist();
        Ok(execution)
    }

    fn get_step_execution(
        &self,
        run_id: &str,
        step_id: &str,
    ) -> Result<Option<StepExecution>, StoreError> {
        let state = self.read()?;
        Ok(state
            .step_executions
            .iter()
            .find(|e| e.run_id == run_id && e.step_id == step_id)
            .cloned())
    }

    fn update_step_execution(
        &self,
        id: &str,
        update: StepExecutionUpdate,
    ) -> Result<(), StoreError> {
        {
            let mut state = self.write()?;
            let execution = state
                .step_executions
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or_else(|| StoreError::not_found("StepExecution", id))?;
            execution.apply(update);
        }
        self.persist();
        Ok(())
    }
}
