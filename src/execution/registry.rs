//! Active Run Registry
//!
//! Tracks runs that are still in flight. An entry is inserted when a run
//! starts and removed exactly once when it terminates; lookups by run id
//! may race freely with both.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::workflow::RunStatus;

/// Snapshot of an in-flight run.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveRun {
    pub workflow_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
}

/// Concurrent map of active runs keyed by run id.
#[derive(Debug, Default)]
pub struct RunRegistry {
    runs: DashMap<String, ActiveRun>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, run_id: &str, workflow_id: &str) {
        self.runs.insert(
            run_id.to_string(),
            ActiveRun {
                workflow_id: workflow_id.to_string(),
                status: RunStatus::Running,
                started_at: Utc::now(),
            },
        );
    }

    /// Removes a run, returning its entry if it was still registered.
    pub(crate) fn deregister(&self, run_id: &str) -> Option<ActiveRun> {
        self.runs.remove(run_id).map(|(_, run)| run)
    }

    pub fn get(&self, run_id: &str) -> Option<ActiveRun> {
        self.runs.get(run_id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let registry = RunRegistry::new();
        registry.register("run-1", "wf-1");

        let active = registry.get("run-1").unwrap();
        assert_eq!(active.workflow_id, "wf-1");
        assert_eq!(active.status, RunStatus::Running);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("run-2").is_none());
    }

    #[test]
    fn test_deregister_once() {
        let registry = RunRegistry::new();
        registry.register("run-1", "wf-1");

        assert!(registry.deregister("run-1").is_some());
        assert!(registry.deregister("run-1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(RunRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let id = format!("run-{i}");
                    registry.register(&id, "wf");
                    assert!(registry.get(&id).is_some());
                    registry.deregister(&id);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(registry.is_empty());
    }
}
