//! PromptChain - LLM Prompt Chain Execution Engine
//!
//! Runs multi-step prompt chains against a language model provider. Each
//! step's prompt is sent with context derived from the previous step's
//! output, and each response is checked against an acceptance criterion
//! with bounded retries.
//!
//! # Architecture
//!
//! The library is organized into five main modules:
//!
//! - [`workflow`]: Workflow definitions, YAML parsing and run records
//! - [`execution`]: Run engine, criteria evaluation and context extraction
//! - [`provider`]: Completion provider interface and implementations
//! - [`storage`]: Persistence of workflows, runs and step executions
//! - [`monitoring`]: Lifecycle events and execution timeline
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use promptchain::{load_workflow, CommandProvider, Engine, InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load a workflow from YAML
//!     let store = Arc::new(InMemoryStore::new());
//!     let workflow_id = store.save_workflow(load_workflow("chain.yaml")?)?;
//!
//!     // Create execution engine
//!     let provider = Arc::new(CommandProvider::new("llm -m {model}"));
//!     let engine = Engine::new(store, provider);
//!
//!     // Start the run; progress arrives on engine.subscribe()
//!     let run_id = engine.execute(&workflow_id)?;
//!     println!("started {}", run_id);
//!     Ok(())
//! }
//! ```

pub mod execution;
pub mod monitoring;
pub mod provider;
pub mod storage;
pub mod workflow;

// Re-export commonly used types
pub use execution::engine::Engine;
pub use provider::{CommandProvider, CompletionProvider};
pub use storage::{InMemoryStore, Store};
pub use workflow::model::{Step, Workflow};
pub use workflow::parser::load_workflow;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "PromptChain";
