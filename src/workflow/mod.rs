//! Workflow Definition Module
//!
//! Provides data structures and utilities for defining, parsing, and
//! validating prompt chains, plus the run records produced by executing them.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (Step, Workflow, criterion and context kinds)
//! - [`parser`]: YAML parsing and loading
//! - [`validator`]: Validation rules
//! - [`state`]: Run and step execution records

pub mod model;
pub mod parser;
pub mod state;
pub mod validator;

pub use model::{ContextMode, CriterionKind, Step, Workflow, CONTEXT_PLACEHOLDER};
pub use parser::{load_workflow, parse_workflow};
pub use state::{
    Run, RunStatus, RunUpdate, StepExecution, StepExecutionStatus, StepExecutionUpdate,
};
pub use validator::{quick_validate, validate_workflow};
