//! Workflow Validation
//!
//! Provides validation for workflow definitions including:
//! - Step field validation
//! - Step name uniqueness
//! - Criterion value sanity checks

use std::collections::HashSet;

use log::{debug, info, warn};
use regex::RegexBuilder;

use super::model::{ContextMode, CriterionKind, Step, Workflow};

/// Validation error types for user-friendly error messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyWorkflow,
    DuplicateStepName(String),
    EmptyStepName,
    EmptyModel(String),
    EmptyPrompt(String),
    ZeroRetryLimit(String),
    InvalidPattern { step: String, error: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyWorkflow => write!(f, "Workflow has no steps"),
            Self::DuplicateStepName(name) => write!(f, "Duplicate step name: '{}'", name),
            Self::EmptyStepName => write!(f, "Step has empty or whitespace-only name"),
            Self::EmptyModel(step) => write!(f, "Step '{}' has no model specified", step),
            Self::EmptyPrompt(step) => write!(f, "Step '{}' has no prompt specified", step),
            Self::ZeroRetryLimit(step) => {
                write!(f, "Step '{}' has a retry limit of 0 (must be at least 1)", step)
            }
            Self::InvalidPattern { step, error } => {
                write!(f, "Step '{}': regex criterion does not compile: {}", step, error)
            }
        }
    }
}

/// Validates a single step's fields.
fn validate_step(step: &Step) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if step.name.trim().is_empty() {
        errors.push(ValidationError::EmptyStepName);
        return errors; // Can't name anything further without a name
    }

    if step.model.trim().is_empty() {
        errors.push(ValidationError::EmptyModel(step.name.clone()));
    }

    if step.prompt.trim().is_empty() {
        errors.push(ValidationError::EmptyPrompt(step.name.clone()));
    }

    if step.retry_limit == 0 {
        errors.push(ValidationError::ZeroRetryLimit(step.name.clone()));
    }

    match step.criteria_type {
        CriterionKind::Regex if !step.criteria_value.is_empty() => {
            if let Err(e) = RegexBuilder::new(&step.criteria_value)
                .case_insensitive(true)
                .multi_line(true)
                .build()
            {
                errors.push(ValidationError::InvalidPattern {
                    step: step.name.clone(),
                    error: e.to_string(),
                });
            }
        }
        CriterionKind::LengthMin | CriterionKind::LengthMax => {
            if step.criteria_value.trim().parse::<usize>().is_err() {
                warn!(
                    "Step '{}': length limit '{}' is not an integer, default will apply",
                    step.name, step.criteria_value
                );
            }
        }
        CriterionKind::Llm if step.criteria_value.trim().is_empty() => {
            warn!("Step '{}': llm criterion has no instructions for the judge", step.name);
        }
        CriterionKind::Unrecognized => {
            warn!("Step '{}': unrecognized criterion kind, output will auto-pass", step.name);
        }
        _ => {}
    }

    if step.context_mode == ContextMode::Unrecognized {
        warn!(
            "Step '{}': unrecognized context mode, full output will be passed on",
            step.name
        );
    }

    if step.uses_context_placeholder() {
        debug!("Step '{}' folds context into its prompt", step.name);
    }

    errors
}

/// Validates the entire workflow structure.
///
/// Performs the following checks:
/// 1. Workflow is not empty
/// 2. No duplicate step names
/// 3. All steps have valid fields
pub fn validate_workflow(workflow: &Workflow) -> Result<(), String> {
    info!("Validating workflow '{}' with {} steps", workflow.name, workflow.steps.len());

    if workflow.steps.is_empty() {
        return Err(ValidationError::EmptyWorkflow.to_string());
    }

    let mut seen_names: HashSet<&str> = HashSet::new();
    for step in &workflow.steps {
        if !step.name.trim().is_empty() && !seen_names.insert(step.name.as_str()) {
            return Err(ValidationError::DuplicateStepName(step.name.clone()).to_string());
        }
    }

    let all_errors: Vec<ValidationError> =
        workflow.steps.iter().flat_map(validate_step).collect();

    if !all_errors.is_empty() {
        let error_messages: Vec<String> = all_errors.iter().map(|e| e.to_string()).collect();
        return Err(error_messages.join("\n"));
    }

    info!("Workflow validated: {} steps", workflow.steps.len());
    Ok(())
}

/// Quick validation that returns a list of error messages.
///
/// Does not stop at the first problem.
pub fn quick_validate(workflow: &Workflow) -> Vec<String> {
    let mut errors = Vec::new();

    if workflow.steps.is_empty() {
        errors.push(ValidationError::EmptyWorkflow.to_string());
        return errors;
    }

    let mut seen_names: HashSet<&str> = HashSet::new();
    for step in &workflow.steps {
        if !step.name.trim().is_empty() && !seen_names.insert(step.name.as_str()) {
            errors.push(ValidationError::DuplicateStepName(step.name.clone()).to_string());
        }
        errors.extend(validate_step(step).iter().map(|e| e.to_string()));
    }

    errors
}
