//! Workflow Parser
//!
//! Handles loading and parsing workflow definitions from YAML files.

use std::error::Error;
use std::fs;

use log::{debug, info};

use super::model::Workflow;
use super::validator::validate_workflow;

/// Parses a workflow from YAML text and validates it.
pub fn parse_workflow(yaml_content: &str) -> Result<Workflow, Box<dyn Error>> {
    let workflow: Workflow = serde_yaml::from_str(yaml_content).map_err(|e| {
        format!(
            "Failed to parse workflow YAML: {}. Check the file format.",
            e
        )
    })?;

    info!(
        "Parsed workflow '{}' with {} steps",
        workflow.name,
        workflow.steps.len()
    );

    validate_workflow(&workflow)?;

    Ok(workflow)
}

/// Loads a workflow from a YAML file.
///
/// This function:
/// 1. Reads and parses the YAML file
/// 2. Assigns identities to the workflow and steps that lack one
/// 3. Validates the workflow structure
///
/// # Example
///
/// ```rust,no_run
/// use promptchain::workflow::load_workflow;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let workflow = load_workflow("chain.yaml")?;
///     println!("Loaded {} steps", workflow.steps.len());
///     Ok(())
/// }
/// ```
pub fn load_workflow(path: &str) -> Result<Workflow, Box<dyn Error>> {
    info!("Loading workflow from: {}", path);

    let yaml_content = fs::read_to_string(path).map_err(|e| {
        format!(
            "Failed to read workflow file '{}': {}. Check that the file exists and is readable.",
            path, e
        )
    })?;

    debug!("YAML content loaded ({} bytes)", yaml_content.len());

    parse_workflow(&yaml_content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{ContextMode, CriterionKind};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CHAIN_YAML: &str = r#"
name: Write and review
description: Draft a function, then review it
steps:
  - name: draft
    model: gpt-4o
    prompt: Write a Python function that reverses a string.
    criteria_type: code
    criteria_value: python
    context_mode: code_only
  - name: review
    model: gpt-4o
    prompt: "Review this code:\n{{context}}"
    criteria_type: length_min
    criteria_value: "40"
    retry_limit: 2
"#;

    #[test]
    fn test_parse_workflow() {
        let workflow = parse_workflow(CHAIN_YAML).unwrap();

        assert_eq!(workflow.name, "Write and review");
        assert_eq!(workflow.len(), 2);

        let draft = &workflow.steps[0];
        assert_eq!(draft.criteria_type, CriterionKind::Code);
        assert_eq!(draft.context_mode, ContextMode::CodeOnly);
        assert_eq!(draft.retry_limit, 3);

        let review = &workflow.steps[1];
        assert!(review.uses_context_placeholder());
        assert_eq!(review.retry_limit, 2);
    }

    #[test]
    fn test_load_workflow_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(CHAIN_YAML.as_bytes()).unwrap();

        let workflow = load_workflow(file.path().to_str().unwrap()).unwrap();
        assert_eq!(workflow.steps[0].name, "draft");
        assert_ne!(workflow.steps[0].id, workflow.steps[1].id);
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_workflow("/nonexistent/chain.yaml");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Failed to read workflow file"));
    }

    #[test]
    fn test_parse_malformed_yaml() {
        let err = parse_workflow("name: [unclosed").unwrap_err().to_string();
        assert!(err.contains("Failed to parse workflow YAML"));
    }

    #[test]
    fn test_parse_rejects_empty_chain() {
        let err = parse_workflow("name: nothing\nsteps: []\n").unwrap_err().to_string();
        assert!(err.contains("no steps"));
    }
}
