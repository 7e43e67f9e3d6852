//! Workflow Data Model
//!
//! Core data structures representing a prompt chain and its steps.
//!
//! # Example YAML Format
//!
//! ```yaml
//! name: Write and review
//! description: Draft a function, then review it
//! steps:
//!   - name: draft
//!     model: gpt-4o
//!     prompt: Write a Python function that reverses a string.
//!     criteria_type: code
//!     criteria_value: python
//!     context_mode: code_only
//!
//!   - name: review
//!     model: gpt-4o
//!     prompt: "Review this code and list any bugs:\n{{context}}"
//!     criteria_type: length_min
//!     criteria_value: "40"
//!     retry_limit: 2
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Token substituted with the previous step's context inside a prompt.
pub const CONTEXT_PLACEHOLDER: &str = "{{context}}";

/// Default number of attempts a step gets before the run fails.
pub const DEFAULT_RETRY_LIMIT: u32 = 3;

/// How a step's output is judged before the chain advances.
///
/// Unknown strings deserialize into [`CriterionKind::Unrecognized`], which
/// always passes.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CriterionKind {
    /// Case-insensitive substring must be present
    Contains,
    /// Case-insensitive substring must be absent
    NotContains,
    /// Case-insensitive, multiline pattern must match
    Regex,
    /// Output must contain (or be) parseable JSON
    Json,
    /// Output must contain code, optionally in a given language
    Code,
    /// Output must be at least N characters
    LengthMin,
    /// Output must be at most N characters
    LengthMax,
    /// A judge model decides
    Llm,
    /// Always passes
    #[default]
    Always,
    #[serde(other)]
    Unrecognized,
}

/// How the text handed to the next step is derived from a step's output.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContextMode {
    #[default]
    Full,
    CodeOnly,
    FirstParagraph,
    LastParagraph,
    Summary,
    #[serde(other)]
    Unrecognized,
}

impl fmt::Display for CriterionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::Regex => "regex",
            Self::Json => "json",
            Self::Code => "code",
            Self::LengthMin => "length_min",
            Self::LengthMax => "length_max",
            Self::Llm => "llm",
            Self::Always => "always",
            Self::Unrecognized => "unrecognized",
        };
        write!(f, "{}", name)
    }
}

impl fmt::Display for ContextMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Full => "full",
            Self::CodeOnly => "code_only",
            Self::FirstParagraph => "first_paragraph",
            Self::LastParagraph => "last_paragraph",
            Self::Summary => "summary",
            Self::Unrecognized => "unrecognized",
        };
        write!(f, "{}", name)
    }
}

/// Represents a single prompting step in a workflow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Step {
    /// Unique identifier (generated when omitted)
    #[serde(default = "new_id")]
    pub id: String,

    /// Human-readable step name, unique within the workflow
    pub name: String,

    /// Model identifier passed to the completion provider
    pub model: String,

    /// Prompt template, may contain [`CONTEXT_PLACEHOLDER`]
    pub prompt: String,

    /// Criterion kind applied to the output
    #[serde(default)]
    pub criteria_type: CriterionKind,

    /// Opaque criterion value, interpreted by kind
    #[serde(default)]
    pub criteria_value: String,

    /// Maximum number of attempts
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Context derivation for the next step
    #[serde(default)]
    pub context_mode: ContextMode,
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_retry_limit() -> u32 {
    DEFAULT_RETRY_LIMIT
}

impl Step {
    /// Creates a new step with default criterion (`always`), retry limit
    /// and context mode (`full`).
    ///
    /// # Example
    ///
    /// ```
    /// use promptchain::workflow::{ContextMode, CriterionKind, Step};
    ///
    /// let step = Step::new("draft", "gpt-4o", "Write a haiku about rust")
    ///     .with_criterion(CriterionKind::LengthMin, "20")
    ///     .with_retry_limit(2)
    ///     .with_context_mode(ContextMode::FirstParagraph);
    /// assert_eq!(step.retry_limit, 2);
    /// ```
    pub fn new(name: impl Into<String>, model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into().trim().to_string(),
            model: model.into().trim().to_string(),
            prompt: prompt.into(),
            criteria_type: CriterionKind::Always,
            criteria_value: String::new(),
            retry_limit: DEFAULT_RETRY_LIMIT,
            context_mode: ContextMode::Full,
        }
    }

    /// Sets the pass/fail criterion.
    pub fn with_criterion(mut self, kind: CriterionKind, value: impl Into<String>) -> Self {
        self.criteria_type = kind;
        self.criteria_value = value.into();
        self
    }

    /// Sets the maximum number of attempts.
    pub fn with_retry_limit(mut self, limit: u32) -> Self {
        self.retry_limit = limit;
        self
    }

    /// Sets how context is derived for the next step.
    pub fn with_context_mode(mut self, mode: ContextMode) -> Self {
        self.context_mode = mode;
        self
    }

    /// Returns true if the prompt folds the previous context in itself.
    pub fn uses_context_placeholder(&self) -> bool {
        self.prompt.contains(CONTEXT_PLACEHOLDER)
    }
}

/// Represents a complete workflow: an ordered chain of steps.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Workflow {
    #[serde(default = "new_id")]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Steps, executed strictly in this order
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Workflow {
    /// Creates a new empty workflow.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            description: String::new(),
            steps: Vec::new(),
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Appends a step to the chain.
    pub fn add_step(&mut self, step: Step) -> Result<(), String> {
        if self.steps.iter().any(|s| s.name == step.name) {
            return Err(format!("Step '{}' already exists", step.name));
        }
        self.steps.push(step);
        Ok(())
    }

    /// Gets a step by name.
    pub fn get_step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Returns the number of steps in the workflow.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the workflow has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_creation() {
        let step = Step::new(" draft ", "gpt-4o", "Say hi")
            .with_criterion(CriterionKind::Contains, "hi")
            .with_retry_limit(5)
            .with_context_mode(ContextMode::CodeOnly);

        assert_eq!(step.name, "draft");
        assert_eq!(step.criteria_type, CriterionKind::Contains);
        assert_eq!(step.criteria_value, "hi");
        assert_eq!(step.retry_limit, 5);
        assert_eq!(step.context_mode, ContextMode::CodeOnly);
        assert!(!step.id.is_empty());
    }

    #[test]
    fn test_step_defaults() {
        let step = Step::new("s", "m", "p");
        assert_eq!(step.criteria_type, CriterionKind::Always);
        assert_eq!(step.retry_limit, DEFAULT_RETRY_LIMIT);
        assert_eq!(step.context_mode, ContextMode::Full);
    }

    #[test]
    fn test_step_ids_are_unique() {
        let a = Step::new("a", "m", "p");
        let b = Step::new("a", "m", "p");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_uses_context_placeholder() {
        assert!(Step::new("s", "m", "Review: {{context}}").uses_context_placeholder());
        assert!(!Step::new("s", "m", "Review: {context}").uses_context_placeholder());
    }

    #[test]
    fn test_workflow_add_step() {
        let mut workflow = Workflow::new("chain");
        let step = Step::new("step1", "m", "p");

        assert!(workflow.add_step(step.clone()).is_ok());
        assert!(workflow.add_step(step).is_err()); // Duplicate
        assert_eq!(workflow.len(), 1);
        assert!(workflow.get_step("step1").is_some());
        assert!(workflow.get_step("missing").is_none());
    }

    #[test]
    fn test_workflow_is_empty() {
        let workflow = Workflow::new("empty").with_description("nothing here");
        assert!(workflow.is_empty());
        assert_eq!(workflow.description, "nothing here");
    }

    #[test]
    fn test_deserialize_step_defaults() {
        let yaml = "name: s\nmodel: m\nprompt: p\n";
        let step: Step = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(step.criteria_type, CriterionKind::Always);
        assert_eq!(step.criteria_value, "");
        assert_eq!(step.retry_limit, 3);
        assert_eq!(step.context_mode, ContextMode::Full);
        assert!(!step.id.is_empty());
    }

    #[test]
    fn test_deserialize_unknown_kinds() {
        let yaml = "name: s\nmodel: m\nprompt: p\ncriteria_type: sentiment\ncontext_mode: bullets\n";
        let step: Step = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(step.criteria_type, CriterionKind::Unrecognized);
        assert_eq!(step.context_mode, ContextMode::Unrecognized);
    }

    #[test]
    fn test_deserialize_snake_case_kinds() {
        let yaml = "name: s\nmodel: m\nprompt: p\ncriteria_type: not_contains\ncontext_mode: last_paragraph\n";
        let step: Step = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(step.criteria_type, CriterionKind::NotContains);
        assert_eq!(step.context_mode, ContextMode::LastParagraph);
    }

    #[test]
    fn test_kind_display_matches_yaml_names() {
        assert_eq!(CriterionKind::NotContains.to_string(), "not_contains");
        assert_eq!(ContextMode::CodeOnly.to_string(), "code_only");

        let kind: CriterionKind = serde_yaml::from_str("length_max").unwrap();
        assert_eq!(kind.to_string(), "length_max");
    }
}
