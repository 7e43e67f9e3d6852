//! Criteria Evaluation
//!
//! Judges a step's output against its criterion. Every outcome carries a
//! human-readable reason; that reason is persisted as the step's error and
//! is the only diagnostic trail a failed step leaves, so it always names
//! the value, pattern or limit involved.
//!
//! Evaluation never fails: bad patterns and judge errors become failed
//! verdicts.

use async_trait::async_trait;
use log::debug;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

use crate::provider::ProviderError;
use crate::workflow::CriterionKind;

/// A capability that sends a prompt to a judge model and returns its reply.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn judge(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Pass/fail outcome with its explanation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    pub reason: String,
}

impl Verdict {
    pub fn pass(reason: impl Into<String>) -> Self {
        Self {
            passed: true,
            reason: reason.into(),
        }
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: reason.into(),
        }
    }
}

static JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)```json[^\n]*\n([\s\S]*?)```").unwrap());

static ANY_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[^\n]*\n([\s\S]*?)```").unwrap());

static BRACE_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[\s\S]*\}").unwrap());

static BRACKET_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[\s\S]*\]").unwrap());

/// Fence opener with its (possibly empty) language tag.
static FENCE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```([A-Za-z0-9_+#.-]*)[^\n]*\n[\s\S]*?```").unwrap());

/// Shapes that suggest unfenced source code.
static CODE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?m)^\s*(async\s+)?(def|fn|func|function)\s+\w+\s*[(<]",
        r"(?m)^\s*(pub\s+)?(export\s+)?(abstract\s+)?(class|struct|interface|enum|trait|impl)\s+\w+",
        r"(?m)^\s*(import\s+[\w.{*]|from\s+[\w.]+\s+import\s|#include\s*[<\x22]|using\s+[\w.]+;|package\s+[\w.]+)",
        r"(?m)^\s*(const|let|var)\s+\w+\s*(:\s*[\w<>\[\]]+\s*)?=",
        r"(?m)^\s*(public|private|protected)\s+(static\s+)?[\w<>\[\]]+\s+\w+\s*\(",
        r"=>\s*\{",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

/// Evaluates `output` against a criterion.
///
/// Output that is empty or only whitespace fails every kind with a
/// "No output" reason. `judge` is only consulted for [`CriterionKind::Llm`].
pub async fn evaluate(
    output: &str,
    kind: CriterionKind,
    value: &str,
    judge: Option<&dyn Judge>,
) -> Verdict {
    if output.trim().is_empty() {
        return Verdict::fail("No output to evaluate");
    }

    let verdict = match kind {
        CriterionKind::Contains => check_contains(output, value),
        CriterionKind::NotContains => check_not_contains(output, value),
        CriterionKind::Regex => check_regex(output, value),
        CriterionKind::Json => check_json(output),
        CriterionKind::Code => check_code(output, value),
        CriterionKind::LengthMin => check_length_min(output, value),
        CriterionKind::LengthMax => check_length_max(output, value),
        CriterionKind::Llm => check_with_judge(output, value, judge).await,
        CriterionKind::Always => Verdict::pass("Always passes"),
        CriterionKind::Unrecognized => Verdict::pass("Unrecognized criterion, auto-pass"),
    };

    debug!(
        "Criterion {:?} -> {} ({})",
        kind,
        if verdict.passed { "pass" } else { "fail" },
        verdict.reason
    );
    verdict
}

fn check_contains(output: &str, value: &str) -> Verdict {
    if value.is_empty() {
        return Verdict::pass("No value specified, auto-pass");
    }

    if output.to_lowercase().contains(&value.to_lowercase()) {
        Verdict::pass(format!("Output contains \"{}\"", value))
    } else {
        Verdict::fail(format!("Output does not contain \"{}\"", value))
    }
}

fn check_not_contains(output: &str, value: &str) -> Verdict {
    if value.is_empty() {
        return Verdict::pass("No value specified, auto-pass");
    }

    if output.to_lowercase().contains(&value.to_lowercase()) {
        Verdict::fail(format!("Output contains forbidden text \"{}\"", value))
    } else {
        Verdict::pass(format!("Output does not contain \"{}\"", value))
    }
}

fn check_regex(output: &str, pattern: &str) -> Verdict {
    let regex = match RegexBuilder::new(pattern)
        .case_insensitive(true)
        .multi_line(true)
        .build()
    {
        Ok(regex) => regex,
        Err(e) => return Verdict::fail(format!("Invalid regex pattern /{}/: {}", pattern, e)),
    };

    match regex.find(output) {
        Some(m) => Verdict::pass(format!("Pattern /{}/ matched \"{}\"", pattern, m.as_str())),
        None => Verdict::fail(format!("Pattern /{}/ did not match", pattern)),
    }
}

/// Candidate JSON snippets, in preference order.
fn json_candidates(output: &str) -> Vec<&str> {
    let mut candidates = Vec::new();

    if let Some(caps) = JSON_FENCE.captures(output) {
        candidates.push(caps.get(1).map_or("", |m| m.as_str()));
    }
    if let Some(caps) = ANY_FENCE.captures(output) {
        candidates.push(caps.get(1).map_or("", |m| m.as_str()));
    }
    if let Some(m) = BRACE_SPAN.find(output) {
        candidates.push(m.as_str());
    }
    if let Some(m) = BRACKET_SPAN.find(output) {
        candidates.push(m.as_str());
    }

    candidates
}

fn check_json(output: &str) -> Verdict {
    for candidate in json_candidates(output) {
        if serde_json::from_str::<serde_json::Value>(candidate.trim()).is_ok() {
            return Verdict::pass("Found valid JSON");
        }
    }

    match serde_json::from_str::<serde_json::Value>(output.trim()) {
        Ok(_) => Verdict::pass("Output is valid JSON"),
        Err(e) => Verdict::fail(format!("No valid JSON found in output: {}", e)),
    }
}

fn check_code(output: &str, language: &str) -> Verdict {
    let tags: Vec<&str> = FENCE_TAG
        .captures_iter(output)
        .map(|caps| caps.get(1).map_or("", |m| m.as_str()))
        .collect();

    if !tags.is_empty() {
        let language = language.trim();
        if language.is_empty() {
            return Verdict::pass(format!("Found {} code block(s)", tags.len()));
        }

        return if tags.iter().any(|tag| tag.eq_ignore_ascii_case(language)) {
            Verdict::pass(format!("Found {} code block", language))
        } else {
            Verdict::fail(format!(
                "Code blocks found ({}) but none tagged \"{}\"",
                tags.iter()
                    .map(|t| if t.is_empty() { "untagged" } else { t })
                    .collect::<Vec<_>>()
                    .join(", "),
                language
            ))
        };
    }

    if CODE_PATTERNS.iter().any(|pattern| pattern.is_match(output)) {
        Verdict::pass("Output looks like source code")
    } else {
        Verdict::fail("No code blocks or code patterns found")
    }
}

fn check_length_min(output: &str, value: &str) -> Verdict {
    let min = value.trim().parse::<usize>().unwrap_or(0);
    let length = output.chars().count();

    if length >= min {
        Verdict::pass(format!("Length {} >= minimum {}", length, min))
    } else {
        Verdict::fail(format!("Length {} is below minimum {}", length, min))
    }
}

fn check_length_max(output: &str, value: &str) -> Verdict {
    let length = output.chars().count();

    let Ok(max) = value.trim().parse::<usize>() else {
        return Verdict::pass(format!("Length {} (no maximum set)", length));
    };

    if length <= max {
        Verdict::pass(format!("Length {} <= maximum {}", length, max))
    } else {
        Verdict::fail(format!("Length {} exceeds maximum {}", length, max))
    }
}

/// Builds the fixed evaluation prompt sent to the judge.
pub fn judge_prompt(criterion: &str, output: &str) -> String {
    format!(
        "You are evaluating the output of an AI model against a criterion.\n\n\
         Criterion: {}\n\n\
         Output to evaluate:\n---\n{}\n---\n\n\
         Does the output satisfy the criterion? Reply with PASS or FAIL on the \
         first line, followed by a brief explanation.",
        criterion, output
    )
}

async fn check_with_judge(output: &str, criterion: &str, judge: Option<&dyn Judge>) -> Verdict {
    let Some(judge) = judge else {
        return Verdict::fail("LLM evaluation not available");
    };

    match judge.judge(&judge_prompt(criterion, output)).await {
        Ok(reply) => {
            let passed = reply
                .trim_start()
                .get(..4)
                .is_some_and(|head| head.eq_ignore_ascii_case("PASS"));
            Verdict { passed, reason: reply }
        }
        Err(e) => Verdict::fail(format!("LLM evaluation failed: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedJudge {
        reply: Result<String, ProviderError>,
        last_prompt: Mutex<Option<String>>,
    }

    impl FixedJudge {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                last_prompt: Mutex::new(None),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(ProviderError::request("connection reset")),
                last_prompt: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl Judge for FixedJudge {
        async fn judge(&self, prompt: &str) -> Result<String, ProviderError> {
            *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
            self.reply.clone()
        }
    }

    async fn eval(output: &str, kind: CriterionKind, value: &str) -> Verdict {
        evaluate(output, kind, value, None).await
    }

    #[tokio::test]
    async fn test_empty_output_fails_for_every_kind() {
        let judge = FixedJudge::replying("PASS");
        let kinds = [
            CriterionKind::Contains,
            CriterionKind::NotContains,
            CriterionKind::Regex,
            CriterionKind::Json,
            CriterionKind::Code,
            CriterionKind::LengthMin,
            CriterionKind::LengthMax,
            CriterionKind::Llm,
            CriterionKind::Always,
            CriterionKind::Unrecognized,
        ];

        for kind in kinds {
            let verdict = evaluate("", kind, "", Some(&judge)).await;
            assert!(!verdict.passed, "{kind:?} passed on empty output");
            assert!(verdict.reason.contains("No output"));
        }
    }

    #[tokio::test]
    async fn test_contains_is_case_insensitive() {
        let verdict = eval("Hello World", CriterionKind::Contains, "hello").await;
        assert!(verdict.passed);
        assert!(verdict.reason.contains("hello"));

        let verdict = eval("Hello World", CriterionKind::Contains, "XYZ").await;
        assert!(!verdict.passed);
        assert!(verdict.reason.contains("XYZ"));
    }

    #[tokio::test]
    async fn test_empty_value_auto_passes() {
        assert!(eval("text", CriterionKind::Contains, "").await.passed);
        assert!(eval("text", CriterionKind::NotContains, "").await.passed);
    }

    #[tokio::test]
    async fn test_not_contains() {
        assert!(eval("all good", CriterionKind::NotContains, "error").await.passed);

        let verdict = eval("An ERROR occurred", CriterionKind::NotContains, "error").await;
        assert!(!verdict.passed);
        assert!(verdict.reason.contains("error"));
    }

    #[tokio::test]
    async fn test_regex_multiline_case_insensitive() {
        let verdict = eval("intro\nANSWER: 42\n", CriterionKind::Regex, r"^answer: \d+$").await;
        assert!(verdict.passed);
        assert!(verdict.reason.contains("ANSWER: 42"));

        assert!(!eval("no digits", CriterionKind::Regex, r"\d+").await.passed);
    }

    #[tokio::test]
    async fn test_invalid_regex_fails_with_error() {
        let verdict = eval("anything", CriterionKind::Regex, "(unclosed").await;
        assert!(!verdict.passed);
        assert!(verdict.reason.contains("Invalid regex"));
        assert!(verdict.reason.contains("unclosed"));
    }

    #[tokio::test]
    async fn test_json_extraction() {
        assert!(eval(r#"{"a":1} and more text"#, CriterionKind::Json, "").await.passed);
        assert!(eval("Here:\n```json\n{\"ok\": true}\n```", CriterionKind::Json, "").await.passed);
        assert!(eval("```\n[1, 2, 3]\n```", CriterionKind::Json, "").await.passed);
        assert!(eval("list: [1, 2] done", CriterionKind::Json, "").await.passed);
        assert!(eval("  42  ", CriterionKind::Json, "").await.passed);

        let verdict = eval("not json at all", CriterionKind::Json, "").await;
        assert!(!verdict.passed);
        assert!(verdict.reason.contains("No valid JSON"));
    }

    #[tokio::test]
    async fn test_json_falls_through_bad_candidates() {
        // Fenced block is not JSON, but the brace span is
        let output = "```text\nhello\n```\n{\"b\": 2}";
        assert!(eval(output, CriterionKind::Json, "").await.passed);
    }

    #[tokio::test]
    async fn test_code_with_fences() {
        let output = "Sure:\n```Python\nprint(1)\n```";
        assert!(eval(output, CriterionKind::Code, "").await.passed);
        assert!(eval(output, CriterionKind::Code, "python").await.passed);

        let verdict = eval(output, CriterionKind::Code, "rust").await;
        assert!(!verdict.passed);
        assert!(verdict.reason.contains("rust"));
        assert!(verdict.reason.contains("Python"));
    }

    #[tokio::test]
    async fn test_code_heuristics() {
        assert!(eval("def add(a, b):\n    return a + b", CriterionKind::Code, "").await.passed);
        assert!(eval("fn main() {}", CriterionKind::Code, "").await.passed);
        assert!(eval("import os", CriterionKind::Code, "").await.passed);
        assert!(eval("const x = 5;", CriterionKind::Code, "").await.passed);
        assert!(eval("class Foo:", CriterionKind::Code, "").await.passed);

        let verdict = eval("Just a plain sentence.", CriterionKind::Code, "").await;
        assert!(!verdict.passed);
    }

    #[tokio::test]
    async fn test_length_min() {
        let verdict = eval("hello", CriterionKind::LengthMin, "5").await;
        assert!(verdict.passed);

        let verdict = eval("hello", CriterionKind::LengthMin, "10").await;
        assert!(!verdict.passed);
        assert!(verdict.reason.contains('5'));
        assert!(verdict.reason.contains("10"));

        // Unparseable minimum defaults to 0
        assert!(eval("x", CriterionKind::LengthMin, "many").await.passed);
    }

    #[tokio::test]
    async fn test_length_max() {
        assert!(eval("hello", CriterionKind::LengthMax, "5").await.passed);

        let verdict = eval("hello world", CriterionKind::LengthMax, "5").await;
        assert!(!verdict.passed);
        assert!(verdict.reason.contains("11"));

        // Unparseable maximum means no limit
        assert!(eval("hello world", CriterionKind::LengthMax, "").await.passed);
    }

    #[tokio::test]
    async fn test_length_counts_characters() {
        assert!(eval("héllo", CriterionKind::LengthMax, "5").await.passed);
    }

    #[tokio::test]
    async fn test_llm_without_judge() {
        let verdict = eval("output", CriterionKind::Llm, "is polite").await;
        assert!(!verdict.passed);
        assert!(verdict.reason.contains("not available"));
    }

    #[tokio::test]
    async fn test_llm_pass_and_fail() {
        let judge = FixedJudge::replying("pass - the tone is polite");
        let verdict = evaluate("Thank you!", CriterionKind::Llm, "is polite", Some(&judge)).await;
        assert!(verdict.passed);
        assert_eq!(verdict.reason, "pass - the tone is polite");

        let prompt = judge.last_prompt.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("is polite"));
        assert!(prompt.contains("Thank you!"));

        let judge = FixedJudge::replying("FAIL: rude");
        let verdict = evaluate("Go away", CriterionKind::Llm, "is polite", Some(&judge)).await;
        assert!(!verdict.passed);
        assert_eq!(verdict.reason, "FAIL: rude");
    }

    #[tokio::test]
    async fn test_llm_judge_error_becomes_failure() {
        let judge = FixedJudge::failing();
        let verdict = evaluate("text", CriterionKind::Llm, "anything", Some(&judge)).await;
        assert!(!verdict.passed);
        assert!(verdict.reason.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_always_and_unrecognized_pass() {
        assert!(eval("x", CriterionKind::Always, "").await.passed);
        assert!(eval("x", CriterionKind::Unrecognized, "whatever").await.passed);
    }

    #[tokio::test]
    async fn test_llm_reason_is_full_reply() {
        let judge = FixedJudge::replying("  PASS\nClear and polite.\n");
        let verdict = evaluate("Hi there", CriterionKind::Llm, "is polite", Some(&judge)).await;

        assert!(verdict.passed);
        assert_eq!(verdict.reason, "  PASS\nClear and polite.\n");
    }

    #[tokio::test]
    async fn test_whitespace_only_output_counts_as_empty() {
        let verdict = evaluate(" \n\t ", CriterionKind::Always, "", None).await;

        assert!(!verdict.passed);
        assert!(verdict.reason.contains("No output"));
    }
}
