//! Context Extraction
//!
//! Derives the text handed from a passed step to the next one.
//! Extraction is total: unknown modes and inputs without the expected
//! structure fall back to the full output.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::workflow::ContextMode;

/// Character budget of the `summary` mode.
pub const SUMMARY_LIMIT: usize = 500;

/// Appended when `summary` truncates.
pub const ELLIPSIS: &str = "...";

/// Fenced block body, without the whole opener line (tag and attributes).
static CODE_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[^\n]*\n([\s\S]*?)```").unwrap());

/// One or more blank lines, LF or CRLF.
static PARAGRAPH_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t\r]*(?:\n[ \t\r]*)+").unwrap());

/// Derives the next step's context from `output`.
pub fn extract(output: &str, mode: ContextMode) -> String {
    if output.is_empty() {
        return String::new();
    }

    match mode {
        ContextMode::Full | ContextMode::Unrecognized => output.to_string(),
        ContextMode::CodeOnly => code_only(output),
        ContextMode::FirstParagraph => paragraphs(output)
            .first()
            .map_or_else(|| output.to_string(), |p| p.to_string()),
        ContextMode::LastParagraph => paragraphs(output)
            .last()
            .map_or_else(|| output.to_string(), |p| p.to_string()),
        ContextMode::Summary => summary(output),
    }
}

fn code_only(output: &str) -> String {
    let blocks: Vec<&str> = CODE_BLOCK
        .captures_iter(output)
        .map(|caps| caps.get(1).map_or("", |m| m.as_str()).trim())
        .collect();

    if blocks.is_empty() {
        return output.to_string();
    }

    blocks.join("\n\n")
}

fn paragraphs(output: &str) -> Vec<&str> {
    PARAGRAPH_BREAK
        .split(output)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Truncation placeholder for real summarization: the first
/// [`SUMMARY_LIMIT`] characters followed by [`ELLIPSIS`].
fn summary(output: &str) -> String {
    if output.chars().count() <= SUMMARY_LIMIT {
        return output.to_string();
    }

    let mut truncated: String = output.chars().take(SUMMARY_LIMIT).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}
