//! Command-Backed Completion Provider
//!
//! Runs an external command once per completion request:
//! - `{model}` in the command line is replaced with the requested model
//! - the prompt is written to the command's stdin, preceded by a
//!   `Context:` block when out-of-band context is supplied
//! - stdout (trimmed) is the completion text
//!
//! Any CLI that reads a prompt on stdin works, e.g.
//! `llm -m {model}` or `ollama run {model}`.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{Completion, CompletionProvider, PricingTable, ProviderError, TokenUsage};

/// Default time a single command invocation may take.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Default extra tries after a failed invocation.
const DEFAULT_MAX_RETRIES: u32 = 2;

/// Backoff before the first retry; doubles on each further retry.
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Rough characters-per-token ratio for usage estimates.
const CHARS_PER_TOKEN: usize = 4;

/// Provider that shells out to a command for each completion.
#[derive(Debug, Clone)]
pub struct CommandProvider {
    command: String,
    timeout: Duration,
    max_retries: u32,
    pricing: PricingTable,
}

impl CommandProvider {
    /// Creates a provider for a command line (run through `sh -c`).
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            pricing: PricingTable::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    /// Builds the text written to stdin.
    fn compose_input(prompt: &str, context: Option<&str>) -> String {
        match context {
            Some(ctx) if !ctx.is_empty() => format!("Context:\n{}\n\n{}", ctx, prompt),
            _ => prompt.to_string(),
        }
    }

    /// Runs the command once.
    async fn invoke(&self, model: &str, input: &str) -> Result<String, ProviderError> {
        let command_line = self.command.replace("{model}", model);

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&command_line)
            .env("PROMPTCHAIN_MODEL", model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProviderError::request(format!("Failed to start '{}': {}", command_line, e)))?;

        // stdin is fed while stdout drains, so commands that echo large
        // inputs cannot fill both pipes and stall
        let stdin = child.stdin.take();
        let label = command_line.as_str();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                match stdin.write_all(input.as_bytes()).await {
                    // The command may exit without reading all of its input
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                        debug!("'{}' closed stdin early", label);
                    }
                    other => other.map_err(|e| {
                        ProviderError::request(format!("Failed to write prompt: {}", e))
                    })?,
                }
            }
            Ok::<(), ProviderError>(())
        };

        let (fed, output) = tokio::time::timeout(self.timeout, async {
            tokio::join!(feed, child.wait_with_output())
        })
        .await
        .map_err(|_| ProviderError::Timeout {
            timeout_ms: self.timeout.as_millis() as u64,
        })?;

        fed?;
        let output = output.map_err(|e| ProviderError::request(format!("Command failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderError::request(format!(
                "'{}' exited with code {:?}: {}",
                command_line,
                output.status.code(),
                stderr.trim()
            )));
        }

        let content = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if content.is_empty() {
            return Err(ProviderError::EmptyResponse);
        }

        Ok(content)
    }
}

/// Estimates a token count from text length.
fn estimate_tokens(text: &str) -> u64 {
    text.chars().count().div_ceil(CHARS_PER_TOKEN) as u64
}

#[async_trait]
impl CompletionProvider for CommandProvider {
    async fn call(
        &self,
        prompt: &str,
        model: &str,
        context: Option<&str>,
    ) -> Result<Completion, ProviderError> {
        let input = Self::compose_input(prompt, context);
        let mut backoff = INITIAL_BACKOFF;
        let mut tries = 0;

        loop {
            tries += 1;
            match self.invoke(model, &input).await {
                Ok(content) => {
                    let tokens = TokenUsage::new(estimate_tokens(&input), estimate_tokens(&content));
                    let cost = self.pricing.cost(model, &tokens);
                    debug!(
                        "Completion from '{}': {} tokens, ${:.6}",
                        model, tokens.total, cost
                    );
                    return Ok(Completion {
                        content,
                        tokens,
                        cost,
                    });
                }
                Err(e) if tries <= self.max_retries => {
                    warn!(
                        "Provider call for '{}' failed (try {}/{}): {}",
                        model,
                        tries,
                        self.max_retries + 1,
                        e
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ModelPricing;

    #[test]
    fn test_compose_input() {
        assert_eq!(CommandProvider::compose_input("Hi", None), "Hi");
        assert_eq!(CommandProvider::compose_input("Hi", Some("")), "Hi");
        assert_eq!(
            CommandProvider::compose_input("Hi", Some("earlier")),
            "Context:\nearlier\n\nHi"
        );
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_call_echoes_stdin() {
        let provider = CommandProvider::new("cat");
        let completion = provider.call("hello world", "any", None).await.unwrap();

        assert_eq!(completion.content, "hello world");
        assert_eq!(completion.tokens.total, 6);
        assert_eq!(completion.cost, 0.0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_call_substitutes_model() {
        let provider = CommandProvider::new("echo {model}; cat > /dev/null");
        let completion = provider.call("ignored", "tiny-model", None).await.unwrap();
        assert_eq!(completion.content, "tiny-model");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_call_with_context_and_pricing() {
        let mut pricing = PricingTable::new();
        pricing.set("priced", ModelPricing::new(1.0, 1.0));

        let provider = CommandProvider::new("cat").with_pricing(pricing);
        let completion = provider.call("question", "priced", Some("notes")).await.unwrap();

        assert!(completion.content.starts_with("Context:\nnotes"));
        assert!(completion.cost > 0.0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_reports_error() {
        let provider = CommandProvider::new("cat > /dev/null; echo oops >&2; exit 3").with_max_retries(0);
        let err = provider.call("x", "m", None).await.unwrap_err();

        match err {
            ProviderError::Request(message) => {
                assert!(message.contains("exited with code Some(3)"));
                assert!(message.contains("oops"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_empty_output_is_error() {
        let provider = CommandProvider::new("cat > /dev/null").with_max_retries(0);
        let err = provider.call("x", "m", None).await.unwrap_err();
        assert_eq!(err, ProviderError::EmptyResponse);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout() {
        let provider = CommandProvider::new("sleep 5")
            .with_timeout(Duration::from_millis(100))
            .with_max_retries(0);
        let err = provider.call("x", "m", None).await.unwrap_err();
        assert_eq!(err, ProviderError::Timeout { timeout_ms: 100 });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_prompt_through_echoing_command() {
        let prompt = "a".repeat(2 * 1024 * 1024);
        let provider = CommandProvider::new("cat")
            .with_timeout(Duration::from_secs(10))
            .with_max_retries(0);

        let completion = tokio::time::timeout(
            Duration::from_secs(20),
            provider.call(&prompt, "m", None),
        )
        .await
        .expect("call outlived its own timeout")
        .unwrap();

        assert_eq!(completion.content.len(), prompt.len());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_ignoring_stdin() {
        let prompt = "b".repeat(1024 * 1024);
        let provider = CommandProvider::new("echo done").with_max_retries(0);

        let completion = provider.call(&prompt, "m", None).await.unwrap();
        assert_eq!(completion.content, "done");
    }
}
