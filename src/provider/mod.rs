//! Completion Provider Module
//!
//! A completion provider turns a prompt into generated text plus usage and
//! cost metadata. Providers own their own transport retry policy; the
//! engine sees at most one error per attempt.
//!
//! - [`command`]: Provider backed by an external command
//! - [`pricing`]: Per-model token pricing

pub mod command;
pub mod pricing;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::execution::criteria::Judge;

pub use command::CommandProvider;
pub use pricing::{ModelPricing, PricingTable};

/// Errors surfaced by a provider after its own retries are exhausted.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    #[error("Provider request failed: {0}")]
    Request(String),

    #[error("Provider timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Provider returned an empty response")]
    EmptyResponse,
}

impl ProviderError {
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request(message.into())
    }
}

/// Token usage of one completion.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input,
            output,
            total: input + output,
        }
    }
}

/// Generated text with usage metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub tokens: TokenUsage,
    pub cost: f64,
}

/// Trait for completion providers.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Sends `prompt` to `model`. `context`, when given, is supplied out of
    /// band (not already folded into the prompt).
    async fn call(
        &self,
        prompt: &str,
        model: &str,
        context: Option<&str>,
    ) -> Result<Completion, ProviderError>;
}

/// A [`Judge`] bound to one provider and a fixed judge model.
pub struct ProviderJudge {
    provider: Arc<dyn CompletionProvider>,
    model: String,
}

impl ProviderJudge {
    pub fn new(provider: Arc<dyn CompletionProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[async_trait]
impl Judge for ProviderJudge {
    async fn judge(&self, prompt: &str) -> Result<String, ProviderError> {
        let completion = self.provider.call(prompt, &self.model, None).await?;
        Ok(completion.content)
    }
}
