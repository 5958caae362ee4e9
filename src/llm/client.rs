//! Service traits: abstraction over language-model backends.
//!
//! Providers (OpenAI-compatible, Anthropic) implement these traits so the
//! rest of the agent never depends on which model answers.

use anyhow::Result;
use async_trait::async_trait;

/// Single-turn text completion.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Sends one user prompt and returns the model's text reply.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Human-readable description of the provider and model.
    ///
    /// Used in status output, e.g. `"openai (gpt-4o-mini)"`.
    fn description(&self) -> String;
}

/// Text embeddings, one vector per input in input order.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
