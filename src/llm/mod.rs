pub mod anthropic;
pub mod client;
pub mod openai;

use std::sync::Arc;

pub use anthropic::AnthropicClient;
pub use client::{CompletionService, EmbeddingService};
pub use openai::OpenAiClient;

use crate::config::LlmConfig;

/// Language-model services selected by the `[llm] provider` field.
pub struct LlmServices {
    pub completion: Arc<dyn CompletionService>,
    /// Only OpenAI-compatible providers expose embeddings.
    pub embeddings: Option<Arc<dyn EmbeddingService>>,
}

/// Builds the services for the configured provider.
pub fn connect(config: &LlmConfig) -> anyhow::Result<LlmServices> {
    match config.provider.as_str() {
        "openai" => {
            let client = Arc::new(OpenAiClient::new(config.clone()));
            Ok(LlmServices {
                completion: client.clone(),
                embeddings: Some(client),
            })
        }
        "anthropic" => Ok(LlmServices {
            completion: Arc::new(AnthropicClient::new(config.clone())),
            embeddings: None,
        }),
        other => anyhow::bail!(
            "Unsupported LLM provider: '{other}'. Supported: 'openai', 'anthropic'."
        ),
    }
}
