//! OpenAI-compatible API provider.
//!
//! Calls `POST {base}/chat/completions` for completions and
//! `POST {base}/embeddings` for embeddings. Works with OpenAI itself and
//! with proxies or local servers speaking the same wire format.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::client::{CompletionService, EmbeddingService};
use crate::config::LlmConfig;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

// ── Request types ────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

// ── Response types ───────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

// ── OpenAiClient ────────────────────────────────────────

/// Client for OpenAI-compatible chat and embedding endpoints.
pub struct OpenAiClient {
    client: Client,
    config: LlmConfig,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Self {
            client,
            config,
            base_url,
        }
    }

    fn chat_request<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.config.max_tokens_per_request,
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(format!("{}/{path}", self.base_url))
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            anyhow::bail!("OpenAI API error ({status}): {body}");
        }
        Ok(response)
    }
}

/// Content of the first choice, trimmed.
fn first_choice_text(resp: ChatResponse) -> Result<String> {
    resp.choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.unwrap_or_default().trim().to_string())
        .ok_or_else(|| anyhow!("OpenAI API returned no choices"))
}

/// Orders embeddings by their `index` and checks one vector per input.
fn ordered_embeddings(resp: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>> {
    let mut data = resp.data;
    data.sort_by_key(|d| d.index);
    if data.len() != expected {
        anyhow::bail!(
            "OpenAI API returned {} embeddings for {expected} inputs",
            data.len()
        );
    }
    Ok(data.into_iter().map(|d| d.embedding).collect())
}

#[async_trait]
impl CompletionService for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        debug!("Calling chat completions ({})", self.config.model);

        let response = self
            .post("chat/completions", &self.chat_request(prompt))
            .await?;
        let resp: ChatResponse = response.json().await?;

        if let Some(ref usage) = resp.usage {
            info!(
                "LLM response: {} in / {} out tokens",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        first_choice_text(resp)
    }

    fn description(&self) -> String {
        self.config.description()
    }
}

#[async_trait]
impl EmbeddingService for OpenAiClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        debug!(
            "Requesting {} embeddings ({})",
            texts.len(),
            self.config.embedding_model
        );

        let request = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: texts,
        };
        let response = self.post("embeddings", &request).await?;
        let resp: EmbeddingResponse = response.json().await?;
        ordered_embeddings(resp, texts.len())
    }
}
