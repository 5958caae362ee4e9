//! Test doubles for the completion service, embeddings and handlers.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::config::{SandboxConfig, ToolsConfig};
use crate::llm::{CompletionService, EmbeddingService};
use crate::sandbox::SecurityGate;
use crate::skills::{
    Action, Handler, HandlerContext, HandlerRegistry, ParamKind, ParamSpec, RegistryBuilder,
};

/// Completion service answering from a script, one reply per call.
pub struct FakeCompletion {
    replies: Mutex<VecDeque<String>>,
    failure: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl FakeCompletion {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            failure: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(text: &str) -> Self {
        Self::new(vec![text.to_string()])
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(vec![])
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl CompletionService for FakeCompletion {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(ref message) = self.failure {
            anyhow::bail!("{message}");
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("no scripted reply left"))
    }

    fn description(&self) -> String {
        "fake (scripted)".to_string()
    }
}

/// Embeddings looked up by exact text; unknown texts get a zero vector.
pub struct FakeEmbeddings {
    vectors: Vec<(String, Vec<f32>)>,
}

impl FakeEmbeddings {
    pub fn new(vectors: Vec<(&str, Vec<f32>)>) -> Self {
        Self {
            vectors: vectors
                .into_iter()
                .map(|(text, v)| (text.to_string(), v))
                .collect(),
        }
    }
}

#[async_trait]
impl EmbeddingService for FakeEmbeddings {
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                self.vectors
                    .iter()
                    .find(|(known, _)| known == text)
                    .map(|(_, v)| v.clone())
                    .unwrap_or_else(|| vec![0.0; 3])
            })
            .collect())
    }
}

/// Handler that records its bound parameters and counts invocations.
pub struct RecordingHandler {
    action: Action,
    params: Vec<ParamSpec>,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Option<Map<String, Value>>>>,
    failure: Option<String>,
}

impl RecordingHandler {
    fn new(action: Action, params: Vec<ParamSpec>) -> Self {
        Self {
            action,
            params,
            calls: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(None)),
            failure: None,
        }
    }

    /// `sort_contacts(input_file, output_file)`
    pub fn sort_contacts() -> Self {
        Self::new(
            Action::SortContacts,
            vec![
                ParamSpec::required("input_file", ParamKind::Path),
                ParamSpec::required("output_file", ParamKind::Path),
            ],
        )
    }

    /// `format_markdown_file(file_path)`
    pub fn single_param() -> Self {
        Self::new(
            Action::FormatMarkdownFile,
            vec![ParamSpec::required("file_path", ParamKind::Path)],
        )
    }

    /// `write_recent_logs(input_dir, output_file, count?, verbose?)`
    pub fn with_optionals() -> Self {
        Self::new(
            Action::WriteRecentLogs,
            vec![
                ParamSpec::required("input_dir", ParamKind::Directory),
                ParamSpec::required("output_file", ParamKind::Path),
                ParamSpec::optional("count", ParamKind::Integer, json!(10)),
                ParamSpec::optional("verbose", ParamKind::Boolean, json!(false)),
            ],
        )
    }

    /// `fetch_url(url, output_file)`
    pub fn fetch() -> Self {
        Self::new(
            Action::FetchUrl,
            vec![
                ParamSpec::required("url", ParamKind::Url),
                ParamSpec::required("output_file", ParamKind::Path),
            ],
        )
    }

    /// `format_markdown_file(file_path)` that always fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::single_param()
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    pub fn seen(&self) -> Arc<Mutex<Option<Map<String, Value>>>> {
        self.seen.clone()
    }
}

#[async_trait]
impl Handler for RecordingHandler {
    type Params = Map<String, Value>;

    fn action(&self) -> Action {
        self.action
    }

    fn description(&self) -> &'static str {
        "Test handler."
    }

    fn params(&self) -> Vec<ParamSpec> {
        self.params.clone()
    }

    async fn run(&self, params: Self::Params, _ctx: &HandlerContext) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.seen.lock().unwrap() = Some(params);
        match &self.failure {
            Some(message) => anyhow::bail!("{message}"),
            None => Ok(format!("{} done", self.action)),
        }
    }
}

pub fn registry_with(handlers: Vec<RecordingHandler>) -> HandlerRegistry {
    let mut builder = RegistryBuilder::new();
    for handler in handlers {
        builder.register(handler).unwrap();
    }
    builder.build()
}

pub fn gate(dir: &Path) -> Arc<SecurityGate> {
    Arc::new(
        SecurityGate::new(&SandboxConfig {
            root: dir.to_path_buf(),
            mount: PathBuf::from("/data"),
        })
        .unwrap(),
    )
}

/// Context with a scripted completion service and no embeddings.
pub fn context(dir: &Path) -> HandlerContext {
    context_with(dir, Arc::new(FakeCompletion::new(vec![])), None)
}

pub fn context_with(
    dir: &Path,
    llm: Arc<dyn CompletionService>,
    embeddings: Option<Arc<dyn EmbeddingService>>,
) -> HandlerContext {
    HandlerContext {
        gate: gate(dir),
        llm,
        embeddings,
        tools: ToolsConfig::default(),
    }
}
