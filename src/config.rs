use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub handlers: HandlersConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// "openai" (any OpenAI-compatible endpoint) or "anthropic"
    pub provider: String,
    pub model: String,
    /// Supports ${ENV_VAR} substitution
    pub api_key: String,
    /// Overrides the provider's default API base URL
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens_per_request: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Only used by OpenAI-compatible providers
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SandboxConfig {
    /// Real directory every file operation must resolve under
    #[serde(default = "default_sandbox_root")]
    pub root: PathBuf,
    /// Virtual prefix instructions use for that directory, e.g. "/data/dates.txt"
    #[serde(default = "default_sandbox_mount")]
    pub mount: PathBuf,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            root: default_sandbox_root(),
            mount: default_sandbox_mount(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ToolsConfig {
    /// Program and leading arguments used to run prettier
    #[serde(default = "default_prettier")]
    pub prettier: Vec<String>,
    /// Program and leading arguments used to run tesseract
    #[serde(default = "default_tesseract")]
    pub tesseract: Vec<String>,
    /// Speech-to-text command; the audio file path is appended and the
    /// transcript is read from stdout
    #[serde(default = "default_transcriber")]
    pub transcriber: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            prettier: default_prettier(),
            tesseract: default_tesseract(),
            transcriber: default_transcriber(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct HandlersConfig {
    /// Action names left out of the registry
    #[serde(default)]
    pub disabled: Vec<String>,
}

fn default_max_tokens() -> u32 {
    512
}

fn default_request_timeout() -> u64 {
    60
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_sandbox_root() -> PathBuf {
    PathBuf::from("./data")
}

fn default_sandbox_mount() -> PathBuf {
    PathBuf::from("/data")
}

fn default_prettier() -> Vec<String> {
    vec!["npx".to_string(), "prettier@3.4.2".to_string()]
}

fn default_tesseract() -> Vec<String> {
    vec!["tesseract".to_string()]
}

fn default_transcriber() -> Vec<String> {
    ["whisper-cli", "--no-prints", "--no-timestamps", "--file"]
        .map(String::from)
        .to_vec()
}

impl LlmConfig {
    /// Human-readable description, e.g. "openai (gpt-4o-mini)"
    pub fn description(&self) -> String {
        format!("{} ({})", self.provider, self.model)
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses a config document, expanding environment variables like ${AIPROXY_TOKEN}.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let expanded = shellexpand::env(content)?;
        let config: Config = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        match self.llm.provider.as_str() {
            "openai" | "anthropic" => {}
            other => anyhow::bail!(
                "Unsupported LLM provider: '{other}'. Supported: 'openai', 'anthropic'."
            ),
        }
        if self.llm.model.trim().is_empty() {
            anyhow::bail!("llm.model must not be empty");
        }
        if !self.sandbox.mount.is_absolute() {
            anyhow::bail!(
                "sandbox.mount must be an absolute path (got {})",
                self.sandbox.mount.display()
            );
        }
        if self.tools.prettier.is_empty() {
            anyhow::bail!("tools.prettier must name a program");
        }
        if self.tools.tesseract.is_empty() {
            anyhow::bail!("tools.tesseract must name a program");
        }
        if self.tools.transcriber.is_empty() {
            anyhow::bail!("tools.transcriber must name a program");
        }
        Ok(())
    }
}
