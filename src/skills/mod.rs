pub mod builtin;
pub mod registry;

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use url::{Host, Url};

use crate::agent::error::TaskError;
use crate::config::ToolsConfig;
use crate::llm::{CompletionService, EmbeddingService};
use crate::sandbox::SecurityGate;

pub use registry::{HandlerRegistry, RegistryBuilder};

/// The closed set of operations the agent can run.
///
/// Resolver output is converted to this type right after the registry
/// lookup; nothing downstream sees the raw action string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Action {
    CountDays,
    SortContacts,
    WriteRecentLogs,
    CreateMarkdownIndex,
    ExtractEmailSender,
    ExtractCreditCardNumber,
    FindMostSimilarComments,
    CalculateTicketSales,
    FormatMarkdownFile,
    FetchUrl,
    ScrapeWebsite,
    ConvertMarkdownToHtml,
    CompressImage,
    TranscribeAudio,
}

impl Action {
    pub const ALL: [Action; 14] = [
        Action::CountDays,
        Action::SortContacts,
        Action::WriteRecentLogs,
        Action::CreateMarkdownIndex,
        Action::ExtractEmailSender,
        Action::ExtractCreditCardNumber,
        Action::FindMostSimilarComments,
        Action::CalculateTicketSales,
        Action::FormatMarkdownFile,
        Action::FetchUrl,
        Action::ScrapeWebsite,
        Action::ConvertMarkdownToHtml,
        Action::CompressImage,
        Action::TranscribeAudio,
    ];

    /// Wire name used in prompts and resolver output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CountDays => "count_days",
            Action::SortContacts => "sort_contacts",
            Action::WriteRecentLogs => "write_recent_logs",
            Action::CreateMarkdownIndex => "create_markdown_index",
            Action::ExtractEmailSender => "extract_email_sender",
            Action::ExtractCreditCardNumber => "extract_credit_card_number",
            Action::FindMostSimilarComments => "find_most_similar_comments",
            Action::CalculateTicketSales => "calculate_ticket_sales",
            Action::FormatMarkdownFile => "format_markdown_file",
            Action::FetchUrl => "fetch_url",
            Action::ScrapeWebsite => "scrape_website",
            Action::ConvertMarkdownToHtml => "convert_md_to_html",
            Action::CompressImage => "compress_image",
            Action::TranscribeAudio => "transcribe_audio",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == name)
            .ok_or_else(|| TaskError::NotFound(format!("unknown action '{name}'")))
    }
}

/// Semantic type of a handler parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// A single file under the sandbox root. Runs through the security gate.
    Path,
    /// An existing directory under the sandbox root. Runs through the security gate.
    Directory,
    String,
    Integer,
    Boolean,
    /// An HTTPS URL, or plain HTTP to a loopback host. See [`check_url`].
    Url,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::Path => "path",
            ParamKind::Directory => "directory",
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Boolean => "boolean",
            ParamKind::Url => "url",
        }
    }

    pub fn is_filesystem(&self) -> bool {
        matches!(self, ParamKind::Path | ParamKind::Directory)
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip == Ipv4Addr::LOCALHOST,
        Some(Host::Ipv6(ip)) => ip == Ipv6Addr::LOCALHOST,
        None => false,
    }
}

/// HTTPS everywhere, plain HTTP only for loopback hosts. Applied when a
/// `Url` parameter is bound and again on every redirect hop.
pub fn check_url(raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw).map_err(|e| anyhow::anyhow!("invalid URL: {e}"))?;
    match url.scheme() {
        "https" => Ok(url),
        "http" if is_loopback(&url) => Ok(url),
        scheme => Err(anyhow::anyhow!(
            "only HTTPS URLs are allowed (got {scheme}://)"
        )),
    }
}

/// One entry of a handler's ordered parameter schema.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    /// Filled in when an optional parameter is left out.
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn required(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            kind,
            required: true,
            default: None,
        }
    }

    pub fn optional(name: &'static str, kind: ParamKind, default: Value) -> Self {
        Self {
            name,
            kind,
            required: false,
            default: Some(default),
        }
    }
}

/// Shared, read-only collaborators handed to every invocation.
pub struct HandlerContext {
    pub gate: Arc<SecurityGate>,
    pub llm: Arc<dyn CompletionService>,
    /// `None` when the configured provider has no embeddings endpoint.
    pub embeddings: Option<Arc<dyn EmbeddingService>>,
    pub tools: ToolsConfig,
}

/// An operation in the catalogue.
///
/// Each handler declares its parameter schema and a typed parameter record.
/// The dispatcher binds and gates the raw parameters against the schema,
/// then the record is decoded from the bound map. Filesystem parameters
/// arrive as resolved paths inside the sandbox.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    type Params: DeserializeOwned + Send;

    fn action(&self) -> Action;

    /// One line shown to the completion model in the action catalogue.
    fn description(&self) -> &'static str;

    fn params(&self) -> Vec<ParamSpec>;

    /// Runs the operation and returns a human-readable status line.
    async fn run(&self, params: Self::Params, ctx: &HandlerContext) -> anyhow::Result<String>;
}

/// Object-safe view of a [`Handler`]: decode, then run.
#[async_trait]
pub trait Invoke: Send + Sync {
    async fn invoke(
        &self,
        params: Map<String, Value>,
        ctx: &HandlerContext,
    ) -> Result<String, TaskError>;
}

#[async_trait]
impl<H: Handler> Invoke for H {
    async fn invoke(
        &self,
        params: Map<String, Value>,
        ctx: &HandlerContext,
    ) -> Result<String, TaskError> {
        let typed: H::Params = serde_json::from_value(Value::Object(params)).map_err(|e| {
            TaskError::validation(format!("invalid parameters for {}: {e}", self.action()))
        })?;
        self.run(typed, ctx).await.map_err(TaskError::handler)
    }
}

/// Registered operation: name, ordered schema, invocation target.
#[derive(Clone)]
pub struct HandlerSpec {
    pub action: Action,
    pub description: &'static str,
    pub params: Vec<ParamSpec>,
    pub target: Arc<dyn Invoke>,
}

impl HandlerSpec {
    pub fn new<H: Handler>(handler: H) -> Self {
        Self {
            action: handler.action(),
            description: handler.description(),
            params: handler.params(),
            target: Arc::new(handler),
        }
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn required_params(&self) -> impl Iterator<Item = &ParamSpec> {
        self.params.iter().filter(|p| p.required)
    }

    /// Signature line for the prompt, e.g. `count_days(input_file, output_file, weekday_name)`.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| {
                if p.required {
                    p.name.to_string()
                } else {
                    format!("{}?", p.name)
                }
            })
            .collect();
        format!("{}({})", self.action, params.join(", "))
    }
}

impl fmt::Debug for HandlerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSpec")
            .field("action", &self.action)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Deserializes a weekday from its English name ("Wednesday", "wed").
pub(crate) fn de_weekday<'de, D>(deserializer: D) -> Result<chrono::Weekday, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;
    let raw = String::deserialize(deserializer)?;
    raw.trim()
        .parse::<chrono::Weekday>()
        .map_err(|_| serde::de::Error::custom(format!("invalid weekday name: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_check_url() {
        assert!(check_url("https://example.com/a").is_ok());
        assert!(check_url("http://localhost:8080/").is_ok());
        assert!(check_url("http://127.0.0.1/").is_ok());
        assert!(check_url("http://[::1]/").is_ok());

        let err = check_url("http://example.com/").unwrap_err();
        assert!(err.to_string().contains("only HTTPS"));
        assert!(check_url("http://localhost.example.com/").is_err());
        assert!(check_url("ftp://example.com/file").is_err());
        assert!(check_url("file:///etc/passwd").is_err());
        assert!(check_url("not a url").unwrap_err().to_string().contains("invalid URL"));
    }

    #[test]
    fn test_action_round_trips_through_wire_name() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
        }
    }

    #[test]
    fn test_unknown_action_is_not_found() {
        let err = "rm_rf".parse::<Action>().unwrap_err();
        assert!(matches!(err, TaskError::NotFound(_)));
        assert!(err.to_string().contains("rm_rf"));
    }

    #[test]
    fn test_action_names_are_unique() {
        let mut names: Vec<&str> = Action::ALL.iter().map(|a| a.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), Action::ALL.len());
    }

    #[test]
    fn test_param_spec_constructors() {
        let p = ParamSpec::required("input_file", ParamKind::Path);
        assert!(p.required);
        assert!(p.default.is_none());
        let p = ParamSpec::optional("count", ParamKind::Integer, json!(10));
        assert!(!p.required);
        assert_eq!(p.default, Some(json!(10)));
    }

    #[test]
    fn test_weekday_deserialization() {
        #[derive(serde::Deserialize)]
        struct P {
            #[serde(deserialize_with = "de_weekday")]
            day: chrono::Weekday,
        }
        let p: P = serde_json::from_value(json!({"day": "Wednesday"})).unwrap();
        assert_eq!(p.day, chrono::Weekday::Wed);
        let p: P = serde_json::from_value(json!({"day": "fri"})).unwrap();
        assert_eq!(p.day, chrono::Weekday::Fri);
        assert!(serde_json::from_value::<P>(json!({"day": "Caturday"})).is_err());
    }
}
