//! Network handlers: download a URL into the sandbox, or scrape its text.
//!
//! Only HTTPS is allowed, except for loopback hosts. Bodies are capped at
//! 25 MB and the cap is enforced while streaming, not just from
//! `Content-Length`.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Semaphore;
use tracing::{debug, info};
use reqwest::redirect::Policy;

use super::write_output;
use crate::skills::{check_url, Action, Handler, HandlerContext, ParamKind, ParamSpec};

/// Maximum response body size (25 MB).
const MAX_BODY_SIZE: u64 = 25 * 1024 * 1024;

const READ_TIMEOUT_SECS: u64 = 60;

const CONNECT_TIMEOUT_SECS: u64 = 10;

const MAX_CONCURRENT_DOWNLOADS: usize = 4;

const MAX_REDIRECTS: usize = 5;

/// Text wrapping width for html2text conversion.
const DEFAULT_TEXT_WIDTH: usize = 100;

const USER_AGENT: &str = concat!("taskgate/", env!("CARGO_PKG_VERSION"));

/// HTTP client shared by the network handlers, with a download limit.
pub struct Fetcher {
    client: reqwest::Client,
    semaphore: Arc<Semaphore>,
}

/// A downloaded body and its media type (without parameters).
struct Fetched {
    body: Vec<u8>,
    content_type: String,
}

impl Fetcher {
    pub fn new() -> Self {
        let client = client_builder()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self::with_client(client)
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_DOWNLOADS)),
        }
    }

    async fn get(&self, raw: &str) -> Result<Fetched> {
        let url = check_url(raw)?;
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| anyhow!("download limiter closed: {e}"))?;

        debug!("Fetching {url}");
        let mut response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("{url} answered HTTP {status}"));
        }
        if let Some(len) = response.content_length() {
            if len > MAX_BODY_SIZE {
                return Err(too_large(len));
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(';').next().unwrap_or(s).trim().to_lowercase())
            .unwrap_or_default();

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            body.extend_from_slice(&chunk);
            if body.len() as u64 > MAX_BODY_SIZE {
                return Err(too_large(body.len() as u64));
            }
        }

        info!("Fetched {url} ({} bytes, {content_type})", body.len());
        Ok(Fetched { body, content_type })
    }
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Client settings shared by every fetch. Each redirect hop must pass the
/// same URL rule as the first request.
fn client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(READ_TIMEOUT_SECS))
        .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .redirect(Policy::custom(|attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                return attempt.error(format!("more than {MAX_REDIRECTS} redirects"));
            }
            let next = check_url(attempt.url().as_str());
            match next {
                Ok(_) => attempt.follow(),
                Err(e) => {
                    debug!("Refusing redirect: {e}");
                    attempt.error(format!("redirect refused: {e}"))
                }
            }
        }))
}

fn too_large(size: u64) -> anyhow::Error {
    anyhow!("response too large: {size} bytes (max {MAX_BODY_SIZE})")
}

fn is_html(content_type: &str) -> bool {
    content_type.contains("text/html") || content_type.contains("application/xhtml")
}

/// Readable text of a response body.
fn extract_text(fetched: &Fetched, width: usize) -> Result<String> {
    if is_html(&fetched.content_type) {
        return html2text::from_read(fetched.body.as_slice(), width)
            .map_err(|e| anyhow!("cannot convert HTML: {e}"));
    }
    let text = String::from_utf8_lossy(&fetched.body);
    if text.chars().take(512).any(|c| c == '\0') {
        return Err(anyhow!(
            "cannot extract text from binary content ({})",
            fetched.content_type
        ));
    }
    Ok(text.into_owned())
}

// ── fetch_url ─────────────────────────────────────────────

/// Downloads a URL into a sandbox file.
#[derive(Default)]
pub struct FetchUrlHandler {
    fetcher: Fetcher,
}

impl FetchUrlHandler {
    pub fn new() -> Self {
        Self {
            fetcher: Fetcher::new(),
        }
    }

    pub fn with_fetcher(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }
}

#[derive(Debug, Deserialize)]
pub struct FetchUrlParams {
    url: String,
    output_file: PathBuf,
}

#[async_trait]
impl Handler for FetchUrlHandler {
    type Params = FetchUrlParams;

    fn action(&self) -> Action {
        Action::FetchUrl
    }

    fn description(&self) -> &'static str {
        "Download the body of an HTTPS URL into a file."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("url", ParamKind::Url),
            ParamSpec::required("output_file", ParamKind::Path),
        ]
    }

    async fn run(&self, params: FetchUrlParams, ctx: &HandlerContext) -> Result<String> {
        let fetched = self.fetcher.get(&params.url).await?;
        write_output(&params.output_file, &fetched.body, ctx).await?;
        Ok(format!(
            "Saved {} bytes from {} to {}",
            fetched.body.len(),
            params.url,
            ctx.gate.display(&params.output_file)
        ))
    }
}

// ── scrape_website ────────────────────────────────────────

/// Fetches a page and stores its readable text.
#[derive(Default)]
pub struct ScrapeWebsiteHandler {
    fetcher: Fetcher,
}

impl ScrapeWebsiteHandler {
    pub fn new() -> Self {
        Self {
            fetcher: Fetcher::new(),
        }
    }

    pub fn with_fetcher(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScrapeWebsiteParams {
    url: String,
    output_file: PathBuf,
    width: NonZeroUsize,
}

#[async_trait]
impl Handler for ScrapeWebsiteHandler {
    type Params = ScrapeWebsiteParams;

    fn action(&self) -> Action {
        Action::ScrapeWebsite
    }

    fn description(&self) -> &'static str {
        "Fetch a web page and write its readable text (HTML stripped), wrapped at `width` columns."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("url", ParamKind::Url),
            ParamSpec::required("output_file", ParamKind::Path),
            ParamSpec::optional("width", ParamKind::Integer, json!(DEFAULT_TEXT_WIDTH)),
        ]
    }

    async fn run(&self, params: ScrapeWebsiteParams, ctx: &HandlerContext) -> Result<String> {
        let fetched = self.fetcher.get(&params.url).await?;
        let text = extract_text(&fetched, params.width.get())?;
        let text = text.trim();

        write_output(&params.output_file, text, ctx).await?;
        Ok(format!(
            "Text of {} ({} characters) written to {}",
            params.url,
            text.chars().count(),
            ctx.gate.display(&params.output_file)
        ))
    }
}
