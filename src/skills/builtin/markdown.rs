use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::Context;
use async_trait::async_trait;
use pulldown_cmark::{Options, Parser};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::{read_text, write_output};
use crate::skills::{Action, Handler, HandlerContext, ParamKind, ParamSpec};

// ── create_markdown_index ─────────────────────────────────

/// Maps every Markdown file under a directory to its first H1 title.
pub struct MarkdownIndexHandler;

#[derive(Debug, Deserialize)]
pub struct MarkdownIndexParams {
    input_dir: PathBuf,
    output_file: PathBuf,
}

/// First `# ` heading of a Markdown document, trimmed.
fn first_heading(text: &str) -> Option<&str> {
    text.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("# "))
        .map(str::trim)
}

/// All `*.md` files below `dir`, recursively. Symlinks are not followed.
async fn markdown_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let path = entry.path();
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() && path.extension().and_then(|e| e.to_str()) == Some("md")
            {
                found.push(path);
            }
        }
    }
    Ok(found)
}

/// Relative path with `/` separators regardless of platform.
fn index_key(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

#[async_trait]
impl Handler for MarkdownIndexHandler {
    type Params = MarkdownIndexParams;

    fn action(&self) -> Action {
        Action::CreateMarkdownIndex
    }

    fn description(&self) -> &'static str {
        "Index every Markdown file under a directory by its first H1 title, written as a JSON object keyed by relative path."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("input_dir", ParamKind::Directory),
            ParamSpec::required("output_file", ParamKind::Path),
        ]
    }

    async fn run(&self, params: MarkdownIndexParams, ctx: &HandlerContext) -> anyhow::Result<String> {
        let files = markdown_files(&params.input_dir)
            .await
            .with_context(|| format!("cannot scan {}", ctx.gate.display(&params.input_dir)))?;

        let mut index = BTreeMap::new();
        for path in files {
            let Some(key) = index_key(&params.input_dir, &path) else {
                continue;
            };
            let text = read_text(&path, ctx).await?;
            match first_heading(&text) {
                Some(title) => {
                    index.insert(key, title.to_string());
                }
                None => debug!("No H1 in {key}"),
            }
        }

        write_output(&params.output_file, serde_json::to_vec(&index)?, ctx).await?;
        Ok(format!(
            "Index of {} Markdown files written to {}",
            index.len(),
            ctx.gate.display(&params.output_file)
        ))
    }
}

// ── format_markdown_file ──────────────────────────────────

/// Formats a Markdown file in place with prettier.
pub struct FormatMarkdownHandler;

#[derive(Debug, Deserialize)]
pub struct FormatMarkdownParams {
    file_path: PathBuf,
}

/// Pipes `input` through `command`, returning its stdout.
/// The command's stderr is included in the error on failure.
pub(crate) async fn pipe_through(command: &[String], input: Vec<u8>) -> anyhow::Result<Vec<u8>> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("empty command"))?;

    let mut child = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("cannot start {program}"))?;

    // Fed from a task so a chatty child cannot fill its stdout pipe and stall
    let writer = child.stdin.take().map(|mut stdin| {
        tokio::spawn(async move {
            let _ = stdin.write_all(&input).await;
        })
    });

    let output = child.wait_with_output().await?;
    if let Some(writer) = writer {
        let _ = writer.await;
    }
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!("{program} exited with {}: {}", output.status, stderr.trim());
        anyhow::bail!("{program} exited with {}: {}", output.status, stderr.trim());
    }
    Ok(output.stdout)
}

#[async_trait]
impl Handler for FormatMarkdownHandler {
    type Params = FormatMarkdownParams;

    fn action(&self) -> Action {
        Action::FormatMarkdownFile
    }

    fn description(&self) -> &'static str {
        "Format a Markdown file in place with prettier."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![ParamSpec::required("file_path", ParamKind::Path)]
    }

    async fn run(&self, params: FormatMarkdownParams, ctx: &HandlerContext) -> anyhow::Result<String> {
        let shown = ctx.gate.display(&params.file_path);
        let original = read_text(&params.file_path, ctx).await?;

        // prettier only uses the path to pick a parser, so the mount form is enough
        let mut command = ctx.tools.prettier.clone();
        command.push("--stdin-filepath".to_string());
        command.push(shown.clone());

        let formatted = pipe_through(&command, original.clone().into_bytes()).await?;
        if formatted == original.as_bytes() {
            return Ok(format!("{shown} is already formatted"));
        }
        write_output(&params.file_path, formatted, ctx).await?;
        Ok(format!("Formatted {shown}"))
    }
}

// ── convert_md_to_html ────────────────────────────────────

/// Renders a Markdown file to an HTML fragment.
pub struct MarkdownToHtmlHandler;

#[derive(Debug, Deserialize)]
pub struct MarkdownToHtmlParams {
    input_file: PathBuf,
    output_file: PathBuf,
}

/// CommonMark plus tables and strikethrough. Raw HTML in the source is
/// passed through unchanged.
fn render_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let mut html = String::with_capacity(markdown.len() * 3 / 2);
    pulldown_cmark::html::push_html(&mut html, Parser::new_ext(markdown, options));
    html
}

#[async_trait]
impl Handler for MarkdownToHtmlHandler {
    type Params = MarkdownToHtmlParams;

    fn action(&self) -> Action {
        Action::ConvertMarkdownToHtml
    }

    fn description(&self) -> &'static str {
        "Convert a Markdown file to HTML."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("input_file", ParamKind::Path),
            ParamSpec::required("output_file", ParamKind::Path),
        ]
    }

    async fn run(&self, params: MarkdownToHtmlParams, ctx: &HandlerContext) -> anyhow::Result<String> {
        let markdown = read_text(&params.input_file, ctx).await?;
        let html = render_html(&markdown);
        write_output(&params.output_file, &html, ctx).await?;
        Ok(format!(
            "{} converted to HTML in {}",
            ctx.gate.display(&params.input_file),
            ctx.gate.display(&params.output_file)
        ))
    }
}
