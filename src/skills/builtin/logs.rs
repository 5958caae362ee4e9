use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

use super::write_output;
use crate::skills::{Action, Handler, HandlerContext, ParamKind, ParamSpec};

const DEFAULT_COUNT: u64 = 10;

/// Collects the first line of the most recently modified `*.log` files.
pub struct RecentLogsHandler;

#[derive(Debug, Deserialize)]
pub struct RecentLogsParams {
    input_dir: PathBuf,
    output_file: PathBuf,
    count: u64,
}

/// `*.log` files directly inside `dir`, newest first.
async fn recent_logs(dir: &Path) -> std::io::Result<Vec<(SystemTime, PathBuf)>> {
    let mut logs = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }
        let meta = entry.metadata().await?;
        if meta.is_file() {
            logs.push((meta.modified()?, path));
        }
    }
    // Newest first; ties broken by name so the output is stable
    logs.sort_by(|(ta, pa), (tb, pb)| tb.cmp(ta).then_with(|| pa.cmp(pb)));
    Ok(logs)
}

async fn first_line(path: &Path) -> std::io::Result<String> {
    let file = tokio::fs::File::open(path).await?;
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line).await?;
    Ok(line.trim().to_string())
}

#[async_trait]
impl Handler for RecentLogsHandler {
    type Params = RecentLogsParams;

    fn action(&self) -> Action {
        Action::WriteRecentLogs
    }

    fn description(&self) -> &'static str {
        "Write the first line of the `count` most recently modified .log files in a directory, newest first."
    }

    fn params(&self) -> Vec<ParamSpec> {
        vec![
            ParamSpec::required("input_dir", ParamKind::Directory),
            ParamSpec::required("output_file", ParamKind::Path),
            ParamSpec::optional("count", ParamKind::Integer, json!(DEFAULT_COUNT)),
        ]
    }

    async fn run(&self, params: RecentLogsParams, ctx: &HandlerContext) -> anyhow::Result<String> {
        let dir_display = ctx.gate.display(&params.input_dir);
        let logs = recent_logs(&params.input_dir)
            .await
            .with_context(|| format!("cannot list {dir_display}"))?;

        let mut lines = Vec::new();
        for (_, path) in logs.iter().take(params.count as usize) {
            let line = first_line(path)
                .await
                .with_context(|| format!("cannot read {}", ctx.gate.display(path)))?;
            if line.is_empty() {
                debug!("Skipping empty log {}", ctx.gate.display(path));
            } else {
                lines.push(line);
            }
        }

        let mut output = lines.join("\n");
        output.push('\n');
        write_output(&params.output_file, output, ctx).await?;

        Ok(format!(
            "First lines of {} most recent log files in {dir_display} written to {}",
            lines.len(),
            ctx.gate.display(&params.output_file)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::context;
    use crate::skills::Invoke;
    use filetime::FileTime;

    /// Writes `logs/log-{i}.log` with mtimes increasing with `i`.
    fn seed_logs(root: &std::path::Path, n: i64) {
        let logs = root.join("logs");
        std::fs::create_dir_all(&logs).unwrap();
        for i in 0..n {
            let path = logs.join(format!("log-{i}.log"));
            std::fs::write(&path, format!("entry {i}\nsecond line\n")).unwrap();
            filetime::set_file_mtime(&path, FileTime::from_unix_time(1_700_000_000 + i * 60, 0))
                .unwrap();
        }
        std::fs::write(logs.join("notes.txt"), "not a log\n").unwrap();
    }

    async fn run(root: &std::path::Path, count: Option<u64>) -> String {
        let ctx = context(root);
        let real = ctx.gate.root().to_path_buf();
        let mut params = json!({
            "input_dir": real.join("logs"),
            "output_file": real.join("logs-recent.txt"),
            "count": DEFAULT_COUNT,
        });
        if let Some(count) = count {
            params["count"] = json!(count);
        }
        RecentLogsHandler
            .invoke(params.as_object().unwrap().clone(), &ctx)
            .await
            .unwrap();
        std::fs::read_to_string(root.join("logs-recent.txt")).unwrap()
    }

    #[tokio::test]
    async fn test_newest_first_and_capped() {
        let dir = tempfile::tempdir().unwrap();
        seed_logs(dir.path(), 12);
        let output = run(dir.path(), None).await;
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], "entry 11");
        assert_eq!(lines[9], "entry 2");
        assert!(output.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_custom_count() {
        let dir = tempfile::tempdir().unwrap();
        seed_logs(dir.path(), 5);
        let output = run(dir.path(), Some(2)).await;
        assert_eq!(output, "entry 4\nentry 3\n");
    }

    #[tokio::test]
    async fn test_empty_directory_writes_blank_line() {
        let dir = tempfile::tempdir().unwrap();
        seed_logs(dir.path(), 0);
        assert_eq!(run(dir.path(), None).await, "\n");
    }
}
