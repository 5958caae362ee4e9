use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use super::dispatcher::Dispatcher;
use super::error::TaskError;
use super::intent::IntentResolver;
use super::response::{Envelope, ExecutionResult};
use crate::llm::CompletionService;
use crate::sandbox::SecurityGate;
use crate::skills::{HandlerContext, HandlerRegistry};

/// Content of a file read back from the sandbox.
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Text(String),
    Bytes(Vec<u8>),
}

/// The task agent, core of taskgate.
///
/// Takes instruction text, resolves it through the completion service,
/// dispatches it to the catalogue, and answers with one envelope.
/// Holds no per-request state.
pub struct TaskAgent {
    resolver: IntentResolver,
    dispatcher: Dispatcher,
    registry: Arc<HandlerRegistry>,
    gate: Arc<SecurityGate>,
    llm_description: String,
    start_time: std::time::Instant,
}

impl TaskAgent {
    pub fn new(registry: Arc<HandlerRegistry>, ctx: HandlerContext) -> Self {
        let llm: Arc<dyn CompletionService> = ctx.llm.clone();
        let gate = ctx.gate.clone();
        Self {
            resolver: IntentResolver::new(llm.clone(), &registry, gate.mount()),
            dispatcher: Dispatcher::new(registry.clone(), ctx),
            registry,
            gate,
            llm_description: llm.description(),
            start_time: std::time::Instant::now(),
        }
    }

    /// Primary entry point: instruction text in, envelope out.
    pub async fn submit(&self, instruction: &str) -> Envelope {
        let request_id = Uuid::new_v4();
        info!("[{request_id}] Instruction: {instruction}");

        let outcome = match self.resolver.resolve(instruction).await {
            Ok(descriptor) => {
                info!(
                    "[{request_id}] Resolved to {} {}",
                    descriptor.action, descriptor.parameters
                );
                self.dispatcher.dispatch(&descriptor).await
            }
            Err(e) => Err(e),
        };

        if let Err(ref e) = outcome {
            warn!("[{request_id}] {}: {e}", e.kind());
        }
        ExecutionResult::from(outcome).into()
    }

    /// Reads a file back from the sandbox, through the security gate.
    pub async fn read_artifact(&self, path: &str) -> Result<Artifact, TaskError> {
        let resolved = self.gate.check_file("path", path)?;
        let bytes = match tokio::fs::read(&resolved).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TaskError::NotFound("file not found".to_string()));
            }
            Err(e) => {
                warn!("Reading {} failed: {e}", resolved.display());
                return Err(TaskError::Handler(format!(
                    "could not read file: {}",
                    e.kind()
                )));
            }
        };
        Ok(match String::from_utf8(bytes) {
            Ok(text) => Artifact::Text(text),
            Err(e) => Artifact::Bytes(e.into_bytes()),
        })
    }

    /// Handles one input line: slash commands locally, everything else
    /// through [`submit`](Self::submit). Returns the text to print.
    pub async fn handle_line(&self, line: &str) -> String {
        let line = line.trim();
        if line.starts_with('/') {
            self.handle_command(line).await
        } else {
            self.submit(line).await.to_json()
        }
    }

    // ── Slash commands ────────────────────────────────────

    /// Commands are answered locally and never reach the completion service.
    async fn handle_command(&self, body: &str) -> String {
        let (command, arg) = match body.split_once(' ') {
            Some((command, arg)) => (command.to_lowercase(), arg.trim()),
            None => (body.to_lowercase(), ""),
        };

        info!("Command: {command}");

        match command.as_str() {
            "/read" => self.cmd_read(arg).await,
            "/actions" => self.registry.catalogue(),
            "/status" => self.cmd_status(),
            "/help" => cmd_help(),
            "/ping" => "pong".to_string(),
            _ => format!("Unknown command: {command}\nType /help for available commands."),
        }
    }

    /// /read PATH: print a sandbox file
    async fn cmd_read(&self, path: &str) -> String {
        match self.read_artifact(path).await {
            Ok(artifact) => render_artifact(&artifact),
            Err(e) => Envelope::from(e).to_json(),
        }
    }

    /// /status: agent status overview
    fn cmd_status(&self) -> String {
        let uptime = self.start_time.elapsed();
        let hours = uptime.as_secs() / 3600;
        let minutes = (uptime.as_secs() % 3600) / 60;

        format!(
            "taskgate status\n\
             Uptime: {hours}h {minutes}m\n\
             LLM: {}\n\
             Sandbox: {}\n\
             Actions: {}",
            self.llm_description,
            self.gate.mount().display(),
            self.registry.len(),
        )
    }
}

/// Text artifacts verbatim; binary ones by size.
pub fn render_artifact(artifact: &Artifact) -> String {
    match artifact {
        Artifact::Text(text) => text.clone(),
        Artifact::Bytes(bytes) => format!("<binary file, {} bytes>", bytes.len()),
    }
}

/// /help: list available commands
fn cmd_help() -> String {
    "\
Type an instruction in plain English, or one of:\n\
  /read PATH    Print a file from the sandbox\n\
  /actions      List the available actions\n\
  /status       Agent info and uptime\n\
  /ping         Check if the agent is alive\n\
  /help         This message"
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::error::ErrorKind;
    use crate::agent::testing::{context_with, registry_with, FakeCompletion, RecordingHandler};
    use std::sync::atomic::Ordering;

    fn agent(dir: &std::path::Path, llm: Arc<FakeCompletion>, handler: RecordingHandler) -> TaskAgent {
        TaskAgent::new(
            Arc::new(registry_with(vec![handler])),
            context_with(dir, llm, None),
        )
    }

    #[tokio::test]
    async fn test_submit_success() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(FakeCompletion::reply(
            r#"{"action": "sort_contacts", "parameters": {"input_file": "/data/c.json", "output_file": "/data/s.json"}}"#,
        ));
        let agent = agent(dir.path(), llm, RecordingHandler::sort_contacts());
        let envelope = agent.submit("sort my contacts").await;
        assert_eq!(
            envelope,
            Envelope::Success {
                result: "sort_contacts done".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_prose_completion_is_malformed_without_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(FakeCompletion::reply("Sure! Here's what you asked for..."));
        let handler = RecordingHandler::sort_contacts();
        let calls = handler.calls();
        let agent = agent(dir.path(), llm, handler);

        match agent.submit("sort my contacts").await {
            Envelope::Error { kind, .. } => assert_eq!(kind, ErrorKind::MalformedIntent),
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_service_unavailable_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(FakeCompletion::failing("503 Service Unavailable"));
        let agent = agent(dir.path(), llm, RecordingHandler::sort_contacts());
        match agent.submit("sort my contacts").await {
            Envelope::Error { kind, message } => {
                assert_eq!(kind, ErrorKind::ServiceUnavailable);
                assert!(message.contains("503"));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_access_denied_envelope_hides_root() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(FakeCompletion::reply(
            r#"{"action": "sort_contacts", "parameters": {"input_file": "../../etc/passwd", "output_file": "/data/s.json"}}"#,
        ));
        let agent = agent(dir.path(), llm, RecordingHandler::sort_contacts());
        let json = agent.submit("sort the passwd file").await.to_json();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        assert!(json.contains("\"kind\":\"access_denied\""));
        assert!(!json.contains(root.to_string_lossy().as_ref()));
        assert!(!json.contains("/etc/passwd"));
    }

    #[tokio::test]
    async fn test_read_artifact_text_and_binary() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("out.txt"), "3").unwrap();
        std::fs::write(dir.path().join("img.bin"), [0xff, 0xfe, 0x00]).unwrap();
        let agent = agent(dir.path(), Arc::new(FakeCompletion::new(vec![])), RecordingHandler::sort_contacts());

        assert_eq!(
            agent.read_artifact("/data/out.txt").await.unwrap(),
            Artifact::Text("3".to_string())
        );
        let binary = agent.read_artifact("/data/img.bin").await.unwrap();
        assert_eq!(binary, Artifact::Bytes(vec![0xff, 0xfe, 0x00]));
        assert_eq!(render_artifact(&binary), "<binary file, 3 bytes>");
    }

    #[tokio::test]
    async fn test_read_artifact_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("logs")).unwrap();
        let agent = agent(dir.path(), Arc::new(FakeCompletion::new(vec![])), RecordingHandler::sort_contacts());

        let err = agent.read_artifact("/data/missing.txt").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = agent.read_artifact("/etc/passwd").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
        let err = agent.read_artifact("/data/logs").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
    }

    #[tokio::test]
    async fn test_commands_never_reach_completion_service() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("out.txt"), "hello").unwrap();
        let llm = Arc::new(FakeCompletion::new(vec![]));
        let agent = agent(dir.path(), llm.clone(), RecordingHandler::sort_contacts());

        assert_eq!(agent.handle_line("/ping").await, "pong");
        assert_eq!(agent.handle_line("/read /data/out.txt").await, "hello");
        assert!(agent.handle_line("/actions").await.contains("sort_contacts"));
        assert!(agent.handle_line("/help").await.contains("/read PATH"));
        assert!(agent.handle_line("/status").await.contains("Actions: 1"));
        assert!(agent.handle_line("/bogus").await.contains("Unknown command"));
        assert!(agent
            .handle_line("/read ../secret")
            .await
            .contains("access_denied"));
        assert_eq!(llm.calls(), 0);
    }
}
