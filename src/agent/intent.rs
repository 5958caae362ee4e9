//! Intent resolution: free-form instruction → structured action descriptor.
//!
//! One completion call per instruction with a fixed prompt listing every
//! registered action. The reply must be a JSON object; the only cleanup
//! applied before parsing is removing code-fence markers.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::error::TaskError;
use crate::llm::CompletionService;
use crate::skills::HandlerRegistry;

/// Fence markers stripped from the start of a completion, longest first.
const OPENING_FENCES: [&str; 3] = ["```json", "```JSON", "```"];
const CLOSING_FENCE: &str = "```";

/// Structured output of intent resolution. `action` is still untrusted here;
/// the dispatcher checks it against the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionDescriptor {
    pub action: String,
    /// Usually an object; may be a bare scalar when the model was imprecise.
    pub parameters: Value,
}

#[derive(Debug, Deserialize)]
struct RawDescriptor {
    #[serde(alias = "function")]
    action: String,
    #[serde(default, alias = "params")]
    parameters: Value,
}

pub struct IntentResolver {
    llm: Arc<dyn CompletionService>,
    /// Everything before the instruction; built once from the registry.
    preamble: String,
}

impl IntentResolver {
    pub fn new(llm: Arc<dyn CompletionService>, registry: &HandlerRegistry, mount: &Path) -> Self {
        let mount = mount.display();
        let preamble = format!(
            "You are an assistant that maps user instructions to the operations of a \
             task automation agent.\n\
             Available actions:\n{}\n\n\
             Parameters marked with ? are optional.\n\
             All files live under {mount}. Write file and directory parameters as absolute \
             paths starting with {mount}.",
            registry.catalogue()
        );
        Self { llm, preamble }
    }

    /// Full prompt for one instruction.
    fn prompt(&self, instruction: &str) -> String {
        format!(
            "{}\n\n\
             Given the following instruction: \"{instruction}\"\n\n\
             Return only a valid JSON object with these keys:\n\
             - \"action\": the name of the action.\n\
             - \"parameters\": an object mapping parameter names to values.\n\
             No explanations, no markdown formatting.",
            self.preamble
        )
    }

    /// Resolves an instruction. Issues exactly one completion call.
    pub async fn resolve(&self, instruction: &str) -> Result<ActionDescriptor, TaskError> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(TaskError::validation("instruction must not be empty"));
        }

        let raw = self
            .llm
            .complete(&self.prompt(instruction))
            .await
            .map_err(|e| TaskError::ServiceUnavailable(format!("{e:#}")))?;

        debug!("Completion: {raw}");
        parse_descriptor(&raw)
    }
}

/// Parses completion text as a descriptor. No repair beyond fence stripping.
pub fn parse_descriptor(raw: &str) -> Result<ActionDescriptor, TaskError> {
    let malformed = |reason: String| {
        warn!("Malformed completion ({reason}): {raw}");
        TaskError::MalformedIntent {
            reason,
            raw: raw.to_string(),
        }
    };

    let body = strip_fences(raw);
    let value: Value =
        serde_json::from_str(body).map_err(|e| malformed(format!("not valid JSON: {e}")))?;
    if !value.is_object() {
        return Err(malformed("expected a JSON object".to_string()));
    }
    let descriptor: RawDescriptor =
        serde_json::from_value(value).map_err(|e| malformed(e.to_string()))?;

    Ok(ActionDescriptor {
        action: descriptor.action.trim().to_string(),
        parameters: descriptor.parameters,
    })
}

/// Removes one leading fence marker (with its language tag) and one
/// trailing fence marker.
fn strip_fences(raw: &str) -> &str {
    let mut body = raw.trim();
    if let Some(rest) = OPENING_FENCES
        .iter()
        .find_map(|fence| body.strip_prefix(fence))
    {
        body = rest;
    }
    if let Some(rest) = body.trim_end().strip_suffix(CLOSING_FENCE) {
        body = rest;
    }
    body.trim()
}
