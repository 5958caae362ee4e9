//! Handler registry: the closed catalogue of operations.
//!
//! Built once at startup through [`RegistryBuilder`], then frozen. Action
//! names absent from the registry are rejected before any invocation.

use std::collections::BTreeMap;

use tracing::debug;

use super::{Action, Handler, HandlerSpec};
use crate::agent::error::TaskError;

#[derive(Default)]
pub struct RegistryBuilder {
    handlers: BTreeMap<Action, HandlerSpec>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler. Registering the same action twice is a startup error.
    pub fn register<H: Handler>(&mut self, handler: H) -> anyhow::Result<&mut Self> {
        let spec = HandlerSpec::new(handler);
        if self.handlers.contains_key(&spec.action) {
            anyhow::bail!("Handler '{}' registered twice", spec.action);
        }
        debug!("Registering handler: {}", spec.signature());
        self.handlers.insert(spec.action, spec);
        Ok(self)
    }

    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

/// Immutable action → spec map, shared read-only by the dispatcher.
#[derive(Debug)]
pub struct HandlerRegistry {
    handlers: BTreeMap<Action, HandlerSpec>,
}

impl HandlerRegistry {
    /// Resolves a raw action name to its typed action and spec.
    pub fn lookup(&self, name: &str) -> Result<&HandlerSpec, TaskError> {
        let action: Action = name.parse()?;
        self.get(action)
            .ok_or_else(|| TaskError::NotFound(format!("action '{action}' is not available")))
    }

    pub fn get(&self, action: Action) -> Option<&HandlerSpec> {
        self.handlers.get(&action)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HandlerSpec> {
        self.handlers.values()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Numbered catalogue, one `signature: description` line per action.
    pub fn catalogue(&self) -> String {
        self.iter()
            .enumerate()
            .map(|(i, spec)| format!("{}. {}: {}", i + 1, spec.signature(), spec.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
