//! Failure taxonomy surfaced to callers.
//!
//! Every failure the core reports maps to exactly one [`ErrorKind`]; the
//! kind is stable on the wire so callers can branch on it.

use serde::Serialize;
use thiserror::Error;

/// Longest slice of raw completion text carried into an error message.
const MAX_RAW_IN_MESSAGE: usize = 200;

/// Stable, machine-readable error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedIntent,
    NotFound,
    ValidationError,
    AccessDenied,
    HandlerError,
    ServiceUnavailable,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedIntent => write!(f, "malformed_intent"),
            Self::NotFound => write!(f, "not_found"),
            Self::ValidationError => write!(f, "validation_error"),
            Self::AccessDenied => write!(f, "access_denied"),
            Self::HandlerError => write!(f, "handler_error"),
            Self::ServiceUnavailable => write!(f, "service_unavailable"),
        }
    }
}

#[derive(Error, Debug)]
pub enum TaskError {
    /// The completion text could not be read as an action descriptor.
    #[error("could not interpret the instruction: {reason} (completion: {})", truncate(.raw))]
    MalformedIntent { reason: String, raw: String },

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    /// Carries only the reason, never the resolved path.
    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("task execution failed: {0}")]
    Handler(String),

    #[error("completion service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl TaskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedIntent { .. } => ErrorKind::MalformedIntent,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::AccessDenied(_) => ErrorKind::AccessDenied,
            Self::Handler(_) => ErrorKind::HandlerError,
            Self::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Wraps a failure raised inside a handler, keeping its full message chain.
    pub fn handler(err: anyhow::Error) -> Self {
        Self::Handler(format!("{err:#}"))
    }
}

fn truncate(raw: &str) -> String {
    if raw.chars().count() > MAX_RAW_IN_MESSAGE {
        let head: String = raw.chars().take(MAX_RAW_IN_MESSAGE).collect();
        format!("{head}…")
    } else {
        raw.to_string()
    }
}
