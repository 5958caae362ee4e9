//! Outcome normalization: every request ends in exactly one envelope,
//! either `{status: success, result}` or `{status: error, kind, message}`.

use serde::Serialize;

use super::error::{ErrorKind, TaskError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
}

/// Outcome of one invocation attempt. No partial-success state.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub status: Status,
    pub message: String,
    pub error_kind: Option<ErrorKind>,
}

impl ExecutionResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            message: message.into(),
            error_kind: None,
        }
    }

    pub fn failure(err: &TaskError) -> Self {
        Self {
            status: Status::Failure,
            message: err.to_string(),
            error_kind: Some(err.kind()),
        }
    }
}

impl From<Result<String, TaskError>> for ExecutionResult {
    fn from(outcome: Result<String, TaskError>) -> Self {
        match outcome {
            Ok(message) => Self::success(message),
            Err(err) => Self::failure(&err),
        }
    }
}

/// Wire shape returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Envelope {
    Success { result: String },
    Error { kind: ErrorKind, message: String },
}

impl Envelope {
    pub fn is_success(&self) -> bool {
        matches!(self, Envelope::Success { .. })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"status":"error","kind":"handler_error","message":"unserializable response: {e}"}}"#)
        })
    }
}

impl From<ExecutionResult> for Envelope {
    fn from(result: ExecutionResult) -> Self {
        match result.status {
            Status::Success => Envelope::Success {
                result: result.message,
            },
            Status::Failure => Envelope::Error {
                kind: result.error_kind.unwrap_or(ErrorKind::HandlerError),
                message: result.message,
            },
        }
    }
}

impl From<TaskError> for Envelope {
    fn from(err: TaskError) -> Self {
        ExecutionResult::failure(&err).into()
    }
}
