//! Dispatch: resolved descriptor → registered handler → one invocation.
//!
//! Order of checks for every descriptor:
//!
//! 1. Registry lookup; unknown or unregistered actions stop here.
//! 2. Parameter shape (object, or a bare scalar for single-parameter handlers).
//! 3. Security gate on every filesystem parameter.
//! 4. Binding of the remaining parameters: type checks, defaults, unknown keys.
//! 5. Per-path locks, then exactly one invocation.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use super::error::TaskError;
use super::intent::ActionDescriptor;
use crate::sandbox::PathLocks;
use crate::skills::{
    check_url, HandlerContext, HandlerRegistry, HandlerSpec, ParamKind, ParamSpec,
};

/// Parameters after gating and binding, ready for typed decoding.
#[derive(Debug)]
struct Bound {
    params: Map<String, Value>,
    /// Resolved filesystem paths, locked for the duration of the call.
    paths: Vec<PathBuf>,
}

pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    ctx: HandlerContext,
    locks: PathLocks,
}

impl Dispatcher {
    pub fn new(registry: Arc<HandlerRegistry>, ctx: HandlerContext) -> Self {
        Self {
            registry,
            ctx,
            locks: PathLocks::new(),
        }
    }

    /// Runs one descriptor to completion. No retries, no timeout.
    pub async fn dispatch(&self, descriptor: &ActionDescriptor) -> Result<String, TaskError> {
        let spec = self.registry.lookup(&descriptor.action)?;
        let bound = self.bind(spec, &descriptor.parameters)?;

        let _guard = self.locks.acquire(bound.paths).await;
        info!("Invoking {}", spec.action);
        let outcome = spec.target.invoke(bound.params, &self.ctx).await;
        match &outcome {
            Ok(message) => info!("{} completed: {message}", spec.action),
            Err(e) => info!("{} failed: {e}", spec.action),
        }
        outcome
    }

    fn bind(&self, spec: &HandlerSpec, parameters: &Value) -> Result<Bound, TaskError> {
        let mut raw = into_map(spec, parameters)?;

        // Gate every filesystem argument before looking at anything else.
        let mut params = Map::new();
        let mut paths = Vec::new();
        for param in spec.params.iter().filter(|p| p.kind.is_filesystem()) {
            let Some(value) = take_present(&mut raw, param.name) else {
                continue;
            };
            let text = expect_str(param, &value)?;
            let resolved = match param.kind {
                ParamKind::Directory => self.ctx.gate.check_dir(param.name, text)?,
                _ => self.ctx.gate.check_file(param.name, text)?,
            };
            params.insert(
                param.name.to_string(),
                Value::String(resolved.to_string_lossy().into_owned()),
            );
            paths.push(resolved);
        }

        if let Some(unknown) = raw.keys().find(|k| spec.param(k).is_none()) {
            return Err(TaskError::validation(format!(
                "unexpected parameter '{unknown}' for {}",
                spec.action
            )));
        }

        for param in &spec.params {
            if params.contains_key(param.name) {
                continue;
            }
            match take_present(&mut raw, param.name) {
                Some(value) => {
                    check_kind(param, &value)?;
                    params.insert(param.name.to_string(), value);
                }
                None if param.required => {
                    return Err(TaskError::validation(format!(
                        "missing required parameter '{}' for {}",
                        param.name, spec.action
                    )));
                }
                None => {
                    if let Some(default) = &param.default {
                        debug!("Defaulting '{}' for {}", param.name, spec.action);
                        params.insert(param.name.to_string(), default.clone());
                    }
                }
            }
        }

        Ok(Bound { params, paths })
    }
}

/// Normalizes the descriptor's parameters into a name → value map.
///
/// A bare scalar is accepted only when the handler has exactly one required
/// parameter, and is bound to that parameter.
fn into_map(spec: &HandlerSpec, parameters: &Value) -> Result<Map<String, Value>, TaskError> {
    match parameters {
        Value::Object(map) => Ok(map.clone()),
        Value::Null => Ok(Map::new()),
        Value::Array(_) => Err(TaskError::validation(format!(
            "parameters for {} must be an object",
            spec.action
        ))),
        scalar => {
            let mut required = spec.required_params();
            match (required.next(), required.next()) {
                (Some(only), None) => {
                    debug!(
                        "Binding scalar parameter to '{}' for {}",
                        only.name, spec.action
                    );
                    let mut map = Map::new();
                    map.insert(only.name.to_string(), scalar.clone());
                    Ok(map)
                }
                _ => Err(TaskError::validation(format!(
                    "parameters for {} must be an object naming each parameter",
                    spec.action
                ))),
            }
        }
    }
}

/// Removes a parameter, treating an explicit `null` as absent.
fn take_present(raw: &mut Map<String, Value>, name: &str) -> Option<Value> {
    raw.remove(name).filter(|v| !v.is_null())
}

fn expect_str<'a>(param: &ParamSpec, value: &'a Value) -> Result<&'a str, TaskError> {
    value.as_str().ok_or_else(|| mistyped(param))
}

fn check_kind(param: &ParamSpec, value: &Value) -> Result<(), TaskError> {
    let ok = match param.kind {
        ParamKind::Path | ParamKind::Directory | ParamKind::String => value.is_string(),
        ParamKind::Integer => value.is_i64() || value.is_u64(),
        ParamKind::Boolean => value.is_boolean(),
        ParamKind::Url => {
            let text = expect_str(param, value)?;
            check_url(text)
                .map_err(|e| TaskError::validation(format!("parameter '{}': {e}", param.name)))?;
            true
        }
    };
    if ok {
        Ok(())
    } else {
        Err(mistyped(param))
    }
}

fn mistyped(param: &ParamSpec) -> TaskError {
    TaskError::validation(format!(
        "parameter '{}' must be a {}",
        param.name,
        param.kind.as_str()
    ))
}
