//! Filesystem sandbox: the single trust boundary between an untrusted
//! interpretation of an instruction and the local filesystem.
//!
//! Every path argument is resolved against the sandbox root and checked
//! again here, no matter what the resolver intended. The checks are:
//!
//! 1. Containment (always): after lexical normalization the path must lie
//!    under the root. Traversal (`..`) and absolute paths outside the mount
//!    are rejected. The deepest existing ancestor is then canonicalized and
//!    checked too, so a symlink inside the sandbox cannot point outside it,
//!    even for an output file that does not exist yet.
//! 2. Shape (only if the path exists): file parameters must not name a
//!    directory, directory parameters must name one.
//!
//! Denials never carry the resolved path.

pub mod locks;

use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::agent::error::TaskError;
use crate::config::SandboxConfig;

pub use locks::PathLocks;

/// Immutable sandbox policy, built once at startup.
#[derive(Debug, Clone)]
pub struct SecurityGate {
    /// Canonical sandbox root.
    root: PathBuf,
    /// Virtual prefix instruction paths are written against (e.g. `/data`).
    mount: PathBuf,
}

impl SecurityGate {
    /// Creates the gate. The root must exist and be a directory.
    pub fn new(config: &SandboxConfig) -> anyhow::Result<Self> {
        let root = std::fs::canonicalize(&config.root).map_err(|e| {
            anyhow::anyhow!(
                "Sandbox root {} is not accessible: {e}",
                config.root.display()
            )
        })?;
        if !root.is_dir() {
            anyhow::bail!("Sandbox root {} is not a directory", root.display());
        }
        if !config.mount.is_absolute() {
            anyhow::bail!("Sandbox mount {} must be absolute", config.mount.display());
        }
        Ok(Self {
            root,
            mount: normalize(&config.mount).unwrap_or_else(|| PathBuf::from("/")),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mount(&self) -> &Path {
        &self.mount
    }

    /// Validates a file argument: contained, and not an existing directory.
    /// Output paths that don't exist yet are allowed.
    pub fn check_file(&self, param: &str, raw: &str) -> Result<PathBuf, TaskError> {
        let path = self.contain(param, raw)?;
        if path.is_dir() {
            warn!("Denied '{param}': names a directory");
            return Err(TaskError::AccessDenied(format!(
                "'{param}' must name a single file, not a directory"
            )));
        }
        Ok(path)
    }

    /// Validates a directory argument: contained, and an existing directory.
    pub fn check_dir(&self, param: &str, raw: &str) -> Result<PathBuf, TaskError> {
        let path = self.contain(param, raw)?;
        if !path.is_dir() {
            return Err(TaskError::validation(format!(
                "'{param}' must name an existing directory"
            )));
        }
        Ok(path)
    }

    /// Maps a resolved path back to its mount form, e.g.
    /// `<root>/dates-wednesdays.txt` → `/data/dates-wednesdays.txt`.
    pub fn display(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) => self.mount.join(rel).to_string_lossy().into_owned(),
            Err(_) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        }
    }

    /// Resolves `raw` under the root and enforces containment.
    fn contain(&self, param: &str, raw: &str) -> Result<PathBuf, TaskError> {
        let deny = |reason: &str| {
            warn!("Denied '{param}': {reason}");
            TaskError::AccessDenied(format!("'{param}' {reason}"))
        };

        let raw = raw.trim();
        if raw.is_empty() {
            return Err(TaskError::validation(format!("'{param}' must not be empty")));
        }
        if raw.contains('\0') {
            return Err(deny("contains a NUL byte"));
        }

        let candidate = Path::new(raw);
        let relative = if candidate.is_absolute() {
            let normalized = normalize(candidate).ok_or_else(|| deny("escapes the sandbox"))?;
            match normalized.strip_prefix(&self.mount) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => return Err(deny("is outside the sandbox")),
            }
        } else {
            candidate.to_path_buf()
        };

        let resolved = normalize(&self.root.join(relative))
            .filter(|p| p.starts_with(&self.root))
            .ok_or_else(|| deny("escapes the sandbox"))?;

        // Symlinks are followed through the deepest existing ancestor, so a
        // path that does not exist yet cannot be created through one.
        // A dangling link has no canonical form and is refused outright.
        let canonical = resolved
            .ancestors()
            .find_map(|p| match std::fs::canonicalize(p) {
                Ok(canonical) => Some(Ok(canonical)),
                Err(_) if p.symlink_metadata().is_ok() => Some(Err(())),
                Err(_) => None,
            })
            .and_then(Result::ok)
            .ok_or_else(|| deny("cannot be resolved"))?;
        if !canonical.starts_with(&self.root) {
            return Err(deny("escapes the sandbox"));
        }

        debug!("Resolved '{param}' → {}", resolved.display());
        Ok(resolved)
    }
}

/// Lexical normalization: drops `.`, applies `..`. Returns `None` when a
/// `..` would climb above the start of the path.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    let mut depth = 0usize;
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                out.pop();
                depth -= 1;
            }
            Component::Normal(part) => {
                out.push(part);
                depth += 1;
            }
        }
    }
    Some(out)
}
