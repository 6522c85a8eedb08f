//! Remote content store: a path-keyed, revisioned blob store.
//!
//! The reconciler and orchestrator only ever see [`ContentStore`]; whether the
//! bytes live in a GitHub repository or a local checkout is decided once, when
//! the store is opened.

pub mod dry_run;
pub mod github;
pub mod local;
#[cfg(test)]
pub mod memory;
pub mod retry;
pub mod staged;

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub use dry_run::DryRunStore;
pub use github::GitHubStore;
pub use local::LocalStore;
pub use retry::RetryPolicy;
pub use staged::StagedStore;

/// Optimistic-concurrency token of a stored path (a git blob sha for GitHub).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Revision(pub String);

impl Display for Revision {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{method} {path} failed with status {status}: {body}")]
    Status {
        method: &'static str,
        path: String,
        status: u16,
        body: String,
    },
    #[error("request for {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("revision conflict on {path}")]
    Conflict { path: String },
    #[error("invalid payload for {path}: {message}")]
    Payload { path: String, message: String },
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Transport { .. } => true,
            StoreError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn payload(path: &str, message: impl Into<String>) -> Self {
        StoreError::Payload {
            path: path.to_string(),
            message: message.into(),
        }
    }

    pub fn io(path: &str, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_string(),
            source,
        }
    }
}

pub trait ContentStore {
    fn backend(&self) -> &'static str;

    /// Whether writes can succeed at all with the configured credentials.
    fn writable(&self) -> bool {
        true
    }

    /// Fails when the store cannot be reached at all.
    fn check_access(&self) -> Result<(), StoreError>;

    fn revision(&self, path: &str) -> Result<Option<Revision>, StoreError>;

    fn exists(&self, path: &str) -> Result<bool, StoreError> {
        Ok(self.revision(path)?.is_some())
    }

    /// Returns [`StoreError::NotFound`] for a missing path.
    fn download(&self, path: &str) -> Result<Vec<u8>, StoreError>;

    /// Create or overwrite `path`.
    fn upload(&self, path: &str, bytes: &[u8], message: &str) -> Result<Revision, StoreError>;

    fn delete(&self, path: &str, message: &str, revision: &Revision) -> Result<(), StoreError>;

    /// Paths of the files directly inside `dir`, sorted. A missing directory
    /// lists as empty.
    fn list(&self, dir: &str) -> Result<Vec<String>, StoreError>;
}

/// Delete `path` at its current revision. `Ok(false)` when it is already gone.
pub fn delete_if_present(
    store: &dyn ContentStore,
    path: &str,
    message: &str,
) -> Result<bool, StoreError> {
    match store.revision(path)? {
        Some(revision) => store.delete(path, message, &revision).map(|()| true),
        None => Ok(false),
    }
}

/// Rejects absolute paths and parent traversal before they reach a backend.
pub fn validate_store_path(path: &str) -> Result<(), StoreError> {
    if path.is_empty() {
        return Err(StoreError::payload(path, "empty path"));
    }
    if path.starts_with('/') || path.contains('\\') {
        return Err(StoreError::payload(path, "path must be relative"));
    }
    if path.split('/').any(|segment| segment == ".." || segment.is_empty()) {
        return Err(StoreError::payload(path, "path has an empty or `..` segment"));
    }
    Ok(())
}
