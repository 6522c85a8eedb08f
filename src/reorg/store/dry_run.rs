use crate::reorg::store::{ContentStore, Revision, StoreError};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PlannedWrite {
    Upload { path: String, bytes: usize },
    Delete { path: String },
}

/// Reads go to the wrapped store; writes are only recorded.
pub struct DryRunStore<'a> {
    inner: &'a dyn ContentStore,
    planned: RefCell<Vec<PlannedWrite>>,
}

impl<'a> DryRunStore<'a> {
    pub fn new(inner: &'a dyn ContentStore) -> Self {
        Self {
            inner,
            planned: RefCell::new(Vec::new()),
        }
    }

    pub fn planned(&self) -> Vec<PlannedWrite> {
        self.planned.borrow().clone()
    }
}

impl ContentStore for DryRunStore<'_> {
    fn backend(&self) -> &'static str {
        self.inner.backend()
    }

    fn check_access(&self) -> Result<(), StoreError> {
        self.inner.check_access()
    }

    fn revision(&self, path: &str) -> Result<Option<Revision>, StoreError> {
        self.inner.revision(path)
    }

    fn download(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        self.inner.download(path)
    }

    fn upload(&self, path: &str, bytes: &[u8], _message: &str) -> Result<Revision, StoreError> {
        tracing::info!(path, bytes = bytes.len(), "dry-run: would upload");
        self.planned.borrow_mut().push(PlannedWrite::Upload {
            path: path.to_string(),
            bytes: bytes.len(),
        });
        Ok(Revision("dry-run".to_string()))
    }

    fn delete(&self, path: &str, _message: &str, _revision: &Revision) -> Result<(), StoreError> {
        tracing::info!(path, "dry-run: would delete");
        self.planned.borrow_mut().push(PlannedWrite::Delete {
            path: path.to_string(),
        });
        Ok(())
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list(dir)
    }
}
