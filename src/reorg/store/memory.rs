//! In-memory store with call accounting and failure injection for tests.

use crate::reorg::store::{ContentStore, Revision, StoreError};
use crate::reorg::util::sha256_hex;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Default)]
pub struct MemoryStore {
    files: RefCell<BTreeMap<String, Vec<u8>>>,
    failing_reads: RefCell<BTreeSet<String>>,
    failing_writes: RefCell<BTreeSet<String>>,
    failing_deletes: RefCell<BTreeSet<String>>,
    unreachable: Cell<bool>,
    writes: Cell<usize>,
    lookups: Cell<usize>,
    downloads: Cell<usize>,
    deletes: RefCell<Vec<String>>,
}

impl MemoryStore {
    pub fn with_files<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, Vec<u8>)>,
        P: Into<String>,
    {
        let store = Self::default();
        for (path, bytes) in files {
            store.put(path, bytes);
        }
        store
    }

    pub fn put(&self, path: impl Into<String>, bytes: Vec<u8>) {
        self.files.borrow_mut().insert(path.into(), bytes);
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.borrow().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.borrow().keys().cloned().collect()
    }

    pub fn fail_reads_of(&self, path: &str) {
        self.failing_reads.borrow_mut().insert(path.to_string());
    }

    pub fn fail_writes_to(&self, path: &str) {
        self.failing_writes.borrow_mut().insert(path.to_string());
    }

    pub fn fail_deletes_of(&self, path: &str) {
        self.failing_deletes.borrow_mut().insert(path.to_string());
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.set(unreachable);
    }

    pub fn write_count(&self) -> usize {
        self.writes.get()
    }

    /// Existence and revision checks served so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.get()
    }

    pub fn download_count(&self) -> usize {
        self.downloads.get()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deletes.borrow().clone()
    }

    fn injected(method: &'static str, path: &str) -> StoreError {
        StoreError::Status {
            method,
            path: path.to_string(),
            status: 500,
            body: "injected failure".to_string(),
        }
    }
}

impl ContentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn check_access(&self) -> Result<(), StoreError> {
        if self.unreachable.get() {
            return Err(Self::injected("GET", "<repo>"));
        }
        Ok(())
    }

    fn revision(&self, path: &str) -> Result<Option<Revision>, StoreError> {
        self.lookups.set(self.lookups.get() + 1);
        if self.failing_reads.borrow().contains(path) {
            return Err(Self::injected("GET", path));
        }
        Ok(self
            .files
            .borrow()
            .get(path)
            .map(|bytes| Revision(sha256_hex(bytes))))
    }

    fn download(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        self.downloads.set(self.downloads.get() + 1);
        if self.failing_reads.borrow().contains(path) {
            return Err(Self::injected("GET", path));
        }
        self.file(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn upload(&self, path: &str, bytes: &[u8], _message: &str) -> Result<Revision, StoreError> {
        if self.failing_writes.borrow().contains(path) {
            return Err(Self::injected("PUT", path));
        }
        self.writes.set(self.writes.get() + 1);
        self.put(path, bytes.to_vec());
        Ok(Revision(sha256_hex(bytes)))
    }

    fn delete(&self, path: &str, _message: &str, revision: &Revision) -> Result<(), StoreError> {
        if self.failing_deletes.borrow().contains(path) {
            return Err(Self::injected("DELETE", path));
        }
        let current = self
            .revision(path)?
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        if &current != revision {
            return Err(StoreError::Conflict {
                path: path.to_string(),
            });
        }
        self.writes.set(self.writes.get() + 1);
        self.files.borrow_mut().remove(path);
        self.deletes.borrow_mut().push(path.to_string());
        Ok(())
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, StoreError> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        Ok(self
            .files
            .borrow()
            .keys()
            .filter(|path| {
                path.strip_prefix(&prefix)
                    .is_some_and(|name| !name.is_empty() && !name.contains('/'))
            })
            .cloned()
            .collect())
    }
}
