//! Copy-on-overwrite staging for a reorganization run.
//!
//! When IDs are reshuffled, the new path of one artwork can be the old path of
//! another artwork that has not been reconciled yet. Protected paths have
//! their previous content stashed on local disk right before the first write
//! touches them, and reads of a stashed path are answered from the stash until
//! the owning artwork releases it. The stash lives on disk so a resumed run
//! still sees the original bytes.

use crate::reorg::store::{ContentStore, Revision, StoreError};
use crate::reorg::util::sha256_hex;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const BYTES_SUFFIX: &str = "bytes";
const ABSENT_SUFFIX: &str = "absent";

enum Stashed {
    Bytes(Vec<u8>),
    Absent,
}

pub struct StagedStore<'a> {
    inner: &'a dyn ContentStore,
    stash_dir: PathBuf,
    protected: RefCell<BTreeSet<String>>,
}

impl<'a> StagedStore<'a> {
    pub fn new(
        inner: &'a dyn ContentStore,
        stash_dir: impl Into<PathBuf>,
        protected: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            inner,
            stash_dir: stash_dir.into(),
            protected: RefCell::new(protected.into_iter().collect()),
        }
    }

    pub fn stash_dir(&self) -> &Path {
        &self.stash_dir
    }

    pub fn is_protected(&self, path: &str) -> bool {
        self.protected.borrow().contains(path)
    }

    /// Stop protecting `path` once its owner has been reconciled, dropping any
    /// stashed copy.
    pub fn release(&self, path: &str) -> Result<(), StoreError> {
        self.protected.borrow_mut().remove(path);
        for suffix in [BYTES_SUFFIX, ABSENT_SUFFIX] {
            let file = self.stash_file(path, suffix);
            match fs::remove_file(&file) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(StoreError::io(path, err)),
            }
        }
        Ok(())
    }

    /// Remove the whole stash after a completed run.
    pub fn discard(&self) -> Result<(), StoreError> {
        match fs::remove_dir_all(&self.stash_dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::io(&self.stash_dir.display().to_string(), err)),
        }
    }

    fn stash_file(&self, path: &str, suffix: &str) -> PathBuf {
        self.stash_dir
            .join(format!("{}.{suffix}", path.replace('/', "__")))
    }

    fn stashed(&self, path: &str) -> Result<Option<Stashed>, StoreError> {
        if !self.is_protected(path) {
            return Ok(None);
        }
        match fs::read(self.stash_file(path, BYTES_SUFFIX)) {
            Ok(bytes) => return Ok(Some(Stashed::Bytes(bytes))),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(StoreError::io(path, err)),
        }
        if self.stash_file(path, ABSENT_SUFFIX).exists() {
            return Ok(Some(Stashed::Absent));
        }
        Ok(None)
    }

    fn write_stash(&self, path: &str, suffix: &str, bytes: &[u8]) -> Result<(), StoreError> {
        fs::create_dir_all(&self.stash_dir).map_err(|err| StoreError::io(path, err))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.stash_dir)
            .map_err(|err| StoreError::io(path, err))?;
        tmp.write_all(bytes).map_err(|err| StoreError::io(path, err))?;
        tmp.persist(self.stash_file(path, suffix))
            .map_err(|err| StoreError::io(path, err.error))?;
        Ok(())
    }

    /// Stash the current content of a protected path before it is replaced.
    fn preserve(&self, path: &str) -> Result<(), StoreError> {
        if !self.is_protected(path) || self.stashed(path)?.is_some() {
            return Ok(());
        }
        match self.inner.download(path) {
            Ok(bytes) => {
                tracing::debug!(path, bytes = bytes.len(), "stashing contested path");
                self.write_stash(path, BYTES_SUFFIX, &bytes)
            }
            Err(err) if err.is_not_found() => self.write_stash(path, ABSENT_SUFFIX, b""),
            Err(err) => Err(err),
        }
    }
}

impl ContentStore for StagedStore<'_> {
    fn backend(&self) -> &'static str {
        self.inner.backend()
    }

    fn check_access(&self) -> Result<(), StoreError> {
        self.inner.check_access()
    }

    fn revision(&self, path: &str) -> Result<Option<Revision>, StoreError> {
        match self.stashed(path)? {
            Some(Stashed::Bytes(bytes)) => Ok(Some(Revision(sha256_hex(&bytes)))),
            Some(Stashed::Absent) => Ok(None),
            None => self.inner.revision(path),
        }
    }

    fn download(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        match self.stashed(path)? {
            Some(Stashed::Bytes(bytes)) => Ok(bytes),
            Some(Stashed::Absent) => Err(StoreError::NotFound(path.to_string())),
            None => self.inner.download(path),
        }
    }

    fn upload(&self, path: &str, bytes: &[u8], message: &str) -> Result<Revision, StoreError> {
        self.preserve(path)?;
        self.inner.upload(path, bytes, message)
    }

    fn delete(&self, path: &str, message: &str, revision: &Revision) -> Result<(), StoreError> {
        self.preserve(path)?;
        self.inner.delete(path, message, revision)
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, StoreError> {
        self.inner.list(dir)
    }
}
