use crate::reorg::store::{ContentStore, Revision, StoreError, validate_store_path};
use crate::reorg::util::sha256_hex;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

/// Content store over a local checkout of the site. Revisions are content
/// digests, so a stale delete is detected the same way the remote API would.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        validate_store_path(path)?;
        Ok(self.root.join(path))
    }

    fn read_optional(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let full = self.resolve(path)?;
        match fs::read(&full) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::io(path, err)),
        }
    }
}

impl ContentStore for LocalStore {
    fn backend(&self) -> &'static str {
        "local"
    }

    fn check_access(&self) -> Result<(), StoreError> {
        let label = self.root.display().to_string();
        let meta = fs::metadata(&self.root).map_err(|err| StoreError::io(&label, err))?;
        if !meta.is_dir() {
            return Err(StoreError::payload(&label, "local store root is not a directory"));
        }
        Ok(())
    }

    fn revision(&self, path: &str) -> Result<Option<Revision>, StoreError> {
        Ok(self
            .read_optional(path)?
            .map(|bytes| Revision(sha256_hex(&bytes))))
    }

    fn download(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        self.read_optional(path)?
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn upload(&self, path: &str, bytes: &[u8], message: &str) -> Result<Revision, StoreError> {
        let full = self.resolve(path)?;
        let parent = full
            .parent()
            .ok_or_else(|| StoreError::payload(path, "path has no parent directory"))?;
        fs::create_dir_all(parent).map_err(|err| StoreError::io(path, err))?;

        let mut tmp =
            tempfile::NamedTempFile::new_in(parent).map_err(|err| StoreError::io(path, err))?;
        tmp.write_all(bytes).map_err(|err| StoreError::io(path, err))?;
        tmp.persist(&full)
            .map_err(|err| StoreError::io(path, err.error))?;

        tracing::debug!(path, bytes = bytes.len(), message, "local upload");
        Ok(Revision(sha256_hex(bytes)))
    }

    fn delete(&self, path: &str, message: &str, revision: &Revision) -> Result<(), StoreError> {
        let current = self
            .revision(path)?
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        if &current != revision {
            return Err(StoreError::Conflict {
                path: path.to_string(),
            });
        }
        let full = self.resolve(path)?;
        fs::remove_file(&full).map_err(|err| StoreError::io(path, err))?;
        tracing::debug!(path, message, "local delete");
        Ok(())
    }

    fn list(&self, dir: &str) -> Result<Vec<String>, StoreError> {
        let dir = dir.trim_end_matches('/');
        let entries = match fs::read_dir(self.resolve(dir)?) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::io(dir, err)),
        };
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| StoreError::io(dir, err))?;
            let is_file = entry
                .file_type()
                .map_err(|err| StoreError::io(dir, err))?
                .is_file();
            if is_file && let Some(name) = entry.file_name().to_str() {
                paths.push(format!("{dir}/{name}"));
            }
        }
        paths.sort();
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_download_and_revisioned_delete() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalStore::new(dir.path());
        store.check_access().expect("root exists");

        assert!(!store.exists("images/a.png").expect("exists"));
        let rev = store.upload("images/a.png", b"one", "add").expect("upload");
        assert_eq!(store.download("images/a.png").expect("download"), b"one");
        assert_eq!(store.revision("images/a.png").expect("rev"), Some(rev.clone()));

        store.upload("images/a.png", b"two", "replace").expect("replace");
        let stale = store.delete("images/a.png", "rm", &rev).expect_err("stale revision");
        assert!(matches!(stale, StoreError::Conflict { .. }));

        let fresh = store.revision("images/a.png").expect("rev").expect("present");
        store.delete("images/a.png", "rm", &fresh).expect("delete");
        assert!(store.download("images/a.png").expect_err("gone").is_not_found());
    }

    #[test]
    fn lists_files_of_one_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalStore::new(dir.path());
        assert!(store.list("images/thumbs").expect("missing dir").is_empty());

        store.upload("images/thumbs/b.png", b"b", "add").expect("upload");
        store.upload("images/thumbs/a.jpg", b"a", "add").expect("upload");
        store.upload("images/thumbs/nested/c.png", b"c", "add").expect("upload");
        assert_eq!(
            store.list("images/thumbs/").expect("list"),
            vec!["images/thumbs/a.jpg", "images/thumbs/b.png"]
        );
    }

    #[test]
    fn refuses_paths_outside_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalStore::new(dir.path());
        assert!(store.upload("../escape.png", b"x", "m").is_err());
    }

    #[test]
    fn missing_root_fails_access_check() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalStore::new(dir.path().join("nope"));
        assert!(store.check_access().is_err());
    }
}
