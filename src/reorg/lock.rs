use crate::error::FolioError;
use crate::reorg::paths::FolioPaths;
use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub build_uuid: String,
    pub started_at: String,
}

/// Exclusive advisory lock over the state directory for the duration of a run.
/// Released and removed on drop.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(paths: &FolioPaths) -> Result<Self> {
        fs::create_dir_all(&paths.state_dir)
            .with_context(|| format!("failed to create {}", paths.state_dir.display()))?;
        let path = paths.lock_file();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            let mut raw = String::new();
            let _ = file.read_to_string(&mut raw);
            let holder = serde_json::from_str::<LockInfo>(&raw).ok();
            return Err(FolioError::Locked {
                pid: holder.as_ref().map(|h| h.pid).unwrap_or_default(),
                started_at: holder
                    .map(|h| h.started_at)
                    .unwrap_or_else(|| "unknown".to_string()),
            }
            .into());
        }

        let info = LockInfo {
            pid: std::process::id(),
            build_uuid: env!("BUILD_UUID").to_string(),
            started_at: chrono::Local::now().to_rfc3339(),
        };
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(serde_json::to_string(&info)?.as_bytes())?;
        file.sync_data()?;
        Ok(Self { file, path })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
        let _ = FileExt::unlock(&self.file);
    }
}

pub fn read_lock_info(path: &Path) -> Result<Option<LockInfo>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }
    let info = serde_json::from_str(&raw)
        .with_context(|| format!("corrupt lock file {}", path.display()))?;
    Ok(Some(info))
}

pub fn pid_alive(pid: u32) -> bool {
    if cfg!(windows) {
        // The fs2 lock is authoritative; this is only used for status output.
        true
    } else {
        let Ok(status) = Command::new("kill").arg("-0").arg(pid.to_string()).status() else {
            return false;
        };
        status.success()
    }
}

/// Cooperative cancellation: set in-process, or requested from another
/// process through the cancel file.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    request_file: Option<PathBuf>,
}

impl CancelToken {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watching(request_file: PathBuf) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            request_file: Some(request_file),
        }
    }

    #[cfg(test)]
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        if let Some(file) = &self.request_file
            && file.exists()
        {
            self.flag.store(true, Ordering::SeqCst);
            return true;
        }
        false
    }
}

pub fn request_cancel(paths: &FolioPaths) -> Result<PathBuf> {
    fs::create_dir_all(&paths.state_dir)
        .with_context(|| format!("failed to create {}", paths.state_dir.display()))?;
    let file = paths.cancel_file();
    fs::write(&file, chrono::Local::now().to_rfc3339())
        .with_context(|| format!("failed to write {}", file.display()))?;
    Ok(file)
}

pub fn clear_cancel_request(paths: &FolioPaths) -> Result<()> {
    match fs::remove_file(paths.cancel_file()) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).context("failed to clear cancel request"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_paths(dir: &Path) -> FolioPaths {
        FolioPaths {
            folio_home: dir.to_path_buf(),
            state_dir: dir.join("state"),
            logs_dir: dir.join("logs"),
            reports_dir: dir.join("reports"),
            backups_dir: dir.join("state/backups"),
        }
    }

    #[test]
    fn second_acquire_is_refused_until_release() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = temp_paths(dir.path());

        let lock = RunLock::acquire(&paths).expect("first acquire");
        let info = read_lock_info(&paths.lock_file())
            .expect("read")
            .expect("lock info");
        assert_eq!(info.pid, std::process::id());

        let err = RunLock::acquire(&paths).expect_err("already locked");
        let folio = err.downcast_ref::<FolioError>().expect("folio error");
        assert_eq!(folio.code().as_str(), "E001_LOCKED");

        drop(lock);
        assert!(!paths.lock_file().exists());
        RunLock::acquire(&paths).expect("reacquire after drop");
    }

    #[test]
    fn cancel_file_trips_the_token() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = temp_paths(dir.path());
        let token = CancelToken::watching(paths.cancel_file());
        assert!(!token.is_cancelled());

        request_cancel(&paths).expect("request");
        assert!(token.is_cancelled());

        clear_cancel_request(&paths).expect("clear");
        assert!(token.is_cancelled(), "cancellation is sticky once observed");
        assert!(!CancelToken::watching(paths.cancel_file()).is_cancelled());
    }

    #[test]
    fn in_process_cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
