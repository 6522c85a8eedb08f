//! Append-only record of finished artworks, bound to the catalog it was
//! started from so `--resume` never mixes two different catalogs.

use crate::error::FolioError;
use crate::reorg::report::Flag;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtworkCheckpoint {
    pub new_id: String,
    pub image: String,
    pub image_high: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<Flag>,
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CheckpointLine {
    Header {
        fingerprint: String,
        total: usize,
        started_at: String,
    },
    Artwork(ArtworkCheckpoint),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointSummary {
    pub fingerprint: String,
    pub total: usize,
    pub completed: usize,
    pub started_at: String,
}

#[derive(Debug)]
pub struct Checkpoint {
    path: PathBuf,
    file: File,
    done: BTreeMap<String, ArtworkCheckpoint>,
}

fn read_lines(path: &Path) -> Result<Option<(CheckpointSummary, Vec<ArtworkCheckpoint>)>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to open {}", path.display()));
        }
    };

    let mut header = None;
    let mut entries = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<CheckpointLine>(&line) {
            Ok(CheckpointLine::Header {
                fingerprint,
                total,
                started_at,
            }) => {
                header = Some(CheckpointSummary {
                    fingerprint,
                    total,
                    completed: 0,
                    started_at,
                });
            }
            Ok(CheckpointLine::Artwork(entry)) => entries.push(entry),
            Err(err) => {
                // A crash mid-append leaves at most one torn line at the end.
                tracing::warn!(line = index + 1, error = %err, "skipping unreadable checkpoint line");
            }
        }
    }

    let Some(mut summary) = header else {
        return Ok(None);
    };
    summary.completed = entries.len();
    Ok(Some((summary, entries)))
}

impl Checkpoint {
    /// Open the checkpoint for a run over the catalog with `fingerprint`.
    ///
    /// With `resume`, an existing checkpoint for the same catalog is continued
    /// and one for a different catalog is an error. Without it, any previous
    /// checkpoint is discarded.
    pub fn open(path: &Path, fingerprint: &str, total: usize, resume: bool) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        if resume {
            if let Some((summary, entries)) = read_lines(path)? {
                if summary.fingerprint != fingerprint {
                    return Err(FolioError::CheckpointConflict(format!(
                        "{} was written for catalog {}; rerun without --resume",
                        path.display(),
                        crate::reorg::util::truncate_with_ellipsis(&summary.fingerprint, 12)
                    ))
                    .into());
                }
                let ends_clean = fs::read(path)?.last().is_none_or(|byte| *byte == b'\n');
                let mut file = OpenOptions::new()
                    .append(true)
                    .open(path)
                    .with_context(|| format!("failed to open {}", path.display()))?;
                if !ends_clean {
                    writeln!(file)?;
                }
                let done = entries
                    .into_iter()
                    .map(|entry| (entry.new_id.clone(), entry))
                    .collect();
                return Ok(Self {
                    path: path.to_path_buf(),
                    file,
                    done,
                });
            }
            tracing::info!(path = %path.display(), "no checkpoint to resume; starting fresh");
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        let header = CheckpointLine::Header {
            fingerprint: fingerprint.to_string(),
            total,
            started_at: chrono::Local::now().to_rfc3339(),
        };
        writeln!(file, "{}", serde_json::to_string(&header)?)?;
        file.sync_data()?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            done: BTreeMap::new(),
        })
    }

    pub fn get(&self, new_id: &str) -> Option<&ArtworkCheckpoint> {
        self.done.get(new_id)
    }

    pub fn completed(&self) -> usize {
        self.done.len()
    }

    pub fn record(&mut self, entry: ArtworkCheckpoint) -> Result<()> {
        let line = serde_json::to_string(&CheckpointLine::Artwork(entry.clone()))?;
        writeln!(self.file, "{line}")
            .with_context(|| format!("failed to append to {}", self.path.display()))?;
        self.file.sync_data()?;
        self.done.insert(entry.new_id.clone(), entry);
        Ok(())
    }

    pub fn remove(self) -> Result<()> {
        let Checkpoint { path, file, .. } = self;
        drop(file);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
        }
    }
}

pub fn peek(path: &Path) -> Result<Option<CheckpointSummary>> {
    Ok(read_lines(path)?.map(|(summary, _)| summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reorg::report::FlagKind;

    fn entry(id: &str) -> ArtworkCheckpoint {
        ArtworkCheckpoint {
            new_id: id.to_string(),
            image: format!("images/paintings/thumbnails/{id}_thumb.png"),
            image_high: String::new(),
            flag: Some(Flag::new(id, "T", FlagKind::Quality, "weak")),
            sources: vec!["images/paintings/thumbnails/old_thumb.png".to_string()],
        }
    }

    #[test]
    fn resume_reloads_recorded_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("checkpoint.jsonl");
        {
            let mut cp = Checkpoint::open(&path, "fp-a", 3, false).expect("open");
            cp.record(entry("2020_001")).expect("record");
            cp.record(entry("2020_002")).expect("record");
        }
        let resumed = Checkpoint::open(&path, "fp-a", 3, true).expect("resume");
        assert_eq!(resumed.completed(), 2);
        assert_eq!(resumed.get("2020_002"), Some(&entry("2020_002")));

        let summary = peek(&path).expect("peek").expect("summary");
        assert_eq!(summary.total, 3);
        assert_eq!(summary.completed, 2);
    }

    #[test]
    fn resume_against_a_different_catalog_is_refused() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("checkpoint.jsonl");
        Checkpoint::open(&path, "fp-a", 1, false).expect("open");
        let err = Checkpoint::open(&path, "fp-b", 1, true).expect_err("mismatch");
        let folio = err.downcast_ref::<FolioError>().expect("folio error");
        assert_eq!(folio.code().as_str(), "E006_CHECKPOINT_CONFLICT");
    }

    #[test]
    fn fresh_open_discards_previous_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("checkpoint.jsonl");
        {
            let mut cp = Checkpoint::open(&path, "fp-a", 1, false).expect("open");
            cp.record(entry("2020_001")).expect("record");
        }
        let cp = Checkpoint::open(&path, "fp-a", 1, false).expect("reopen");
        assert_eq!(cp.completed(), 0);
        cp.remove().expect("remove");
        assert!(peek(&path).expect("peek").is_none());
    }

    #[test]
    fn torn_trailing_line_is_ignored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("checkpoint.jsonl");
        {
            let mut cp = Checkpoint::open(&path, "fp-a", 2, false).expect("open");
            cp.record(entry("2020_001")).expect("record");
        }
        let mut file = OpenOptions::new().append(true).open(&path).expect("append");
        write!(file, "{{\"type\":\"artwork\",\"new_id\":\"2020_0").expect("torn write");
        drop(file);

        let mut resumed = Checkpoint::open(&path, "fp-a", 2, true).expect("resume");
        assert_eq!(resumed.completed(), 1);
        resumed.record(entry("2020_002")).expect("record after torn line");
        drop(resumed);

        let again = Checkpoint::open(&path, "fp-a", 2, true).expect("resume again");
        assert_eq!(again.completed(), 2);
    }
}
