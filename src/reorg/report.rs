use crate::reorg::ids::IdChange;
use crate::reorg::paths::FolioPaths;
use crate::reorg::store::dry_run::PlannedWrite;
use crate::reorg::util::timestamp_slug;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagKind {
    Quality,
    Missing,
    Error,
}

/// Operator-facing note about one artwork that needs attention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flag {
    pub id: String,
    pub title: String,
    pub issue: String,
    pub kind: FlagKind,
}

impl Flag {
    pub fn new(id: &str, title: &str, kind: FlagKind, issue: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            issue: issue.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Cancelled,
    Failed,
}

impl RunOutcome {
    pub fn label(self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Cancelled => "cancelled",
            RunOutcome::Failed => "failed",
        }
    }
}

/// Why a run ended in `Failed`; `code` is set for the known fatal conditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub code: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupFailure {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: String,
    pub finished_at: Option<String>,
    pub outcome: RunOutcome,
    pub dry_run: bool,
    pub total: usize,
    /// Artworks skipped because a previous interrupted run already finished them.
    pub resumed: usize,
    pub processed: Vec<String>,
    pub flags: Vec<Flag>,
    pub id_mappings: Vec<IdChange>,
    pub deleted: Vec<String>,
    pub cleanup_failures: Vec<CleanupFailure>,
    pub catalog_backup: Option<String>,
    pub failure: Option<RunFailure>,
    /// Writes a dry run would have made, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub planned_writes: Vec<PlannedWrite>,
}

impl RunReport {
    pub fn start(dry_run: bool) -> Self {
        Self {
            started_at: chrono::Local::now().to_rfc3339(),
            finished_at: None,
            outcome: RunOutcome::Completed,
            dry_run,
            total: 0,
            resumed: 0,
            processed: Vec::new(),
            flags: Vec::new(),
            id_mappings: Vec::new(),
            deleted: Vec::new(),
            cleanup_failures: Vec::new(),
            catalog_backup: None,
            failure: None,
            planned_writes: Vec::new(),
        }
    }

    pub fn finish(&mut self, outcome: RunOutcome) {
        self.outcome = outcome;
        self.finished_at = Some(chrono::Local::now().to_rfc3339());
    }

    pub fn count_flags(&self, kind: FlagKind) -> usize {
        self.flags.iter().filter(|flag| flag.kind == kind).count()
    }

    pub fn renamed_count(&self) -> usize {
        self.id_mappings.iter().filter(|m| m.is_rename()).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "processed={} flagged={} errors={} renamed={} deleted={}",
            self.processed.len(),
            self.flags.len() - self.count_flags(FlagKind::Error),
            self.count_flags(FlagKind::Error),
            self.renamed_count(),
            self.deleted.len()
        )
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, format!("{json}\n"))
            .with_context(|| format!("failed to write report {}", path.display()))?;
        Ok(())
    }
}

pub fn default_report_path(paths: &FolioPaths) -> PathBuf {
    paths
        .reports_dir
        .join(format!("reorganize-{}.json", timestamp_slug()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_separates_errors_from_quality_flags() {
        let mut report = RunReport::start(false);
        report.processed = vec!["2020_001".to_string(), "2020_002".to_string()];
        report.flags.push(Flag::new("2020_002", "B", FlagKind::Quality, "low"));
        report.flags.push(Flag::new("2020_003", "C", FlagKind::Error, "boom"));
        report.id_mappings.push(IdChange {
            old_id: Some("x".to_string()),
            new_id: "2020_001".to_string(),
        });
        assert_eq!(
            report.summary(),
            "processed=2 flagged=1 errors=1 renamed=1 deleted=0"
        );
    }

    #[test]
    fn saved_report_is_json_with_snake_case_kinds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut report = RunReport::start(true);
        report.flags.push(Flag::new("unknown_001", "T", FlagKind::Missing, "No images found"));
        report.finish(RunOutcome::Completed);
        let path = dir.path().join("nested").join("report.json");
        report.save(&path).expect("save");

        let raw = fs::read_to_string(&path).expect("read");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(value["outcome"], "completed");
        assert_eq!(value["flags"][0]["kind"], "missing");
        assert_eq!(value["dry_run"], true);
        assert!(value["finished_at"].is_string());
    }
}
