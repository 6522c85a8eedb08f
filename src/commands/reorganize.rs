use anyhow::Result;
use std::path::PathBuf;

use crate::commands::{CommandReport, coded_issue, confirm};
use crate::reorg::catalog;
use crate::reorg::config::load_config;
use crate::reorg::lock::{CancelToken, RunLock, clear_cancel_request};
use crate::reorg::open_store;
use crate::reorg::orchestrator::{Orchestrator, RunOptions, RunPhase};
use crate::reorg::paths::resolve_paths;
use crate::reorg::report::{FlagKind, RunOutcome, RunReport, default_report_path};
use crate::reorg::store::ContentStore;
use crate::reorg::store::dry_run::PlannedWrite;
use crate::reorg::transcode::PngTranscoder;

#[derive(Debug, Clone, Default)]
pub struct ReorganizeOptions {
    pub yes: bool,
    pub dry_run: bool,
    pub resume: bool,
    pub report: Option<PathBuf>,
    /// Suppress progress lines on stdout (JSON output mode).
    pub quiet: bool,
}

pub fn confirmation_prompt(count: usize) -> String {
    format!(
        "This will reorganize {count} artworks and rename files. This process takes 10-15 minutes. Continue?"
    )
}

/// Ask before a live run. `Ok(false)` means the operator declined.
fn confirm_run(store: &dyn ContentStore, report: &mut CommandReport) -> Result<bool> {
    let count = catalog::load_from_store(store)?.artworks.len();
    confirm(
        report,
        &confirmation_prompt(count),
        "refusing to reorganize without confirmation; pass --yes when not on a terminal",
    )
}

fn summarize(run: &RunReport, report: &mut CommandReport) {
    report.detail(format!("outcome={}", run.outcome.label()));
    report.detail(format!("dry_run={}", run.dry_run));
    report.detail(format!("artworks={}", run.total));
    if run.resumed > 0 {
        report.detail(format!("resumed={}", run.resumed));
    }
    report.detail(run.summary());
    for change in run.id_mappings.iter().filter(|change| change.is_rename()) {
        report.detail(format!(
            "renamed {} -> {}",
            change.old_id.as_deref().unwrap_or("(none)"),
            change.new_id
        ));
    }
    for flag in &run.flags {
        let kind = match flag.kind {
            FlagKind::Quality => "quality",
            FlagKind::Missing => "missing",
            FlagKind::Error => "error",
        };
        report.detail(format!("flag[{kind}] {} {}: {}", flag.id, flag.title, flag.issue));
    }
    for failure in &run.cleanup_failures {
        report.detail(format!("cleanup failed for {}: {}", failure.path, failure.error));
    }
    if run.dry_run {
        report.detail(format!("planned_writes={}", run.planned_writes.len()));
        for write in &run.planned_writes {
            match write {
                PlannedWrite::Upload { path, bytes } => {
                    report.detail(format!("would upload {path} ({bytes} bytes)"))
                }
                PlannedWrite::Delete { path } => report.detail(format!("would delete {path}")),
            }
        }
    }
    if let Some(backup) = &run.catalog_backup {
        report.detail(format!("catalog_backup={backup}"));
    }

    match run.outcome {
        RunOutcome::Completed => {}
        RunOutcome::Cancelled => report.issue(format!(
            "reorganization cancelled after {} artworks; catalog unchanged, rerun with --resume",
            run.processed.len()
        )),
        RunOutcome::Failed => {
            let Some(failure) = &run.failure else {
                report.issue("reorganization failed");
                return;
            };
            match &failure.code {
                Some(code) => report.issue(format!("{code}: {}", failure.message)),
                None => report.issue(failure.message.clone()),
            }
        }
    }
}

fn print_progress(phase: RunPhase, percent: f64, message: &str) {
    println!("[{percent:>3.0}%] {:<10} {message}", phase.label());
}

pub fn run(opts: &ReorganizeOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("reorganize");
    let paths = resolve_paths()?;
    let cfg = match load_config() {
        Ok(cfg) => cfg,
        Err(err) => {
            coded_issue(&mut report, err)?;
            return Ok(report);
        }
    };
    let store = open_store(&cfg)?;
    report.detail(format!("store_backend={}", store.backend()));

    if !opts.dry_run && !store.writable() {
        report.issue("no write credential: set FOLIO_GITHUB_TOKEN or FOLIO_PROXY_URL, or use --dry-run");
        return Ok(report);
    }

    let _lock = match RunLock::acquire(&paths) {
        Ok(lock) => lock,
        Err(err) => {
            coded_issue(&mut report, err)?;
            return Ok(report);
        }
    };
    clear_cancel_request(&paths)?;

    if !opts.yes && !opts.dry_run && !confirm_run(store.as_ref(), &mut report)? {
        return Ok(report);
    }

    let transcoder = PngTranscoder;
    let cancel = CancelToken::watching(paths.cancel_file());
    let options = RunOptions {
        dry_run: opts.dry_run,
        resume: opts.resume,
    };
    let mut orchestrator = Orchestrator::new(store.as_ref(), &transcoder, &paths, cancel, options);
    let quiet = opts.quiet;
    let mut progress = |phase: RunPhase, percent: f64, message: &str| {
        if !quiet {
            print_progress(phase, percent, message);
        }
    };
    let run = orchestrator.run(&mut progress);
    tracing::debug!(phase = orchestrator.phase().label(), "orchestrator stopped");

    let report_path = opts
        .report
        .clone()
        .unwrap_or_else(|| default_report_path(&paths));
    run.save(&report_path)?;
    report.detail(format!("report={}", report_path.display()));

    summarize(&run, &mut report);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reorg::ids::IdChange;
    use crate::reorg::report::{Flag, RunFailure};

    #[test]
    fn prompt_states_count_and_duration() {
        assert_eq!(
            confirmation_prompt(42),
            "This will reorganize 42 artworks and rename files. This process takes 10-15 minutes. Continue?"
        );
    }

    #[test]
    fn failed_run_becomes_coded_issue() {
        let mut run = RunReport::start(false);
        run.failure = Some(RunFailure {
            code: Some("E004_CATALOG_PERSIST".to_string()),
            message: "upload refused".to_string(),
        });
        run.finish(RunOutcome::Failed);

        let mut report = CommandReport::new("reorganize");
        summarize(&run, &mut report);
        assert!(!report.ok);
        assert_eq!(report.issues, vec!["E004_CATALOG_PERSIST: upload refused".to_string()]);
        assert!(report.details.contains(&"outcome=failed".to_string()));
    }

    #[test]
    fn completed_run_with_flags_stays_ok() {
        let mut run = RunReport::start(false);
        run.total = 2;
        run.processed = vec!["2021_001".to_string(), "2021_002".to_string()];
        run.id_mappings.push(IdChange {
            old_id: Some("a".to_string()),
            new_id: "2021_001".to_string(),
        });
        run.flags
            .push(Flag::new("2021_002", "Dusk", FlagKind::Error, "Processing error: boom"));
        run.finish(RunOutcome::Completed);

        let mut report = CommandReport::new("reorganize");
        summarize(&run, &mut report);
        assert!(report.ok);
        assert!(report.details.contains(&"renamed a -> 2021_001".to_string()));
        assert!(
            report
                .details
                .contains(&"flag[error] 2021_002 Dusk: Processing error: boom".to_string())
        );
    }
}
