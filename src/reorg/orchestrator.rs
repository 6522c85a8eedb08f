//! End-to-end reorganization run.
//!
//! Strictly sequential: ids are assigned for the whole catalog before any
//! image I/O, artworks are reconciled one at a time, the catalog is saved once
//! after the loop, and stale paths are removed only after the save succeeded.

use crate::error::FolioError;
use crate::reorg::artwork::Artwork;
use crate::reorg::audit;
use crate::reorg::catalog::{self, LoadedCatalog};
use crate::reorg::checkpoint::{self, ArtworkCheckpoint, Checkpoint};
use crate::reorg::ids::{IdChange, assign_sequential_ids};
use crate::reorg::lock::CancelToken;
use crate::reorg::paths::{AssetKind, FolioPaths, LOOKUP_EXTS, asset_path, asset_path_with_ext};
use crate::reorg::reconcile::Reconciler;
use crate::reorg::report::{CleanupFailure, Flag, FlagKind, RunFailure, RunOutcome, RunReport};
use crate::reorg::store::{ContentStore, DryRunStore, StagedStore, delete_if_present};
use crate::reorg::transcode::Transcoder;
use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeSet;

const ASSET_KINDS: [AssetKind; 2] = [AssetKind::Thumbnail, AssetKind::Large];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    ValidatingPrerequisites,
    AssigningIds,
    ProcessingArtworks,
    PersistingCatalog,
    CleaningUp,
    Done,
    Failed,
    Cancelled,
}

impl RunPhase {
    pub fn label(self) -> &'static str {
        match self {
            RunPhase::Idle => "idle",
            RunPhase::ValidatingPrerequisites => "validating",
            RunPhase::AssigningIds => "assigning-ids",
            RunPhase::ProcessingArtworks => "processing",
            RunPhase::PersistingCatalog => "persisting",
            RunPhase::CleaningUp => "cleanup",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
            RunPhase::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub dry_run: bool,
    pub resume: bool,
}

/// `(phase, percent, message)` progress callback.
pub type ProgressFn<'p> = dyn FnMut(RunPhase, f64, &str) + 'p;

pub fn processing_percent(index: usize, total: usize) -> f64 {
    if total == 0 {
        return 15.0;
    }
    15.0 + (index as f64 / total as f64) * 70.0
}

pub struct Orchestrator<'a> {
    store: &'a dyn ContentStore,
    transcoder: &'a dyn Transcoder,
    paths: &'a FolioPaths,
    cancel: CancelToken,
    options: RunOptions,
    phase: RunPhase,
}

struct Processed {
    artworks: Vec<Artwork>,
    sources: BTreeSet<String>,
    errored_old_ids: BTreeSet<String>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        store: &'a dyn ContentStore,
        transcoder: &'a dyn Transcoder,
        paths: &'a FolioPaths,
        cancel: CancelToken,
        options: RunOptions,
    ) -> Self {
        Self {
            store,
            transcoder,
            paths,
            cancel,
            options,
            phase: RunPhase::Idle,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Run a full reorganization. Never panics on store trouble: fatal
    /// conditions end the run as `Failed` with a coded reason in the report.
    pub fn run(&mut self, progress: &mut ProgressFn<'_>) -> RunReport {
        let mut report = RunReport::start(self.options.dry_run);
        self.audit("started", if self.options.dry_run { "dry-run" } else { "live" });

        match self.execute(&mut report, progress) {
            Ok(outcome) => {
                report.finish(outcome);
                let terminal = match outcome {
                    RunOutcome::Cancelled => RunPhase::Cancelled,
                    _ => RunPhase::Done,
                };
                self.phase = terminal;
                self.audit(terminal.label(), &report.summary());
            }
            Err(err) => {
                let code = err
                    .downcast_ref::<FolioError>()
                    .map(|folio| folio.code().as_str().to_string());
                let message = format!("{err:#}");
                tracing::error!(code = code.as_deref().unwrap_or("-"), "reorganization failed: {message}");
                report.failure = Some(RunFailure { code, message });
                report.finish(RunOutcome::Failed);
                self.phase = RunPhase::Failed;
                self.audit("failed", &format!("{err:#}"));
            }
        }
        report
    }

    fn audit(&self, status: &str, message: &str) {
        if let Err(err) = audit::append_event(self.paths, "reorganize", status, message) {
            tracing::warn!(error = %err, "failed to append audit event");
        }
    }

    fn advance(
        &mut self,
        progress: &mut ProgressFn<'_>,
        phase: RunPhase,
        percent: f64,
        message: &str,
    ) {
        self.phase = phase;
        tracing::info!(phase = phase.label(), percent = percent.round() as u64, "{message}");
        progress(phase, percent, message);
    }

    fn execute(
        &mut self,
        report: &mut RunReport,
        progress: &mut ProgressFn<'_>,
    ) -> Result<RunOutcome> {
        self.advance(
            progress,
            RunPhase::ValidatingPrerequisites,
            5.0,
            "Starting complete reorganization...",
        );
        let loaded = self.validate_prerequisites()?;
        report.total = loaded.artworks.len();

        self.advance(progress, RunPhase::AssigningIds, 10.0, "Generated sequential IDs without gaps");
        let assignment = assign_sequential_ids(loaded.artworks.clone());
        report.id_mappings = assignment.mapping.entries().to_vec();
        tracing::info!(
            artworks = assignment.artworks.len(),
            renamed = assignment.mapping.renames().count(),
            "ids assigned"
        );

        let dry_store = self.options.dry_run.then(|| DryRunStore::new(self.store));
        let base: &dyn ContentStore = match &dry_store {
            Some(dry) => dry,
            None => self.store,
        };

        let mut checkpoint = if self.options.dry_run {
            None
        } else {
            Some(self.open_checkpoint(&loaded)?)
        };

        let staged = if self.options.dry_run {
            None
        } else {
            let protected = protected_paths(&report.id_mappings, checkpoint.as_ref());
            Some(StagedStore::new(
                base,
                self.paths.staging_dir(&loaded.fingerprint),
                protected,
            ))
        };
        let active: &dyn ContentStore = match &staged {
            Some(staged) => staged,
            None => base,
        };

        let processed = match self.process_artworks(
            assignment.artworks,
            report,
            active,
            staged.as_ref(),
            checkpoint.as_mut(),
            progress,
        )? {
            Some(processed) => processed,
            None => return Ok(RunOutcome::Cancelled),
        };

        if self.cancel.is_cancelled() {
            tracing::warn!("cancelled before saving the catalog");
            return Ok(RunOutcome::Cancelled);
        }

        self.advance(progress, RunPhase::PersistingCatalog, 90.0, "Updating artworks.json...");
        if !self.options.dry_run {
            let backup = catalog::backup_previous(self.paths, &loaded.raw)?;
            report.catalog_backup = Some(backup.display().to_string());
        }
        catalog::persist(base, &processed.artworks)
            .map_err(|err| FolioError::CatalogPersist(format!("{err:#}")))?;

        self.advance(progress, RunPhase::CleaningUp, 95.0, "Cleaning up old files...");
        self.cleanup(base, &processed, report);

        if let Some(checkpoint) = checkpoint.take() {
            checkpoint.remove()?;
        }
        if let Some(staged) = &staged {
            if processed.errored_old_ids.is_empty() {
                staged.discard()?;
            } else {
                tracing::warn!(
                    stash = %staged.stash_dir().display(),
                    "keeping stashed originals of artworks that failed"
                );
            }
        }
        crate::reorg::lock::clear_cancel_request(self.paths)?;
        if let Some(dry) = &dry_store {
            report.planned_writes = dry.planned();
        }

        self.advance(progress, RunPhase::Done, 100.0, "Reorganization complete!");
        Ok(RunOutcome::Completed)
    }

    fn validate_prerequisites(&self) -> Result<LoadedCatalog> {
        self.store
            .check_access()
            .map_err(|err| FolioError::StoreUnreachable(err.to_string()))?;
        let loaded = catalog::load_from_store(self.store)?;
        if loaded.artworks.is_empty() {
            return Err(FolioError::EmptyCatalog.into());
        }
        Ok(loaded)
    }

    fn open_checkpoint(&self, loaded: &LoadedCatalog) -> Result<Checkpoint> {
        let path = self.paths.checkpoint_file();
        if !self.options.resume
            && let Some(previous) = checkpoint::peek(&path)?
            && previous.fingerprint == loaded.fingerprint
            && previous.completed > 0
        {
            return Err(FolioError::CheckpointConflict(format!(
                "an interrupted run of this catalog already moved {} of {} artworks; rerun with --resume",
                previous.completed, previous.total
            ))
            .into());
        }
        let checkpoint = Checkpoint::open(
            &path,
            &loaded.fingerprint,
            loaded.artworks.len(),
            self.options.resume,
        )?;
        if checkpoint.completed() > 0 {
            tracing::info!(completed = checkpoint.completed(), "resuming from checkpoint");
        }
        Ok(checkpoint)
    }

    /// Returns `None` when the run was cancelled.
    fn process_artworks(
        &mut self,
        mut artworks: Vec<Artwork>,
        report: &mut RunReport,
        store: &dyn ContentStore,
        staged: Option<&StagedStore<'_>>,
        mut checkpoint: Option<&mut Checkpoint>,
        progress: &mut ProgressFn<'_>,
    ) -> Result<Option<Processed>> {
        let reconciler = Reconciler::new(store, self.transcoder);
        let mappings = report.id_mappings.clone();
        let total = artworks.len();
        let mut sources = BTreeSet::new();
        let mut errored_old_ids = BTreeSet::new();
        let mut errored = Vec::new();
        let mut published = BTreeSet::new();

        for (index, (artwork, change)) in artworks.iter_mut().zip(mappings.iter()).enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!(done = index, total, "reorganization cancelled");
                return Ok(None);
            }
            let message = format!("Processing: {}", artwork.title);
            self.advance(
                progress,
                RunPhase::ProcessingArtworks,
                processing_percent(index, total),
                &message,
            );

            if let Some(done) = checkpoint.as_deref().and_then(|cp| cp.get(&artwork.id)) {
                artwork.image = done.image.clone();
                artwork.image_high = done.image_high.clone();
                report.flags.extend(done.flag.clone());
                sources.extend(done.sources.iter().cloned());
                published.extend(
                    [&done.image, &done.image_high]
                        .into_iter()
                        .filter(|path| !path.is_empty())
                        .cloned(),
                );
                report.processed.push(artwork.id.clone());
                report.resumed += 1;
                continue;
            }

            let old_id = change.old_id.as_deref();
            match reconciler.reconcile(old_id, &artwork.id, &artwork.title) {
                Ok(result) => {
                    artwork.image = result.thumbnail_path.clone();
                    artwork.image_high = result.large_path.clone();
                    if let Some(flag) = &result.flag {
                        tracing::warn!(id = %artwork.id, issue = %flag.issue, "flagged");
                    }
                    report.flags.extend(result.flag.clone());
                    report.processed.push(artwork.id.clone());
                    sources.extend(result.sources.iter().cloned());
                    published.extend(
                        [&result.thumbnail_path, &result.large_path]
                            .into_iter()
                            .filter(|path| !path.is_empty())
                            .cloned(),
                    );

                    if let Some(cp) = checkpoint.as_deref_mut() {
                        cp.record(ArtworkCheckpoint {
                            new_id: artwork.id.clone(),
                            image: result.thumbnail_path,
                            image_high: result.large_path,
                            flag: result.flag,
                            sources: result.sources,
                        })?;
                    }
                    if let (Some(staged), Some(old)) = (staged, old_id) {
                        for kind in ASSET_KINDS {
                            staged.release(&asset_path(kind, old))?;
                        }
                    }
                }
                Err(err) => {
                    tracing::error!(id = %artwork.id, title = %artwork.title, error = %err, "failed to process artwork");
                    report.flags.push(Flag::new(
                        &artwork.id,
                        &artwork.title,
                        FlagKind::Error,
                        format!("Processing error: {err}"),
                    ));
                    if let Some(old) = old_id {
                        errored_old_ids.insert(old.to_string());
                    }
                    errored.push(index);
                }
            }
        }

        for index in errored {
            rehome_failed(&mut artworks[index], &published, store, staged);
        }

        Ok(Some(Processed {
            artworks,
            sources,
            errored_old_ids,
        }))
    }

    /// Best-effort removal of old paths the saved catalog no longer points at.
    fn cleanup(&self, store: &dyn ContentStore, processed: &Processed, report: &mut RunReport) {
        let referenced: BTreeSet<&str> = processed
            .artworks
            .iter()
            .flat_map(|artwork| [artwork.image.as_str(), artwork.image_high.as_str()])
            .filter(|path| !path.is_empty())
            .collect();
        let excluded: BTreeSet<String> = processed
            .errored_old_ids
            .iter()
            .flat_map(|old| {
                ASSET_KINDS.into_iter().flat_map(move |kind| {
                    LOOKUP_EXTS
                        .into_iter()
                        .map(move |ext| asset_path_with_ext(kind, old, ext))
                })
            })
            .collect();

        for path in &processed.sources {
            if referenced.contains(path.as_str()) || excluded.contains(path) {
                continue;
            }
            match delete_if_present(store, path, &format!("Remove {path} after reorganization")) {
                Ok(true) => report.deleted.push(path.clone()),
                Ok(false) => tracing::debug!(path = %path, "already gone"),
                Err(err) => {
                    tracing::warn!(path = %path, error = %err, "could not clean up old file");
                    report.cleanup_failures.push(CleanupFailure {
                        path: path.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
    }
}

/// A failed artwork keeps its input paths, but another artwork may have
/// published over them during this run. Republish the stashed original under
/// the failed artwork's own new id, or drop the reference when no original
/// survives, so the catalog never shows another artwork's image.
fn rehome_failed(
    artwork: &mut Artwork,
    published: &BTreeSet<String>,
    store: &dyn ContentStore,
    staged: Option<&StagedStore<'_>>,
) {
    let id = artwork.id.clone();
    let title = artwork.title.clone();
    for (kind, field) in [
        (AssetKind::Thumbnail, &mut artwork.image),
        (AssetKind::Large, &mut artwork.image_high),
    ] {
        if field.is_empty() || !published.contains(field.as_str()) {
            continue;
        }
        let target = asset_path(kind, &id);
        let message = format!("Restore {} for {title}", kind.label());
        let restored = staged
            .filter(|staged| staged.is_protected(field.as_str()))
            .map(|_| {
                store
                    .download(field.as_str())
                    .and_then(|bytes| store.upload(&target, &bytes, &message))
            });
        match restored {
            Some(Ok(_)) => {
                tracing::warn!(id = %id, from = %field, to = %target, "restored original of failed artwork");
                *field = target;
            }
            Some(Err(err)) => {
                tracing::warn!(id = %id, path = %field, error = %err, "could not restore original; dropping reference");
                field.clear();
            }
            None => {
                tracing::warn!(id = %id, path = %field, "path now holds another artwork; dropping reference");
                field.clear();
            }
        }
    }
}

/// Canonical asset paths of contested old ids whose owners still need work.
fn protected_paths(mappings: &[IdChange], checkpoint: Option<&Checkpoint>) -> Vec<String> {
    let new_ids: BTreeSet<&str> = mappings.iter().map(|m| m.new_id.as_str()).collect();
    mappings
        .iter()
        .filter(|m| m.is_rename())
        .filter(|m| checkpoint.is_none_or(|cp| cp.get(&m.new_id).is_none()))
        .filter_map(|m| m.old_id.as_deref())
        .filter(|old| new_ids.contains(old))
        .flat_map(|old| ASSET_KINDS.map(|kind| asset_path(kind, old)))
        .collect()
}
