use anyhow::Result;

use crate::commands::{CommandReport, coded_issue, confirm};
use crate::reorg::catalog;
use crate::reorg::config::load_config;
use crate::reorg::lock::RunLock;
use crate::reorg::open_store;
use crate::reorg::orphans;
use crate::reorg::paths::resolve_paths;

#[derive(Debug, Clone, Default)]
pub struct PruneOptions {
    /// Delete the orphans instead of only listing them.
    pub execute: bool,
    pub yes: bool,
}

pub fn prune_prompt(count: usize) -> String {
    format!("This will permanently delete {count} orphaned images. Continue?")
}

pub fn run(opts: &PruneOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("prune");
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

    let loaded = catalog::load_from_store(store.as_ref())?;
    if loaded.artworks.is_empty() {
        report.issue("catalog is empty; refusing to treat every image as orphaned");
        return Ok(report);
    }
    if paths.checkpoint_file().exists() {
        report.issue("an interrupted reorganization is pending; finish it with `folio reorganize --resume` first");
        return Ok(report);
    }

    let scan = orphans::scan(store.as_ref(), &loaded.artworks)?;
    report.detail(format!("images_scanned={}", scan.scanned));
    report.detail(format!("orphans={}", scan.orphans.len()));
    for path in &scan.orphans {
        report.detail(format!("orphan {path}"));
    }
    for path in &scan.unrecognized {
        report.detail(format!("skipped {path} (no artwork id in name)"));
    }
    if scan.orphans.is_empty() {
        return Ok(report);
    }
    if !opts.execute {
        report.detail("nothing deleted; pass --execute to remove the orphans");
        return Ok(report);
    }

    if !store.writable() {
        report.issue("no write credential: set FOLIO_GITHUB_TOKEN or FOLIO_PROXY_URL");
        return Ok(report);
    }
    let _lock = match RunLock::acquire(&paths) {
        Ok(lock) => lock,
        Err(err) => {
            coded_issue(&mut report, err)?;
            return Ok(report);
        }
    };
    if !opts.yes
        && !confirm(
            &mut report,
            &prune_prompt(scan.orphans.len()),
            "refusing to delete without confirmation; pass --yes when not on a terminal",
        )?
    {
        return Ok(report);
    }

    let outcome = orphans::prune(store.as_ref(), &scan.orphans);
    report.detail(format!("deleted={}", outcome.deleted.len()));
    for path in &outcome.deleted {
        report.detail(format!("deleted {path}"));
    }
    for failure in &outcome.failures {
        report.issue(format!("could not delete {}: {}", failure.path, failure.error));
    }
    Ok(report)
}
