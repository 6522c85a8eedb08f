use anyhow::Result;
use std::path::PathBuf;

use crate::commands::CommandReport;
use crate::reorg::catalog::{self, LoadedCatalog};
use crate::reorg::config::load_config;
use crate::reorg::ids::assign_sequential_ids;
use crate::reorg::open_store;

#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Plan against a local copy of the catalog instead of the store.
    pub catalog: Option<PathBuf>,
}

fn load(opts: &PlanOptions) -> Result<LoadedCatalog> {
    if let Some(path) = &opts.catalog {
        return catalog::load_from_file(path);
    }
    let cfg = load_config()?;
    let store = open_store(&cfg)?;
    catalog::load_from_store(store.as_ref())
}

pub fn run(opts: &PlanOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("plan");
    let loaded = load(opts)?;
    let assignment = assign_sequential_ids(loaded.artworks);
    if assignment.mapping.is_empty() {
        report.issue("no artworks found to reorganize");
        return Ok(report);
    }

    report.detail(format!("artworks={}", assignment.mapping.len()));
    report.detail(format!("renamed={}", assignment.mapping.renames().count()));
    report.detail(format!(
        "contested={}",
        assignment.mapping.contested_old_ids().len()
    ));

    for (change, artwork) in assignment
        .mapping
        .entries()
        .iter()
        .zip(assignment.artworks.iter())
    {
        let old = change.old_id.as_deref().unwrap_or("(none)");
        let marker = if change.is_rename() { "->" } else { "==" };
        report.detail(format!(
            "{old} {marker} {} ({})",
            change.new_id, artwork.title
        ));
    }
    Ok(report)
}
