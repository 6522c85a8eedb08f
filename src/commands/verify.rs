use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};

use crate::commands::CommandReport;
use crate::reorg::artwork::{Artwork, split_id};
use crate::reorg::catalog;
use crate::reorg::config::load_config;
use crate::reorg::open_store;
use crate::reorg::orphans;
use crate::reorg::paths::{large_path, thumbnail_path};
use crate::reorg::store::ContentStore;

#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// Also check that every referenced image exists in the store.
    pub strict: bool,
}

/// Structural checks on a reorganized catalog. Returns one issue per problem.
pub fn check_catalog(artworks: &[Artwork]) -> Vec<String> {
    let mut issues = Vec::new();
    let mut seen = BTreeSet::new();
    let mut sequences: BTreeMap<String, Vec<u32>> = BTreeMap::new();

    for artwork in artworks {
        let id = artwork.id.as_str();
        if !seen.insert(id) {
            issues.push(format!("duplicate id {id}"));
            continue;
        }
        let Some((token, seq)) = split_id(id) else {
            issues.push(format!("{id:?} ({}) is not a sequential id", artwork.title));
            continue;
        };
        let expected = artwork.year_token();
        if token != expected {
            issues.push(format!("{id}: year token {token} does not match year {expected}"));
        }
        sequences.entry(token.to_string()).or_default().push(seq);

        if !artwork.image.is_empty() && artwork.image != thumbnail_path(id) {
            issues.push(format!("{id}: image {} is not canonical", artwork.image));
        }
        if !artwork.image_high.is_empty() && artwork.image_high != large_path(id) {
            issues.push(format!("{id}: imageHigh {} is not canonical", artwork.image_high));
        }
    }

    for (token, mut seqs) in sequences {
        seqs.sort_unstable();
        for (expected, actual) in (1..).zip(seqs.iter()) {
            if *actual != expected {
                issues.push(format!(
                    "{token}: sequence has a gap (expected {expected:03}, found {actual:03})"
                ));
                break;
            }
        }
    }
    issues
}

fn check_referenced_images(store: &dyn ContentStore, artworks: &[Artwork], report: &mut CommandReport) {
    let mut checked = 0usize;
    for artwork in artworks {
        for path in [&artwork.image, &artwork.image_high] {
            if path.is_empty() {
                continue;
            }
            checked += 1;
            match store.exists(path) {
                Ok(true) => {}
                Ok(false) => report.issue(format!("{}: {path} is missing from the store", artwork.id)),
                Err(err) => report.issue(format!("{}: failed to check {path}: {err}", artwork.id)),
            }
        }
    }
    report.detail(format!("images_checked={checked}"));
}

/// Listed only; `folio prune` is what deletes them.
fn list_orphans(store: &dyn ContentStore, artworks: &[Artwork], report: &mut CommandReport) {
    match orphans::scan(store, artworks) {
        Ok(scan) => {
            report.detail(format!("orphans={}", scan.orphans.len()));
            for path in scan.orphans {
                report.detail(format!("orphan {path}"));
            }
        }
        Err(err) => report.issue(format!("failed to list image directories: {err}")),
    }
}

pub fn run(opts: &VerifyOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("verify");
    let cfg = load_config()?;
    let store = open_store(&cfg)?;
    let loaded = catalog::load_from_store(store.as_ref())?;

    report.detail(format!("artworks={}", loaded.artworks.len()));
    if loaded.artworks.is_empty() {
        report.issue("catalog is empty");
        return Ok(report);
    }
    let without_images = loaded
        .artworks
        .iter()
        .filter(|a| a.image.is_empty() && a.image_high.is_empty())
        .count();
    report.detail(format!("without_images={without_images}"));

    for issue in check_catalog(&loaded.artworks) {
        report.issue(issue);
    }
    if opts.strict {
        check_referenced_images(store.as_ref(), &loaded.artworks, &mut report);
        list_orphans(store.as_ref(), &loaded.artworks, &mut report);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placed(id: &str, year: Option<&str>) -> Artwork {
        let mut artwork = Artwork::new(id, format!("Work {id}"), year);
        artwork.image = thumbnail_path(id);
        artwork.image_high = large_path(id);
        artwork
    }

    #[test]
    fn reorganized_catalog_passes() {
        let artworks = vec![
            placed("2019_001", Some("2019")),
            placed("2019_002", Some("2019")),
            placed("2022.8_001", Some("2022.8")),
            Artwork::new("unknown_001", "Untitled", None),
        ];
        assert!(check_catalog(&artworks).is_empty());
    }

    #[test]
    fn gaps_duplicates_and_stray_paths_are_reported() {
        let mut stray = placed("2020_003", Some("2020"));
        stray.image = "images/paintings/thumbnails/old_thumb.png".to_string();
        let artworks = vec![
            placed("2020_001", Some("2020")),
            stray,
            placed("2020_001", Some("2020")),
            placed("2019_001", Some("2021")),
            Artwork::new("abc", "Loose", Some("2020")),
        ];
        let issues = check_catalog(&artworks);
        assert!(issues.iter().any(|i| i == "duplicate id 2020_001"));
        assert!(issues.iter().any(|i| i.contains("2020_003: image")));
        assert!(issues.iter().any(|i| i.starts_with("2020: sequence has a gap")));
        assert!(issues.iter().any(|i| i.contains("does not match year 2021")));
        assert!(issues.iter().any(|i| i.contains("\"abc\"")));
    }
}
