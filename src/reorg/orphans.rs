//! Image files in the asset directories that no catalog entry accounts for.

use crate::reorg::artwork::Artwork;
use crate::reorg::paths::{LARGE_DIR, THUMBNAIL_DIR};
use crate::reorg::report::CleanupFailure;
use crate::reorg::store::{ContentStore, StoreError, delete_if_present};
use std::collections::BTreeSet;

const IMAGE_EXTS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "bmp", "webp"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrphanScan {
    /// Image files seen across both asset directories.
    pub scanned: usize,
    pub orphans: Vec<String>,
    /// Image files whose name carries no artwork id; never deleted.
    pub unrecognized: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PruneOutcome {
    pub deleted: Vec<String>,
    pub failures: Vec<CleanupFailure>,
}

fn is_image(name: &str) -> bool {
    name.rsplit_once('.')
        .is_some_and(|(_, ext)| IMAGE_EXTS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Artwork id encoded in an asset file name: `<id>_thumb.<ext>` or
/// `<id>_large.<ext>`.
pub fn id_from_asset_name(name: &str) -> Option<&str> {
    let (stem, _) = name.rsplit_once('.')?;
    stem.strip_suffix("_thumb")
        .or_else(|| stem.strip_suffix("_large"))
        .filter(|id| !id.is_empty())
}

/// A file is orphaned when its id is not in the catalog and no entry points
/// at it directly.
pub fn scan(store: &dyn ContentStore, artworks: &[Artwork]) -> Result<OrphanScan, StoreError> {
    let ids: BTreeSet<&str> = artworks.iter().map(|a| a.id.as_str()).collect();
    let referenced: BTreeSet<&str> = artworks
        .iter()
        .flat_map(|a| [a.image.as_str(), a.image_high.as_str()])
        .filter(|path| !path.is_empty())
        .collect();

    let mut out = OrphanScan::default();
    for dir in [THUMBNAIL_DIR, LARGE_DIR] {
        for path in store.list(dir)? {
            let name = path.rsplit_once('/').map_or(path.as_str(), |(_, name)| name);
            if !is_image(name) {
                continue;
            }
            out.scanned += 1;
            let orphaned = id_from_asset_name(name)
                .map(|id| !ids.contains(id) && !referenced.contains(path.as_str()));
            match orphaned {
                Some(true) => out.orphans.push(path),
                Some(false) => {}
                None => out.unrecognized.push(path),
            }
        }
    }
    tracing::debug!(
        scanned = out.scanned,
        orphans = out.orphans.len(),
        unrecognized = out.unrecognized.len(),
        "orphan scan"
    );
    Ok(out)
}

/// Best-effort removal; one failed delete does not stop the rest.
pub fn prune(store: &dyn ContentStore, orphans: &[String]) -> PruneOutcome {
    let mut outcome = PruneOutcome::default();
    for path in orphans {
        match delete_if_present(store, path, &format!("Remove orphaned {path}")) {
            Ok(true) => outcome.deleted.push(path.clone()),
            Ok(false) => tracing::debug!(path = %path, "already gone"),
            Err(err) => {
                tracing::warn!(path = %path, error = %err, "could not remove orphan");
                outcome.failures.push(CleanupFailure {
                    path: path.clone(),
                    error: err.to_string(),
                });
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reorg::paths::{large_path, thumbnail_path};
    use crate::reorg::store::memory::MemoryStore;

    fn placed(id: &str) -> Artwork {
        let mut artwork = Artwork::new(id, "Work", Some("2020"));
        artwork.image = thumbnail_path(id);
        artwork
    }

    #[test]
    fn asset_names_yield_their_id() {
        assert_eq!(id_from_asset_name("2017_001_thumb.png"), Some("2017_001"));
        assert_eq!(id_from_asset_name("2022.8_001_large.jpg"), Some("2022.8_001"));
        assert_eq!(id_from_asset_name("banner.png"), None);
        assert_eq!(id_from_asset_name("_thumb.png"), None);
    }

    #[test]
    fn scan_sorts_files_into_kept_orphaned_and_unrecognized() {
        let store = MemoryStore::with_files([
            (thumbnail_path("2020_001"), b"a".to_vec()),
            (large_path("2020_001"), b"b".to_vec()),
            (thumbnail_path("2019_004"), b"c".to_vec()),
            ("images/paintings/thumbnails/legacy_thumb.jpg".to_string(), b"d".to_vec()),
            ("images/paintings/thumbnails/banner.png".to_string(), b"e".to_vec()),
            ("images/paintings/thumbnails/README.md".to_string(), b"f".to_vec()),
        ]);
        let mut kept = placed("2020_002");
        kept.image = "images/paintings/thumbnails/legacy_thumb.jpg".to_string();
        let artworks = vec![placed("2020_001"), kept];

        let out = scan(&store, &artworks).expect("scan");
        assert_eq!(out.scanned, 5);
        assert_eq!(out.orphans, vec![thumbnail_path("2019_004")]);
        assert_eq!(out.unrecognized, vec!["images/paintings/thumbnails/banner.png"]);
    }

    #[test]
    fn prune_keeps_going_after_a_failed_delete() {
        let store = MemoryStore::with_files([
            (thumbnail_path("2019_001"), b"a".to_vec()),
            (thumbnail_path("2019_002"), b"b".to_vec()),
        ]);
        store.fail_deletes_of(&thumbnail_path("2019_001"));
        let orphans = vec![
            thumbnail_path("2019_001"),
            thumbnail_path("2019_002"),
            thumbnail_path("2019_003"),
        ];

        let outcome = prune(&store, &orphans);
        assert_eq!(outcome.deleted, vec![thumbnail_path("2019_002")]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].path, thumbnail_path("2019_001"));
    }
}
