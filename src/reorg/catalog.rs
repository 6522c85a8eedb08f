use crate::reorg::artwork::Artwork;
use crate::reorg::paths::{CATALOG_PATH, FolioPaths};
use crate::reorg::store::{ContentStore, Revision};
use crate::reorg::util::{sha256_hex, timestamp_slug};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct LoadedCatalog {
    pub artworks: Vec<Artwork>,
    /// Bytes exactly as stored, kept for the pre-save backup.
    pub raw: Vec<u8>,
    pub fingerprint: String,
}

pub fn parse_catalog(bytes: &[u8], origin: &str) -> Result<LoadedCatalog> {
    let artworks: Vec<Artwork> = serde_json::from_slice(bytes)
        .with_context(|| format!("{origin} is not a JSON array of artworks"))?;
    Ok(LoadedCatalog {
        artworks,
        raw: bytes.to_vec(),
        fingerprint: sha256_hex(bytes),
    })
}

/// Load the canonical catalog. A missing catalog loads as empty.
pub fn load_from_store(store: &dyn ContentStore) -> Result<LoadedCatalog> {
    match store.download(CATALOG_PATH) {
        Ok(bytes) => parse_catalog(&bytes, CATALOG_PATH),
        Err(err) if err.is_not_found() => {
            tracing::warn!(path = CATALOG_PATH, "catalog not found in store");
            parse_catalog(b"[]", CATALOG_PATH)
        }
        Err(err) => Err(err).with_context(|| format!("failed to download {CATALOG_PATH}")),
    }
}

pub fn load_from_file(path: &Path) -> Result<LoadedCatalog> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_catalog(&bytes, &path.display().to_string())
}

/// Two-space indented JSON array, the format the site reads.
pub fn render_catalog(artworks: &[Artwork]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(artworks)?)
}

pub fn commit_message(count: usize) -> String {
    format!("Update artworks.json with {count} artworks")
}

pub fn persist(store: &dyn ContentStore, artworks: &[Artwork]) -> Result<Revision> {
    let bytes = render_catalog(artworks)?;
    let revision = store
        .upload(CATALOG_PATH, &bytes, &commit_message(artworks.len()))
        .with_context(|| format!("failed to upload {CATALOG_PATH}"))?;
    tracing::info!(artworks = artworks.len(), revision = %revision, "catalog saved");
    Ok(revision)
}

/// Keep a local copy of the catalog about to be overwritten.
pub fn backup_previous(paths: &FolioPaths, raw: &[u8]) -> Result<PathBuf> {
    fs::create_dir_all(&paths.backups_dir)
        .with_context(|| format!("failed to create {}", paths.backups_dir.display()))?;
    let path = paths
        .backups_dir
        .join(format!("artworks-{}.json", timestamp_slug()));
    fs::write(&path, raw).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
