use anyhow::Result;
use std::env;
use std::path::PathBuf;

pub const CATALOG_PATH: &str = "data/artworks.json";
pub const THUMBNAIL_DIR: &str = "images/paintings/thumbnails/";
pub const LARGE_DIR: &str = "images/paintings/large/";
pub const CANONICAL_EXT: &str = "png";
/// Extensions probed when looking for an artwork's existing assets, canonical first.
pub const LOOKUP_EXTS: [&str; 2] = ["png", "jpg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Thumbnail,
    Large,
}

impl AssetKind {
    pub fn label(self) -> &'static str {
        match self {
            AssetKind::Thumbnail => "thumbnail",
            AssetKind::Large => "large",
        }
    }
}

pub fn asset_path_with_ext(kind: AssetKind, id: &str, ext: &str) -> String {
    match kind {
        AssetKind::Thumbnail => format!("{THUMBNAIL_DIR}{id}_thumb.{ext}"),
        AssetKind::Large => format!("{LARGE_DIR}{id}_large.{ext}"),
    }
}

pub fn asset_path(kind: AssetKind, id: &str) -> String {
    asset_path_with_ext(kind, id, CANONICAL_EXT)
}

pub fn thumbnail_path(id: &str) -> String {
    asset_path(AssetKind::Thumbnail, id)
}

pub fn large_path(id: &str) -> String {
    asset_path(AssetKind::Large, id)
}

/// Local directories owned by the tool; nothing here lives in the content store.
#[derive(Debug, Clone)]
pub struct FolioPaths {
    pub folio_home: PathBuf,
    pub state_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub backups_dir: PathBuf,
}

impl FolioPaths {
    pub fn lock_file(&self) -> PathBuf {
        self.state_dir.join("reorganize.lock")
    }

    pub fn cancel_file(&self) -> PathBuf {
        self.state_dir.join("reorganize.cancel")
    }

    pub fn checkpoint_file(&self) -> PathBuf {
        self.state_dir.join("checkpoint.jsonl")
    }

    pub fn staging_dir(&self, fingerprint: &str) -> PathBuf {
        let short = fingerprint.get(..16).unwrap_or(fingerprint);
        self.state_dir.join("staging").join(short)
    }
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<FolioPaths> {
    let folio_home = match env::var("FOLIO_HOME") {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => required_home_dir()?.join(".folio"),
    };

    let state_dir = env_or_default_path("FOLIO_STATE_DIR", folio_home.join("state"));
    let logs_dir = env_or_default_path("FOLIO_LOGS_DIR", folio_home.join("logs"));
    let reports_dir = env_or_default_path("FOLIO_REPORTS_DIR", folio_home.join("reports"));
    let backups_dir = state_dir.join("backups");

    Ok(FolioPaths {
        folio_home,
        state_dir,
        logs_dir,
        reports_dir,
        backups_dir,
    })
}
