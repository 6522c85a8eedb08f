//! Per-artwork image reconciliation.
//!
//! Given the old and new identifier of one artwork, find whatever assets exist
//! under the old id, judge their quality, and publish the best available pair
//! under the new id. Missing or weak assets produce a flag, not an error; only
//! store and encoder failures are returned as `Err`.

use crate::reorg::paths::{AssetKind, LOOKUP_EXTS, asset_path, asset_path_with_ext};
use crate::reorg::quality::{ImageQuality, LARGE_MAX_DIM, THUMBNAIL_MAX_DIM, classify};
use crate::reorg::report::{Flag, FlagKind};
use crate::reorg::store::{ContentStore, StoreError};
use crate::reorg::transcode::Transcoder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const NO_IMAGES_ISSUE: &str = "No images found";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Both,
    LargeOnly,
    ThumbnailOnly,
    Neither,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// Empty when the artwork ends up without a thumbnail.
    pub thumbnail_path: String,
    /// Empty when the artwork ends up without a large image.
    pub large_path: String,
    pub flag: Option<Flag>,
    pub scenario: Scenario,
    /// Old paths that were read; candidates for cleanup once the catalog is saved.
    pub sources: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to re-encode {path}: {source}")]
    Transcode {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

pub fn large_quality_issue(quality: &ImageQuality) -> String {
    format!("Large image quality insufficient ({})", quality.describe())
}

pub fn thumbnail_only_issue(quality: &ImageQuality) -> String {
    format!(
        "Only thumbnail exists, insufficient quality for large image ({})",
        quality.describe()
    )
}

struct Source {
    path: String,
    bytes: Vec<u8>,
}

pub struct Reconciler<'a> {
    store: &'a dyn ContentStore,
    transcoder: &'a dyn Transcoder,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn ContentStore, transcoder: &'a dyn Transcoder) -> Self {
        Self { store, transcoder }
    }

    /// First existing asset of `kind` under `old_id`, canonical extension first.
    pub fn locate(&self, kind: AssetKind, old_id: &str) -> Result<Option<String>, StoreError> {
        for ext in LOOKUP_EXTS {
            let path = asset_path_with_ext(kind, old_id, ext);
            if self.store.exists(&path)? {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    pub fn reconcile(
        &self,
        old_id: Option<&str>,
        new_id: &str,
        title: &str,
    ) -> Result<Reconciled, ReconcileError> {
        let (large, thumbnail) = match old_id {
            Some(old) => (
                self.locate(AssetKind::Large, old)?,
                self.locate(AssetKind::Thumbnail, old)?,
            ),
            None => (None, None),
        };
        tracing::debug!(
            old = old_id.unwrap_or("<none>"),
            new = new_id,
            large = large.as_deref().unwrap_or("-"),
            thumbnail = thumbnail.as_deref().unwrap_or("-"),
            "located assets"
        );

        match (large, thumbnail) {
            (Some(large), Some(thumbnail)) => self.both(new_id, title, &large, &thumbnail),
            (Some(large), None) => self.large_only(new_id, title, &large),
            (None, Some(thumbnail)) => self.thumbnail_only(new_id, title, &thumbnail),
            (None, None) => Ok(Reconciled {
                thumbnail_path: String::new(),
                large_path: String::new(),
                flag: Some(Flag::new(new_id, title, FlagKind::Missing, NO_IMAGES_ISSUE)),
                scenario: Scenario::Neither,
                sources: Vec::new(),
            }),
        }
    }

    fn both(
        &self,
        new_id: &str,
        title: &str,
        large_path: &str,
        thumb_path: &str,
    ) -> Result<Reconciled, ReconcileError> {
        let large = self.fetch(large_path)?;
        let quality = classify(&large.bytes);
        let sources = vec![large_path.to_string(), thumb_path.to_string()];

        if quality.is_large_worthy {
            let thumbnail = self.publish_derived(
                &large,
                AssetKind::Thumbnail,
                new_id,
                &format!("Update thumbnail for {title}"),
            )?;
            let large_target = self.publish_derived(
                &large,
                AssetKind::Large,
                new_id,
                &format!("Update large image for {title}"),
            )?;
            return Ok(Reconciled {
                thumbnail_path: thumbnail,
                large_path: large_target,
                flag: None,
                scenario: Scenario::Both,
                sources,
            });
        }

        let thumb = self.fetch(thumb_path)?;
        let thumbnail = self.publish_copy(
            &thumb,
            AssetKind::Thumbnail,
            new_id,
            &format!("Update thumbnail for {title}"),
        )?;
        let large_target = self.publish_copy(
            &large,
            AssetKind::Large,
            new_id,
            &format!("Update large image for {title}"),
        )?;
        Ok(Reconciled {
            thumbnail_path: thumbnail,
            large_path: large_target,
            flag: Some(Flag::new(
                new_id,
                title,
                FlagKind::Quality,
                large_quality_issue(&quality),
            )),
            scenario: Scenario::Both,
            sources,
        })
    }

    fn large_only(
        &self,
        new_id: &str,
        title: &str,
        large_path: &str,
    ) -> Result<Reconciled, ReconcileError> {
        let large = self.fetch(large_path)?;
        let quality = classify(&large.bytes);
        let sources = vec![large_path.to_string()];

        if quality.is_large_worthy {
            let thumbnail = self.publish_derived(
                &large,
                AssetKind::Thumbnail,
                new_id,
                &format!("Create thumbnail for {title}"),
            )?;
            let large_target = self.publish_derived(
                &large,
                AssetKind::Large,
                new_id,
                &format!("Update large image for {title}"),
            )?;
            return Ok(Reconciled {
                thumbnail_path: thumbnail,
                large_path: large_target,
                flag: None,
                scenario: Scenario::LargeOnly,
                sources,
            });
        }

        let large_target = self.publish_copy(
            &large,
            AssetKind::Large,
            new_id,
            &format!("Update large image for {title}"),
        )?;
        Ok(Reconciled {
            thumbnail_path: String::new(),
            large_path: large_target,
            flag: Some(Flag::new(
                new_id,
                title,
                FlagKind::Quality,
                large_quality_issue(&quality),
            )),
            scenario: Scenario::LargeOnly,
            sources,
        })
    }

    fn thumbnail_only(
        &self,
        new_id: &str,
        title: &str,
        thumb_path: &str,
    ) -> Result<Reconciled, ReconcileError> {
        let thumb = self.fetch(thumb_path)?;
        let quality = classify(&thumb.bytes);
        let sources = vec![thumb_path.to_string()];

        if quality.is_promotable() {
            let thumbnail = self.publish_derived(
                &thumb,
                AssetKind::Thumbnail,
                new_id,
                &format!("Create thumbnail for {title}"),
            )?;
            let large_target = self.publish_derived(
                &thumb,
                AssetKind::Large,
                new_id,
                &format!("Promote thumbnail to large for {title}"),
            )?;
            return Ok(Reconciled {
                thumbnail_path: thumbnail,
                large_path: large_target,
                flag: None,
                scenario: Scenario::ThumbnailOnly,
                sources,
            });
        }

        let thumbnail = self.publish_copy(
            &thumb,
            AssetKind::Thumbnail,
            new_id,
            &format!("Update thumbnail for {title}"),
        )?;
        Ok(Reconciled {
            thumbnail_path: thumbnail,
            large_path: String::new(),
            flag: Some(Flag::new(
                new_id,
                title,
                FlagKind::Quality,
                thumbnail_only_issue(&quality),
            )),
            scenario: Scenario::ThumbnailOnly,
            sources,
        })
    }

    fn fetch(&self, path: &str) -> Result<Source, StoreError> {
        let bytes = self.store.download(path)?;
        Ok(Source {
            path: path.to_string(),
            bytes,
        })
    }

    fn max_dim(kind: AssetKind) -> u32 {
        match kind {
            AssetKind::Thumbnail => THUMBNAIL_MAX_DIM,
            AssetKind::Large => LARGE_MAX_DIM,
        }
    }

    /// Re-encode a decodable source into the `kind` box and publish it.
    fn publish_derived(
        &self,
        source: &Source,
        kind: AssetKind,
        new_id: &str,
        message: &str,
    ) -> Result<String, ReconcileError> {
        let bytes = self
            .transcoder
            .fit(&source.bytes, Self::max_dim(kind))
            .map_err(|source_err| ReconcileError::Transcode {
                path: source.path.clone(),
                source: source_err,
            })?;
        let target = asset_path(kind, new_id);
        self.put(&target, &bytes, source, message)?;
        Ok(target)
    }

    /// Best-effort carry-over of a weak asset: normalized when it decodes,
    /// copied verbatim when it does not.
    fn publish_copy(
        &self,
        source: &Source,
        kind: AssetKind,
        new_id: &str,
        message: &str,
    ) -> Result<String, ReconcileError> {
        let bytes = match self.transcoder.fit(&source.bytes, Self::max_dim(kind)) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(path = %source.path, error = %err, "copying undecodable asset verbatim");
                source.bytes.clone()
            }
        };
        let target = asset_path(kind, new_id);
        self.put(&target, &bytes, source, message)?;
        Ok(target)
    }

    fn put(
        &self,
        target: &str,
        bytes: &[u8],
        source: &Source,
        message: &str,
    ) -> Result<(), StoreError> {
        if target == source.path && bytes == source.bytes.as_slice() {
            tracing::debug!(path = target, "asset already in place");
            return Ok(());
        }
        self.store.upload(target, bytes, message)?;
        Ok(())
    }
}
