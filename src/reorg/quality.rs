use image::ImageReader;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

pub const MIN_LARGE_WIDTH: u32 = 1200;
pub const MIN_LARGE_BYTES: u64 = 200_000;
/// Promotion of a lone thumbnail requires the full large-image bar.
pub const MIN_PROMOTABLE_WIDTH: u32 = MIN_LARGE_WIDTH;
pub const MIN_PROMOTABLE_BYTES: u64 = MIN_LARGE_BYTES;

pub const THUMBNAIL_MAX_DIM: u32 = 400;
pub const LARGE_MAX_DIM: u32 = 1600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageQuality {
    pub width: u32,
    pub height: u32,
    pub file_size: u64,
    pub is_large_worthy: bool,
}

impl ImageQuality {
    pub fn is_promotable(&self) -> bool {
        self.width >= MIN_PROMOTABLE_WIDTH && self.file_size >= MIN_PROMOTABLE_BYTES
    }

    /// `W×H, NKB` as shown in operator flags.
    pub fn describe(&self) -> String {
        let kb = (self.file_size as f64 / 1024.0).round() as u64;
        format!("{}×{}, {}KB", self.width, self.height, kb)
    }
}

fn decode_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

/// Classify encoded image bytes. Undecodable input is reported as 0×0 and is
/// never large-worthy.
pub fn classify(bytes: &[u8]) -> ImageQuality {
    let file_size = bytes.len() as u64;
    let (width, height) = decode_dimensions(bytes).unwrap_or((0, 0));
    ImageQuality {
        width,
        height,
        file_size,
        is_large_worthy: width >= MIN_LARGE_WIDTH && file_size >= MIN_LARGE_BYTES,
    }
}

/// Dimensions after fitting `(width, height)` inside a `max_dim` box.
/// Never upscales.
pub fn fit_dimensions(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max_dim || longest == 0 {
        return (width, height);
    }
    let ratio = f64::from(max_dim) / f64::from(longest);
    let scale = |dim: u32| ((f64::from(dim) * ratio).round() as u32).max(1);
    (scale(width), scale(height))
}
