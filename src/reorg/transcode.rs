use crate::reorg::quality::fit_dimensions;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{ImageFormat, ImageResult};
use std::io::Cursor;

/// Resize/re-encode capability used by the reconciler. Output is always in
/// the canonical asset format.
pub trait Transcoder {
    fn fit(&self, bytes: &[u8], max_dim: u32) -> ImageResult<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PngTranscoder;

impl Transcoder for PngTranscoder {
    fn fit(&self, bytes: &[u8], max_dim: u32) -> ImageResult<Vec<u8>> {
        let img = image::load_from_memory(bytes)?;
        let (width, height) = fit_dimensions(img.width(), img.height(), max_dim);
        let already_fits = width == img.width() && height == img.height();
        if already_fits && image::guess_format(bytes)? == ImageFormat::Png {
            return Ok(bytes.to_vec());
        }

        let resized = if already_fits {
            img
        } else {
            img.resize_exact(width, height, FilterType::Lanczos3)
        };

        let mut out = Cursor::new(Vec::new());
        let encoder =
            PngEncoder::new_with_quality(&mut out, CompressionType::Best, PngFilter::Adaptive);
        resized.write_with_encoder(encoder)?;
        Ok(out.into_inner())
    }
}
