//! Image loading into fixed-shape RGB records.

use crate::types::{ImageRecord, IMAGE_HEIGHT, IMAGE_WIDTH};
use image::imageops::FilterType;
use std::path::Path;

/// Loads images from disk and resizes them to a fixed shape.
#[derive(Debug, Clone, Copy)]
pub struct ImageLoader {
    pub width: u32,
    pub height: u32,
    pub filter: FilterType,
}

impl Default for ImageLoader {
    fn default() -> Self {
        Self {
            width: IMAGE_WIDTH as u32,
            height: IMAGE_HEIGHT as u32,
            filter: FilterType::CatmullRom,
        }
    }
}

impl ImageLoader {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Decode, resize, and convert to RGB8. Returns `None` when the file cannot be decoded.
    pub fn load(&self, path: &Path) -> Option<ImageRecord> {
        let img = match image::open(path) {
            Ok(img) => img,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "image decode failed");
                return None;
            }
        };
        // Decoders yield RGB channel order; to_rgb8 drops alpha and expands grayscale.
        let rgb = img.to_rgb8();
        let rgb = if rgb.dimensions() == (self.width, self.height) {
            rgb
        } else {
            image::imageops::resize(&rgb, self.width, self.height, self.filter)
        };
        Some(ImageRecord {
            width: self.width,
            height: self.height,
            pixels: rgb.into_raw(),
        })
    }
}

/// Load `path` as a 224x224 RGB record, or `None` if it is not a readable image.
pub fn load_image(path: &Path) -> Option<ImageRecord> {
    ImageLoader::default().load(path)
}
