//! Mask extraction from freehand drawing data
//!
//! Converts the raw RGBA buffer produced by a drawing canvas into a binary
//! inpainting mask at the working image size. White pixels mark regions to be
//! repainted, black pixels are preserved.

use crate::error::{InpaintError, Result};
use image::{imageops, DynamicImage, GrayImage, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Intensity cutoff separating deliberate strokes from anti-aliasing noise.
///
/// Resizing and luma conversion introduce faint gray edges around strokes;
/// anything at or below this value is treated as background.
pub const STROKE_THRESHOLD: u8 = 10;

/// Default working size of the base image and mask (pixels per side)
pub const DEFAULT_TARGET_SIZE: u32 = 512;

/// Raw pixel output of a freehand drawing surface
///
/// The layer has the dimensions of the canvas widget (typically 700x700),
/// independent of the base image resolution. It is produced incrementally by
/// user input and consumed once, at generation time.
#[derive(Debug, Clone)]
pub struct DrawingLayer {
    pixels: RgbaImage,
}

impl DrawingLayer {
    /// Create a drawing layer from raw RGBA bytes
    ///
    /// # Errors
    /// - Zero width or height
    /// - Buffer length does not match `width * height * 4`
    pub fn from_rgba_bytes(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(InpaintError::invalid_drawing(format!(
                "canvas dimensions must be non-zero, got {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize * 4;
        if data.len() != expected {
            return Err(InpaintError::invalid_drawing(format!(
                "canvas buffer has {} bytes, expected {expected} for {width}x{height} RGBA",
                data.len()
            )));
        }
        let pixels = RgbaImage::from_raw(width, height, data).ok_or_else(|| {
            InpaintError::invalid_drawing("canvas buffer could not be interpreted as RGBA")
        })?;
        Ok(Self { pixels })
    }

    /// Create a drawing layer from an already-decoded RGBA image
    #[must_use]
    pub fn from_image(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    /// Canvas dimensions (width, height)
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Access the underlying RGBA pixels
    #[must_use]
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}

/// Binary inpainting mask
///
/// Single-channel raster at the working image size. Invariant: every pixel is
/// exactly 0 ("preserve") or 255 ("inpaint") after extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BinaryMask {
    /// Mask data as grayscale values, each 0 or 255
    data: Vec<u8>,
    /// Mask dimensions (width, height)
    dimensions: (u32, u32),
}

// Deserialization goes through `from_raw` so the 0/255 invariant holds for
// masks from any source, not just extraction.
impl<'de> Deserialize<'de> for BinaryMask {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawMask {
            data: Vec<u8>,
            dimensions: (u32, u32),
        }

        let raw = RawMask::deserialize(deserializer)?;
        Self::from_raw(raw.dimensions.0, raw.dimensions.1, raw.data)
            .map_err(serde::de::Error::custom)
    }
}

impl BinaryMask {
    /// Create a mask from raw single-channel data, binarizing on the way in
    ///
    /// # Errors
    /// - Buffer length does not match `width * height`
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(InpaintError::invalid_drawing(format!(
                "mask buffer has {} bytes, expected {expected} for {width}x{height}",
                data.len()
            )));
        }
        let data = data
            .into_iter()
            .map(|v| if v > STROKE_THRESHOLD { 255 } else { 0 })
            .collect();
        Ok(Self {
            data,
            dimensions: (width, height),
        })
    }

    /// Mask dimensions (width, height)
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    /// Raw mask bytes, row-major, each 0 or 255
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Fraction of pixels marked for inpainting (0.0 to 1.0)
    #[must_use]
    pub fn coverage(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let marked = self.data.iter().filter(|&&v| v == 255).count();
        marked as f64 / self.data.len() as f64
    }

    /// Whether no pixel is marked for inpainting
    ///
    /// A blank mask is still a valid generation input: the backend repaints
    /// nothing and effectively reconstructs the original image.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|&v| v == 0)
    }

    /// Convert to a grayscale image for display or encoding
    #[must_use]
    pub fn to_luma_image(&self) -> GrayImage {
        let (width, height) = self.dimensions;
        // Invariant: data length always matches dimensions
        GrayImage::from_raw(width, height, self.data.clone())
            .unwrap_or_else(|| GrayImage::new(width, height))
    }
}

/// Converts raw drawing layers into model-consumable binary masks
///
/// The extraction is deterministic: discard the alpha channel, resample to the
/// working size, convert to luma and apply a hard threshold so only deliberate
/// strokes register as mask.
#[derive(Debug, Clone)]
pub struct MaskExtractor {
    target_size: u32,
}

impl Default for MaskExtractor {
    fn default() -> Self {
        Self {
            target_size: DEFAULT_TARGET_SIZE,
        }
    }
}

impl MaskExtractor {
    /// Create an extractor producing masks at the default working size
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an extractor producing masks at a custom square size
    #[must_use]
    pub fn with_target_size(target_size: u32) -> Self {
        Self { target_size }
    }

    /// Target mask size (pixels per side)
    #[must_use]
    pub fn target_size(&self) -> u32 {
        self.target_size
    }

    /// Extract a binary mask from a drawing layer
    ///
    /// # Errors
    /// - The configured target size is zero
    pub fn extract(&self, layer: &DrawingLayer) -> Result<BinaryMask> {
        if self.target_size == 0 {
            return Err(InpaintError::validation(
                "target_size",
                "mask target size must be non-zero",
            ));
        }

        let (width, height) = layer.dimensions();

        // Drop the alpha channel before resampling so stroke opacity does not
        // bleed into the intensity values.
        let rgb = DynamicImage::ImageRgba8(layer.pixels().clone()).to_rgb8();

        // Bilinear keeps stroke coverage reasonably intact when shrinking a
        // large canvas down to the working size.
        let resized = imageops::resize(
            &rgb,
            self.target_size,
            self.target_size,
            imageops::FilterType::Triangle,
        );

        let luma = DynamicImage::ImageRgb8(resized).to_luma8();

        let data = luma
            .into_raw()
            .into_iter()
            .map(|v| if v > STROKE_THRESHOLD { 255 } else { 0 })
            .collect::<Vec<u8>>();

        let mask = BinaryMask {
            data,
            dimensions: (self.target_size, self.target_size),
        };

        debug!(
            canvas = %format!("{width}x{height}"),
            target = self.target_size,
            coverage = mask.coverage(),
            "Extracted binary mask from drawing layer"
        );

        Ok(mask)
    }
}
