//! Generation request assembly and result types
//!
//! A [`GenerationRequest`] is the complete, validated input to one backend
//! call: base image, binary mask and numeric parameters. Assembly is a pure
//! validation step with no side effects; every constraint is checked before
//! any expensive computation is attempted.

use crate::config::GenerationParameters;
use crate::error::{InpaintError, Result};
use crate::mask::BinaryMask;
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Immutable, validated input tuple for one generation call
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    base_image: DynamicImage,
    mask: BinaryMask,
    params: GenerationParameters,
}

impl GenerationRequest {
    /// Create a request builder
    #[must_use]
    pub fn builder() -> GenerationRequestBuilder {
        GenerationRequestBuilder::default()
    }

    /// The picture to be edited
    #[must_use]
    pub fn base_image(&self) -> &DynamicImage {
        &self.base_image
    }

    /// The binary inpainting mask
    #[must_use]
    pub fn mask(&self) -> &BinaryMask {
        &self.mask
    }

    /// The generation parameters
    #[must_use]
    pub fn params(&self) -> &GenerationParameters {
        &self.params
    }

    /// Text prompt shorthand
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.params.prompt
    }

    /// Content-addressed digest of the exact input tuple
    ///
    /// Covers the prompt, the base image pixels, the mask pixels and the
    /// numeric parameters (float bit patterns). Two requests share a digest
    /// exactly when the backend would receive identical input, which makes
    /// the digest the key of the result cache.
    #[must_use]
    pub fn content_digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.params.prompt.as_bytes());
        hasher.update([0]);
        hasher.update(self.base_image.to_rgb8().as_raw());
        hasher.update(self.mask.data());
        hasher.update(self.params.inference_steps.to_le_bytes());
        hasher.update(self.params.guidance_scale.to_bits().to_le_bytes());
        hasher.update(self.params.strength.to_bits().to_le_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Builder for [`GenerationRequest`]
///
/// `build()` validates parameter bounds and the image/mask dimension match
/// and fails with a [`InpaintError::Validation`] naming the offending field.
#[derive(Debug, Default)]
pub struct GenerationRequestBuilder {
    base_image: Option<DynamicImage>,
    mask: Option<BinaryMask>,
    params: GenerationParameters,
}

impl GenerationRequestBuilder {
    /// Set the base image
    #[must_use]
    pub fn base_image(mut self, image: DynamicImage) -> Self {
        self.base_image = Some(image);
        self
    }

    /// Set the binary mask
    #[must_use]
    pub fn mask(mut self, mask: BinaryMask) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Set the generation parameters
    #[must_use]
    pub fn params(mut self, params: GenerationParameters) -> Self {
        self.params = params;
        self
    }

    /// Assemble and validate the request
    ///
    /// # Errors
    /// - Missing base image or mask
    /// - Any parameter outside its documented bounds
    /// - Base image and mask pixel dimensions differ
    pub fn build(self) -> Result<GenerationRequest> {
        let base_image = self
            .base_image
            .ok_or_else(|| InpaintError::validation("base_image", "base image is required"))?;
        let mask = self
            .mask
            .ok_or_else(|| InpaintError::validation("mask", "binary mask is required"))?;

        self.params.validate()?;

        let image_dims = base_image.dimensions();
        let mask_dims = mask.dimensions();
        if image_dims != mask_dims {
            return Err(InpaintError::validation(
                "mask",
                format!(
                    "mask dimensions {}x{} do not match base image {}x{}",
                    mask_dims.0, mask_dims.1, image_dims.0, image_dims.1
                ),
            ));
        }

        Ok(GenerationRequest {
            base_image,
            mask,
            params: self.params,
        })
    }
}

/// Timing and provenance metadata for one generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    /// Name of the model that produced the image
    pub model: String,
    /// Wall-clock inference time in milliseconds (0 for cache hits)
    pub inference_ms: u64,
    /// Whether the image was served from the result cache
    pub from_cache: bool,
}

/// Output of one generation call
///
/// Exists only transiently for display; nothing is persisted unless the
/// caller saves it explicitly.
#[derive(Debug, Clone)]
pub struct GenerationResult {
    /// The generated image, same dimensions as the base image
    pub image: DynamicImage,
    /// Content digest of the request that produced this image
    pub digest: String,
    /// Timing and provenance metadata
    pub metadata: GenerationMetadata,
}

impl GenerationResult {
    /// Image dimensions (width, height)
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Save the result as PNG
    ///
    /// # Errors
    /// - File I/O or encoding failures
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.image.save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }

    /// Encode the result as PNG bytes
    ///
    /// # Errors
    /// - Encoding failures
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        self.image.write_to(&mut cursor, image::ImageFormat::Png)?;
        Ok(buffer)
    }

    /// Encode the result as JPEG bytes with the given quality
    ///
    /// # Errors
    /// - Encoding failures
    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut buffer);
        let rgb_image = self.image.to_rgb8();
        let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, quality);
        encoder.encode_image(&rgb_image)?;
        Ok(buffer)
    }
}
