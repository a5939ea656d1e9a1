//! Test utilities and mock backends
//!
//! Mock implementations of the [`DiffusionBackend`] trait so engine behavior
//! (caching, lazy initialization, error surfacing) can be tested without
//! model weights or a libtorch installation.

use crate::backends::{DiffusionBackend, ModelInfo};
use crate::config::EngineConfig;
use crate::engine::BackendFactory;
use crate::error::{InpaintError, Result};
use crate::request::GenerationRequest;
use image::{DynamicImage, Rgb, RgbImage};
use instant::Duration;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Mock diffusion backend for testing
///
/// `generate` deterministically fills the masked region of the base image
/// with a fixed color, so tests can verify that masks and parameters were
/// threaded through without invoking a real model.
#[derive(Debug, Clone)]
pub struct MockDiffusionBackend {
    initialized: bool,
    fill_color: [u8; 3],
    generate_calls: Arc<AtomicUsize>,
    should_fail_init: bool,
    should_exhaust_memory: bool,
}

impl MockDiffusionBackend {
    /// Create a mock backend with default behavior
    #[must_use]
    pub fn new() -> Self {
        Self {
            initialized: false,
            fill_color: [255, 0, 255],
            generate_calls: Arc::new(AtomicUsize::new(0)),
            should_fail_init: false,
            should_exhaust_memory: false,
        }
    }

    /// Create a mock backend that fails initialization with `BackendUnavailable`
    #[must_use]
    pub fn new_failing_init() -> Self {
        Self {
            should_fail_init: true,
            ..Self::new()
        }
    }

    /// Create a mock backend that fails generation with `ResourceExhausted`
    #[must_use]
    pub fn new_exhausting_memory() -> Self {
        Self {
            should_exhaust_memory: true,
            ..Self::new()
        }
    }

    /// Number of `generate` invocations across all clones
    #[must_use]
    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    /// Shared call counter, for verification after the backend is boxed
    #[must_use]
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.generate_calls)
    }
}

impl Default for MockDiffusionBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DiffusionBackend for MockDiffusionBackend {
    fn initialize(&mut self, _config: &EngineConfig) -> Result<Option<Duration>> {
        if self.should_fail_init {
            return Err(InpaintError::backend_unavailable(
                "mock backend configured to fail initialization",
            ));
        }
        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn generate(&mut self, request: &GenerationRequest) -> Result<DynamicImage> {
        if !self.initialized {
            return Err(InpaintError::backend_unavailable(
                "mock backend is not initialized",
            ));
        }
        if self.should_exhaust_memory {
            return Err(InpaintError::resource_exhausted(
                "mock device out of memory",
            ));
        }
        self.generate_calls.fetch_add(1, Ordering::SeqCst);

        let base = request.base_image().to_rgb8();
        let (width, height) = base.dimensions();
        let mask = request.mask().data();
        let mut output = RgbImage::new(width, height);
        for (x, y, pixel) in output.enumerate_pixels_mut() {
            let index = (y * width + x) as usize;
            let masked = mask.get(index).copied().unwrap_or(0) == 255;
            *pixel = if masked {
                Rgb(self.fill_color)
            } else {
                *base.get_pixel(x, y)
            };
        }
        Ok(DynamicImage::ImageRgb8(output))
    }

    fn model_info(&self) -> Result<ModelInfo> {
        if !self.initialized {
            return Err(InpaintError::backend_unavailable(
                "mock backend is not initialized",
            ));
        }
        Ok(ModelInfo {
            name: "mock-inpaint-model".to_string(),
            device: "cpu".to_string(),
        })
    }
}

/// Backend factory producing clones of a prepared mock backend
pub struct MockBackendFactory {
    prototype: MockDiffusionBackend,
}

impl MockBackendFactory {
    /// Create a factory from a prototype backend
    #[must_use]
    pub fn new(prototype: MockDiffusionBackend) -> Self {
        Self { prototype }
    }
}

impl BackendFactory for MockBackendFactory {
    fn create_backend(&self, _config: &EngineConfig) -> Result<Box<dyn DiffusionBackend>> {
        Ok(Box::new(self.prototype.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationParameters;
    use crate::mask::BinaryMask;

    fn request_with_half_mask(size: u32) -> GenerationRequest {
        let base =
            DynamicImage::ImageRgb8(RgbImage::from_pixel(size, size, Rgb([10, 20, 30])));
        let mut data = vec![0_u8; (size * size) as usize];
        for value in data.iter_mut().take((size * size / 2) as usize) {
            *value = 255;
        }
        let mask = BinaryMask::from_raw(size, size, data).unwrap();
        GenerationRequest::builder()
            .base_image(base)
            .mask(mask)
            .params(GenerationParameters::default())
            .build()
            .unwrap()
    }

    #[test]
    fn test_mock_requires_initialization() {
        let mut backend = MockDiffusionBackend::new();
        let request = request_with_half_mask(16);
        assert!(backend.generate(&request).is_err());

        backend.initialize(&EngineConfig::default()).unwrap();
        assert!(backend.is_initialized());
        assert!(backend.generate(&request).is_ok());
        assert_eq!(backend.generate_calls(), 1);
    }

    #[test]
    fn test_mock_fills_masked_region_only() {
        let mut backend = MockDiffusionBackend::new();
        backend.initialize(&EngineConfig::default()).unwrap();
        let request = request_with_half_mask(16);
        let output = backend.generate(&request).unwrap().to_rgb8();

        // Top half masked, bottom half preserved
        assert_eq!(output.get_pixel(0, 0).0, [255, 0, 255]);
        assert_eq!(output.get_pixel(0, 15).0, [10, 20, 30]);
    }

    #[test]
    fn test_failing_variants() {
        let mut backend = MockDiffusionBackend::new_failing_init();
        let err = backend.initialize(&EngineConfig::default()).unwrap_err();
        assert!(matches!(err, InpaintError::BackendUnavailable(_)));

        let mut backend = MockDiffusionBackend::new_exhausting_memory();
        backend.initialize(&EngineConfig::default()).unwrap();
        let err = backend.generate(&request_with_half_mask(8)).unwrap_err();
        assert!(matches!(err, InpaintError::ResourceExhausted(_)));
    }
}
