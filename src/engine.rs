//! Inpainting engine: the generation backend adapter
//!
//! [`InpaintEngine`] consolidates the business logic around one model
//! invocation: lazy backend construction, content-addressed result caching
//! and timing metadata. [`SharedEngine`] wraps it in the process-wide
//! singleton handle the hosting UI holds on to.

use crate::backends::DiffusionBackend;
use crate::cache::{ResultCache, ResultCacheStats};
use crate::config::EngineConfig;
use crate::error::{InpaintError, Result};
use crate::request::{GenerationMetadata, GenerationRequest, GenerationResult};
use image::GenericImageView;
use instant::Instant;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::{debug, info, instrument};

/// Factory trait for creating diffusion backends
///
/// Lets hosts and tests inject a backend without the engine knowing which
/// implementations were compiled in.
pub trait BackendFactory: Send + Sync {
    /// Create a backend instance for the given configuration
    ///
    /// # Errors
    /// - No backend implementation is available
    /// - Backend construction failures
    fn create_backend(&self, config: &EngineConfig) -> Result<Box<dyn DiffusionBackend>>;
}

/// Default backend factory: Stable Diffusion when compiled in
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    #[cfg(feature = "diffusion")]
    fn create_backend(&self, _config: &EngineConfig) -> Result<Box<dyn DiffusionBackend>> {
        Ok(Box::new(crate::backends::StableDiffusionBackend::new()))
    }

    #[cfg(not(feature = "diffusion"))]
    fn create_backend(&self, _config: &EngineConfig) -> Result<Box<dyn DiffusionBackend>> {
        Err(InpaintError::backend_unavailable(
            "no diffusion backend compiled in; enable the `diffusion` feature",
        ))
    }
}

/// Generation backend adapter with result caching
///
/// Owns one long-lived backend instance. Construction of the engine is
/// cheap; the expensive model load happens on the first call to
/// [`initialize`](Self::initialize) (or implicitly on the first
/// [`generate`](Self::generate)) and is idempotent.
pub struct InpaintEngine {
    config: EngineConfig,
    backend_factory: Box<dyn BackendFactory>,
    backend: Option<Box<dyn DiffusionBackend>>,
    cache: ResultCache,
}

impl InpaintEngine {
    /// Create an engine with the default backend factory
    ///
    /// # Errors
    /// - Invalid engine configuration
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_factory(config, Box::new(DefaultBackendFactory))
    }

    /// Create an engine with a custom backend factory
    ///
    /// # Errors
    /// - Invalid engine configuration
    pub fn with_factory(
        config: EngineConfig,
        backend_factory: Box<dyn BackendFactory>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            backend_factory,
            backend: None,
            cache: ResultCache::new(),
        })
    }

    /// The engine configuration
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether the backend has been constructed and loaded
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.backend.as_ref().is_some_and(|b| b.is_initialized())
    }

    /// Load the model; idempotent
    ///
    /// # Errors
    /// - Backend construction or model loading failures
    ///   (`BackendUnavailable`)
    pub fn initialize(&mut self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }

        info!(model = %self.config.model_id, device = %self.config.device, "Initializing inpainting engine");
        let mut backend = self.backend_factory.create_backend(&self.config)?;
        let load_time = backend.initialize(&self.config)?;
        if let Some(elapsed) = load_time {
            debug!(elapsed_ms = elapsed.as_millis() as u64, "Model load finished");
        }
        self.backend = Some(backend);
        Ok(())
    }

    /// Execute one generation call
    ///
    /// Identical requests (same prompt, image content, mask content and
    /// numeric parameters) are served from the content-addressed cache
    /// unless caching is disabled. A failed call caches nothing: generation
    /// either fully succeeds with one complete image or fails entirely.
    ///
    /// # Errors
    /// - Request dimensions differ from the configured working size
    ///   (`Validation`)
    /// - Backend initialization failures (`BackendUnavailable`)
    /// - Device memory exhaustion (`ResourceExhausted`)
    /// - Inference failures
    #[instrument(skip(self, request), fields(digest = tracing::field::Empty))]
    pub fn generate(&mut self, request: &GenerationRequest) -> Result<GenerationResult> {
        // The backend's latent geometry is fixed by the configured working
        // size; a mismatched request must fail here, not inside a tensor op.
        let (width, height) = request.base_image().dimensions();
        let size = self.config.image_size;
        if width != size || height != size {
            return Err(InpaintError::validation(
                "base_image",
                format!("image is {width}x{height} but the engine works at {size}x{size}"),
            ));
        }

        self.initialize()?;

        let digest = request.content_digest();
        tracing::Span::current().record("digest", digest.as_str());

        if !self.config.disable_cache {
            if let Some(image) = self.cache.get(&digest) {
                let model = self.model_name();
                return Ok(GenerationResult {
                    image,
                    digest,
                    metadata: GenerationMetadata {
                        model,
                        inference_ms: 0,
                        from_cache: true,
                    },
                });
            }
        }

        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| InpaintError::internal("engine initialized without a backend"))?;

        let start = Instant::now();
        let image = backend.generate(request)?;
        let inference_ms = start.elapsed().as_millis() as u64;
        info!(inference_ms, "Generation finished");

        if !self.config.disable_cache {
            self.cache.insert(digest.clone(), image.clone());
        }

        Ok(GenerationResult {
            image,
            digest,
            metadata: GenerationMetadata {
                model: self.model_name(),
                inference_ms,
                from_cache: false,
            },
        })
    }

    /// Result cache statistics
    #[must_use]
    pub fn cache_stats(&self) -> ResultCacheStats {
        self.cache.stats()
    }

    fn model_name(&self) -> String {
        self.backend
            .as_ref()
            .and_then(|b| b.model_info().ok())
            .map_or_else(|| self.config.model_id.clone(), |info| info.name)
    }
}

static SHARED_ENGINE: OnceLock<SharedEngine> = OnceLock::new();

/// Process-wide handle to the lazily-initialized engine singleton
///
/// The underlying engine is constructed at most once per process; every call
/// to [`get_or_init`](Self::get_or_init) observes the same instance. The
/// handle is an explicit owned value to pass around, not ambient global
/// state; the expensive model load still only happens on first generation.
#[derive(Clone)]
pub struct SharedEngine {
    inner: Arc<Mutex<InpaintEngine>>,
}

impl SharedEngine {
    /// Get the process-wide engine, constructing it on first call
    ///
    /// Concurrent first calls are safe: one construction wins and all
    /// callers receive handles to the same engine. A construction failure
    /// leaves the guard unset, so a later call with a corrected
    /// configuration may retry.
    ///
    /// # Errors
    /// - Invalid engine configuration on first construction
    pub fn get_or_init(config: &EngineConfig) -> Result<Self> {
        if let Some(engine) = SHARED_ENGINE.get() {
            return Ok(engine.clone());
        }
        let engine = Self::from_engine(InpaintEngine::new(config.clone())?);
        Ok(SHARED_ENGINE.get_or_init(|| engine).clone())
    }

    /// Wrap an existing engine in a shareable handle (not the singleton)
    #[must_use]
    pub fn from_engine(engine: InpaintEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    /// Whether two handles refer to the same underlying engine
    #[must_use]
    pub fn same_engine(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Load the model; idempotent
    ///
    /// # Errors
    /// - Backend construction or model loading failures
    pub fn initialize(&self) -> Result<()> {
        self.lock()?.initialize()
    }

    /// Execute one generation call through the shared engine
    ///
    /// # Errors
    /// - See [`InpaintEngine::generate`]
    pub fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        self.lock()?.generate(request)
    }

    /// Result cache statistics of the shared engine
    ///
    /// # Errors
    /// - The engine lock is poisoned
    pub fn cache_stats(&self) -> Result<ResultCacheStats> {
        Ok(self.lock()?.cache_stats())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, InpaintEngine>> {
        self.inner
            .lock()
            .map_err(|_| InpaintError::internal("engine lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::test_utils::{MockBackendFactory, MockDiffusionBackend};
    use crate::config::GenerationParameters;
    use crate::mask::BinaryMask;
    use image::{DynamicImage, RgbImage};

    fn mock_engine(backend: MockDiffusionBackend, disable_cache: bool) -> InpaintEngine {
        let config = EngineConfig::builder()
            .image_size(16)
            .disable_cache(disable_cache)
            .build()
            .unwrap();
        InpaintEngine::with_factory(config, Box::new(MockBackendFactory::new(backend))).unwrap()
    }

    fn test_request(size: u32, prompt: &str) -> GenerationRequest {
        let base = DynamicImage::ImageRgb8(RgbImage::from_pixel(
            size,
            size,
            image::Rgb([40, 50, 60]),
        ));
        let mut data = vec![0_u8; (size * size) as usize];
        data[0] = 255;
        let mask = BinaryMask::from_raw(size, size, data).unwrap();
        GenerationRequest::builder()
            .base_image(base)
            .mask(mask)
            .params(GenerationParameters {
                prompt: prompt.to_string(),
                ..GenerationParameters::default()
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_lazy_initialization_on_first_generate() {
        let backend = MockDiffusionBackend::new();
        let mut engine = mock_engine(backend, false);
        assert!(!engine.is_initialized());

        let request = test_request(16, "a castle");
        engine.generate(&request).unwrap();
        assert!(engine.is_initialized());
    }

    #[test]
    fn test_identical_requests_hit_cache() {
        let backend = MockDiffusionBackend::new();
        let calls = backend.call_counter();
        let mut engine = mock_engine(backend, false);

        let request = test_request(16, "a castle");
        let first = engine.generate(&request).unwrap();
        let second = engine.generate(&request).unwrap();

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(!first.metadata.from_cache);
        assert!(second.metadata.from_cache);
        assert_eq!(second.metadata.inference_ms, 0);
        assert_eq!(first.digest, second.digest);
        assert_eq!(
            first.image.to_rgb8().as_raw(),
            second.image.to_rgb8().as_raw()
        );
    }

    #[test]
    fn test_different_prompts_miss_cache() {
        let backend = MockDiffusionBackend::new();
        let calls = backend.call_counter();
        let mut engine = mock_engine(backend, false);

        engine.generate(&test_request(16, "a castle")).unwrap();
        engine.generate(&test_request(16, "a pirate boat")).unwrap();

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cache_can_be_disabled() {
        let backend = MockDiffusionBackend::new();
        let calls = backend.call_counter();
        let mut engine = mock_engine(backend, true);

        let request = test_request(16, "a castle");
        engine.generate(&request).unwrap();
        let second = engine.generate(&request).unwrap();

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert!(!second.metadata.from_cache);
    }

    #[test]
    fn test_failed_initialization_surfaces() {
        let mut engine = mock_engine(MockDiffusionBackend::new_failing_init(), false);
        let err = engine.generate(&test_request(16, "x")).unwrap_err();
        assert!(matches!(err, InpaintError::BackendUnavailable(_)));
        assert!(!engine.is_initialized());
    }

    #[test]
    fn test_resource_exhaustion_surfaces_and_caches_nothing() {
        let mut engine = mock_engine(MockDiffusionBackend::new_exhausting_memory(), false);
        let request = test_request(16, "x");
        let err = engine.generate(&request).unwrap_err();
        assert!(matches!(err, InpaintError::ResourceExhausted(_)));
        assert_eq!(engine.cache_stats().entries, 0);
    }

    #[test]
    fn test_blank_mask_request_is_accepted() {
        let backend = MockDiffusionBackend::new();
        let mut engine = mock_engine(backend, false);

        let base = DynamicImage::ImageRgb8(RgbImage::from_pixel(
            16,
            16,
            image::Rgb([40, 50, 60]),
        ));
        let mask = BinaryMask::from_raw(16, 16, vec![0; 256]).unwrap();
        let request = GenerationRequest::builder()
            .base_image(base)
            .mask(mask)
            .params(GenerationParameters::default())
            .build()
            .unwrap();

        let result = engine.generate(&request).unwrap();
        // Nothing masked: the mock reconstructs the original image
        assert_eq!(result.image.to_rgb8().get_pixel(0, 0).0, [40, 50, 60]);
    }

    #[test]
    fn test_wrong_working_size_rejected_before_backend() {
        let backend = MockDiffusionBackend::new();
        let calls = backend.call_counter();
        let mut engine = mock_engine(backend, false);

        // Engine works at 16x16, request is 8x8
        let err = engine.generate(&test_request(8, "a castle")).unwrap_err();
        assert_eq!(err.field(), Some("base_image"));
        assert!(err.to_string().contains("8x8"));
        assert!(err.to_string().contains("16x16"));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(!engine.is_initialized());
    }

    #[test]
    fn test_shared_engine_is_thread_safe() {
        fn assert_send<T: Send>() {}
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send::<InpaintEngine>();
        assert_send_sync::<SharedEngine>();
    }

    #[test]
    fn test_shared_engine_from_engine_identity() {
        let engine = mock_engine(MockDiffusionBackend::new(), false);
        let shared = SharedEngine::from_engine(engine);
        let clone = shared.clone();
        assert!(shared.same_engine(&clone));

        let other = SharedEngine::from_engine(mock_engine(MockDiffusionBackend::new(), false));
        assert!(!shared.same_engine(&other));
    }
}
