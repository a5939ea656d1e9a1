#![allow(clippy::missing_errors_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Latent Inpaint
//!
//! Core library of a text-guided image-inpainting demo. It converts a
//! freehand drawing into a binary mask, validates and assembles a generation
//! request, and dispatches it to a pretrained Stable Diffusion inpainting
//! pipeline through a thin adapter with content-addressed result caching.
//!
//! The hosting UI (canvas widget, sliders, page rendering) is an external
//! collaborator: it collects user input and hands this crate the raw canvas
//! pixels, the selected base image and the slider values.
//!
//! ## Features
//!
//! - **Mask Extraction**: canvas RGBA strokes to a strict binary mask at the
//!   working image size
//! - **Request Validation**: bounded generation parameters and image/mask
//!   dimension checks, failing fast before any model work
//! - **Backend Adapter**: one long-lived Stable Diffusion pipeline instance
//!   per process, loaded lazily and guarded against concurrent
//!   initialization
//! - **Result Caching**: content-addressed cache keyed by the exact input
//!   tuple, so identical widget re-renders skip the multi-second model call
//! - **Preset Gallery**: fixed directory of base images plus JPEG/PNG upload
//!   decoding
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use latent_inpaint::{
//!     DrawingLayer, EngineConfig, GenerationParameters, inpaint_image,
//! };
//!
//! # fn example(base: image::DynamicImage, canvas_rgba: Vec<u8>) -> latent_inpaint::Result<()> {
//! // Raw RGBA pixels from the drawing canvas (700x700 widget)
//! let drawing = DrawingLayer::from_rgba_bytes(700, 700, canvas_rgba)?;
//!
//! let params = GenerationParameters::builder()
//!     .prompt("Face of a yellow cat, high resolution")
//!     .inference_steps(20)
//!     .guidance_scale(7.5)
//!     .strength(1.0)
//!     .build()?;
//!
//! let result = inpaint_image(base, &drawing, params, &EngineConfig::default())?;
//! result.save_png("inpainted.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Backend Selection
//!
//! The Stable Diffusion backend (tch/libtorch) is behind the default
//! `diffusion` feature. With the feature disabled the crate still builds and
//! the mask/request/validation layers work; generation fails with
//! `BackendUnavailable` unless a custom [`BackendFactory`] is injected.

pub mod backends;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod gallery;
pub mod mask;
pub mod request;
pub mod weights;

// Public API exports
pub use backends::{DiffusionBackend, ModelInfo};
#[cfg(feature = "diffusion")]
pub use backends::StableDiffusionBackend;
pub use cache::{ResultCache, ResultCacheStats, DEFAULT_CACHE_CAPACITY};
pub use config::{
    DeviceSelection, EngineConfig, EngineConfigBuilder, GenerationParameters,
    GenerationParametersBuilder, DEFAULT_MODEL_ID,
};
pub use engine::{BackendFactory, DefaultBackendFactory, InpaintEngine, SharedEngine};
pub use error::{InpaintError, Result};
pub use gallery::{decode_upload, GalleryEntry, PresetGallery, DEFAULT_PROMPTS};
pub use mask::{BinaryMask, DrawingLayer, MaskExtractor, DEFAULT_TARGET_SIZE, STROKE_THRESHOLD};
pub use request::{
    GenerationMetadata, GenerationRequest, GenerationRequestBuilder, GenerationResult,
};
pub use weights::{ModelWeights, WEIGHTS_DIR_ENV};

use image::DynamicImage;

/// Inpaint a base image using a freehand drawing as the mask
///
/// Drives the full pipeline against the process-wide shared engine: mask
/// extraction, request assembly/validation and one generation call. The base
/// image is resized to the configured working size first.
///
/// # Errors
/// - Mask extraction failures (`InvalidDrawingData`)
/// - Parameter or dimension validation failures (`Validation`)
/// - Backend failures (`BackendUnavailable`, `ResourceExhausted`)
pub fn inpaint_image(
    base_image: DynamicImage,
    drawing: &DrawingLayer,
    params: GenerationParameters,
    config: &EngineConfig,
) -> Result<GenerationResult> {
    let base_image = gallery::resize_to_working_size(&base_image, config.image_size);
    let mask = MaskExtractor::with_target_size(config.image_size).extract(drawing)?;
    let request = GenerationRequest::builder()
        .base_image(base_image)
        .mask(mask)
        .params(params)
        .build()?;
    SharedEngine::get_or_init(config)?.generate(&request)
}

/// Inpaint from an encoded base image (JPEG/PNG bytes) and raw canvas pixels
///
/// Convenience wrapper for hosts that hand over the uploaded file and the
/// canvas buffer directly.
///
/// # Errors
/// - Base image decoding failures
/// - Malformed canvas data (`InvalidDrawingData`)
/// - See [`inpaint_image`] for the remaining failure modes
pub fn inpaint_from_bytes(
    base_image_bytes: &[u8],
    canvas_width: u32,
    canvas_height: u32,
    canvas_rgba: Vec<u8>,
    params: GenerationParameters,
    config: &EngineConfig,
) -> Result<GenerationResult> {
    let base_image = image::load_from_memory(base_image_bytes)?;
    let drawing = DrawingLayer::from_rgba_bytes(canvas_width, canvas_height, canvas_rgba)?;
    inpaint_image(base_image, &drawing, params, config)
}
