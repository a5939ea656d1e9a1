//! Backend implementations for the diffusion model boundary
//!
//! This module provides the backends of the inpainting library:
//! - Stable Diffusion backend (tch/libtorch, GPU acceleration)
//! - Mock backend for tests (no model files required)

use crate::config::EngineConfig;
use crate::error::Result;
use crate::request::GenerationRequest;
use image::DynamicImage;
use instant::Duration;

#[cfg(feature = "diffusion")]
pub mod stable_diffusion;

// Test utilities for backend testing
#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "diffusion")]
pub use self::stable_diffusion::StableDiffusionBackend;

/// Descriptive information about a loaded model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    /// Checkpoint identifier
    pub name: String,
    /// Device the model runs on ("cpu" or "cuda")
    pub device: String,
}

/// Trait for text-guided inpainting backends
///
/// The backend wraps one external pretrained model invocation and is treated
/// as opaque: given identical input, repeated calls are not required to
/// produce identical pixels (sampling is stochastic unless seeded). Backends
/// must be `Send` so the engine that owns them can live behind the
/// process-wide shared handle.
pub trait DiffusionBackend: Send {
    /// Load the model onto the compute device
    ///
    /// Construction is expensive (weight loading); callers are expected to
    /// initialize once per process lifetime and reuse the instance. The
    /// operation is idempotent.
    ///
    /// # Errors
    /// - Weight files cannot be found or parsed (`BackendUnavailable`)
    /// - The compute device is unavailable (`BackendUnavailable`)
    fn initialize(&mut self, config: &EngineConfig) -> Result<Option<Duration>>;

    /// Check if the model is loaded
    fn is_initialized(&self) -> bool;

    /// Run one generation pass over a validated request
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Device memory exhausted (`ResourceExhausted`)
    /// - Model inference failures
    fn generate(&mut self, request: &GenerationRequest) -> Result<DynamicImage>;

    /// Information about the loaded model
    ///
    /// # Errors
    /// - Backend not initialized
    fn model_info(&self) -> Result<ModelInfo>;
}
