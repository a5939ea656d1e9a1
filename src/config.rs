//! Configuration types for inpainting generation

use crate::error::{InpaintError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Inclusive bounds for the number of denoising steps
pub const INFERENCE_STEPS_RANGE: (u32, u32) = (10, 100);
/// Inclusive bounds for the classifier-free guidance scale
pub const GUIDANCE_SCALE_RANGE: (f64, f64) = (0.0, 10.0);
/// Inclusive bounds for the image transformation strength
pub const STRENGTH_RANGE: (f64, f64) = (0.0, 1.0);

/// Identifier of the pretrained inpainting checkpoint this crate targets
pub const DEFAULT_MODEL_ID: &str = "runwayml/stable-diffusion-inpainting";

/// Compute device options for the diffusion backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceSelection {
    /// Use CUDA when available, otherwise fall back to CPU
    Auto,
    /// CPU execution (always available, slow for diffusion)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
}

impl Default for DeviceSelection {
    fn default() -> Self {
        Self::Auto
    }
}

impl std::fmt::Display for DeviceSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
        }
    }
}

/// Numeric and textual parameters for one generation call
///
/// Immutable once constructed and supplied fresh per request. The defaults
/// match the demo UI's slider defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    /// Text prompt guiding the denoising process; may be empty for an
    /// unconditioned generation
    pub prompt: String,

    /// Number of iterative denoising steps (10-100)
    pub inference_steps: u32,

    /// How strongly the prompt influences the generated pixels (0.0-10.0)
    pub guidance_scale: f64,

    /// Extent to which the reference image is transformed (0.0-1.0). At 1.0
    /// the denoising process runs for the full number of inference steps.
    pub strength: f64,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            inference_steps: 20,
            guidance_scale: 7.5,
            strength: 1.0,
        }
    }
}

impl GenerationParameters {
    /// Create a parameter builder for fluent construction
    #[must_use]
    pub fn builder() -> GenerationParametersBuilder {
        GenerationParametersBuilder::default()
    }

    /// Validate all parameters against their documented bounds
    ///
    /// Valid input is accepted unchanged; a violation fails with a
    /// [`InpaintError::Validation`] naming the out-of-range field.
    ///
    /// # Errors
    /// - `inference_steps` outside [10, 100]
    /// - `guidance_scale` outside [0.0, 10.0]
    /// - `strength` outside [0.0, 1.0]
    pub fn validate(&self) -> Result<()> {
        let (steps_min, steps_max) = INFERENCE_STEPS_RANGE;
        if self.inference_steps < steps_min || self.inference_steps > steps_max {
            return Err(InpaintError::out_of_range(
                "inference_steps",
                self.inference_steps,
                &format!("{steps_min}-{steps_max}"),
            ));
        }

        let (guidance_min, guidance_max) = GUIDANCE_SCALE_RANGE;
        if !self.guidance_scale.is_finite()
            || self.guidance_scale < guidance_min
            || self.guidance_scale > guidance_max
        {
            return Err(InpaintError::out_of_range(
                "guidance_scale",
                self.guidance_scale,
                &format!("{guidance_min}-{guidance_max}"),
            ));
        }

        let (strength_min, strength_max) = STRENGTH_RANGE;
        if !self.strength.is_finite()
            || self.strength < strength_min
            || self.strength > strength_max
        {
            return Err(InpaintError::out_of_range(
                "strength",
                self.strength,
                &format!("{strength_min}-{strength_max}"),
            ));
        }

        Ok(())
    }
}

/// Builder for [`GenerationParameters`]
#[derive(Debug, Default)]
pub struct GenerationParametersBuilder {
    params: GenerationParameters,
}

impl GenerationParametersBuilder {
    /// Set the text prompt
    #[must_use]
    pub fn prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.params.prompt = prompt.into();
        self
    }

    /// Set the number of denoising steps
    #[must_use]
    pub fn inference_steps(mut self, steps: u32) -> Self {
        self.params.inference_steps = steps;
        self
    }

    /// Set the guidance scale
    #[must_use]
    pub fn guidance_scale(mut self, scale: f64) -> Self {
        self.params.guidance_scale = scale;
        self
    }

    /// Set the transformation strength
    #[must_use]
    pub fn strength(mut self, strength: f64) -> Self {
        self.params.strength = strength;
        self
    }

    /// Build and validate the parameters
    ///
    /// # Errors
    /// - Any parameter outside its documented bounds
    pub fn build(self) -> Result<GenerationParameters> {
        self.params.validate()?;
        Ok(self.params)
    }
}

/// Configuration for the inpainting engine and its diffusion backend
///
/// The model identifier and scheduler choice are configuration constants, not
/// user input; the per-request knobs live in [`GenerationParameters`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Pretrained checkpoint identifier
    pub model_id: String,

    /// Compute device for model execution
    pub device: DeviceSelection,

    /// Directory holding the model weight files. `None` resolves via the
    /// `LATENT_INPAINT_WEIGHTS_DIR` environment variable or the user cache
    /// directory.
    pub weights_dir: Option<PathBuf>,

    /// Square working size of base images, masks and results
    pub image_size: u32,

    /// Fixed RNG seed for reproducible sampling (`None` = stochastic)
    pub seed: Option<i64>,

    /// Disable the content-addressed result cache
    pub disable_cache: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            device: DeviceSelection::default(),
            weights_dir: None,
            image_size: crate::mask::DEFAULT_TARGET_SIZE,
            seed: None,
            disable_cache: false,
        }
    }
}

impl EngineConfig {
    /// Create a configuration builder for fluent construction
    #[must_use]
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// - Zero image size
    /// - Empty model identifier
    pub fn validate(&self) -> Result<()> {
        if self.image_size == 0 {
            return Err(InpaintError::validation(
                "image_size",
                "working image size must be non-zero",
            ));
        }
        if self.model_id.is_empty() {
            return Err(InpaintError::validation(
                "model_id",
                "model identifier must not be empty",
            ));
        }
        Ok(())
    }
}

/// Builder for [`EngineConfig`]
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Set the pretrained checkpoint identifier
    #[must_use]
    pub fn model_id<S: Into<String>>(mut self, model_id: S) -> Self {
        self.config.model_id = model_id.into();
        self
    }

    /// Set the compute device
    #[must_use]
    pub fn device(mut self, device: DeviceSelection) -> Self {
        self.config.device = device;
        self
    }

    /// Set an explicit weights directory
    #[must_use]
    pub fn weights_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.weights_dir = Some(dir.into());
        self
    }

    /// Set the square working size
    #[must_use]
    pub fn image_size(mut self, size: u32) -> Self {
        self.config.image_size = size;
        self
    }

    /// Set a fixed RNG seed
    #[must_use]
    pub fn seed(mut self, seed: i64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Disable the result cache
    #[must_use]
    pub fn disable_cache(mut self, disable: bool) -> Self {
        self.config.disable_cache = disable;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Configuration validation failures
    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let params = GenerationParameters::default();
        assert!(params.validate().is_ok());

        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model_id, DEFAULT_MODEL_ID);
        assert_eq!(config.image_size, 512);
    }

    #[test]
    fn test_valid_parameters_accepted_unchanged() {
        let params = GenerationParameters::builder()
            .prompt("a beautiful castle, high resolution")
            .inference_steps(50)
            .guidance_scale(9.9)
            .strength(0.3)
            .build()
            .unwrap();
        assert_eq!(params.inference_steps, 50);
        assert_eq!(params.guidance_scale, 9.9);
        assert_eq!(params.strength, 0.3);
    }

    #[test]
    fn test_boundary_parameters_accepted() {
        for steps in [10, 100] {
            let params = GenerationParameters::builder()
                .inference_steps(steps)
                .build()
                .unwrap();
            assert_eq!(params.inference_steps, steps);
        }
        for scale in [0.0, 10.0] {
            assert!(GenerationParameters::builder()
                .guidance_scale(scale)
                .build()
                .is_ok());
        }
        for strength in [0.0, 1.0] {
            assert!(GenerationParameters::builder()
                .strength(strength)
                .build()
                .is_ok());
        }
    }

    #[test]
    fn test_steps_below_lower_bound_rejected() {
        let err = GenerationParameters::builder()
            .inference_steps(5)
            .build()
            .unwrap_err();
        assert_eq!(err.field(), Some("inference_steps"));
    }

    #[test]
    fn test_guidance_above_upper_bound_rejected() {
        let err = GenerationParameters::builder()
            .guidance_scale(15.0)
            .build()
            .unwrap_err();
        assert_eq!(err.field(), Some("guidance_scale"));
    }

    #[test]
    fn test_strength_out_of_range_rejected() {
        let err = GenerationParameters::builder()
            .strength(1.5)
            .build()
            .unwrap_err();
        assert_eq!(err.field(), Some("strength"));

        let err = GenerationParameters::builder()
            .strength(-0.1)
            .build()
            .unwrap_err();
        assert_eq!(err.field(), Some("strength"));
    }

    #[test]
    fn test_non_finite_floats_rejected() {
        assert!(GenerationParameters::builder()
            .guidance_scale(f64::NAN)
            .build()
            .is_err());
        assert!(GenerationParameters::builder()
            .strength(f64::INFINITY)
            .build()
            .is_err());
    }

    #[test]
    fn test_empty_prompt_is_valid() {
        let params = GenerationParameters::builder().prompt("").build().unwrap();
        assert!(params.prompt.is_empty());
    }

    #[test]
    fn test_engine_config_builder() {
        let config = EngineConfig::builder()
            .model_id("stabilityai/stable-diffusion-2-inpainting")
            .device(DeviceSelection::Cpu)
            .image_size(512)
            .seed(32)
            .disable_cache(true)
            .build()
            .unwrap();
        assert_eq!(config.device, DeviceSelection::Cpu);
        assert_eq!(config.seed, Some(32));
        assert!(config.disable_cache);
    }

    #[test]
    fn test_engine_config_rejects_zero_size() {
        let err = EngineConfig::builder().image_size(0).build().unwrap_err();
        assert_eq!(err.field(), Some("image_size"));
    }
}
