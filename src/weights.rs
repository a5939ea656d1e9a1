//! Model weight resolution
//!
//! The diffusion backend loads four fixed artifacts per checkpoint: the CLIP
//! byte-pair vocabulary, the CLIP text transformer weights, the VAE weights
//! and the inpainting UNet weights. This module locates them on disk in an
//! XDG-compliant layout and reports missing files as `BackendUnavailable`
//! before any model construction is attempted. Provisioning the files is the
//! host's responsibility; this crate performs no network downloads.

use crate::error::{InpaintError, Result};
use log::debug;
use std::path::{Path, PathBuf};

/// Environment variable overriding the weights root directory
pub const WEIGHTS_DIR_ENV: &str = "LATENT_INPAINT_WEIGHTS_DIR";

/// File name of the CLIP byte-pair encoding vocabulary
pub const VOCAB_FILE: &str = "bpe_simple_vocab_16e6.txt";
/// File name of the CLIP text transformer weights
pub const CLIP_FILE: &str = "clip.safetensors";
/// File name of the VAE weights
pub const VAE_FILE: &str = "vae.safetensors";
/// File name of the 9-channel inpainting UNet weights
pub const UNET_FILE: &str = "unet-inpaint.safetensors";

/// Resolved locations of all weight files for one checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelWeights {
    /// CLIP vocabulary file
    pub vocab: PathBuf,
    /// CLIP text transformer weights
    pub clip: PathBuf,
    /// VAE weights
    pub vae: PathBuf,
    /// Inpainting UNet weights
    pub unet: PathBuf,
}

impl ModelWeights {
    /// Resolve the weight files for a model identifier
    ///
    /// Resolution order for the root directory: the explicit `weights_dir`
    /// argument, the `LATENT_INPAINT_WEIGHTS_DIR` environment variable, then
    /// `~/.cache/latent-inpaint/models/`. The checkpoint lives in a
    /// subdirectory named after the model id with `/` replaced by `--`
    /// (e.g. `runwayml--stable-diffusion-inpainting`).
    ///
    /// # Errors
    /// - No cache directory can be determined
    /// - Any of the four weight files is missing (`BackendUnavailable`,
    ///   naming the expected path)
    pub fn resolve(model_id: &str, weights_dir: Option<&Path>) -> Result<Self> {
        let root = match weights_dir {
            Some(dir) => dir.to_path_buf(),
            None => Self::default_weights_root()?,
        };
        let model_dir = root.join(Self::model_dir_name(model_id));
        debug!(
            "Resolving weights for model '{model_id}' in {}",
            model_dir.display()
        );

        let weights = Self {
            vocab: model_dir.join(VOCAB_FILE),
            clip: model_dir.join(CLIP_FILE),
            vae: model_dir.join(VAE_FILE),
            unet: model_dir.join(UNET_FILE),
        };
        weights.verify(model_id)?;
        Ok(weights)
    }

    /// Filesystem-safe directory name for a model identifier
    #[must_use]
    pub fn model_dir_name(model_id: &str) -> String {
        model_id.replace('/', "--")
    }

    /// Default XDG-compliant weights root
    ///
    /// # Errors
    /// - Neither the environment override nor a user cache directory is
    ///   available
    pub fn default_weights_root() -> Result<PathBuf> {
        if let Ok(dir_override) = std::env::var(WEIGHTS_DIR_ENV) {
            return Ok(PathBuf::from(dir_override));
        }

        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                InpaintError::backend_unavailable(format!(
                    "Failed to determine cache directory. Set {WEIGHTS_DIR_ENV} environment variable."
                ))
            })?
            .join("latent-inpaint")
            .join("models"))
    }

    fn verify(&self, model_id: &str) -> Result<()> {
        for (label, path) in [
            ("vocabulary", &self.vocab),
            ("CLIP weights", &self.clip),
            ("VAE weights", &self.vae),
            ("UNet weights", &self.unet),
        ] {
            if !path.exists() {
                return Err(InpaintError::backend_unavailable(format!(
                    "missing {label} for model '{model_id}': expected file at {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}
