//! Stable Diffusion inpainting backend (tch/libtorch)
//!
//! Wraps the pretrained Stable Diffusion inpainting pipeline: CLIP text
//! encoder, VAE and a 9-channel UNet conditioned on the latents, the
//! downsampled mask and the masked-image latents. The default DDIM scheduler
//! of the checkpoint is swapped for a DPM-Solver++ multistep scheduler after
//! load. The model internals are opaque to the rest of the crate; this module
//! only adapts them to the [`DiffusionBackend`] contract.

use crate::backends::{DiffusionBackend, ModelInfo};
use crate::config::{DeviceSelection, EngineConfig};
use crate::error::{InpaintError, Result};
use crate::request::GenerationRequest;
use crate::weights::ModelWeights;
use diffusers::pipelines::stable_diffusion::StableDiffusionConfig;
use diffusers::schedulers::dpmsolver_multistep::{
    DPMSolverMultistepScheduler, DPMSolverMultistepSchedulerConfig,
};
use diffusers::transformers::clip;
use image::{DynamicImage, RgbImage};
use instant::{Duration, Instant};
use tch::nn::Module;
use tch::{Device, Kind, Tensor};
use tracing::{debug, info, instrument};

/// Scaling factor between VAE latents and the diffusion space
const LATENT_SCALE: f64 = 0.18215;
/// Spatial downsampling factor of the VAE
const LATENT_DOWNSAMPLE: i64 = 8;
/// Channel count of the inpainting UNet input (latents + mask + masked latents)
const UNET_IN_CHANNELS: i64 = 9;

struct LoadedPipeline {
    sd_config: StableDiffusionConfig,
    tokenizer: clip::Tokenizer,
    text_model: clip::ClipTextTransformer,
    vae: diffusers::models::vae::AutoEncoderKL,
    unet: diffusers::models::unet_2d::UNet2DConditionModel,
}

/// Stable Diffusion backend for text-guided inpainting
pub struct StableDiffusionBackend {
    device: Device,
    model_id: String,
    seed: Option<i64>,
    pipeline: Option<LoadedPipeline>,
}

impl std::fmt::Debug for StableDiffusionBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StableDiffusionBackend")
            .field("device", &self.device)
            .field("model_id", &self.model_id)
            .field("initialized", &self.pipeline.is_some())
            .finish()
    }
}

impl Default for StableDiffusionBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StableDiffusionBackend {
    /// Create an unloaded backend; weights are loaded on `initialize`
    #[must_use]
    pub fn new() -> Self {
        Self {
            device: Device::Cpu,
            model_id: String::new(),
            seed: None,
            pipeline: None,
        }
    }

    fn select_device(selection: DeviceSelection) -> Result<Device> {
        match selection {
            DeviceSelection::Cpu => Ok(Device::Cpu),
            DeviceSelection::Cuda => {
                if tch::Cuda::is_available() {
                    Ok(Device::Cuda(0))
                } else {
                    Err(InpaintError::backend_unavailable(
                        "CUDA device requested but no CUDA device is available",
                    ))
                }
            },
            DeviceSelection::Auto => Ok(Device::cuda_if_available()),
        }
    }

    fn pipeline(&self) -> Result<&LoadedPipeline> {
        self.pipeline.as_ref().ok_or_else(|| {
            InpaintError::backend_unavailable("Stable Diffusion backend is not initialized")
        })
    }

    /// Map a libtorch failure to the contract error kinds
    fn classify(error: &anyhow::Error) -> InpaintError {
        let message = format!("{error:#}");
        let lowered = message.to_lowercase();
        if lowered.contains("out of memory") || lowered.contains("outofmemory") {
            InpaintError::resource_exhausted(message)
        } else {
            InpaintError::inference(message)
        }
    }

    /// Build the (1, 3, H, W) image tensor scaled to [-1, 1] and the
    /// (1, 1, H, W) binary mask tensor
    fn prepare_mask_and_masked_image(request: &GenerationRequest) -> (Tensor, Tensor, Tensor) {
        let rgb = request.base_image().to_rgb8();
        let (width, height) = rgb.dimensions();
        let image = Tensor::from_slice(rgb.as_raw())
            .view([i64::from(height), i64::from(width), 3])
            .permute([2, 0, 1])
            .to_kind(Kind::Float)
            / 255.
            * 2.
            - 1.;

        let mask = Tensor::from_slice(request.mask().data())
            .view([1, i64::from(height), i64::from(width)])
            .to_kind(Kind::Float)
            / 255.;

        let masked_image: Tensor = &image * (1 - &mask);
        (
            image.unsqueeze(0),
            mask.unsqueeze(0),
            masked_image.unsqueeze(0),
        )
    }

    fn run_diffusion(
        &self,
        pipeline: &LoadedPipeline,
        request: &GenerationRequest,
    ) -> anyhow::Result<Tensor> {
        let params = request.params();
        let n_steps = params.inference_steps as usize;
        let height = pipeline.sd_config.height;
        let width = pipeline.sd_config.width;
        let device = self.device;

        let (image, mask, masked_image) = Self::prepare_mask_and_masked_image(request);

        let _no_grad_guard = tch::no_grad_guard();
        if let Some(seed) = self.seed {
            tch::manual_seed(seed);
        }

        // Tokenize both the prompt and the unconditional input for
        // classifier-free guidance.
        let tokens = pipeline.tokenizer.encode(request.prompt())?;
        let tokens: Vec<i64> = tokens.into_iter().map(|x| x as i64).collect();
        let tokens = Tensor::from_slice(&tokens).view((1, -1)).to(device);
        let uncond_tokens = pipeline.tokenizer.encode("")?;
        let uncond_tokens: Vec<i64> = uncond_tokens.into_iter().map(|x| x as i64).collect();
        let uncond_tokens = Tensor::from_slice(&uncond_tokens).view((1, -1)).to(device);

        let text_embeddings = pipeline.text_model.forward(&tokens);
        let uncond_embeddings = pipeline.text_model.forward(&uncond_tokens);
        let text_embeddings = Tensor::cat(&[uncond_embeddings, text_embeddings], 0).to(device);

        let mut scheduler = DPMSolverMultistepScheduler::new(
            n_steps,
            DPMSolverMultistepSchedulerConfig::default(),
        );

        let latent_height = height / LATENT_DOWNSAMPLE;
        let latent_width = width / LATENT_DOWNSAMPLE;

        // The mask and the masked-image latents are constant across timesteps
        // and duplicated for the guidance pair.
        let mask = mask.upsample_nearest2d([latent_height, latent_width], None, None);
        let mask = Tensor::cat(&[&mask, &mask], 0).to_device(device);
        let masked_image_latents =
            (pipeline.vae.encode(&masked_image.to_device(device)).sample() * LATENT_SCALE)
                .to(device);
        let masked_image_latents =
            Tensor::cat(&[&masked_image_latents, &masked_image_latents], 0);

        // Strength truncates the schedule: lower values keep more of the
        // original image by starting from its noised latents partway in.
        let timesteps = scheduler.timesteps().to_vec();
        let t_start = n_steps - (n_steps as f64 * params.strength) as usize;

        let mut latents = if t_start == 0 {
            let latents = Tensor::randn(
                [1, 4, latent_height, latent_width],
                (Kind::Float, device),
            );
            latents * scheduler.init_noise_sigma()
        } else {
            let init_latents =
                (pipeline.vae.encode(&image.to_device(device)).sample() * LATENT_SCALE).to(device);
            match timesteps.get(t_start) {
                Some(&timestep) => {
                    let noise = init_latents.randn_like();
                    scheduler.add_noise(&init_latents, noise, timestep)
                },
                // Strength 0.0: no noise, no denoising, reconstruct the input
                None => init_latents,
            }
        };

        for (timestep_index, &timestep) in timesteps.iter().enumerate() {
            if timestep_index < t_start {
                continue;
            }
            debug!(step = timestep_index, total = n_steps, "Denoising step");
            let latent_model_input = Tensor::cat(&[&latents, &latents], 0);
            let latent_model_input = scheduler.scale_model_input(latent_model_input, timestep);
            let latent_model_input =
                Tensor::cat(&[&latent_model_input, &mask, &masked_image_latents], 1);
            let noise_pred =
                pipeline
                    .unet
                    .forward(&latent_model_input, timestep as f64, &text_embeddings);
            let noise_pred = noise_pred.chunk(2, 0);
            let (noise_pred_uncond, noise_pred_text) = (&noise_pred[0], &noise_pred[1]);
            let noise_pred =
                noise_pred_uncond + (noise_pred_text - noise_pred_uncond) * params.guidance_scale;
            latents = scheduler.step(&noise_pred, timestep, &latents);
        }

        let decoded = pipeline.vae.decode(&(&latents / LATENT_SCALE));
        let decoded = (decoded / 2 + 0.5).clamp(0., 1.).to_device(Device::Cpu);
        Ok((decoded * 255.).to_kind(Kind::Uint8))
    }

    fn tensor_to_image(tensor: &Tensor) -> Result<DynamicImage> {
        // (1, 3, H, W) uint8 -> interleaved RGB rows
        let tensor = tensor.squeeze_dim(0).permute([1, 2, 0]).contiguous();
        let (height, width) = match tensor.size().as_slice() {
            [h, w, 3] => (*h, *w),
            shape => {
                return Err(InpaintError::inference(format!(
                    "unexpected output tensor shape {shape:?}"
                )))
            },
        };
        let data = Vec::<u8>::try_from(&tensor.reshape([-1]))
            .map_err(|e| InpaintError::inference(format!("failed to read output tensor: {e}")))?;
        let image = RgbImage::from_raw(width as u32, height as u32, data).ok_or_else(|| {
            InpaintError::inference("output tensor does not form a valid RGB image")
        })?;
        Ok(DynamicImage::ImageRgb8(image))
    }
}

impl DiffusionBackend for StableDiffusionBackend {
    #[instrument(skip(self, config), fields(model = %config.model_id, device = %config.device))]
    fn initialize(&mut self, config: &EngineConfig) -> Result<Option<Duration>> {
        if self.pipeline.is_some() {
            return Ok(None);
        }

        let start = Instant::now();
        let device = Self::select_device(config.device)?;
        let weights = ModelWeights::resolve(&config.model_id, config.weights_dir.as_deref())?;

        let size = i64::from(config.image_size);
        let sd_config = StableDiffusionConfig::v1_5(None, Some(size), Some(size));

        let vocab = weights.vocab.to_string_lossy().into_owned();
        let tokenizer = clip::Tokenizer::create(&vocab, &sd_config.clip).map_err(|e| {
            InpaintError::backend_unavailable(format!("failed to load CLIP vocabulary: {e:#}"))
        })?;

        info!("Loading CLIP text transformer");
        let text_model = sd_config
            .build_clip_transformer(&weights.clip.to_string_lossy(), device)
            .map_err(|e| {
                InpaintError::backend_unavailable(format!("failed to load CLIP weights: {e:#}"))
            })?;

        info!("Loading VAE");
        let vae = sd_config
            .build_vae(&weights.vae.to_string_lossy(), device)
            .map_err(|e| {
                InpaintError::backend_unavailable(format!("failed to load VAE weights: {e:#}"))
            })?;

        info!("Loading inpainting UNet");
        let unet = sd_config
            .build_unet(&weights.unet.to_string_lossy(), device, UNET_IN_CHANNELS)
            .map_err(|e| {
                InpaintError::backend_unavailable(format!("failed to load UNet weights: {e:#}"))
            })?;

        self.device = device;
        self.model_id = config.model_id.clone();
        self.seed = config.seed;
        self.pipeline = Some(LoadedPipeline {
            sd_config,
            tokenizer,
            text_model,
            vae,
            unet,
        });

        let elapsed = start.elapsed();
        info!(elapsed_ms = elapsed.as_millis() as u64, "Model loaded");
        Ok(Some(elapsed))
    }

    fn is_initialized(&self) -> bool {
        self.pipeline.is_some()
    }

    #[instrument(skip(self, request), fields(steps = request.params().inference_steps))]
    fn generate(&mut self, request: &GenerationRequest) -> Result<DynamicImage> {
        let pipeline = self.pipeline()?;
        let tensor = self
            .run_diffusion(pipeline, request)
            .map_err(|e| Self::classify(&e))?;
        Self::tensor_to_image(&tensor)
    }

    fn model_info(&self) -> Result<ModelInfo> {
        self.pipeline()?;
        Ok(ModelInfo {
            name: self.model_id.clone(),
            device: if self.device.is_cuda() { "cuda" } else { "cpu" }.to_string(),
        })
    }
}
