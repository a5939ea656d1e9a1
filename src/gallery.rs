//! Preset base images and upload decoding
//!
//! The demo offers a fixed directory of preset pictures (each with a default
//! prompt) and accepts a user-uploaded JPEG or PNG as an alternative base
//! image. Everything is resized to the square working size before use.

use crate::error::{InpaintError, Result};
use image::{imageops::FilterType, DynamicImage};
use std::path::Path;
use tracing::{debug, warn};

/// Default prompts paired with the preset images, in gallery order
pub const DEFAULT_PROMPTS: &[&str] = &[
    "Man with suit and tie, high resolution, standing in front of a building",
    "Face of a Brown and white cat, high resolution, sitting on a park bench",
    "A beautiful castle, high resolution",
    "An old pirate boat navigating in the sea",
];

const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// One selectable base image
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    /// File stem the entry was loaded from, or a label for uploads
    pub name: String,
    /// The base image at the working size
    pub image: DynamicImage,
    /// Prompt pre-filled when this entry is selected (empty for uploads)
    pub default_prompt: String,
}

/// Fixed set of preset base images loaded at startup
#[derive(Debug, Clone, Default)]
pub struct PresetGallery {
    entries: Vec<GalleryEntry>,
}

impl PresetGallery {
    /// Load all preset images from a directory, sorted by file name
    ///
    /// Entries are paired positionally with [`DEFAULT_PROMPTS`]; presets
    /// beyond the prompt list get an empty default prompt. Unsupported or
    /// undecodable files are skipped with a warning rather than failing the
    /// whole gallery.
    ///
    /// # Errors
    /// - The directory cannot be read
    pub fn load_from_dir<P: AsRef<Path>>(dir: P, image_size: u32) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir)
            .map_err(|e| InpaintError::file_io_error("read preset directory", dir, e))?;

        let mut paths: Vec<_> = entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| {
                        SUPPORTED_EXTENSIONS
                            .iter()
                            .any(|supported| ext.eq_ignore_ascii_case(supported))
                    })
            })
            .collect();
        paths.sort();

        let mut gallery_entries = Vec::with_capacity(paths.len());
        for path in paths {
            let image = match image::open(&path) {
                Ok(image) => image,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping undecodable preset image");
                    continue;
                },
            };
            let name = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or("preset")
                .to_string();
            let default_prompt = DEFAULT_PROMPTS
                .get(gallery_entries.len())
                .copied()
                .unwrap_or("")
                .to_string();
            gallery_entries.push(GalleryEntry {
                name,
                image: resize_to_working_size(&image, image_size),
                default_prompt,
            });
        }

        debug!(count = gallery_entries.len(), dir = %dir.display(), "Loaded preset gallery");
        Ok(Self {
            entries: gallery_entries,
        })
    }

    /// All entries in gallery order
    #[must_use]
    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    /// Number of presets
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the gallery is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry by index
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&GalleryEntry> {
        self.entries.get(index)
    }

    /// Append an uploaded image as a selectable entry with no default prompt
    pub fn push_upload(&mut self, entry: GalleryEntry) {
        self.entries.push(entry);
    }
}

/// Decode a user-uploaded JPEG or PNG into a gallery entry
///
/// # Errors
/// - The bytes are not a decodable image
pub fn decode_upload(bytes: &[u8], image_size: u32) -> Result<GalleryEntry> {
    let image = image::load_from_memory(bytes)?;
    Ok(GalleryEntry {
        name: "upload".to_string(),
        image: resize_to_working_size(&image, image_size),
        default_prompt: String::new(),
    })
}

/// Resize a base image to the square working size
///
/// Aspect ratio is not preserved: the demo edits a fixed 512x512 frame, so
/// the selected picture is stretched to fit it, matching what the generation
/// backend expects.
#[must_use]
pub fn resize_to_working_size(image: &DynamicImage, image_size: u32) -> DynamicImage {
    if image.width() == image_size && image.height() == image_size {
        return image.clone();
    }
    image.resize_exact(image_size, image_size, FilterType::Triangle)
}
