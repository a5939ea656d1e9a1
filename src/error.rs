//! Error types for inpainting operations

use thiserror::Error;

/// Result type alias for inpainting operations
pub type Result<T> = std::result::Result<T, InpaintError>;

/// Error types surfaced by the inpainting pipeline
///
/// Every variant is reported to the caller as-is: none of these conditions
/// resolve themselves without a change in input or environment, so there is
/// no silent recovery and no automatic retry anywhere in the crate.
#[derive(Error, Debug)]
pub enum InpaintError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image format or decoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Malformed or empty drawing canvas output
    #[error("Invalid drawing data: {0}")]
    InvalidDrawingData(String),

    /// Out-of-range generation parameter or mismatched image/mask dimensions
    #[error("Validation error: {field}: {message}")]
    Validation {
        /// Name of the offending request field
        field: &'static str,
        /// Human-readable description of the violated constraint
        message: String,
    },

    /// The model or compute device cannot be initialized
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Device memory was exhausted during generation
    ///
    /// Retrying with identical parameters will typically fail identically;
    /// the caller should surface this to the user instead.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl InpaintError {
    /// Create a new invalid drawing data error
    pub fn invalid_drawing<S: Into<String>>(msg: S) -> Self {
        Self::InvalidDrawingData(msg.into())
    }

    /// Create a new validation error naming the offending field
    pub fn validation<S: Into<String>>(field: &'static str, message: S) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Create a new backend unavailable error
    pub fn backend_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::BackendUnavailable(msg.into())
    }

    /// Create a new resource exhausted error
    pub fn resource_exhausted<S: Into<String>>(msg: S) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a validation error with the valid range spelled out
    pub fn out_of_range<T: std::fmt::Display>(
        field: &'static str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::Validation {
            field,
            message: format!("{value} is out of range (valid range: {valid_range})"),
        }
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {operation} '{path_display}': {error}"),
        ))
    }

    /// Name of the validated field, if this is a validation error
    #[must_use]
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}
