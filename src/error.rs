use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqueezeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Drive API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(#[from] image::ImageError),

    #[error("PNG optimization error: {0}")]
    PngOptimization(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid quality value: {0}. Must be between 1 and 100")]
    InvalidQuality(u8),

    #[error("Invalid target size: {0} bytes. Must be greater than zero")]
    InvalidTarget(u64),

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Invalid image dimensions: {0}x{1}. Maximum allowed: {2}x{2}")]
    InvalidDimensions(u32, u32, u32),

    #[error("File too large: {0} bytes. Maximum allowed: {1} bytes")]
    FileTooLarge(u64, u64),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Folder not found or not accessible: {0}")]
    FolderNotFound(String),
}

impl SqueezeError {
    /// Errors that make continuing the run pointless. Everything else is
    /// scoped to a single file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SqueezeError::Auth(_))
    }

    /// Errors that mean the file was never a candidate for compression,
    /// as opposed to a failed attempt.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            SqueezeError::UnsupportedFormat(_)
                | SqueezeError::Decode(_)
                | SqueezeError::InvalidDimensions(..)
                | SqueezeError::FileTooLarge(..)
        )
    }
}

pub type Result<T> = std::result::Result<T, SqueezeError>;
