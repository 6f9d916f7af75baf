//! Error types shared across Vidscale crates.
//!
//! Variants are grouped the way failures surface during an export:
//! validation errors are raised before any resource is allocated, setup
//! errors abort before the first sample moves, track errors end one track
//! (and with it the whole session), and session errors describe the terminal
//! reader/writer state after every track has joined.

use std::path::PathBuf;

/// Top-level error type for Vidscale operations.
#[derive(Debug, thiserror::Error)]
pub enum VidscaleError {
    #[error("Input file does not exist: {path}")]
    InputNotFound { path: PathBuf },

    #[error("Output file already exists: {path}")]
    OutputAlreadyExists { path: PathBuf },

    #[error("Output {axis} {value} exceeds the maximum supported size of {max}")]
    DimensionTooLarge {
        axis: &'static str,
        value: u32,
        max: u32,
    },

    #[error("Unsupported input file type \"{extension}\" (expected mov, m4v, or mp4)")]
    UnsupportedExtension { extension: String },

    #[error("Input does not contain a video track: {path}")]
    NoVideoTrack { path: PathBuf },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Setup error: {message}")]
    Setup { message: String },

    #[error("Track {track_id} failed: {message}")]
    Track { track_id: u32, message: String },

    #[error("GPU error: {message}")]
    Gpu { message: String },

    #[error("Media error: {message}")]
    Media { message: String },

    #[error("Export session failed: {message}")]
    Session { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using VidscaleError.
pub type VidscaleResult<T> = Result<T, VidscaleError>;

impl VidscaleError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    pub fn setup(msg: impl Into<String>) -> Self {
        Self::Setup {
            message: msg.into(),
        }
    }

    pub fn track(track_id: u32, msg: impl Into<String>) -> Self {
        Self::Track {
            track_id,
            message: msg.into(),
        }
    }

    pub fn gpu(msg: impl Into<String>) -> Self {
        Self::Gpu {
            message: msg.into(),
        }
    }

    pub fn media(msg: impl Into<String>) -> Self {
        Self::Media {
            message: msg.into(),
        }
    }

    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether this error was raised by pre-flight validation, before any
    /// reader, writer, or GPU resource existed.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InputNotFound { .. }
                | Self::OutputAlreadyExists { .. }
                | Self::DimensionTooLarge { .. }
                | Self::UnsupportedExtension { .. }
                | Self::NoVideoTrack { .. }
                | Self::Validation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        assert!(VidscaleError::OutputAlreadyExists {
            path: PathBuf::from("/tmp/out.mov")
        }
        .is_validation());
        assert!(VidscaleError::DimensionTooLarge {
            axis: "width",
            value: 20000,
            max: 16384
        }
        .is_validation());
        assert!(!VidscaleError::setup("writer refused track").is_validation());
        assert!(!VidscaleError::track(1, "missing image buffer").is_validation());
    }

    #[test]
    fn test_dimension_message_names_axis() {
        let err = VidscaleError::DimensionTooLarge {
            axis: "height",
            value: 17000,
            max: 16384,
        };
        assert_eq!(
            err.to_string(),
            "Output height 17000 exceeds the maximum supported size of 16384"
        );
    }
}
