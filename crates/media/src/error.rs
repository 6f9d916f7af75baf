//! Errors raised by media toolkits, readers, and writers.

use std::path::PathBuf;

use vidscale_common::VidscaleError;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Cannot open asset {path}: {message}")]
    Open { path: PathBuf, message: String },

    #[error("Cannot probe asset: {message}")]
    Probe { message: String },

    #[error("Reader cannot add output for track {track_id}: {message}")]
    CannotAddOutput { track_id: u32, message: String },

    #[error("Writer cannot add input for track {track_id}: {message}")]
    CannotAddInput { track_id: u32, message: String },

    #[error("Reader failed: {message}")]
    Reader { message: String },

    #[error("Writer failed: {message}")]
    Writer { message: String },

    #[error("Invalid {operation} while {status}")]
    InvalidState {
        operation: &'static str,
        status: String,
    },

    #[error("Pixel buffer length {actual} does not match expected {expected}")]
    BufferLength { expected: usize, actual: usize },

    #[error("Invalid pixel buffer pool: {message}")]
    InvalidPool { message: String },

    #[error("Unsupported media operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    pub fn reader(msg: impl Into<String>) -> Self {
        Self::Reader {
            message: msg.into(),
        }
    }

    pub fn writer(msg: impl Into<String>) -> Self {
        Self::Writer {
            message: msg.into(),
        }
    }

    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }
}

impl From<MediaError> for VidscaleError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::CannotAddOutput { .. } | MediaError::CannotAddInput { .. } => {
                VidscaleError::setup(err.to_string())
            }
            MediaError::Io(io) => VidscaleError::Io(io),
            other => VidscaleError::media(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_attachment_errors_are_setup_errors() {
        let err: VidscaleError = MediaError::CannotAddInput {
            track_id: 2,
            message: "unsupported settings".into(),
        }
        .into();
        assert!(matches!(err, VidscaleError::Setup { .. }));

        let err: VidscaleError = MediaError::writer("disk full").into();
        assert!(matches!(err, VidscaleError::Media { .. }));
    }
}
