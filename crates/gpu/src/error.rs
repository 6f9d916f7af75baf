//! GPU engine errors.

use vidscale_common::VidscaleError;
use vidscale_media::{MediaError, PixelFormat, Size};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GpuError {
    #[error("No image-scaling accelerator available: {message}")]
    AcceleratorUnavailable { message: String },

    #[error("Unsupported pixel format {}; the upscaler accepts BGRA only", .format.as_str())]
    UnsupportedPixelFormat { format: PixelFormat },

    #[error("Could not create pixel buffer: {message}")]
    CouldNotCreatePixelBuffer { message: String },

    #[error("Could not create texture: {message}")]
    CouldNotCreateTexture { message: String },

    #[error("Could not create texture cache: {message}")]
    CouldNotCreateTextureCache { message: String },

    #[error("Could not create spatial scaler for {input} -> {output}: {message}")]
    CouldNotCreateScaler {
        input: Size,
        output: Size,
        message: String,
    },

    #[error("Could not make command buffer")]
    CouldNotMakeCommandBuffer,

    #[error("Encode failed: {message}")]
    Encode { message: String },

    #[error("Command buffer failed: {message}")]
    CommandFailed { message: String },

    #[error("Command queue is closed")]
    QueueClosed,

    #[error("Size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: Size, actual: Size },
}

pub type GpuResult<T> = Result<T, GpuError>;

impl GpuError {
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode {
            message: msg.into(),
        }
    }

    pub fn command_failed(msg: impl Into<String>) -> Self {
        Self::CommandFailed {
            message: msg.into(),
        }
    }

    /// Whether the failure happened while building engine resources rather
    /// than while processing a frame.
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            Self::AcceleratorUnavailable { .. }
                | Self::CouldNotCreateTextureCache { .. }
                | Self::CouldNotCreateScaler { .. }
        )
    }
}

impl From<MediaError> for GpuError {
    fn from(err: MediaError) -> Self {
        GpuError::CouldNotCreatePixelBuffer {
            message: err.to_string(),
        }
    }
}

impl From<GpuError> for VidscaleError {
    fn from(err: GpuError) -> Self {
        VidscaleError::gpu(err.to_string())
    }
}
