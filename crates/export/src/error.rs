//! Per-track runtime errors.

use vidscale_common::VidscaleError;
use vidscale_gpu::GpuError;
use vidscale_media::{MediaError, MediaTime};

/// Why a track worker stopped with a failure.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("sample at {pts} has no image buffer")]
    MissingImageBuffer { pts: MediaTime },

    #[error("sample at {pts} is missing its left or right eye buffer")]
    MissingTaggedBuffers { pts: MediaTime },

    #[error("sample at {pts} has an eye buffer that is not a pixel buffer")]
    InvalidTaggedBuffers { pts: MediaTime },

    #[error("upscale engine: {0}")]
    Engine(#[from] GpuError),

    #[error("media: {0}")]
    Media(#[from] MediaError),
}

impl TrackError {
    pub fn into_vidscale(self, track_id: u32) -> VidscaleError {
        VidscaleError::track(track_id, self.to_string())
    }
}
