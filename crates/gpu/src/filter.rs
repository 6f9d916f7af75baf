//! Single-image upscaling for interactive and preview callers.

use std::sync::Arc;

use vidscale_media::{PixelBuffer, Size};

use crate::accelerator::Accelerator;
use crate::upscaler::Upscaler;

/// Upscales one image at a time, rebuilding its engine whenever the input
/// or output size changes.
///
/// Unlike the export pipeline, the filter never fails: if no engine can be
/// built or a scale pass errors, the input image is returned unscaled.
pub struct UpscalingFilter {
    accelerator: Arc<dyn Accelerator>,
    output_size: Option<Size>,
    upscaler: Option<Upscaler>,
}

impl UpscalingFilter {
    pub fn new(accelerator: Arc<dyn Accelerator>) -> Self {
        Self {
            accelerator,
            output_size: None,
            upscaler: None,
        }
    }

    pub fn with_output_size(mut self, size: Size) -> Self {
        self.output_size = Some(size);
        self
    }

    pub fn set_output_size(&mut self, size: Option<Size>) {
        self.output_size = size;
    }

    pub fn output_size(&self) -> Option<Size> {
        self.output_size
    }

    /// Upscale `input` to the configured output size.
    ///
    /// Returns `None` only when no output size has been set.
    pub fn apply(&mut self, input: &PixelBuffer) -> Option<PixelBuffer> {
        let output_size = self.output_size?;

        let stale = self.upscaler.as_ref().map_or(true, |upscaler| {
            upscaler.input_size() != input.size() || upscaler.output_size() != output_size
        });
        if stale {
            self.upscaler = Upscaler::try_new(self.accelerator.as_ref(), input.size(), output_size);
        }

        let Some(upscaler) = &self.upscaler else {
            return Some(input.clone());
        };
        match upscaler.upscale_blocking(input, None, None) {
            Ok(output) => Some(output),
            Err(e) => {
                tracing::warn!(error = %e, "Upscale failed, passing image through");
                Some(input.clone())
            }
        }
    }
}
