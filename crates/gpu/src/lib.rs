//! Vidscale GPU Upscale Engine
//!
//! Spatial upscaling of BGRA pixel buffers through an image-scaling
//! accelerator.
//!
//! # Architecture
//!
//! ```text
//! PixelBuffer ──► TextureCache ──► SpatialScaler ──► intermediate texture
//!                                                          │ blit
//!                  PixelBufferPool ──► output buffer ◄──────┘
//!                                          │
//!                         CommandQueue (FIFO, dedicated thread)
//! ```
//!
//! [`Upscaler`] owns one set of these resources for a fixed input/output size
//! pair. Completion can be observed by blocking, by awaiting a one-shot
//! channel, or through a callback. [`UpscalingFilter`] wraps an upscaler for
//! single-image callers and passes images through on failure.

pub mod accelerator;
pub mod command;
pub mod error;
pub mod filter;
pub mod software;
pub mod texture;
pub mod upscaler;

use std::sync::Arc;

pub use accelerator::{Accelerator, ColorProcessingMode, SpatialScaler, SpatialScalerDescriptor};
pub use command::{CommandBuffer, CommandQueue};
pub use error::{GpuError, GpuResult};
pub use filter::UpscalingFilter;
pub use software::{SoftwareAccelerator, SoftwareFault};
pub use texture::{StorageMode, Texture, TextureCache, TextureDescriptor, TextureFormat};
pub use upscaler::Upscaler;

/// The accelerator used when none is configured explicitly.
pub fn default_accelerator() -> Arc<dyn Accelerator> {
    Arc::new(SoftwareAccelerator::new())
}
