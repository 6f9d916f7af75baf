//! The accelerator contract: a device that can build spatial scalers,
//! textures, texture caches, and command queues.

use vidscale_media::Size;

use crate::command::{CommandBuffer, CommandQueue};
use crate::error::GpuResult;
use crate::texture::{Texture, TextureCache, TextureDescriptor, TextureFormat};

/// How the scaler treats color values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorProcessingMode {
    /// Values are perceptually encoded (sRGB-like); the common case for video.
    Perceptual,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpatialScalerDescriptor {
    pub input_size: Size,
    pub output_size: Size,
    pub color_format: TextureFormat,
    pub output_format: TextureFormat,
    pub color_processing: ColorProcessingMode,
}

impl SpatialScalerDescriptor {
    /// BGRA in, BGRA out, perceptual color.
    pub fn bgra(input_size: Size, output_size: Size) -> Self {
        Self {
            input_size,
            output_size,
            color_format: TextureFormat::Bgra8Unorm,
            output_format: TextureFormat::Bgra8Unorm,
            color_processing: ColorProcessingMode::Perceptual,
        }
    }
}

/// A fixed-size image scaler.
pub trait SpatialScaler: Send + Sync {
    fn input_size(&self) -> Size;

    fn output_size(&self) -> Size;

    /// Encode a scale of `color` (input size) into `output` (output size).
    fn encode(
        &self,
        command_buffer: &mut CommandBuffer,
        color: &Texture,
        output: &Texture,
    ) -> GpuResult<()>;
}

/// A hardware (or emulated) image-scaling device.
pub trait Accelerator: Send + Sync {
    fn name(&self) -> &str;

    fn make_command_queue(&self) -> GpuResult<CommandQueue>;

    fn make_spatial_scaler(
        &self,
        descriptor: &SpatialScalerDescriptor,
    ) -> GpuResult<Box<dyn SpatialScaler>>;

    fn make_texture(&self, descriptor: &TextureDescriptor) -> GpuResult<Texture>;

    fn make_texture_cache(&self) -> GpuResult<TextureCache>;
}
