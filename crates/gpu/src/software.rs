//! Reference accelerator that runs the scale pass on the CPU.
//!
//! It follows the same resource and submission model as a hardware device,
//! so the upscaler and everything above it behave identically. Faults can be
//! injected at each construction step and at execution time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use vidscale_media::Size;

use crate::accelerator::{Accelerator, SpatialScaler, SpatialScalerDescriptor};
use crate::command::{CommandBuffer, CommandQueue};
use crate::error::{GpuError, GpuResult};
use crate::texture::{Texture, TextureCache, TextureDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftwareFault {
    /// No device: command queue creation fails.
    Unavailable,
    ScalerCreation,
    TextureCreation,
    TextureCacheCreation,
    /// Scale passes fail once this many have succeeded.
    ExecutionAfter(usize),
}

#[derive(Debug, Clone, Default)]
pub struct SoftwareAccelerator {
    fault: Option<SoftwareFault>,
    passes: Arc<AtomicUsize>,
}

impl SoftwareAccelerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fault(fault: SoftwareFault) -> Self {
        Self {
            fault: Some(fault),
            passes: Arc::default(),
        }
    }

    /// Scale passes executed by every scaler this accelerator built.
    pub fn passes_executed(&self) -> usize {
        self.passes.load(Ordering::SeqCst)
    }
}

impl Accelerator for SoftwareAccelerator {
    fn name(&self) -> &str {
        "software-bilinear"
    }

    fn make_command_queue(&self) -> GpuResult<CommandQueue> {
        if self.fault == Some(SoftwareFault::Unavailable) {
            return Err(GpuError::AcceleratorUnavailable {
                message: "software device disabled".to_string(),
            });
        }
        CommandQueue::new("software")
    }

    fn make_spatial_scaler(
        &self,
        descriptor: &SpatialScalerDescriptor,
    ) -> GpuResult<Box<dyn SpatialScaler>> {
        let fail = |message: &str| GpuError::CouldNotCreateScaler {
            input: descriptor.input_size,
            output: descriptor.output_size,
            message: message.to_string(),
        };
        if self.fault == Some(SoftwareFault::ScalerCreation) {
            return Err(fail("scaler creation disabled"));
        }
        if descriptor.input_size.is_empty() || descriptor.output_size.is_empty() {
            return Err(fail("dimensions must be non-zero"));
        }
        let fail_after = match self.fault {
            Some(SoftwareFault::ExecutionAfter(passes)) => Some(passes),
            _ => None,
        };
        Ok(Box::new(BilinearScaler {
            input_size: descriptor.input_size,
            output_size: descriptor.output_size,
            fail_after,
            passes: Arc::clone(&self.passes),
        }))
    }

    fn make_texture(&self, descriptor: &TextureDescriptor) -> GpuResult<Texture> {
        if self.fault == Some(SoftwareFault::TextureCreation) {
            return Err(GpuError::CouldNotCreateTexture {
                message: "texture allocation disabled".to_string(),
            });
        }
        Texture::allocate(descriptor)
    }

    fn make_texture_cache(&self) -> GpuResult<TextureCache> {
        if self.fault == Some(SoftwareFault::TextureCacheCreation) {
            return Err(GpuError::CouldNotCreateTextureCache {
                message: "texture cache disabled".to_string(),
            });
        }
        Ok(TextureCache::new())
    }
}

struct BilinearScaler {
    input_size: Size,
    output_size: Size,
    fail_after: Option<usize>,
    passes: Arc<AtomicUsize>,
}

impl SpatialScaler for BilinearScaler {
    fn input_size(&self) -> Size {
        self.input_size
    }

    fn output_size(&self) -> Size {
        self.output_size
    }

    fn encode(
        &self,
        command_buffer: &mut CommandBuffer,
        color: &Texture,
        output: &Texture,
    ) -> GpuResult<()> {
        if color.size() != self.input_size {
            return Err(GpuError::SizeMismatch {
                expected: self.input_size,
                actual: color.size(),
            });
        }
        if output.size() != self.output_size {
            return Err(GpuError::SizeMismatch {
                expected: self.output_size,
                actual: output.size(),
            });
        }

        let (color, output) = (color.clone(), output.clone());
        let (src_size, dst_size) = (self.input_size, self.output_size);
        let fail_after = self.fail_after;
        let passes = Arc::clone(&self.passes);
        command_buffer.encode(move || {
            if fail_after.is_some_and(|limit| passes.load(Ordering::SeqCst) >= limit) {
                return Err(GpuError::command_failed("device lost during scale pass"));
            }
            color.with_bytes(|src| {
                output.with_bytes_mut(|dst| scale_bilinear(src, src_size, dst, dst_size))
            })?;
            passes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        Ok(())
    }
}

/// Bilinear resample of a 4-channel, 8-bit image with pixel-center alignment.
pub fn scale_bilinear(src: &[u8], src_size: Size, dst: &mut [u8], dst_size: Size) -> GpuResult<()> {
    let (sw, sh) = (src_size.width as usize, src_size.height as usize);
    let (dw, dh) = (dst_size.width as usize, dst_size.height as usize);
    if src.len() < sw * sh * 4 || dst.len() < dw * dh * 4 {
        return Err(GpuError::encode(format!(
            "texture storage too small for {src_size} -> {dst_size}"
        )));
    }
    if sw == 0 || sh == 0 {
        return Ok(());
    }

    let x_ratio = sw as f32 / dw as f32;
    let y_ratio = sh as f32 / dh as f32;
    for y in 0..dh {
        let fy = ((y as f32 + 0.5) * y_ratio - 0.5).clamp(0.0, (sh - 1) as f32);
        let y0 = fy.floor() as usize;
        let y1 = (y0 + 1).min(sh - 1);
        let wy = fy - y0 as f32;
        for x in 0..dw {
            let fx = ((x as f32 + 0.5) * x_ratio - 0.5).clamp(0.0, (sw - 1) as f32);
            let x0 = fx.floor() as usize;
            let x1 = (x0 + 1).min(sw - 1);
            let wx = fx - x0 as f32;
            for c in 0..4 {
                let texel = |xx: usize, yy: usize| src[(yy * sw + xx) * 4 + c] as f32;
                let top = texel(x0, y0) * (1.0 - wx) + texel(x1, y0) * wx;
                let bottom = texel(x0, y1) * (1.0 - wx) + texel(x1, y1) * wx;
                let value = top * (1.0 - wy) + bottom * wy;
                dst[(y * dw + x) * 4 + c] = value.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solid_color_survives_scaling() {
        let src: Vec<u8> = [10u8, 20, 30, 255].repeat(3 * 2);
        let mut dst = vec![0u8; 7 * 5 * 4];
        scale_bilinear(&src, Size::new(3, 2), &mut dst, Size::new(7, 5)).unwrap();
        for px in dst.chunks_exact(4) {
            assert_eq!(px, [10, 20, 30, 255]);
        }
    }

    #[test]
    fn test_identity_scale_copies() {
        let src: Vec<u8> = (0..16).collect();
        let mut dst = vec![0u8; 16];
        scale_bilinear(&src, Size::new(2, 2), &mut dst, Size::new(2, 2)).unwrap();
        assert_eq!(src, dst);
    }

    #[test]
    fn test_short_storage_is_an_error() {
        let mut dst = vec![0u8; 4];
        assert!(scale_bilinear(&[0; 4], Size::new(1, 1), &mut dst, Size::new(2, 2)).is_err());
    }

    #[test]
    fn test_scaler_creation_fault() {
        let accel = SoftwareAccelerator::with_fault(SoftwareFault::ScalerCreation);
        let result = accel.make_spatial_scaler(&SpatialScalerDescriptor::bgra(
            Size::new(2, 2),
            Size::new(4, 4),
        ));
        assert!(matches!(result, Err(GpuError::CouldNotCreateScaler { .. })));
    }
}
