//! The upscale engine: one instance per (input size, output size) pair.

use std::fmt;
use std::sync::{Arc, Mutex};

use vidscale_media::{PixelBuffer, PixelBufferPool, PixelFormat, Size};

use crate::accelerator::{Accelerator, SpatialScaler, SpatialScalerDescriptor};
use crate::command::{CommandBuffer, CommandQueue};
use crate::error::{GpuError, GpuResult};
use crate::texture::{Texture, TextureCache, TextureDescriptor, TextureFormat};

/// Upscales BGRA pixel buffers from a fixed input size to a fixed output size.
///
/// Owns its scaler, intermediate render target, texture cache, and default
/// output pool. Instances are not shared between tracks.
pub struct Upscaler {
    input_size: Size,
    output_size: Size,
    queue: CommandQueue,
    scaler: Box<dyn SpatialScaler>,
    intermediate: Texture,
    texture_cache: TextureCache,
    pool: PixelBufferPool,
}

impl Upscaler {
    /// Build every resource the engine needs up front.
    pub fn new(accelerator: &dyn Accelerator, input_size: Size, output_size: Size) -> GpuResult<Self> {
        let queue = accelerator.make_command_queue()?;
        let scaler =
            accelerator.make_spatial_scaler(&SpatialScalerDescriptor::bgra(input_size, output_size))?;
        let intermediate = accelerator.make_texture(&TextureDescriptor::render_target(output_size))?;
        let texture_cache = accelerator.make_texture_cache()?;
        let pool = PixelBufferPool::new(output_size, PixelFormat::Bgra8)?;

        tracing::debug!(
            accelerator = accelerator.name(),
            input = %input_size,
            output = %output_size,
            "Upscaler created"
        );

        Ok(Self {
            input_size,
            output_size,
            queue,
            scaler,
            intermediate,
            texture_cache,
            pool,
        })
    }

    /// Like [`Upscaler::new`], but reports "no engine available" as `None`.
    pub fn try_new(accelerator: &dyn Accelerator, input_size: Size, output_size: Size) -> Option<Self> {
        match Self::new(accelerator, input_size, output_size) {
            Ok(upscaler) => Some(upscaler),
            Err(e) => {
                tracing::warn!(
                    input = %input_size,
                    output = %output_size,
                    error = %e,
                    "No upscaler available"
                );
                None
            }
        }
    }

    pub fn input_size(&self) -> Size {
        self.input_size
    }

    pub fn output_size(&self) -> Size {
        self.output_size
    }

    /// The engine's own output pool, used when the caller supplies none.
    pub fn pool(&self) -> &PixelBufferPool {
        &self.pool
    }

    pub fn texture_cache(&self) -> &TextureCache {
        &self.texture_cache
    }

    /// Validate the job, wrap both buffers as textures, and encode the scale
    /// pass followed by a blit into the output buffer.
    fn encode(
        &self,
        buffer: &PixelBuffer,
        pool: Option<&PixelBufferPool>,
        output: Option<PixelBuffer>,
    ) -> GpuResult<(CommandBuffer, PixelBuffer)> {
        if buffer.format() != PixelFormat::Bgra8 {
            return Err(GpuError::UnsupportedPixelFormat {
                format: buffer.format(),
            });
        }
        if buffer.size() != self.input_size {
            return Err(GpuError::SizeMismatch {
                expected: self.input_size,
                actual: buffer.size(),
            });
        }

        let output = match output {
            Some(output) => output,
            None => {
                let pool = pool.unwrap_or(&self.pool);
                if pool.size() != self.output_size || pool.format() != PixelFormat::Bgra8 {
                    return Err(GpuError::CouldNotCreatePixelBuffer {
                        message: format!(
                            "pool vends {} {}, engine needs {} BGRA",
                            pool.size(),
                            pool.format().as_str(),
                            self.output_size
                        ),
                    });
                }
                pool.create_pixel_buffer()
            }
        };
        if output.format() != PixelFormat::Bgra8 {
            return Err(GpuError::UnsupportedPixelFormat {
                format: output.format(),
            });
        }
        if output.size() != self.output_size {
            return Err(GpuError::SizeMismatch {
                expected: self.output_size,
                actual: output.size(),
            });
        }

        let color = self
            .texture_cache
            .texture_from_image(buffer, TextureFormat::Bgra8Unorm)?;
        let upscaled = self
            .texture_cache
            .texture_from_image(&output, TextureFormat::Bgra8Unorm)?;

        let mut command_buffer = self.queue.make_command_buffer()?;
        self.scaler
            .encode(&mut command_buffer, &color, &self.intermediate)?;
        command_buffer.encode_blit(&self.intermediate, &upscaled)?;

        Ok((command_buffer, output))
    }

    /// Upscale and block the calling thread until the GPU is done.
    pub fn upscale_blocking(
        &self,
        buffer: &PixelBuffer,
        pool: Option<&PixelBufferPool>,
        output: Option<PixelBuffer>,
    ) -> GpuResult<PixelBuffer> {
        let (command_buffer, output) = self.encode(buffer, pool, output)?;
        command_buffer.commit_and_wait()?;
        Ok(output)
    }

    /// Upscale, suspending until the GPU signals completion.
    pub async fn upscale(
        &self,
        buffer: &PixelBuffer,
        pool: Option<&PixelBufferPool>,
        output: Option<PixelBuffer>,
    ) -> GpuResult<PixelBuffer> {
        let (command_buffer, output) = self.encode(buffer, pool, output)?;
        command_buffer.commit_and_await().await?;
        Ok(output)
    }

    /// Upscale and deliver the outcome to `handler`, which runs on the queue
    /// thread (or immediately, if encoding fails).
    pub fn upscale_with_handler(
        &self,
        buffer: &PixelBuffer,
        pool: Option<&PixelBufferPool>,
        output: Option<PixelBuffer>,
        handler: impl FnOnce(GpuResult<PixelBuffer>) + Send + 'static,
    ) {
        let (mut command_buffer, output) = match self.encode(buffer, pool, output) {
            Ok(encoded) => encoded,
            Err(e) => return handler(Err(e)),
        };

        // If the queue is gone the completion callback is dropped unrun, so
        // the handler stays reachable from here as well.
        let slot = Arc::new(Mutex::new(Some(handler)));
        let completion = Arc::clone(&slot);
        command_buffer.add_completed_handler(move |outcome| {
            if let Some(handler) = take_handler(&completion) {
                handler(outcome.map(|()| output));
            }
        });
        if let Err(e) = command_buffer.commit() {
            if let Some(handler) = take_handler(&slot) {
                handler(Err(e));
            }
        }
    }
}

fn take_handler<H>(slot: &Mutex<Option<H>>) -> Option<H> {
    slot.lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take()
}

impl fmt::Debug for Upscaler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upscaler")
            .field("input_size", &self.input_size)
            .field("output_size", &self.output_size)
            .field("queue", &self.queue.label())
            .finish_non_exhaustive()
    }
}
