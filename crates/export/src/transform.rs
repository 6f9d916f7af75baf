//! Per-sample transforms applied between a track's reader output and writer
//! input.

use async_trait::async_trait;
use vidscale_gpu::Upscaler;
use vidscale_media::{
    find_eye, Eye, PixelBuffer, PixelFormat, ResourcePool, SampleBuffer, SamplePayload, TaggedBuffer,
};

use crate::error::TrackError;

/// What a track worker does to each sample before appending it.
#[async_trait]
pub trait FrameTransform: Send {
    fn name(&self) -> &'static str;

    async fn apply(&mut self, sample: SampleBuffer) -> Result<SampleBuffer, TrackError>;
}

/// Forwards samples unchanged (audio tracks).
#[derive(Debug, Default)]
pub struct Passthrough;

#[async_trait]
impl FrameTransform for Passthrough {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    async fn apply(&mut self, sample: SampleBuffer) -> Result<SampleBuffer, TrackError> {
        Ok(sample)
    }
}

/// Upscales the single image buffer of each video sample.
#[derive(Debug)]
pub struct UpscaleTransform {
    upscaler: Upscaler,
    pools: ResourcePool,
}

impl UpscaleTransform {
    pub fn new(upscaler: Upscaler) -> Self {
        Self {
            upscaler,
            pools: ResourcePool::new(),
        }
    }
}

#[async_trait]
impl FrameTransform for UpscaleTransform {
    fn name(&self) -> &'static str {
        "upscale"
    }

    async fn apply(&mut self, sample: SampleBuffer) -> Result<SampleBuffer, TrackError> {
        let image = sample
            .image_buffer()
            .ok_or(TrackError::MissingImageBuffer { pts: sample.pts })?;
        let upscaled = upscale_into_pool(&self.upscaler, &mut self.pools, image).await?;
        Ok(sample.with_payload(SamplePayload::Image(upscaled)))
    }
}

/// Upscales both eyes of a stereo sample and re-tags them as video layers.
#[derive(Debug)]
pub struct SpatialUpscaleTransform {
    upscaler: Upscaler,
    pools: ResourcePool,
}

impl SpatialUpscaleTransform {
    pub fn new(upscaler: Upscaler) -> Self {
        Self {
            upscaler,
            pools: ResourcePool::new(),
        }
    }
}

#[async_trait]
impl FrameTransform for SpatialUpscaleTransform {
    fn name(&self) -> &'static str {
        "spatial-upscale"
    }

    async fn apply(&mut self, sample: SampleBuffer) -> Result<SampleBuffer, TrackError> {
        let pts = sample.pts;
        let buffers = sample
            .tagged_buffers()
            .ok_or(TrackError::MissingTaggedBuffers { pts })?;
        let (Some(left), Some(right)) = (find_eye(buffers, Eye::Left), find_eye(buffers, Eye::Right))
        else {
            return Err(TrackError::MissingTaggedBuffers { pts });
        };
        let (Some(left), Some(right)) = (left.pixel_buffer(), right.pixel_buffer()) else {
            return Err(TrackError::InvalidTaggedBuffers { pts });
        };
        let (left, right) = (left.clone(), right.clone());

        let left = upscale_into_pool(&self.upscaler, &mut self.pools, &left).await?;
        let right = upscale_into_pool(&self.upscaler, &mut self.pools, &right).await?;

        Ok(sample.with_payload(SamplePayload::Tagged(vec![
            TaggedBuffer::layered_eye(Eye::Left, left),
            TaggedBuffer::layered_eye(Eye::Right, right),
        ])))
    }
}

async fn upscale_into_pool(
    upscaler: &Upscaler,
    pools: &mut ResourcePool,
    image: &PixelBuffer,
) -> Result<PixelBuffer, TrackError> {
    let pool = pools.pool_for(upscaler.output_size(), PixelFormat::Bgra8)?.clone();
    Ok(upscaler.upscale(image, Some(&pool), None).await?)
}
