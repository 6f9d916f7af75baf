//! Samples flowing from reader outputs to writer inputs.

use serde::{Deserialize, Serialize};

use crate::buffer::PixelBuffer;
use crate::time::MediaTime;

/// One eye of a stereo pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    /// Video layer ID this eye is written to: 0 for left, 1 for right.
    pub fn layer_id(&self) -> u32 {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }
}

/// Classification attached to a buffer inside a multi-view sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferTag {
    StereoView(Eye),
    VideoLayerId(u32),
}

/// What a tagged buffer carries.
#[derive(Debug, Clone)]
pub enum TaggedContent {
    Pixels(PixelBuffer),
    /// Compressed or otherwise opaque data; cannot be upscaled.
    Opaque(Vec<u8>),
}

/// A buffer annotated with classification tags.
#[derive(Debug, Clone)]
pub struct TaggedBuffer {
    pub tags: Vec<BufferTag>,
    pub content: TaggedContent,
}

impl TaggedBuffer {
    pub fn new(tags: Vec<BufferTag>, content: TaggedContent) -> Self {
        Self { tags, content }
    }

    /// A pixel buffer tagged as one eye of a stereo pair.
    pub fn eye(eye: Eye, buffer: PixelBuffer) -> Self {
        Self::new(vec![BufferTag::StereoView(eye)], TaggedContent::Pixels(buffer))
    }

    /// A pixel buffer tagged with both its eye and its output layer.
    pub fn layered_eye(eye: Eye, buffer: PixelBuffer) -> Self {
        Self::new(
            vec![
                BufferTag::StereoView(eye),
                BufferTag::VideoLayerId(eye.layer_id()),
            ],
            TaggedContent::Pixels(buffer),
        )
    }

    pub fn has_tag(&self, tag: BufferTag) -> bool {
        self.tags.contains(&tag)
    }

    pub fn stereo_eye(&self) -> Option<Eye> {
        self.tags.iter().find_map(|tag| match tag {
            BufferTag::StereoView(eye) => Some(*eye),
            _ => None,
        })
    }

    pub fn layer_id(&self) -> Option<u32> {
        self.tags.iter().find_map(|tag| match tag {
            BufferTag::VideoLayerId(id) => Some(*id),
            _ => None,
        })
    }

    pub fn pixel_buffer(&self) -> Option<&PixelBuffer> {
        match &self.content {
            TaggedContent::Pixels(buffer) => Some(buffer),
            TaggedContent::Opaque(_) => None,
        }
    }
}

/// Find the buffer tagged with the given eye.
pub fn find_eye(buffers: &[TaggedBuffer], eye: Eye) -> Option<&TaggedBuffer> {
    buffers
        .iter()
        .find(|buffer| buffer.has_tag(BufferTag::StereoView(eye)))
}

/// One audio access unit, PCM or still encoded, forwarded as read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioBuffer {
    pub sample_rate: u32,
    pub channels: u16,
    pub data: Vec<u8>,
}

/// The payload of one sample.
#[derive(Debug, Clone)]
pub enum SamplePayload {
    Image(PixelBuffer),
    Tagged(Vec<TaggedBuffer>),
    Audio(AudioBuffer),
    /// A sample that carries timing only (e.g. a dropped frame marker).
    Empty,
}

/// One timed unit read from a track.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    pub pts: MediaTime,
    pub duration: MediaTime,
    pub payload: SamplePayload,
}

impl SampleBuffer {
    pub fn new(pts: MediaTime, duration: MediaTime, payload: SamplePayload) -> Self {
        Self {
            pts,
            duration,
            payload,
        }
    }

    pub fn image(pts: MediaTime, duration: MediaTime, buffer: PixelBuffer) -> Self {
        Self::new(pts, duration, SamplePayload::Image(buffer))
    }

    pub fn tagged(pts: MediaTime, duration: MediaTime, buffers: Vec<TaggedBuffer>) -> Self {
        Self::new(pts, duration, SamplePayload::Tagged(buffers))
    }

    pub fn audio(pts: MediaTime, duration: MediaTime, audio: AudioBuffer) -> Self {
        Self::new(pts, duration, SamplePayload::Audio(audio))
    }

    pub fn image_buffer(&self) -> Option<&PixelBuffer> {
        match &self.payload {
            SamplePayload::Image(buffer) => Some(buffer),
            _ => None,
        }
    }

    pub fn tagged_buffers(&self) -> Option<&[TaggedBuffer]> {
        match &self.payload {
            SamplePayload::Tagged(buffers) => Some(buffers),
            _ => None,
        }
    }

    /// Same timing, new payload.
    pub fn with_payload(&self, payload: SamplePayload) -> Self {
        Self::new(self.pts, self.duration, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PixelFormat;
    use crate::geometry::Size;

    #[test]
    fn test_find_eye_by_tag() {
        let left = PixelBuffer::new(Size::new(2, 2), PixelFormat::Bgra8);
        let right = PixelBuffer::new(Size::new(2, 2), PixelFormat::Bgra8);
        let buffers = vec![
            TaggedBuffer::eye(Eye::Right, right.clone()),
            TaggedBuffer::eye(Eye::Left, left.clone()),
        ];

        let found = find_eye(&buffers, Eye::Left).unwrap();
        assert!(found.pixel_buffer().unwrap().ptr_eq(&left));
        assert_eq!(found.stereo_eye(), Some(Eye::Left));
        assert_eq!(found.layer_id(), None);
    }

    #[test]
    fn test_layered_eye_tags() {
        let buffer = PixelBuffer::new(Size::new(1, 1), PixelFormat::Bgra8);
        let tagged = TaggedBuffer::layered_eye(Eye::Right, buffer);
        assert_eq!(tagged.layer_id(), Some(1));
        assert!(tagged.has_tag(BufferTag::StereoView(Eye::Right)));
    }

    #[test]
    fn test_opaque_content_has_no_pixels() {
        let tagged = TaggedBuffer::new(
            vec![BufferTag::StereoView(Eye::Left)],
            TaggedContent::Opaque(vec![1, 2, 3]),
        );
        assert!(tagged.pixel_buffer().is_none());
    }
}
