//! Vidscale Media Model
//!
//! Types shared by every stage of an export: rational timestamps, pixel
//! buffers and their pools, samples and tagged (multi-view) buffers, track
//! descriptors, per-track output settings, and the reader/writer contracts a
//! media toolkit implements.
//!
//! The [`memory`] toolkit implements those contracts entirely in memory and
//! is what the export pipeline's tests run against.

pub mod asset;
pub mod buffer;
pub mod error;
pub mod geometry;
pub mod memory;
pub mod sample;
pub mod session;
pub mod settings;
pub mod time;
pub mod track;

pub use asset::{Asset, ContainerFormat, MetadataItem};
pub use buffer::{PixelBuffer, PixelBufferPool, PixelFormat, PoolKey, ResourcePool};
pub use error::{MediaError, MediaResult};
pub use geometry::{Size, Transform};
pub use sample::{
    find_eye, AudioBuffer, BufferTag, Eye, SampleBuffer, SamplePayload, TaggedBuffer,
    TaggedContent,
};
pub use session::{
    AssetReader, AssetWriter, MediaToolkit, SessionStatus, SharedStatus, TrackInput, TrackOutput,
    WriterOptions,
};
pub use settings::{AudioOutputSettings, SpatialSettings, TrackOutputSettings, VideoOutputSettings};
pub use time::MediaTime;
pub use track::{
    AudioFormat, ColorDescription, ColorPrimaries, ColorProperties, MediaKind, StereoMetadata,
    TrackDescriptor, TransferFunction, VideoCodec, YCbCrMatrix,
};
