//! Output settings handed to a writer when a track input is attached.

use serde::{Deserialize, Serialize};

use crate::geometry::{Size, Transform};
use crate::track::{AudioFormat, ColorProperties, MediaKind, StereoMetadata, VideoCodec};

/// Multi-layer (stereo) output configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialSettings {
    /// Video layer IDs, left eye first.
    pub layer_ids: [u32; 2],
    pub metadata: Option<StereoMetadata>,
}

impl SpatialSettings {
    pub fn stereo(metadata: Option<StereoMetadata>) -> Self {
        Self {
            layer_ids: [0, 1],
            metadata,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoOutputSettings {
    pub size: Size,
    pub codec: VideoCodec,
    /// Present only when the source carries a complete color triple.
    pub color: Option<ColorProperties>,
    pub frame_rate: f64,
    pub transform: Transform,
    pub spatial: Option<SpatialSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioOutputSettings {
    /// Source format passed through without re-encode settings.
    pub format_hint: Option<AudioFormat>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrackOutputSettings {
    Video(VideoOutputSettings),
    Audio(AudioOutputSettings),
}

impl TrackOutputSettings {
    pub fn kind(&self) -> MediaKind {
        match self {
            TrackOutputSettings::Video(_) => MediaKind::Video,
            TrackOutputSettings::Audio(_) => MediaKind::Audio,
        }
    }

    pub fn video(&self) -> Option<&VideoOutputSettings> {
        match self {
            TrackOutputSettings::Video(video) => Some(video),
            TrackOutputSettings::Audio(_) => None,
        }
    }

    pub fn is_spatial(&self) -> bool {
        self.video().is_some_and(|video| video.spatial.is_some())
    }
}
