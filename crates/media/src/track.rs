//! Track descriptions: what a reader reports about each stream.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MediaError;
use crate::geometry::{Size, Transform};
use crate::sample::Eye;
use crate::time::MediaTime;

/// Media type of a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
    Text,
    Timecode,
    Metadata,
}

impl MediaKind {
    /// Only video and audio tracks are carried into the output.
    pub fn is_eligible(&self) -> bool {
        matches!(self, MediaKind::Video | MediaKind::Audio)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Text => "text",
            MediaKind::Timecode => "timecode",
            MediaKind::Metadata => "metadata",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Video codec families the toolkits can decode or encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    Hevc,
    HevcWithAlpha,
    H264,
    Jpeg,
    ProRes422,
    ProRes422Hq,
    ProRes422Lt,
    ProRes422Proxy,
    ProRes4444,
    ProRes4444Xq,
}

impl VideoCodec {
    pub const ALL: [VideoCodec; 10] = [
        VideoCodec::Hevc,
        VideoCodec::HevcWithAlpha,
        VideoCodec::H264,
        VideoCodec::Jpeg,
        VideoCodec::ProRes422,
        VideoCodec::ProRes422Hq,
        VideoCodec::ProRes422Lt,
        VideoCodec::ProRes422Proxy,
        VideoCodec::ProRes4444,
        VideoCodec::ProRes4444Xq,
    ];

    pub fn is_prores(&self) -> bool {
        matches!(
            self,
            VideoCodec::ProRes422
                | VideoCodec::ProRes422Hq
                | VideoCodec::ProRes422Lt
                | VideoCodec::ProRes422Proxy
                | VideoCodec::ProRes4444
                | VideoCodec::ProRes4444Xq
        )
    }

    /// QuickTime sample description four-character code.
    pub fn fourcc(&self) -> &'static str {
        match self {
            VideoCodec::Hevc => "hvc1",
            VideoCodec::HevcWithAlpha => "muxa",
            VideoCodec::H264 => "avc1",
            VideoCodec::Jpeg => "jpeg",
            VideoCodec::ProRes422 => "apcn",
            VideoCodec::ProRes422Hq => "apch",
            VideoCodec::ProRes422Lt => "apcs",
            VideoCodec::ProRes422Proxy => "apco",
            VideoCodec::ProRes4444 => "ap4h",
            VideoCodec::ProRes4444Xq => "ap4x",
        }
    }

    pub fn from_fourcc(fourcc: &str) -> Option<Self> {
        match fourcc {
            "hev1" => Some(VideoCodec::Hevc),
            "avc3" => Some(VideoCodec::H264),
            other => Self::ALL.into_iter().find(|codec| codec.fourcc() == other),
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            VideoCodec::Hevc => "HEVC",
            VideoCodec::HevcWithAlpha => "HEVC with alpha",
            VideoCodec::H264 => "H.264",
            VideoCodec::Jpeg => "JPEG",
            VideoCodec::ProRes422 => "ProRes 422",
            VideoCodec::ProRes422Hq => "ProRes 422 HQ",
            VideoCodec::ProRes422Lt => "ProRes 422 LT",
            VideoCodec::ProRes422Proxy => "ProRes 422 Proxy",
            VideoCodec::ProRes4444 => "ProRes 4444",
            VideoCodec::ProRes4444Xq => "ProRes 4444 XQ",
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorPrimaries {
    Itu709,
    Ebu3213,
    SmpteC,
    P3D65,
    Itu2020,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferFunction {
    Itu709,
    Smpte240M,
    Pq,
    Hlg,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YCbCrMatrix {
    Itu709,
    Itu601,
    Smpte240M,
    Itu2020,
}

impl FromStr for ColorPrimaries {
    type Err = MediaError;

    /// Accepts the names ffprobe and GStreamer colorimetry strings use.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bt709" | "itu709" => Ok(Self::Itu709),
            "ebu3213" | "jedec-p22" => Ok(Self::Ebu3213),
            "smpte170m" | "smpte-c" | "smptec" => Ok(Self::SmpteC),
            "smpte432" | "p3-d65" | "p3d65" => Ok(Self::P3D65),
            "bt2020" | "itu2020" => Ok(Self::Itu2020),
            other => Err(MediaError::unsupported(format!(
                "unknown color primaries \"{other}\""
            ))),
        }
    }
}

impl FromStr for TransferFunction {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bt709" | "itu709" => Ok(Self::Itu709),
            "smpte240m" => Ok(Self::Smpte240M),
            "smpte2084" | "pq" => Ok(Self::Pq),
            "arib-std-b67" | "hlg" => Ok(Self::Hlg),
            "linear" => Ok(Self::Linear),
            other => Err(MediaError::unsupported(format!(
                "unknown transfer function \"{other}\""
            ))),
        }
    }
}

impl FromStr for YCbCrMatrix {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bt709" | "itu709" => Ok(Self::Itu709),
            "smpte170m" | "bt470bg" | "bt601" | "itu601" => Ok(Self::Itu601),
            "smpte240m" => Ok(Self::Smpte240M),
            "bt2020nc" | "bt2020c" | "bt2020" | "itu2020" => Ok(Self::Itu2020),
            other => Err(MediaError::unsupported(format!(
                "unknown YCbCr matrix \"{other}\""
            ))),
        }
    }
}

/// A complete color triple, as written to an encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorProperties {
    pub primaries: ColorPrimaries,
    pub transfer: TransferFunction,
    pub matrix: YCbCrMatrix,
}

/// Color tags found on a source track. Any of them may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorDescription {
    pub primaries: Option<ColorPrimaries>,
    pub transfer: Option<TransferFunction>,
    pub matrix: Option<YCbCrMatrix>,
}

impl ColorDescription {
    /// The full triple, or `None` if any component is absent.
    pub fn properties(&self) -> Option<ColorProperties> {
        Some(ColorProperties {
            primaries: self.primaries?,
            transfer: self.transfer?,
            matrix: self.matrix?,
        })
    }
}

impl From<ColorProperties> for ColorDescription {
    fn from(props: ColorProperties) -> Self {
        Self {
            primaries: Some(props.primaries),
            transfer: Some(props.transfer),
            matrix: Some(props.matrix),
        }
    }
}

/// Stereo view metadata carried by spatial video tracks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StereoMetadata {
    pub hero_eye: Option<Eye>,
    /// Distance between the camera centers, in micrometers.
    pub baseline_um: Option<u32>,
    /// Horizontal disparity adjustment, normalized to [-10000, 10000].
    pub disparity_adjustment: Option<i32>,
    /// Horizontal field of view, in thousandths of a degree.
    pub horizontal_fov_millideg: Option<u32>,
}

/// Source format description of an audio track, passed to the writer as a hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Everything the export pipeline needs to know about one source track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    pub id: u32,
    pub kind: MediaKind,

    /// Native frame dimensions (zero for non-video tracks).
    pub natural_size: Size,

    /// Frames per second as reported by the container; 0 when unknown.
    pub nominal_frame_rate: f64,

    pub preferred_transform: Transform,

    #[serde(default)]
    pub color: ColorDescription,

    pub codec: Option<VideoCodec>,

    /// Stereo eyes present in the format description's tag collections.
    #[serde(default)]
    pub stereo_eyes: Vec<Eye>,

    #[serde(default)]
    pub stereo_metadata: Option<StereoMetadata>,

    pub duration: MediaTime,

    #[serde(default)]
    pub audio_format: Option<AudioFormat>,
}

impl TrackDescriptor {
    pub fn video(id: u32, natural_size: Size, nominal_frame_rate: f64, duration: MediaTime) -> Self {
        Self {
            id,
            kind: MediaKind::Video,
            natural_size,
            nominal_frame_rate,
            preferred_transform: Transform::IDENTITY,
            color: ColorDescription::default(),
            codec: None,
            stereo_eyes: Vec::new(),
            stereo_metadata: None,
            duration,
            audio_format: None,
        }
    }

    pub fn audio(id: u32, format: AudioFormat, duration: MediaTime) -> Self {
        Self {
            id,
            kind: MediaKind::Audio,
            natural_size: Size::new(0, 0),
            nominal_frame_rate: 0.0,
            preferred_transform: Transform::IDENTITY,
            color: ColorDescription::default(),
            codec: None,
            stereo_eyes: Vec::new(),
            stereo_metadata: None,
            duration,
            audio_format: Some(format),
        }
    }

    pub fn has_left_and_right_eye(&self) -> bool {
        self.stereo_eyes.contains(&Eye::Left) && self.stereo_eyes.contains(&Eye::Right)
    }

    pub fn is_spatial(&self) -> bool {
        self.kind == MediaKind::Video && self.has_left_and_right_eye()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prores_family() {
        let prores: Vec<_> = VideoCodec::ALL
            .into_iter()
            .filter(VideoCodec::is_prores)
            .collect();
        assert_eq!(prores.len(), 6);
        assert!(!VideoCodec::Hevc.is_prores());
        assert!(!VideoCodec::H264.is_prores());
    }

    #[test]
    fn test_fourcc_round_trip() {
        for codec in VideoCodec::ALL {
            assert_eq!(VideoCodec::from_fourcc(codec.fourcc()), Some(codec));
        }
        assert_eq!(VideoCodec::from_fourcc("hev1"), Some(VideoCodec::Hevc));
        assert_eq!(VideoCodec::from_fourcc("vp09"), None);
    }

    #[test]
    fn test_partial_color_triple_is_dropped() {
        let partial = ColorDescription {
            primaries: Some(ColorPrimaries::Itu709),
            transfer: None,
            matrix: Some(YCbCrMatrix::Itu709),
        };
        assert_eq!(partial.properties(), None);

        let full = ColorDescription {
            transfer: Some(TransferFunction::Hlg),
            ..partial
        };
        assert_eq!(
            full.properties(),
            Some(ColorProperties {
                primaries: ColorPrimaries::Itu709,
                transfer: TransferFunction::Hlg,
                matrix: YCbCrMatrix::Itu709,
            })
        );
    }

    #[test]
    fn test_color_names_parse() {
        assert_eq!("bt2020".parse::<ColorPrimaries>().unwrap(), ColorPrimaries::Itu2020);
        assert_eq!("arib-std-b67".parse::<TransferFunction>().unwrap(), TransferFunction::Hlg);
        assert_eq!("bt2020nc".parse::<YCbCrMatrix>().unwrap(), YCbCrMatrix::Itu2020);
        assert!("unknown".parse::<ColorPrimaries>().is_err());
    }

    #[test]
    fn test_spatial_requires_both_eyes() {
        let mut track = TrackDescriptor::video(1, Size::new(1920, 1080), 30.0, MediaTime::ZERO);
        track.stereo_eyes = vec![Eye::Left];
        assert!(!track.is_spatial());
        track.stereo_eyes.push(Eye::Right);
        assert!(track.is_spatial());
    }

    #[test]
    fn test_only_audio_and_video_are_eligible() {
        assert!(MediaKind::Video.is_eligible());
        assert!(MediaKind::Audio.is_eligible());
        assert!(!MediaKind::Text.is_eligible());
        assert!(!MediaKind::Timecode.is_eligible());
    }
}
