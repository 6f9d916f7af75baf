//! Format policy: output size, codec, container, and per-track settings.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use vidscale_common::{LimitsConfig, VidscaleError, VidscaleResult};
use vidscale_media::{
    AudioOutputSettings, ContainerFormat, MediaKind, Size, SpatialSettings, TrackDescriptor,
    TrackOutputSettings, VideoCodec, VideoOutputSettings,
};

/// Frame rate used when the source reports none.
pub const FALLBACK_FRAME_RATE: f64 = 30.0;

/// Requested output codec.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecSelector {
    /// Keep the source codec (HEVC when it cannot be detected).
    #[default]
    Source,
    Hevc,
    ProRes,
    H264,
}

impl CodecSelector {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodecSelector::Source => "source",
            CodecSelector::Hevc => "hevc",
            CodecSelector::ProRes => "prores",
            CodecSelector::H264 => "h264",
        }
    }
}

impl fmt::Display for CodecSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodecSelector {
    type Err = VidscaleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "source" | "default" => Ok(CodecSelector::Source),
            "hevc" | "h265" => Ok(CodecSelector::Hevc),
            "prores" => Ok(CodecSelector::ProRes),
            "h264" | "avc" => Ok(CodecSelector::H264),
            other => Err(VidscaleError::validation(format!(
                "unknown codec \"{other}\" (expected source, hevc, prores, or h264)"
            ))),
        }
    }
}

/// Encoder size limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatLimits {
    pub max_dimension: u32,
    pub max_non_prores_area: u64,
    pub prores_only_area: u64,
}

impl Default for FormatLimits {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for FormatLimits {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            max_dimension: config.max_dimension,
            max_non_prores_area: config.max_non_prores_area,
            prores_only_area: config.prores_only_area,
        }
    }
}

/// Everything fixed for the lifetime of one export.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSpec {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Codec requested by the caller.
    pub codec: CodecSelector,

    /// Codec each video track resolves to, in track order.
    pub video_codecs: Vec<VideoCodec>,

    pub output_size: Size,
    pub creator: Option<String>,
    pub limits: FormatLimits,
}

/// Final output dimensions.
///
/// An explicit dimension wins; a single explicit dimension derives the other
/// from the source aspect ratio; with neither, both are `default_scale` times
/// the source. Dimensions above the limit are rejected, never clamped.
pub fn resolve_output_size(
    source: Size,
    width: Option<u32>,
    height: Option<u32>,
    default_scale: u32,
    limits: &FormatLimits,
) -> VidscaleResult<Size> {
    if source.is_empty() && (width.is_none() || height.is_none()) {
        return Err(VidscaleError::validation(format!(
            "source size {source} cannot be scaled proportionally"
        )));
    }

    let proportional = |value: u32, numerator: u32, denominator: u32| -> u64 {
        (value as f64 * numerator as f64 / denominator as f64).round() as u64
    };

    let out_width: u64 = match (width, height) {
        (Some(w), _) => w as u64,
        (None, Some(h)) => proportional(source.width, h, source.height),
        (None, None) => source.width as u64 * default_scale as u64,
    };
    let out_height: u64 = match height {
        Some(h) => h as u64,
        None => (source.height as f64 * out_width as f64 / source.width as f64).round() as u64,
    };

    for (axis, value) in [("width", out_width), ("height", out_height)] {
        if value > limits.max_dimension as u64 {
            return Err(VidscaleError::DimensionTooLarge {
                axis,
                value: value.min(u32::MAX as u64) as u32,
                max: limits.max_dimension,
            });
        }
        if value == 0 {
            return Err(VidscaleError::validation(format!("output {axis} must be at least 1")));
        }
    }

    Ok(Size::new(out_width as u32, out_height as u32))
}

/// Output codec for a video track.
///
/// Areas strictly above `prores_only_area` always get ProRes 422. Areas
/// strictly above `max_non_prores_area` get ProRes 422 unless the choice is
/// already a ProRes variant.
pub fn resolve_codec(
    selector: CodecSelector,
    source: Option<VideoCodec>,
    output: Size,
    limits: &FormatLimits,
) -> VideoCodec {
    let area = output.area();
    if area > limits.prores_only_area {
        return VideoCodec::ProRes422;
    }

    let requested = match selector {
        CodecSelector::Source => source.unwrap_or(VideoCodec::Hevc),
        CodecSelector::Hevc => VideoCodec::Hevc,
        CodecSelector::ProRes => VideoCodec::ProRes422,
        CodecSelector::H264 => VideoCodec::H264,
    };
    if area > limits.max_non_prores_area && !requested.is_prores() {
        return VideoCodec::ProRes422;
    }
    requested
}

/// `<dir>/<stem><suffix>.<ext>` next to the input.
pub fn derive_output_path(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    };
    input.with_file_name(name)
}

/// Force a `.mov` extension when any video track is encoded as ProRes.
pub fn resolve_output_path(output: &Path, codecs: impl IntoIterator<Item = VideoCodec>) -> PathBuf {
    let is_mov = output
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mov"));
    if !is_mov && codecs.into_iter().any(|codec| codec.is_prores()) {
        output.with_extension(ContainerFormat::Mov.extension())
    } else {
        output.to_path_buf()
    }
}

/// Pre-flight checks on the input path.
pub fn validate_input(input: &Path) -> VidscaleResult<()> {
    if !input.exists() {
        return Err(VidscaleError::InputNotFound {
            path: input.to_path_buf(),
        });
    }
    let extension = input
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_default();
    if !ContainerFormat::is_supported_extension(&extension) {
        return Err(VidscaleError::UnsupportedExtension { extension });
    }
    Ok(())
}

/// Output settings for one source track, or `None` if the track is not
/// carried into the output.
pub fn resolve_track_settings(track: &TrackDescriptor, spec: &ExportSpec) -> Option<TrackOutputSettings> {
    match track.kind {
        MediaKind::Video => {
            let frame_rate = if track.nominal_frame_rate > 0.0 {
                track.nominal_frame_rate
            } else {
                FALLBACK_FRAME_RATE
            };
            let spatial = track
                .has_left_and_right_eye()
                .then(|| SpatialSettings::stereo(track.stereo_metadata));
            Some(TrackOutputSettings::Video(VideoOutputSettings {
                size: spec.output_size,
                codec: resolve_codec(spec.codec, track.codec, spec.output_size, &spec.limits),
                color: track.color.properties(),
                frame_rate,
                transform: track.preferred_transform,
                spatial,
            }))
        }
        MediaKind::Audio => Some(TrackOutputSettings::Audio(AudioOutputSettings {
            format_hint: track.audio_format.clone(),
        })),
        MediaKind::Text | MediaKind::Timecode | MediaKind::Metadata => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidscale_media::{
        ColorDescription, ColorPrimaries, Eye, MediaTime, StereoMetadata, TransferFunction,
        Transform, YCbCrMatrix,
    };

    fn limits() -> FormatLimits {
        FormatLimits::default()
    }

    fn spec(output_size: Size, codec: CodecSelector) -> ExportSpec {
        ExportSpec {
            input: PathBuf::from("/videos/clip.mp4"),
            output: PathBuf::from("/videos/clip_upscaled.mp4"),
            codec,
            video_codecs: Vec::new(),
            output_size,
            creator: None,
            limits: limits(),
        }
    }

    #[test]
    fn test_default_is_double() {
        let size = resolve_output_size(Size::new(1920, 1080), None, None, 2, &limits()).unwrap();
        assert_eq!(size, Size::new(3840, 2160));
    }

    #[test]
    fn test_height_only_keeps_aspect() {
        let size = resolve_output_size(Size::new(1920, 1080), None, Some(1441), 2, &limits()).unwrap();
        assert_eq!(size, Size::new(2562, 1441));
    }

    #[test]
    fn test_width_only_keeps_aspect() {
        let size = resolve_output_size(Size::new(640, 480), Some(1000), None, 2, &limits()).unwrap();
        assert_eq!(size, Size::new(1000, 750));
    }

    #[test]
    fn test_dimension_limit_is_an_error() {
        let err = resolve_output_size(Size::new(1920, 1080), Some(16385), Some(100), 2, &limits())
            .unwrap_err();
        assert!(matches!(
            err,
            VidscaleError::DimensionTooLarge {
                axis: "width",
                value: 16385,
                max: 16384
            }
        ));

        let err = resolve_output_size(Size::new(1000, 2000), Some(10000), None, 2, &limits())
            .unwrap_err();
        assert!(matches!(err, VidscaleError::DimensionTooLarge { axis: "height", .. }));

        assert!(resolve_output_size(Size::new(16, 9), Some(16384), Some(16384), 2, &limits()).is_ok());
    }

    #[test]
    fn test_4k_boundary_is_strict() {
        let exact = resolve_codec(CodecSelector::Hevc, None, Size::new(3840, 2160), &limits());
        assert_eq!(exact, VideoCodec::Hevc);

        let over = resolve_codec(CodecSelector::Hevc, None, Size::new(3841, 2161), &limits());
        assert_eq!(over, VideoCodec::ProRes422);
    }

    #[test]
    fn test_existing_prores_kept_above_4k() {
        let codec = resolve_codec(
            CodecSelector::Source,
            Some(VideoCodec::ProRes4444),
            Size::new(7680, 4320),
            &limits(),
        );
        assert_eq!(codec, VideoCodec::ProRes4444);
    }

    #[test]
    fn test_huge_area_forces_prores_422() {
        let codec = resolve_codec(
            CodecSelector::Source,
            Some(VideoCodec::ProRes4444),
            Size::new(14501, 8156),
            &limits(),
        );
        assert_eq!(codec, VideoCodec::ProRes422);

        let exact = resolve_codec(
            CodecSelector::ProRes,
            Some(VideoCodec::ProRes4444),
            Size::new(14500, 8156),
            &limits(),
        );
        assert_eq!(exact, VideoCodec::ProRes422);
    }

    #[test]
    fn test_missing_source_codec_defaults_to_hevc() {
        let codec = resolve_codec(CodecSelector::Source, None, Size::new(1280, 720), &limits());
        assert_eq!(codec, VideoCodec::Hevc);
    }

    #[test]
    fn test_output_path_derivation() {
        assert_eq!(
            derive_output_path(Path::new("/videos/My Clip.MOV"), "_upscaled"),
            PathBuf::from("/videos/My Clip_upscaled.MOV")
        );
        assert_eq!(
            derive_output_path(Path::new("clip"), "_x2"),
            PathBuf::from("clip_x2")
        );
    }

    #[test]
    fn test_prores_forces_mov_extension() {
        let out = Path::new("/videos/clip_upscaled.mp4");
        assert_eq!(
            resolve_output_path(out, [VideoCodec::ProRes422]),
            PathBuf::from("/videos/clip_upscaled.mov")
        );
        assert_eq!(resolve_output_path(out, [VideoCodec::Hevc]), out.to_path_buf());

        let mov = Path::new("/videos/clip_upscaled.MOV");
        assert_eq!(resolve_output_path(mov, [VideoCodec::ProRes422]), mov.to_path_buf());
    }

    #[test]
    fn test_validate_input_extension() {
        let dir = tempfile::tempdir().unwrap();
        let mkv = dir.path().join("clip.mkv");
        std::fs::write(&mkv, b"").unwrap();
        assert!(matches!(
            validate_input(&mkv),
            Err(VidscaleError::UnsupportedExtension { .. })
        ));

        let missing = dir.path().join("missing.mov");
        assert!(matches!(
            validate_input(&missing),
            Err(VidscaleError::InputNotFound { .. })
        ));

        let mp4 = dir.path().join("clip.MP4");
        std::fs::write(&mp4, b"").unwrap();
        assert!(validate_input(&mp4).is_ok());
    }

    #[test]
    fn test_video_settings_carry_source_properties() {
        let mut track = TrackDescriptor::video(1, Size::new(1280, 720), 0.0, MediaTime::new(5, 1));
        track.preferred_transform = Transform::rotation(90);
        track.codec = Some(VideoCodec::H264);
        track.color = ColorDescription {
            primaries: Some(ColorPrimaries::Itu2020),
            transfer: Some(TransferFunction::Pq),
            matrix: Some(YCbCrMatrix::Itu2020),
        };

        let settings = resolve_track_settings(&track, &spec(Size::new(2560, 1440), CodecSelector::Source))
            .unwrap();
        let video = settings.video().unwrap();
        assert_eq!(video.codec, VideoCodec::H264);
        assert_eq!(video.frame_rate, FALLBACK_FRAME_RATE);
        assert_eq!(video.transform.rotation_degrees(), 90);
        assert!(video.color.is_some());
        assert!(video.spatial.is_none());
    }

    #[test]
    fn test_partial_color_is_not_emitted() {
        let mut track = TrackDescriptor::video(1, Size::new(1280, 720), 24.0, MediaTime::new(5, 1));
        track.color.primaries = Some(ColorPrimaries::Itu709);
        let settings = resolve_track_settings(&track, &spec(Size::new(2560, 1440), CodecSelector::Source))
            .unwrap();
        assert_eq!(settings.video().unwrap().color, None);
        assert_eq!(settings.video().unwrap().frame_rate, 24.0);
    }

    #[test]
    fn test_stereo_track_gets_spatial_settings() {
        let mut track = TrackDescriptor::video(1, Size::new(1920, 1080), 30.0, MediaTime::new(5, 1));
        track.stereo_eyes = vec![Eye::Left, Eye::Right];
        track.stereo_metadata = Some(StereoMetadata {
            hero_eye: Some(Eye::Left),
            baseline_um: Some(63_000),
            disparity_adjustment: Some(200),
            horizontal_fov_millideg: Some(71_500),
        });
        let settings = resolve_track_settings(&track, &spec(Size::new(3840, 2160), CodecSelector::Hevc))
            .unwrap();
        let spatial = settings.video().unwrap().spatial.clone().unwrap();
        assert_eq!(spatial.layer_ids, [0, 1]);
        assert_eq!(spatial.metadata, track.stereo_metadata);
    }

    #[test]
    fn test_non_av_tracks_are_skipped() {
        let mut track = TrackDescriptor::video(9, Size::new(0, 0), 0.0, MediaTime::ZERO);
        track.kind = MediaKind::Timecode;
        assert!(resolve_track_settings(&track, &spec(Size::new(10, 10), CodecSelector::Source)).is_none());
    }

    #[test]
    fn test_codec_selector_parsing() {
        assert_eq!("ProRes".parse::<CodecSelector>().unwrap(), CodecSelector::ProRes);
        assert_eq!("h265".parse::<CodecSelector>().unwrap(), CodecSelector::Hevc);
        assert!("vp9".parse::<CodecSelector>().is_err());
    }
}
