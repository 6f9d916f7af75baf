//! Asset probing through `ffprobe`'s JSON output.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use serde::Deserialize;
use vidscale_media::{
    Asset, AudioFormat, ColorDescription, MediaError, MediaKind, MediaResult, MediaTime,
    MetadataItem, Size, TrackDescriptor, Transform, VideoCodec,
};

/// Timescale used for durations parsed from decimal seconds.
const PROBE_TIMESCALE: i32 = 600;

#[derive(Debug, Default, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: ProbeFormat,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeStream {
    index: u32,
    codec_type: Option<String>,
    codec_name: Option<String>,
    codec_tag_string: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
    color_primaries: Option<String>,
    color_transfer: Option<String>,
    color_space: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u16>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
    #[serde(default)]
    side_data_list: Vec<SideData>,
    #[serde(default)]
    disposition: Disposition,
}

#[derive(Debug, Default, Deserialize)]
struct Disposition {
    #[serde(default)]
    attached_pic: u8,
}

#[derive(Debug, Default, Deserialize)]
struct SideData {
    rotation: Option<f64>,
}

/// Run `ffprobe` on `path` and describe its tracks.
pub fn probe_asset(path: &Path) -> MediaResult<Asset> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .map_err(|e| MediaError::probe(format!("failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(MediaError::Open {
            path: path.to_path_buf(),
            message: stderr.trim().to_string(),
        });
    }

    parse_probe(path, &output.stdout)
}

/// Whether `ffprobe` can be executed.
pub fn ffprobe_available() -> bool {
    Command::new("ffprobe")
        .arg("-version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Build an [`Asset`] from raw `ffprobe -print_format json` output.
pub fn parse_probe(path: &Path, json: &[u8]) -> MediaResult<Asset> {
    let probe: ProbeOutput = serde_json::from_slice(json)?;

    let tracks: Vec<TrackDescriptor> = probe.streams.iter().filter_map(describe_stream).collect();
    let duration = probe
        .format
        .duration
        .as_deref()
        .and_then(parse_seconds)
        .or_else(|| tracks.iter().map(|track| track.duration).max())
        .unwrap_or(MediaTime::ZERO);
    let metadata = probe
        .format
        .tags
        .into_iter()
        .map(|(key, value)| MetadataItem::new(key, value))
        .collect();

    Ok(Asset {
        path: path.to_path_buf(),
        duration,
        tracks,
        metadata,
    })
}

fn describe_stream(stream: &ProbeStream) -> Option<TrackDescriptor> {
    let kind = match stream.codec_type.as_deref()? {
        // Cover art is a still image, not a demuxable video track.
        "video" if stream.disposition.attached_pic != 0 => MediaKind::Metadata,
        "video" => MediaKind::Video,
        "audio" => MediaKind::Audio,
        "subtitle" => MediaKind::Text,
        "data" if stream.codec_tag_string.as_deref() == Some("tmcd") => MediaKind::Timecode,
        "data" => MediaKind::Metadata,
        _ => return None,
    };
    let id = stream.index + 1;
    let duration = stream
        .duration
        .as_deref()
        .and_then(parse_seconds)
        .unwrap_or(MediaTime::ZERO);

    let mut track = match kind {
        MediaKind::Video => {
            let size = Size::new(stream.width.unwrap_or(0), stream.height.unwrap_or(0));
            let fps = stream
                .avg_frame_rate
                .as_deref()
                .and_then(parse_rate)
                .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate))
                .unwrap_or(0.0);
            let mut track = TrackDescriptor::video(id, size, fps, duration);
            track.codec = video_codec(stream);
            track.color = ColorDescription {
                primaries: stream.color_primaries.as_deref().and_then(|s| s.parse().ok()),
                transfer: stream.color_transfer.as_deref().and_then(|s| s.parse().ok()),
                matrix: stream.color_space.as_deref().and_then(|s| s.parse().ok()),
            };
            track.preferred_transform = Transform::rotation(rotation_degrees(stream));
            track
        }
        MediaKind::Audio => TrackDescriptor::audio(
            id,
            AudioFormat {
                codec: stream.codec_name.clone().unwrap_or_default(),
                sample_rate: stream
                    .sample_rate
                    .as_deref()
                    .and_then(|rate| rate.parse().ok())
                    .unwrap_or(0),
                channels: stream.channels.unwrap_or(0),
            },
            duration,
        ),
        _ => TrackDescriptor::video(id, Size::new(0, 0), 0.0, duration),
    };
    track.kind = kind;
    Some(track)
}

fn video_codec(stream: &ProbeStream) -> Option<VideoCodec> {
    if let Some(codec) = stream
        .codec_tag_string
        .as_deref()
        .and_then(VideoCodec::from_fourcc)
    {
        return Some(codec);
    }
    match stream.codec_name.as_deref()? {
        "hevc" => Some(VideoCodec::Hevc),
        "h264" => Some(VideoCodec::H264),
        "mjpeg" => Some(VideoCodec::Jpeg),
        "prores" => Some(VideoCodec::ProRes422),
        _ => None,
    }
}

/// Clockwise display rotation in degrees.
fn rotation_degrees(stream: &ProbeStream) -> i32 {
    if let Some(rotate) = stream.tags.get("rotate").and_then(|r| r.parse::<i32>().ok()) {
        return rotate;
    }
    stream
        .side_data_list
        .iter()
        .find_map(|side| side.rotation)
        .map(|rotation| -(rotation.round() as i32))
        .unwrap_or(0)
}

/// `"30000/1001"` -> 29.97. Zero denominators yield `None`.
fn parse_rate(rate: &str) -> Option<f64> {
    let (num, den) = rate.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    (den != 0.0).then(|| num / den)
}

fn parse_seconds(secs: &str) -> Option<MediaTime> {
    let secs: f64 = secs.trim().parse().ok()?;
    secs.is_finite()
        .then(|| MediaTime::from_secs(secs.max(0.0), PROBE_TIMESCALE))
}
