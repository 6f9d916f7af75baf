//! GStreamer initialization and pipeline launch strings.

use std::path::Path;
use std::sync::OnceLock;

use gstreamer as gst;
use vidscale_media::{
    AudioFormat, ColorPrimaries, ColorProperties, ContainerFormat, MediaError, MediaKind,
    MediaResult, TrackDescriptor, TransferFunction, VideoCodec, VideoOutputSettings, YCbCrMatrix,
};

/// Name of the `appsink` in reader pipelines.
pub const SINK_NAME: &str = "sink";

/// Name of the muxer in writer pipelines.
pub const MUX_NAME: &str = "mux";

pub fn init_gstreamer() -> MediaResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    let init_res = GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string()));
    match init_res {
        Ok(()) => Ok(()),
        Err(e) => Err(MediaError::unsupported(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}

/// Elements every export needs regardless of codec.
pub const REQUIRED_ELEMENTS: &[&str] = &[
    "filesrc",
    "filesink",
    "qtdemux",
    "decodebin",
    "videoconvert",
    "appsink",
    "appsrc",
    "qtmux",
    "mp4mux",
];

/// Required elements that are not installed.
pub fn missing_elements(names: &[&str]) -> Vec<String> {
    names
        .iter()
        .filter(|name| gst::ElementFactory::find(name).is_none())
        .map(|name| name.to_string())
        .collect()
}

/// Encoder chain for a video codec, ending in a muxer-ready stream.
pub fn video_encoder(codec: VideoCodec) -> &'static str {
    match codec {
        VideoCodec::Hevc | VideoCodec::HevcWithAlpha => "x265enc ! h265parse",
        VideoCodec::H264 => "x264enc ! h264parse",
        VideoCodec::Jpeg => "jpegenc",
        VideoCodec::ProRes422Proxy => "avenc_prores_ks profile=proxy",
        VideoCodec::ProRes422Lt => "avenc_prores_ks profile=lt",
        VideoCodec::ProRes422 => "avenc_prores_ks profile=standard",
        VideoCodec::ProRes422Hq => "avenc_prores_ks profile=hq",
        VideoCodec::ProRes4444 | VideoCodec::ProRes4444Xq => "avenc_prores_ks profile=4444",
    }
}

/// The encoder element name, for availability checks.
pub fn video_encoder_element(codec: VideoCodec) -> &'static str {
    video_encoder(codec)
        .split_whitespace()
        .next()
        .unwrap_or_default()
}

/// GStreamer colorimetry string for a complete color triple, if it has one.
pub fn colorimetry(color: &ColorProperties) -> Option<&'static str> {
    use ColorPrimaries as P;
    use TransferFunction as T;
    use YCbCrMatrix as M;

    match (color.primaries, color.transfer, color.matrix) {
        (P::Itu709, T::Itu709, M::Itu709) => Some("bt709"),
        (P::Itu2020, T::Pq, M::Itu2020) => Some("bt2100-pq"),
        (P::Itu2020, T::Hlg, M::Itu2020) => Some("bt2100-hlg"),
        (P::Itu2020, T::Itu709, M::Itu2020) => Some("bt2020"),
        (P::SmpteC, T::Itu709, M::Itu601) => Some("bt601"),
        _ => None,
    }
}

/// How a compressed audio stream travels from demuxer to muxer untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPassthrough {
    /// Parser that frames the stream on both sides, if it needs one.
    pub parser: Option<&'static str>,

    /// Caps of the access units exchanged between reader and writer.
    pub caps: String,

    /// The stream can only be muxed into QuickTime.
    pub mov_only: bool,
}

/// Passthrough route for an audio format, or `None` when it cannot be
/// carried without re-encoding.
pub fn audio_passthrough(format: &AudioFormat) -> Option<AudioPassthrough> {
    let framed = |parser: &'static str, caps: &str| {
        Some(AudioPassthrough {
            parser: Some(parser),
            caps: caps.to_string(),
            mov_only: false,
        })
    };
    let pcm = match format.codec.as_str() {
        "aac" => return framed("aacparse", "audio/mpeg,mpegversion=4,stream-format=adts"),
        "ac3" => return framed("ac3parse", "audio/x-ac3,framed=true"),
        "eac3" => return framed("ac3parse", "audio/x-eac3,framed=true"),
        "mp3" => return framed("mpegaudioparse", "audio/mpeg,mpegversion=1,layer=3,parsed=true"),
        "pcm_u8" => "U8",
        "pcm_s16le" => "S16LE",
        "pcm_s16be" => "S16BE",
        "pcm_s24le" => "S24LE",
        "pcm_s24be" => "S24BE",
        "pcm_s32le" => "S32LE",
        "pcm_s32be" => "S32BE",
        "pcm_f32le" => "F32LE",
        "pcm_f32be" => "F32BE",
        "pcm_f64le" => "F64LE",
        "pcm_f64be" => "F64BE",
        _ => return None,
    };
    if format.sample_rate == 0 || format.channels == 0 {
        return None;
    }
    Some(AudioPassthrough {
        parser: None,
        caps: format!(
            "audio/x-raw,format={pcm},layout=interleaved,rate={},channels={}",
            format.sample_rate, format.channels
        ),
        mov_only: true,
    })
}

/// Rational caps frame rate. NTSC-family rates stay exact (29.97 is
/// `30000/1001`); other fractional rates keep millihertz precision.
pub fn frame_rate_fraction(fps: f64) -> (u32, u32) {
    if !fps.is_finite() || fps <= 0.0 {
        return (30, 1);
    }
    let whole = fps.round();
    if (fps - whole).abs() < 1e-3 {
        return (whole.max(1.0) as u32, 1);
    }
    let ntsc = (fps * 1.001).round();
    if ntsc >= 1.0 && (fps - ntsc * 1000.0 / 1001.0).abs() < 5e-3 {
        return (ntsc as u32 * 1000, 1001);
    }
    let num = (fps * 1000.0).round() as u32;
    let divisor = gcd(num, 1000);
    (num / divisor, 1000 / divisor)
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.max(1)
}

fn escape_path(path: &Path) -> String {
    path.to_string_lossy().replace('"', "\\\"")
}

/// Reader pipeline for `track`, the `ordinal`-th stream of its kind.
///
/// Video is decoded to BGRA for the upscaler. Audio stays compressed and is
/// only framed by its parser.
pub fn reader_launch(path: &Path, track: &TrackDescriptor, ordinal: usize) -> MediaResult<String> {
    let branch = match track.kind {
        MediaKind::Video => format!(
            "d.video_{ordinal} ! queue ! decodebin ! videoconvert ! video/x-raw,format=BGRA"
        ),
        MediaKind::Audio => {
            let route = track
                .audio_format
                .as_ref()
                .and_then(audio_passthrough)
                .ok_or_else(|| {
                    MediaError::unsupported(format!(
                        "audio track {} cannot be passed through",
                        track.id
                    ))
                })?;
            match route.parser {
                Some(parser) => format!("d.audio_{ordinal} ! queue ! {parser} ! {}", route.caps),
                None => format!("d.audio_{ordinal} ! queue ! {}", route.caps),
            }
        }
        other => {
            return Err(MediaError::unsupported(format!(
                "{other} tracks cannot be decoded"
            )))
        }
    };
    Ok(format!(
        "filesrc location=\"{}\" ! qtdemux name=d {branch} ! appsink name={SINK_NAME} sync=false",
        escape_path(path)
    ))
}

/// `appsrc` plus encoder branch for one video input, linked into the muxer.
pub fn video_input_branch(track_id: u32, settings: &VideoOutputSettings, queue_depth: usize) -> String {
    let (fps_n, fps_d) = frame_rate_fraction(settings.frame_rate);
    let colorimetry = settings
        .color
        .as_ref()
        .and_then(colorimetry)
        .map(|c| format!(",colorimetry={c}"))
        .unwrap_or_default();
    format!(
        "appsrc name={name} format=time max-buffers={queue_depth} \
         caps=\"video/x-raw,format=BGRA,width={w},height={h},framerate={fps_n}/{fps_d}{colorimetry}\" \
         ! videoconvert ! {encoder} ! queue ! {MUX_NAME}.",
        name = source_name(track_id),
        w = settings.size.width,
        h = settings.size.height,
        encoder = video_encoder(settings.codec),
    )
}

/// `appsrc` branch that hands already-encoded audio straight to the muxer.
pub fn audio_input_branch(track_id: u32, route: &AudioPassthrough, queue_depth: usize) -> String {
    let parser = route
        .parser
        .map(|parser| format!("{parser} ! "))
        .unwrap_or_default();
    format!(
        "appsrc name={name} format=time max-buffers={queue_depth} caps=\"{caps}\" \
         ! {parser}queue ! {MUX_NAME}.",
        name = source_name(track_id),
        caps = route.caps,
    )
}

/// Muxer and file sink for the output container.
pub fn muxer_launch(path: &Path, container: ContainerFormat) -> String {
    let muxer = match container {
        ContainerFormat::Mov => "qtmux",
        ContainerFormat::M4v | ContainerFormat::Mp4 => "mp4mux",
    };
    format!(
        "{muxer} name={MUX_NAME} ! filesink location=\"{}\"",
        escape_path(path)
    )
}

pub fn source_name(track_id: u32) -> String {
    format!("src{track_id}")
}
