//! Reader: one `qtdemux ! ... ! appsink` pipeline per track.
//!
//! Video is decoded to BGRA. Audio is only parsed, so its samples reach the
//! writer still encoded.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use gst::prelude::*;
use gstreamer as gst;
use vidscale_media::{
    Asset, AssetReader, AudioBuffer, AudioFormat, MediaError, MediaKind, MediaResult, MediaTime, PixelBuffer,
    PixelFormat, SampleBuffer, SessionStatus, SharedStatus, Size, TrackDescriptor, TrackOutput,
};

use crate::launch::{audio_passthrough, init_gstreamer, reader_launch, SINK_NAME};

/// How long one `try-pull-sample` call blocks before status is rechecked.
const PULL_TIMEOUT_NS: u64 = 100_000_000;

pub struct GstReader {
    asset: Asset,
    status: SharedStatus,
    pipelines: Vec<(u32, gst::Pipeline)>,
    remaining: Arc<AtomicUsize>,
}

impl GstReader {
    pub fn new(asset: Asset) -> MediaResult<Self> {
        init_gstreamer()?;
        Ok(Self {
            asset,
            status: SharedStatus::new(),
            pipelines: Vec::new(),
            remaining: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Position of `track` among the asset's streams of the same kind.
    fn ordinal(&self, track: &TrackDescriptor) -> usize {
        self.asset
            .tracks
            .iter()
            .filter(|t| t.kind == track.kind)
            .take_while(|t| t.id != track.id)
            .count()
    }

    fn stop_pipelines(&self) {
        for (track_id, pipeline) in &self.pipelines {
            if let Err(e) = pipeline.set_state(gst::State::Null) {
                tracing::debug!(track_id, error = ?e, "Failed to stop reader pipeline");
            }
        }
    }
}

impl AssetReader for GstReader {
    fn can_add_output(&self, track: &TrackDescriptor) -> bool {
        self.status.is(SessionStatus::Unknown)
            && track.kind.is_eligible()
            && !track.is_spatial()
            && (track.kind != MediaKind::Audio
                || track.audio_format.as_ref().and_then(audio_passthrough).is_some())
            && self.asset.track(track.id).is_some()
            && !self.pipelines.iter().any(|(id, _)| *id == track.id)
    }

    fn add_output(&mut self, track: &TrackDescriptor) -> MediaResult<Box<dyn TrackOutput>> {
        if !self.can_add_output(track) {
            return Err(MediaError::CannotAddOutput {
                track_id: track.id,
                message: format!("{} track cannot be read by GStreamer", track.kind),
            });
        }

        let launch = reader_launch(&self.asset.path, track, self.ordinal(track))?;
        let pipeline = gst::parse::launch(&launch)
            .map_err(|e| MediaError::CannotAddOutput {
                track_id: track.id,
                message: format!("Failed to build pipeline: {e}"),
            })?
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| MediaError::reader("Launch string did not produce a pipeline"))?;
        let sink = pipeline
            .by_name(SINK_NAME)
            .ok_or_else(|| MediaError::reader("reader pipeline has no appsink"))?;

        tracing::debug!(track_id = track.id, launch = %launch, "Reader pipeline built");
        self.pipelines.push((track.id, pipeline.clone()));
        self.remaining.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(GstTrackOutput {
            track_id: track.id,
            kind: track.kind,
            audio_format: track.audio_format.clone(),
            pipeline,
            sink,
            status: self.status.clone(),
            remaining: Arc::clone(&self.remaining),
            exhausted: false,
        }))
    }

    fn outputs_count(&self) -> usize {
        self.pipelines.len()
    }

    fn start_reading(&mut self) -> MediaResult<()> {
        if !self.status.transition(SessionStatus::Reading) {
            return Err(MediaError::InvalidState {
                operation: "start_reading",
                status: self.status.get().to_string(),
            });
        }
        for (track_id, pipeline) in &self.pipelines {
            if let Err(e) = pipeline.set_state(gst::State::Playing) {
                let message = format!("track {track_id} pipeline failed to start: {e:?}");
                self.status.fail(message.clone());
                self.stop_pipelines();
                return Err(MediaError::reader(message));
            }
        }
        tracing::info!(
            path = %self.asset.path.display(),
            outputs = self.pipelines.len(),
            "Reading started"
        );
        Ok(())
    }

    fn status(&self) -> SessionStatus {
        self.status.get()
    }

    fn error(&self) -> Option<String> {
        self.status.error()
    }

    fn cancel_reading(&self) {
        if self.status.cancel() {
            self.stop_pipelines();
        }
    }

    fn abort_with_error(&self, message: String) {
        if self.status.fail(message) {
            self.stop_pipelines();
        }
    }
}

impl Drop for GstReader {
    fn drop(&mut self) {
        self.stop_pipelines();
    }
}

struct GstTrackOutput {
    track_id: u32,
    kind: MediaKind,
    audio_format: Option<AudioFormat>,
    pipeline: gst::Pipeline,
    sink: gst::Element,
    status: SharedStatus,
    remaining: Arc<AtomicUsize>,
    exhausted: bool,
}

enum Pulled {
    Sample(gst::Sample),
    Eos,
    Stopped,
    Error(String),
}

fn pull(pipeline: &gst::Pipeline, sink: &gst::Element, status: &SharedStatus) -> Pulled {
    loop {
        if matches!(
            status.get(),
            SessionStatus::Cancelled | SessionStatus::Failed
        ) {
            return Pulled::Stopped;
        }
        let sample = sink.emit_by_name::<Option<gst::Sample>>("try-pull-sample", &[&PULL_TIMEOUT_NS]);
        if let Some(sample) = sample {
            return Pulled::Sample(sample);
        }
        if sink.property::<bool>("eos") {
            return Pulled::Eos;
        }
        let error = pipeline
            .bus()
            .and_then(|bus| bus.pop_filtered(&[gst::MessageType::Error]));
        if let Some(message) = error {
            if let gst::MessageView::Error(e) = message.view() {
                return Pulled::Error(e.error().to_string());
            }
        }
    }
}

fn clock_to_media_time(time: Option<gst::ClockTime>) -> MediaTime {
    time.map(|t| MediaTime::from_nanos(t.nseconds()))
        .unwrap_or(MediaTime::INVALID)
}

fn convert_sample(
    kind: MediaKind,
    audio_format: Option<&AudioFormat>,
    sample: &gst::Sample,
) -> MediaResult<SampleBuffer> {
    let buffer = sample
        .buffer()
        .ok_or_else(|| MediaError::reader("sample has no buffer"))?;
    let structure = sample
        .caps()
        .and_then(|caps| caps.structure(0))
        .ok_or_else(|| MediaError::reader("sample has no caps"))?;
    let map = buffer
        .map_readable()
        .map_err(|_| MediaError::reader("sample buffer is not readable"))?;
    let pts = clock_to_media_time(buffer.pts());
    let duration = clock_to_media_time(buffer.duration());

    match kind {
        MediaKind::Video => {
            let width = structure
                .get::<i32>("width")
                .map_err(|e| MediaError::reader(format!("video caps: {e}")))?;
            let height = structure
                .get::<i32>("height")
                .map_err(|e| MediaError::reader(format!("video caps: {e}")))?;
            let size = Size::new(width.max(0) as u32, height.max(0) as u32);
            let pixels = PixelBuffer::from_vec(size, PixelFormat::Bgra8, map.as_slice().to_vec())?;
            Ok(SampleBuffer::image(pts, duration, pixels))
        }
        MediaKind::Audio => {
            // Parsed caps may omit the layout; fall back to the probed format.
            let rate = structure
                .get::<i32>("rate")
                .ok()
                .map(|rate| rate.max(0) as u32)
                .or_else(|| audio_format.map(|f| f.sample_rate))
                .unwrap_or(0);
            let channels = structure
                .get::<i32>("channels")
                .ok()
                .map(|channels| channels.clamp(0, u16::MAX as i32) as u16)
                .or_else(|| audio_format.map(|f| f.channels))
                .unwrap_or(0);
            Ok(SampleBuffer::audio(
                pts,
                duration,
                AudioBuffer {
                    sample_rate: rate,
                    channels,
                    data: map.as_slice().to_vec(),
                },
            ))
        }
        other => Err(MediaError::unsupported(format!(
            "{other} samples cannot be read"
        ))),
    }
}

impl GstTrackOutput {
    fn finish(&mut self) {
        if self.exhausted {
            return;
        }
        self.exhausted = true;
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            tracing::debug!(track_id = self.track_id, error = ?e, "Failed to stop reader pipeline");
        }
        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.status.transition(SessionStatus::Finished);
        }
    }
}

#[async_trait]
impl TrackOutput for GstTrackOutput {
    fn track_id(&self) -> u32 {
        self.track_id
    }

    async fn next_sample(&mut self) -> MediaResult<Option<SampleBuffer>> {
        if self.exhausted {
            return Ok(None);
        }
        match self.status.get() {
            SessionStatus::Cancelled => return Ok(None),
            SessionStatus::Failed => {
                return Err(MediaError::reader(
                    self.status.error().unwrap_or_else(|| "reader failed".into()),
                ))
            }
            SessionStatus::Unknown => {
                return Err(MediaError::InvalidState {
                    operation: "next_sample",
                    status: SessionStatus::Unknown.to_string(),
                })
            }
            _ => {}
        }

        let pipeline = self.pipeline.clone();
        let sink = self.sink.clone();
        let status = self.status.clone();
        let pulled = tokio::task::spawn_blocking(move || pull(&pipeline, &sink, &status))
            .await
            .map_err(|e| MediaError::reader(format!("sample pull task failed: {e}")))?;

        match pulled {
            Pulled::Sample(sample) => match convert_sample(self.kind, self.audio_format.as_ref(), &sample) {
                Ok(buffer) => Ok(Some(buffer)),
                Err(e) => {
                    self.status.fail(e.to_string());
                    Err(e)
                }
            },
            Pulled::Eos => {
                tracing::debug!(track_id = self.track_id, "Reader reached end of stream");
                self.finish();
                Ok(None)
            }
            Pulled::Stopped => match self.status.get() {
                SessionStatus::Failed => Err(MediaError::reader(
                    self.status.error().unwrap_or_else(|| "reader failed".into()),
                )),
                _ => Ok(None),
            },
            Pulled::Error(message) => {
                let message = format!("decode error in track {}: {message}", self.track_id);
                self.status.fail(message.clone());
                Err(MediaError::reader(message))
            }
        }
    }
}
