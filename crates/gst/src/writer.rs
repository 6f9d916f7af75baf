//! Encoding writer: one `appsrc` branch per track feeding a shared muxer.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use gst::prelude::*;
use gstreamer as gst;
use tokio::sync::Notify;
use vidscale_media::{
    AssetWriter, ContainerFormat, MediaError, MediaResult, MediaTime, MetadataItem,
    SampleBuffer, SamplePayload, SessionStatus, SharedStatus, TrackInput, TrackOutputSettings,
    WriterOptions,
};

use crate::launch::{
    audio_input_branch, audio_passthrough, init_gstreamer, missing_elements, muxer_launch, source_name,
    video_encoder_element, video_input_branch, MUX_NAME,
};

/// Upper bound on waiting for the muxer to drain after every input ends.
const FINALIZE_TIMEOUT: Duration = Duration::from_secs(120);

/// Interval at which a waiting input rechecks writer status.
const READY_POLL: Duration = Duration::from_millis(50);

/// State shared between the writer and its inputs.
struct WriterShared {
    status: SharedStatus,
    pipeline: OnceLock<gst::Pipeline>,
    start_ns: AtomicU64,
}

impl WriterShared {
    /// Fail the writer if the pipeline posted an error.
    fn poll_bus_errors(&self) {
        let Some(bus) = self.pipeline.get().and_then(|p| p.bus()) else {
            return;
        };
        while let Some(message) = bus.pop_filtered(&[gst::MessageType::Error]) {
            if let gst::MessageView::Error(e) = message.view() {
                self.status.fail(format!("encoder error: {}", e.error()));
            }
        }
    }

    fn stop(&self) {
        if let Some(pipeline) = self.pipeline.get() {
            if let Err(e) = pipeline.set_state(gst::State::Null) {
                tracing::debug!(error = ?e, "Failed to stop writer pipeline");
            }
        }
    }
}

/// Per-input flow control, driven by the `appsrc` signals.
struct InputShared {
    source: OnceLock<gst::Element>,
    wants_data: AtomicBool,
    notify: Notify,
}

pub struct GstWriter {
    path: PathBuf,
    options: WriterOptions,
    metadata: Vec<MetadataItem>,
    inputs: Vec<(u32, TrackOutputSettings, Arc<InputShared>)>,
    shared: Arc<WriterShared>,
}

impl GstWriter {
    pub fn new(path: &Path, options: WriterOptions) -> MediaResult<Self> {
        init_gstreamer()?;
        Ok(Self {
            path: path.to_path_buf(),
            options,
            metadata: Vec::new(),
            inputs: Vec::new(),
            shared: Arc::new(WriterShared {
                status: SharedStatus::new(),
                pipeline: OnceLock::new(),
                start_ns: AtomicU64::new(0),
            }),
        })
    }

    fn launch(&self) -> String {
        let depth = self.options.queue_depth.max(1);
        let mut parts = vec![muxer_launch(&self.path, self.options.container)];
        for (track_id, settings, _) in &self.inputs {
            parts.push(match settings {
                TrackOutputSettings::Video(video) => video_input_branch(*track_id, video, depth),
                TrackOutputSettings::Audio(audio) => {
                    match audio.format_hint.as_ref().and_then(audio_passthrough) {
                        Some(route) => audio_input_branch(*track_id, &route, depth),
                        None => continue,
                    }
                }
            });
        }
        parts.join(" ")
    }

    fn build_pipeline(&self) -> MediaResult<gst::Pipeline> {
        let launch = self.launch();
        tracing::debug!(launch = %launch, "Writer pipeline");
        gst::parse::launch(&launch)
            .map_err(|e| MediaError::writer(format!("Failed to build pipeline: {e}")))?
            .dynamic_cast::<gst::Pipeline>()
            .map_err(|_| MediaError::writer("Launch string did not produce a pipeline"))
    }

    fn apply_metadata(&self, pipeline: &gst::Pipeline) {
        let Some(setter) = pipeline
            .by_name(MUX_NAME)
            .and_then(|mux| mux.dynamic_cast::<gst::TagSetter>().ok())
        else {
            return;
        };
        for item in &self.metadata {
            let value = item.value.as_str();
            match item.key.as_str() {
                "title" | "com.apple.quicktime.title" => {
                    setter.add_tag::<gst::tags::Title>(&value, gst::TagMergeMode::Replace)
                }
                "artist" | "com.apple.quicktime.artist" => {
                    setter.add_tag::<gst::tags::Artist>(&value, gst::TagMergeMode::Replace)
                }
                "comment" | "description" | "com.apple.quicktime.description" => {
                    setter.add_tag::<gst::tags::Comment>(&value, gst::TagMergeMode::Replace)
                }
                "encoder" => {
                    setter.add_tag::<gst::tags::Encoder>(&value, gst::TagMergeMode::Replace)
                }
                other => tracing::debug!(key = other, "Metadata item has no container tag"),
            }
        }
    }

    fn start_pipeline(&self) -> MediaResult<()> {
        let pipeline = self.build_pipeline()?;
        self.apply_metadata(&pipeline);
        self.connect_inputs(&pipeline)?;
        let _ = self.shared.pipeline.set(pipeline.clone());
        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| MediaError::writer(format!("writer pipeline failed to start: {e:?}")))?;
        Ok(())
    }

    fn connect_inputs(&self, pipeline: &gst::Pipeline) -> MediaResult<()> {
        for (track_id, settings, input) in &self.inputs {
            let source = pipeline.by_name(&source_name(*track_id)).ok_or_else(|| {
                MediaError::writer(format!("writer pipeline has no source for track {track_id}"))
            })?;

            let need = Arc::clone(input);
            source.connect("need-data", false, move |_| {
                need.wants_data.store(true, Ordering::SeqCst);
                need.notify.notify_waiters();
                None
            });
            let enough = Arc::clone(input);
            source.connect("enough-data", false, move |_| {
                enough.wants_data.store(false, Ordering::SeqCst);
                None
            });

            if let TrackOutputSettings::Video(video) = settings {
                let degrees = video.transform.rotation_degrees();
                if degrees != 0 {
                    let orientation = format!("rotate-{degrees}");
                    let mut tags = gst::TagList::new();
                    if let Some(tags) = tags.get_mut() {
                        tags.add::<gst::tags::ImageOrientation>(
                            &orientation.as_str(),
                            gst::TagMergeMode::Replace,
                        );
                    }
                    if !source.send_event(gst::event::Tag::new(tags)) {
                        tracing::warn!(track_id, degrees, "Rotation tag was not accepted");
                    }
                }
            }

            let _ = input.source.set(source);
        }
        Ok(())
    }
}

#[async_trait]
impl AssetWriter for GstWriter {
    fn output_path(&self) -> &Path {
        &self.path
    }

    fn container(&self) -> ContainerFormat {
        self.options.container
    }

    fn set_metadata(&mut self, items: Vec<MetadataItem>) {
        self.metadata = items;
    }

    fn can_add_input(&self, settings: &TrackOutputSettings) -> bool {
        if !self.shared.status.is(SessionStatus::Unknown) || settings.is_spatial() {
            return false;
        }
        match settings {
            TrackOutputSettings::Video(video) => {
                missing_elements(&[video_encoder_element(video.codec)]).is_empty()
            }
            TrackOutputSettings::Audio(audio) => {
                let Some(route) = audio.format_hint.as_ref().and_then(audio_passthrough) else {
                    return false;
                };
                if route.mov_only && self.options.container != ContainerFormat::Mov {
                    return false;
                }
                route
                    .parser
                    .map_or(true, |parser| missing_elements(&[parser]).is_empty())
            }
        }
    }

    fn add_input(
        &mut self,
        track_id: u32,
        settings: TrackOutputSettings,
    ) -> MediaResult<Box<dyn TrackInput>> {
        if !self.can_add_input(&settings) {
            return Err(MediaError::CannotAddInput {
                track_id,
                message: match &settings {
                    TrackOutputSettings::Audio(audio) => format!(
                        "audio {} cannot be passed through into {}",
                        audio
                            .format_hint
                            .as_ref()
                            .map(|f| f.codec.as_str())
                            .unwrap_or("of unknown format"),
                        self.options.container
                    ),
                    TrackOutputSettings::Video(_) => {
                        format!("{} output cannot be encoded by GStreamer", settings.kind())
                    }
                },
            });
        }
        let input = Arc::new(InputShared {
            source: OnceLock::new(),
            wants_data: AtomicBool::new(true),
            notify: Notify::new(),
        });
        self.inputs.push((track_id, settings, Arc::clone(&input)));
        Ok(Box::new(GstTrackInput {
            track_id,
            input,
            shared: Arc::clone(&self.shared),
            finished: false,
        }))
    }

    fn inputs_count(&self) -> usize {
        self.inputs.len()
    }

    fn start_writing(&mut self) -> MediaResult<()> {
        if !self.shared.status.is(SessionStatus::Unknown) {
            return Err(MediaError::InvalidState {
                operation: "start_writing",
                status: self.shared.status.get().to_string(),
            });
        }
        std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)?;

        if let Err(e) = self.start_pipeline() {
            self.shared.status.fail(e.to_string());
            self.shared.stop();
            if let Err(io) = std::fs::remove_file(&self.path) {
                tracing::warn!(path = %self.path.display(), error = %io, "Failed to remove unstarted output");
            }
            return Err(e);
        }
        self.shared.status.transition(SessionStatus::Writing);
        tracing::info!(
            path = %self.path.display(),
            container = %self.options.container,
            inputs = self.inputs.len(),
            "Writing started"
        );
        Ok(())
    }

    fn start_session(&mut self, at: MediaTime) {
        self.shared.start_ns.store(at.as_nanos(), Ordering::SeqCst);
    }

    async fn finish_writing(&mut self) -> MediaResult<()> {
        if !self.shared.status.is(SessionStatus::Writing) {
            return Err(MediaError::InvalidState {
                operation: "finish_writing",
                status: self.shared.status.get().to_string(),
            });
        }
        let Some(pipeline) = self.shared.pipeline.get().cloned() else {
            return Err(MediaError::writer("writer pipeline was never built"));
        };

        let status = self.shared.status.clone();
        let drained = tokio::task::spawn_blocking(move || drain(&pipeline, &status))
            .await
            .map_err(|e| MediaError::writer(format!("finalize task failed: {e}")))?;
        self.shared.stop();

        match drained {
            Ok(()) => {
                self.shared.status.transition(SessionStatus::Finished);
                tracing::info!(path = %self.path.display(), "Container finalized");
                Ok(())
            }
            Err(message) => {
                self.shared.status.fail(message.clone());
                Err(MediaError::writer(message))
            }
        }
    }

    fn cancel_writing(&self) {
        if self.shared.status.cancel() {
            self.shared.stop();
        }
    }

    fn status(&self) -> SessionStatus {
        self.shared.poll_bus_errors();
        self.shared.status.get()
    }

    fn error(&self) -> Option<String> {
        self.shared.status.error()
    }
}

impl Drop for GstWriter {
    fn drop(&mut self) {
        self.shared.stop();
    }
}

/// Wait for EOS to reach the sink so the muxer writes its index.
fn drain(pipeline: &gst::Pipeline, status: &SharedStatus) -> Result<(), String> {
    let Some(bus) = pipeline.bus() else {
        return Err("writer pipeline has no bus".into());
    };
    let start = Instant::now();
    loop {
        if status.is(SessionStatus::Cancelled) {
            return Err("writing was cancelled".into());
        }
        let elapsed = start.elapsed();
        if elapsed >= FINALIZE_TIMEOUT {
            return Err("container could not be finalized: EOS drain timed out".into());
        }
        let wait = (FINALIZE_TIMEOUT - elapsed).min(Duration::from_secs(1));
        let Some(message) = bus.timed_pop(gst::ClockTime::from_nseconds(wait.as_nanos() as u64))
        else {
            continue;
        };
        match message.view() {
            gst::MessageView::Eos(_) => {
                tracing::debug!("EOS received; writer drained");
                return Ok(());
            }
            gst::MessageView::Error(e) => {
                return Err(format!("container could not be finalized: {}", e.error()));
            }
            _ => {}
        }
    }
}

struct GstTrackInput {
    track_id: u32,
    input: Arc<InputShared>,
    shared: Arc<WriterShared>,
    finished: bool,
}

impl GstTrackInput {
    fn accepting(&self) -> bool {
        self.shared.poll_bus_errors();
        !self.finished && self.shared.status.is(SessionStatus::Writing)
    }

    fn to_buffer(&self, sample: &SampleBuffer) -> Option<gst::Buffer> {
        let data = match &sample.payload {
            SamplePayload::Image(pixels) => pixels.to_vec(),
            SamplePayload::Audio(audio) => audio.data.clone(),
            SamplePayload::Tagged(_) | SamplePayload::Empty => return None,
        };
        let start_ns = self.shared.start_ns.load(Ordering::SeqCst);
        let mut buffer = gst::Buffer::from_mut_slice(data);
        if let Some(buffer) = buffer.get_mut() {
            if sample.pts.is_valid() {
                buffer.set_pts(gst::ClockTime::from_nseconds(
                    sample.pts.as_nanos().saturating_sub(start_ns),
                ));
            }
            if sample.duration.is_valid() {
                buffer.set_duration(gst::ClockTime::from_nseconds(sample.duration.as_nanos()));
            }
        }
        Some(buffer)
    }
}

#[async_trait]
impl TrackInput for GstTrackInput {
    fn track_id(&self) -> u32 {
        self.track_id
    }

    async fn ready_for_more_data(&mut self) -> bool {
        loop {
            if !self.accepting() {
                return false;
            }
            if self.input.wants_data.load(Ordering::SeqCst) {
                return true;
            }
            let _ = tokio::time::timeout(READY_POLL, self.input.notify.notified()).await;
        }
    }

    fn append(&mut self, sample: SampleBuffer) -> bool {
        if !self.accepting() {
            return false;
        }
        let Some(source) = self.input.source.get() else {
            self.shared.status.fail("writer input was never connected");
            return false;
        };
        if matches!(sample.payload, SamplePayload::Empty) {
            return true;
        }
        let Some(buffer) = self.to_buffer(&sample) else {
            self.shared.status.fail(format!(
                "writer rejected sample at {:.3}s: track {} cannot encode tagged buffers",
                sample.pts.as_secs_f64(),
                self.track_id
            ));
            return false;
        };

        let flow = source.emit_by_name::<gst::FlowReturn>("push-buffer", &[&buffer]);
        if flow != gst::FlowReturn::Ok {
            self.shared.status.fail(format!(
                "writer rejected sample at {:.3}s: {flow:?}",
                sample.pts.as_secs_f64()
            ));
            return false;
        }
        true
    }

    fn mark_finished(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Some(source) = self.input.source.get() {
            let flow = source.emit_by_name::<gst::FlowReturn>("end-of-stream", &[]);
            tracing::debug!(track_id = self.track_id, ?flow, "Input marked finished");
        }
    }
}
