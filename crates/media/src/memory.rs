//! In-memory media toolkit.
//!
//! Assets are registered up front as lists of samples per track. Writers
//! buffer appended samples through a bounded channel (the same readiness
//! gate a real encoder exposes) and, on finish, write a JSON manifest of
//! everything they received to the output path. Faults can be injected on
//! both sides so failure and rollback paths are testable without a codec.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::asset::{Asset, ContainerFormat, MetadataItem};
use crate::buffer::{PixelBuffer, PixelFormat};
use crate::error::{MediaError, MediaResult};
use crate::geometry::Size;
use crate::sample::{AudioBuffer, Eye, SampleBuffer, SamplePayload, TaggedBuffer};
use crate::session::{
    AssetReader, AssetWriter, MediaToolkit, SessionStatus, SharedStatus, TrackInput, TrackOutput,
    WriterOptions,
};
use crate::settings::TrackOutputSettings;
use crate::time::MediaTime;
use crate::track::{AudioFormat, MediaKind, TrackDescriptor};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A registered source asset and its samples.
#[derive(Debug, Clone)]
pub struct MemoryAsset {
    pub asset: Asset,
    samples: HashMap<u32, Vec<SampleBuffer>>,
    read_failure: Option<(u32, usize)>,
}

impl MemoryAsset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            asset: Asset {
                path: path.into(),
                duration: MediaTime::ZERO,
                tracks: Vec::new(),
                metadata: Vec::new(),
            },
            samples: HashMap::new(),
            read_failure: None,
        }
    }

    pub fn with_metadata(mut self, item: MetadataItem) -> Self {
        self.asset.metadata.push(item);
        self
    }

    pub fn with_track(mut self, descriptor: TrackDescriptor, samples: Vec<SampleBuffer>) -> Self {
        if descriptor.duration > self.asset.duration {
            self.asset.duration = descriptor.duration;
        }
        self.samples.insert(descriptor.id, samples);
        self.asset.tracks.push(descriptor);
        self
    }

    /// Add a BGRA video track of solid-color frames.
    pub fn with_video(self, id: u32, size: Size, fps: u32, frames: usize) -> Self {
        let descriptor =
            TrackDescriptor::video(id, size, fps as f64, frame_time(frames, fps));
        self.with_track(descriptor, video_frames(size, fps, frames))
    }

    /// Add a stereo video track whose frames carry left and right eye buffers.
    pub fn with_stereo_video(self, id: u32, size: Size, fps: u32, frames: usize) -> Self {
        let mut descriptor =
            TrackDescriptor::video(id, size, fps as f64, frame_time(frames, fps));
        descriptor.stereo_eyes = vec![Eye::Left, Eye::Right];
        self.with_track(descriptor, stereo_frames(size, fps, frames))
    }

    /// Add a 48 kHz stereo PCM track split into 1024-frame chunks.
    pub fn with_audio(self, id: u32, chunks: usize) -> Self {
        let format = AudioFormat {
            codec: "lpcm".to_string(),
            sample_rate: AUDIO_RATE,
            channels: 2,
        };
        let duration = MediaTime::new((chunks * AUDIO_CHUNK) as i64, AUDIO_RATE as i32);
        self.with_track(
            TrackDescriptor::audio(id, format, duration),
            audio_chunks(chunks),
        )
    }

    /// Make the output for `track_id` fail after delivering `samples` samples.
    pub fn fail_reading_after(mut self, track_id: u32, samples: usize) -> Self {
        self.read_failure = Some((track_id, samples));
        self
    }

    pub fn path(&self) -> &Path {
        &self.asset.path
    }

    pub fn samples(&self, track_id: u32) -> &[SampleBuffer] {
        self.samples
            .get(&track_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn descriptor_mut(&mut self, track_id: u32) -> Option<&mut TrackDescriptor> {
        self.asset.tracks.iter_mut().find(|track| track.id == track_id)
    }
}

const AUDIO_RATE: u32 = 48_000;
const AUDIO_CHUNK: usize = 1024;

fn frame_time(index: usize, fps: u32) -> MediaTime {
    MediaTime::new(index as i64, fps.max(1) as i32)
}

/// Solid BGRA frames whose blue channel encodes the frame index.
pub fn video_frames(size: Size, fps: u32, frames: usize) -> Vec<SampleBuffer> {
    (0..frames)
        .map(|i| {
            let buffer = PixelBuffer::solid_bgra(size, [i as u8, 0x40, 0x80, 0xff]);
            SampleBuffer::image(frame_time(i, fps), frame_time(1, fps), buffer)
        })
        .collect()
}

/// Stereo frames: left eye is red, right eye is green.
pub fn stereo_frames(size: Size, fps: u32, frames: usize) -> Vec<SampleBuffer> {
    (0..frames)
        .map(|i| {
            let left = PixelBuffer::solid_bgra(size, [0x00, 0x00, 0xff, 0xff]);
            let right = PixelBuffer::solid_bgra(size, [0x00, 0xff, 0x00, 0xff]);
            SampleBuffer::tagged(
                frame_time(i, fps),
                frame_time(1, fps),
                vec![
                    TaggedBuffer::eye(Eye::Left, left),
                    TaggedBuffer::eye(Eye::Right, right),
                ],
            )
        })
        .collect()
}

pub fn audio_chunks(chunks: usize) -> Vec<SampleBuffer> {
    (0..chunks)
        .map(|i| {
            SampleBuffer::audio(
                MediaTime::new((i * AUDIO_CHUNK) as i64, AUDIO_RATE as i32),
                MediaTime::new(AUDIO_CHUNK as i64, AUDIO_RATE as i32),
                AudioBuffer {
                    sample_rate: AUDIO_RATE,
                    channels: 2,
                    data: vec![0; AUDIO_CHUNK * 4],
                },
            )
        })
        .collect()
}

/// Faults injected into every writer the toolkit opens.
#[derive(Debug, Clone, Default)]
pub struct WriterFaults {
    /// Reject appends once this many samples were accepted across all inputs.
    pub reject_after: Option<usize>,
    /// Fail inside `finish_writing`.
    pub fail_on_finish: bool,
    /// Refuse to attach inputs of this kind.
    pub refuse_inputs: Option<MediaKind>,
}

/// Summary of one sample received by a writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrittenSample {
    pub pts: MediaTime,
    pub payload: WrittenPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WrittenPayload {
    Image {
        size: Size,
        format: PixelFormat,
        first_pixel: Vec<u8>,
    },
    Tagged {
        layers: Vec<WrittenLayer>,
    },
    Audio {
        bytes: usize,
    },
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrittenLayer {
    pub eye: Option<Eye>,
    pub layer_id: Option<u32>,
    pub size: Option<Size>,
}

impl From<&SampleBuffer> for WrittenSample {
    fn from(sample: &SampleBuffer) -> Self {
        let payload = match &sample.payload {
            SamplePayload::Image(buffer) => WrittenPayload::Image {
                size: buffer.size(),
                format: buffer.format(),
                first_pixel: buffer.lock().iter().take(4).copied().collect(),
            },
            SamplePayload::Tagged(buffers) => WrittenPayload::Tagged {
                layers: buffers
                    .iter()
                    .map(|tagged| WrittenLayer {
                        eye: tagged.stereo_eye(),
                        layer_id: tagged.layer_id(),
                        size: tagged.pixel_buffer().map(PixelBuffer::size),
                    })
                    .collect(),
            },
            SamplePayload::Audio(audio) => WrittenPayload::Audio {
                bytes: audio.data.len(),
            },
            SamplePayload::Empty => WrittenPayload::Empty,
        };
        Self {
            pts: sample.pts,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrittenTrack {
    pub track_id: u32,
    pub settings: TrackOutputSettings,
    pub samples: Vec<WrittenSample>,
}

/// Manifest written to the output path when a writer finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrittenAsset {
    pub container: ContainerFormat,
    pub metadata: Vec<MetadataItem>,
    pub session_start: Option<MediaTime>,
    pub tracks: Vec<WrittenTrack>,
}

impl WrittenAsset {
    pub fn track(&self, track_id: u32) -> Option<&WrittenTrack> {
        self.tracks.iter().find(|track| track.track_id == track_id)
    }

    /// Read a manifest back from disk.
    pub fn load(path: &Path) -> MediaResult<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[derive(Default)]
struct ToolkitInner {
    assets: Mutex<HashMap<PathBuf, MemoryAsset>>,
    written: Mutex<HashMap<PathBuf, WrittenAsset>>,
    faults: Mutex<WriterFaults>,
}

/// Media toolkit backed by registered in-memory assets.
#[derive(Clone, Default)]
pub struct MemoryToolkit {
    inner: Arc<ToolkitInner>,
}

impl MemoryToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, asset: MemoryAsset) {
        lock(&self.inner.assets).insert(asset.path().to_path_buf(), asset);
    }

    pub fn set_writer_faults(&self, faults: WriterFaults) {
        *lock(&self.inner.faults) = faults;
    }

    /// Manifest of a successfully finished output.
    pub fn written(&self, path: &Path) -> Option<WrittenAsset> {
        lock(&self.inner.written).get(path).cloned()
    }
}

#[async_trait]
impl MediaToolkit for MemoryToolkit {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn check(&self) -> MediaResult<()> {
        Ok(())
    }

    async fn load_asset(&self, path: &Path) -> MediaResult<Asset> {
        lock(&self.inner.assets)
            .get(path)
            .map(|memory| memory.asset.clone())
            .ok_or_else(|| MediaError::Open {
                path: path.to_path_buf(),
                message: "no asset registered at this path".to_string(),
            })
    }

    fn open_reader(&self, asset: &Asset) -> MediaResult<Box<dyn AssetReader>> {
        let source = lock(&self.inner.assets)
            .get(&asset.path)
            .cloned()
            .ok_or_else(|| MediaError::Open {
                path: asset.path.clone(),
                message: "no asset registered at this path".to_string(),
            })?;
        Ok(Box::new(MemoryReader {
            source,
            status: SharedStatus::new(),
            outputs: Vec::new(),
            remaining: Arc::new(AtomicUsize::new(0)),
        }))
    }

    fn open_writer(&self, path: &Path, options: WriterOptions) -> MediaResult<Box<dyn AssetWriter>> {
        Ok(Box::new(MemoryWriter {
            path: path.to_path_buf(),
            options,
            status: SharedStatus::new(),
            metadata: Vec::new(),
            pending: Vec::new(),
            drains: Mutex::new(Vec::new()),
            finish_tx: None,
            session_start: None,
            faults: lock(&self.inner.faults).clone(),
            appended: Arc::new(AtomicUsize::new(0)),
            toolkit: Arc::clone(&self.inner),
        }))
    }
}

struct MemoryReader {
    source: MemoryAsset,
    status: SharedStatus,
    outputs: Vec<u32>,
    remaining: Arc<AtomicUsize>,
}

impl AssetReader for MemoryReader {
    fn can_add_output(&self, track: &TrackDescriptor) -> bool {
        self.status.is(SessionStatus::Unknown)
            && track.kind.is_eligible()
            && self.source.samples.contains_key(&track.id)
            && !self.outputs.contains(&track.id)
    }

    fn add_output(&mut self, track: &TrackDescriptor) -> MediaResult<Box<dyn TrackOutput>> {
        if !self.can_add_output(track) {
            return Err(MediaError::CannotAddOutput {
                track_id: track.id,
                message: format!("{} track cannot be read", track.kind),
            });
        }
        self.outputs.push(track.id);
        self.remaining.fetch_add(1, Ordering::SeqCst);
        let fail_after = self
            .source
            .read_failure
            .filter(|(id, _)| *id == track.id)
            .map(|(_, after)| after);
        Ok(Box::new(MemoryTrackOutput {
            track_id: track.id,
            samples: self.source.samples(track.id).iter().cloned().collect(),
            delivered: 0,
            fail_after,
            exhausted: false,
            status: self.status.clone(),
            remaining: Arc::clone(&self.remaining),
        }))
    }

    fn outputs_count(&self) -> usize {
        self.outputs.len()
    }

    fn start_reading(&mut self) -> MediaResult<()> {
        let status = self.status.get();
        if status != SessionStatus::Unknown {
            return Err(MediaError::InvalidState {
                operation: "start_reading",
                status: status.to_string(),
            });
        }
        self.status.transition(SessionStatus::Reading);
        Ok(())
    }

    fn status(&self) -> SessionStatus {
        self.status.get()
    }

    fn error(&self) -> Option<String> {
        self.status.error()
    }

    fn cancel_reading(&self) {
        self.status.cancel();
    }

    fn abort_with_error(&self, message: String) {
        self.status.fail(message);
    }
}

struct MemoryTrackOutput {
    track_id: u32,
    samples: VecDeque<SampleBuffer>,
    delivered: usize,
    fail_after: Option<usize>,
    exhausted: bool,
    status: SharedStatus,
    remaining: Arc<AtomicUsize>,
}

#[async_trait]
impl TrackOutput for MemoryTrackOutput {
    fn track_id(&self) -> u32 {
        self.track_id
    }

    async fn next_sample(&mut self) -> MediaResult<Option<SampleBuffer>> {
        tokio::task::yield_now().await;

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

        if self.fail_after.is_some_and(|after| self.delivered >= after) {
            let message = format!(
                "decode error in track {} after {} samples",
                self.track_id, self.delivered
            );
            self.status.fail(message.clone());
            return Err(MediaError::reader(message));
        }

        match self.samples.pop_front() {
            Some(sample) => {
                self.delivered += 1;
                Ok(Some(sample))
            }
            None => {
                if !self.exhausted {
                    self.exhausted = true;
                    if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                        self.status.transition(SessionStatus::Finished);
                    }
                }
                Ok(None)
            }
        }
    }
}

struct PendingInput {
    track_id: u32,
    settings: TrackOutputSettings,
    rx: Option<mpsc::Receiver<SampleBuffer>>,
}

struct MemoryWriter {
    path: PathBuf,
    options: WriterOptions,
    status: SharedStatus,
    metadata: Vec<MetadataItem>,
    pending: Vec<PendingInput>,
    drains: Mutex<Vec<JoinHandle<WrittenTrack>>>,
    finish_tx: Option<watch::Sender<bool>>,
    session_start: Option<MediaTime>,
    faults: WriterFaults,
    appended: Arc<AtomicUsize>,
    toolkit: Arc<ToolkitInner>,
}

/// Record samples for one input until its senders are gone or the writer
/// is finishing.
async fn drain_input(
    track_id: u32,
    settings: TrackOutputSettings,
    mut rx: mpsc::Receiver<SampleBuffer>,
    mut finishing: watch::Receiver<bool>,
) -> WrittenTrack {
    let mut samples = Vec::new();
    loop {
        tokio::select! {
            biased;
            sample = rx.recv() => match sample {
                Some(sample) => samples.push(WrittenSample::from(&sample)),
                None => break,
            },
            _ = finishing.changed() => {
                rx.close();
                while let Some(sample) = rx.recv().await {
                    samples.push(WrittenSample::from(&sample));
                }
                break;
            }
        }
    }
    WrittenTrack {
        track_id,
        settings,
        samples,
    }
}

#[async_trait]
impl AssetWriter for MemoryWriter {
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
        self.status.is(SessionStatus::Unknown)
            && self.faults.refuse_inputs != Some(settings.kind())
    }

    fn add_input(
        &mut self,
        track_id: u32,
        settings: TrackOutputSettings,
    ) -> MediaResult<Box<dyn TrackInput>> {
        if !self.can_add_input(&settings) {
            return Err(MediaError::CannotAddInput {
                track_id,
                message: format!("{} output settings not accepted", settings.kind()),
            });
        }
        let (tx, rx) = mpsc::channel(self.options.queue_depth.max(1));
        self.pending.push(PendingInput {
            track_id,
            settings,
            rx: Some(rx),
        });
        Ok(Box::new(MemoryTrackInput {
            track_id,
            tx: Some(tx),
            permit: None,
            status: self.status.clone(),
            reject_after: self.faults.reject_after,
            appended: Arc::clone(&self.appended),
        }))
    }

    fn inputs_count(&self) -> usize {
        self.pending.len()
    }

    fn start_writing(&mut self) -> MediaResult<()> {
        let status = self.status.get();
        if status != SessionStatus::Unknown {
            return Err(MediaError::InvalidState {
                operation: "start_writing",
                status: status.to_string(),
            });
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| MediaError::writer(format!("no async runtime: {e}")))?;

        std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)?;

        let (finish_tx, finish_rx) = watch::channel(false);
        let mut drains = lock(&self.drains);
        for input in &mut self.pending {
            if let Some(rx) = input.rx.take() {
                drains.push(runtime.spawn(drain_input(
                    input.track_id,
                    input.settings.clone(),
                    rx,
                    finish_rx.clone(),
                )));
            }
        }
        drop(drains);
        self.finish_tx = Some(finish_tx);
        self.status.transition(SessionStatus::Writing);
        Ok(())
    }

    fn start_session(&mut self, at: MediaTime) {
        self.session_start = Some(at);
    }

    async fn finish_writing(&mut self) -> MediaResult<()> {
        let status = self.status.get();
        if status != SessionStatus::Writing {
            return Err(MediaError::InvalidState {
                operation: "finish_writing",
                status: status.to_string(),
            });
        }
        if let Some(finish_tx) = self.finish_tx.take() {
            finish_tx.send_replace(true);
        }

        let handles = std::mem::take(&mut *lock(&self.drains));
        let mut tracks = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(track) => tracks.push(track),
                Err(e) => {
                    let message = format!("input drain task ended abnormally: {e}");
                    self.status.fail(message.clone());
                    return Err(MediaError::writer(message));
                }
            }
        }

        if self.faults.fail_on_finish {
            let message = "container could not be finalized".to_string();
            self.status.fail(message.clone());
            return Err(MediaError::writer(message));
        }

        let written = WrittenAsset {
            container: self.options.container,
            metadata: self.metadata.clone(),
            session_start: self.session_start,
            tracks,
        };
        if let Err(e) = std::fs::write(&self.path, serde_json::to_vec_pretty(&written)?) {
            self.status.fail(e.to_string());
            return Err(e.into());
        }
        self.status.transition(SessionStatus::Finished);
        tracing::debug!(
            path = %self.path.display(),
            tracks = written.tracks.len(),
            "In-memory container finalized"
        );
        lock(&self.toolkit.written).insert(self.path.clone(), written);
        Ok(())
    }

    fn cancel_writing(&self) {
        self.status.cancel();
        for handle in lock(&self.drains).drain(..) {
            handle.abort();
        }
    }

    fn status(&self) -> SessionStatus {
        self.status.get()
    }

    fn error(&self) -> Option<String> {
        self.status.error()
    }
}

struct MemoryTrackInput {
    track_id: u32,
    tx: Option<mpsc::Sender<SampleBuffer>>,
    permit: Option<mpsc::OwnedPermit<SampleBuffer>>,
    status: SharedStatus,
    reject_after: Option<usize>,
    appended: Arc<AtomicUsize>,
}

#[async_trait]
impl TrackInput for MemoryTrackInput {
    fn track_id(&self) -> u32 {
        self.track_id
    }

    async fn ready_for_more_data(&mut self) -> bool {
        if !self.status.is(SessionStatus::Writing) {
            return false;
        }
        if self.permit.is_some() {
            return true;
        }
        let Some(tx) = self.tx.clone() else {
            return false;
        };
        match tx.reserve_owned().await {
            Ok(permit) => {
                self.permit = Some(permit);
                self.status.is(SessionStatus::Writing)
            }
            Err(_) => false,
        }
    }

    fn append(&mut self, sample: SampleBuffer) -> bool {
        if !self.status.is(SessionStatus::Writing) {
            return false;
        }
        if let Some(limit) = self.reject_after {
            if self.appended.load(Ordering::SeqCst) >= limit {
                self.status.fail(format!(
                    "writer rejected sample at {} on track {}",
                    sample.pts, self.track_id
                ));
                return false;
            }
        }
        let sent = match self.permit.take() {
            Some(permit) => {
                permit.send(sample);
                true
            }
            None => self
                .tx
                .as_ref()
                .is_some_and(|tx| tx.try_send(sample).is_ok()),
        };
        if sent {
            self.appended.fetch_add(1, Ordering::SeqCst);
        }
        sent
    }

    fn mark_finished(&mut self) {
        self.permit = None;
        self.tx = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::AudioOutputSettings;

    fn audio_settings() -> TrackOutputSettings {
        TrackOutputSettings::Audio(AudioOutputSettings { format_hint: None })
    }

    #[tokio::test]
    async fn test_reader_delivers_samples_in_order() {
        let toolkit = MemoryToolkit::new();
        toolkit.register(MemoryAsset::new("/in/clip.mov").with_video(1, Size::new(4, 4), 30, 3));
        let asset = toolkit.load_asset(Path::new("/in/clip.mov")).await.unwrap();

        let mut reader = toolkit.open_reader(&asset).unwrap();
        let mut output = reader.add_output(&asset.tracks[0]).unwrap();
        reader.start_reading().unwrap();

        let mut pts = Vec::new();
        while let Some(sample) = output.next_sample().await.unwrap() {
            pts.push(sample.pts);
        }
        assert_eq!(pts, vec![frame_time(0, 30), frame_time(1, 30), frame_time(2, 30)]);
        assert_eq!(reader.status(), SessionStatus::Finished);
    }

    #[tokio::test]
    async fn test_read_failure_marks_reader_failed() {
        let toolkit = MemoryToolkit::new();
        toolkit.register(
            MemoryAsset::new("/in/clip.mov")
                .with_video(1, Size::new(4, 4), 30, 5)
                .fail_reading_after(1, 2),
        );
        let asset = toolkit.load_asset(Path::new("/in/clip.mov")).await.unwrap();
        let mut reader = toolkit.open_reader(&asset).unwrap();
        let mut output = reader.add_output(&asset.tracks[0]).unwrap();
        reader.start_reading().unwrap();

        assert!(output.next_sample().await.unwrap().is_some());
        assert!(output.next_sample().await.unwrap().is_some());
        assert!(output.next_sample().await.is_err());
        assert_eq!(reader.status(), SessionStatus::Failed);
    }

    #[tokio::test]
    async fn test_writer_records_appended_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.mov");
        let toolkit = MemoryToolkit::new();
        let mut writer = toolkit
            .open_writer(
                &path,
                WriterOptions {
                    container: ContainerFormat::Mov,
                    queue_depth: 1,
                },
            )
            .unwrap();
        let mut input = writer.add_input(7, audio_settings()).unwrap();
        writer.start_writing().unwrap();
        writer.start_session(MediaTime::ZERO);

        for sample in audio_chunks(4) {
            assert!(input.ready_for_more_data().await);
            assert!(input.append(sample));
        }
        input.mark_finished();
        drop(input);
        writer.finish_writing().await.unwrap();

        assert_eq!(writer.status(), SessionStatus::Finished);
        let written = toolkit.written(&path).unwrap();
        assert_eq!(written.track(7).unwrap().samples.len(), 4);
        assert_eq!(WrittenAsset::load(&path).unwrap(), written);
    }

    #[tokio::test]
    async fn test_writer_rejects_after_limit() {
        let dir = tempfile::tempdir().unwrap();
        let toolkit = MemoryToolkit::new();
        toolkit.set_writer_faults(WriterFaults {
            reject_after: Some(2),
            ..Default::default()
        });
        let mut writer = toolkit
            .open_writer(
                &dir.path().join("out.mp4"),
                WriterOptions {
                    container: ContainerFormat::Mp4,
                    queue_depth: 8,
                },
            )
            .unwrap();
        let mut input = writer.add_input(1, audio_settings()).unwrap();
        writer.start_writing().unwrap();

        let mut accepted = 0;
        for sample in audio_chunks(5) {
            if !input.ready_for_more_data().await || !input.append(sample) {
                break;
            }
            accepted += 1;
        }
        assert_eq!(accepted, 2);
        assert_eq!(writer.status(), SessionStatus::Failed);
        assert!(writer.error().is_some());
    }

    #[tokio::test]
    async fn test_cancel_unblocks_readiness() {
        let dir = tempfile::tempdir().unwrap();
        let toolkit = MemoryToolkit::new();
        let mut writer = toolkit
            .open_writer(
                &dir.path().join("out.mov"),
                WriterOptions {
                    container: ContainerFormat::Mov,
                    queue_depth: 1,
                },
            )
            .unwrap();
        let mut input = writer.add_input(1, audio_settings()).unwrap();
        writer.start_writing().unwrap();
        writer.cancel_writing();

        assert!(!input.ready_for_more_data().await);
        assert_eq!(writer.status(), SessionStatus::Cancelled);
    }

    #[test]
    fn test_refused_input_kind() {
        let toolkit = MemoryToolkit::new();
        toolkit.set_writer_faults(WriterFaults {
            refuse_inputs: Some(MediaKind::Audio),
            ..Default::default()
        });
        let mut writer = toolkit
            .open_writer(
                Path::new("/nowhere/out.mov"),
                WriterOptions {
                    container: ContainerFormat::Mov,
                    queue_depth: 1,
                },
            )
            .unwrap();
        assert!(matches!(
            writer.add_input(2, audio_settings()),
            Err(MediaError::CannotAddInput { track_id: 2, .. })
        ));
    }
}
