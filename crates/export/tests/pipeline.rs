use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use vidscale_common::VidscaleError;
use vidscale_export::{
    CodecSelector, ExportOptions, ExportOutcome, ExportRequest, ExportSession, TrackSummary,
};
use vidscale_gpu::{Accelerator, SoftwareAccelerator, SoftwareFault};
use vidscale_media::memory::{
    stereo_frames, video_frames, MemoryAsset, MemoryToolkit, WriterFaults, WrittenAsset,
    WrittenPayload,
};
use vidscale_media::{
    ContainerFormat, Eye, MediaKind, MediaTime, MetadataItem, SampleBuffer, SamplePayload, Size,
    TaggedBuffer, TrackDescriptor, VideoCodec,
};

struct Fixture {
    dir: TempDir,
    toolkit: MemoryToolkit,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
            toolkit: MemoryToolkit::new(),
        }
    }

    /// Create the input file on disk and register its contents.
    fn input(&self, name: &str, build: impl FnOnce(MemoryAsset) -> MemoryAsset) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"").expect("input file should be writable");
        self.toolkit.register(build(MemoryAsset::new(&path)));
        path
    }

    async fn session(
        &self,
        request: ExportRequest,
        accelerator: SoftwareAccelerator,
    ) -> Result<ExportSession, VidscaleError> {
        let accelerator: Arc<dyn Accelerator> = Arc::new(accelerator);
        ExportSession::prepare(
            Arc::new(self.toolkit.clone()),
            accelerator,
            request,
            &ExportOptions::default(),
        )
        .await
    }

    async fn export(&self, request: ExportRequest) -> (PathBuf, Result<ExportOutcome, VidscaleError>) {
        self.export_with(request, SoftwareAccelerator::new()).await
    }

    async fn export_with(
        &self,
        request: ExportRequest,
        accelerator: SoftwareAccelerator,
    ) -> (PathBuf, Result<ExportOutcome, VidscaleError>) {
        let session = self
            .session(request, accelerator)
            .await
            .expect("export should prepare");
        let output = session.spec().output.clone();
        (output, session.export().await)
    }
}

fn written(path: &Path) -> WrittenAsset {
    WrittenAsset::load(path).expect("output manifest should load")
}

fn timecode_track(id: u32) -> TrackDescriptor {
    let mut track = TrackDescriptor::video(id, Size::new(0, 0), 0.0, MediaTime::new(1, 1));
    track.kind = MediaKind::Timecode;
    track
}

#[tokio::test]
async fn exports_every_eligible_track() {
    let fixture = Fixture::new();
    let input = fixture.input("clip.mp4", |asset| {
        asset
            .with_metadata(MetadataItem::new("com.apple.quicktime.make", "Vidscale"))
            .with_video(1, Size::new(8, 6), 30, 12)
            .with_audio(2, 20)
            .with_track(timecode_track(3), Vec::new())
    });

    let session = fixture
        .session(ExportRequest::new(&input), SoftwareAccelerator::new())
        .await
        .expect("export should prepare");
    let progress = session.progress();
    let outcome = session.export().await.expect("export should succeed");

    let output = input.with_file_name("clip_upscaled.mp4");
    assert_eq!(
        outcome,
        ExportOutcome::Completed {
            output: output.clone(),
            tracks: vec![
                TrackSummary {
                    track_id: 1,
                    kind: MediaKind::Video,
                    samples: 12
                },
                TrackSummary {
                    track_id: 2,
                    kind: MediaKind::Audio,
                    samples: 20
                },
            ],
        }
    );
    assert!(progress.is_complete());
    assert_eq!(progress.completed_units(), progress.total_units());

    let manifest = written(&output);
    assert_eq!(manifest.container, ContainerFormat::Mp4);
    assert_eq!(manifest.session_start, Some(MediaTime::ZERO));
    assert_eq!(manifest.metadata[0].key, "com.apple.quicktime.make");
    assert_eq!(manifest.tracks.len(), 2);
    assert!(manifest.track(3).is_none());

    let video = manifest.track(1).expect("video track");
    let settings = video.settings.video().expect("video settings");
    assert_eq!(settings.size, Size::new(16, 12));
    assert_eq!(settings.codec, VideoCodec::Hevc);
    assert_eq!(settings.frame_rate, 30.0);
    for (i, sample) in video.samples.iter().enumerate() {
        assert_eq!(sample.pts, MediaTime::new(i as i64, 30));
        match &sample.payload {
            WrittenPayload::Image {
                size, first_pixel, ..
            } => {
                assert_eq!(*size, Size::new(16, 12));
                assert_eq!(first_pixel[0], i as u8);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    let audio = manifest.track(2).expect("audio track");
    assert_eq!(audio.samples.len(), 20);
    assert!(audio
        .samples
        .iter()
        .all(|sample| matches!(sample.payload, WrittenPayload::Audio { bytes: 4096 })));
}

#[tokio::test]
async fn explicit_size_and_source_codec() {
    let fixture = Fixture::new();
    let input = fixture.input("portrait.m4v", |asset| {
        let mut asset = asset.with_video(1, Size::new(6, 8), 24, 3);
        asset.descriptor_mut(1).expect("track").codec = Some(VideoCodec::H264);
        asset
    });

    let mut request = ExportRequest::new(&input);
    request.height = Some(20);
    let (output, result) = fixture.export(request).await;
    result.expect("export should succeed");

    let manifest = written(&output);
    assert_eq!(manifest.container, ContainerFormat::M4v);
    let settings = manifest.track(1).expect("video").settings.clone();
    let settings = settings.video().expect("video settings");
    assert_eq!(settings.size, Size::new(15, 20));
    assert_eq!(settings.codec, VideoCodec::H264);
}

#[tokio::test]
async fn large_output_switches_to_prores_and_mov() {
    let fixture = Fixture::new();
    let input = fixture.input("wide.mp4", |asset| asset.with_video(1, Size::new(2000, 1200), 30, 1));

    let mut request = ExportRequest::new(&input);
    request.codec = Some(CodecSelector::Hevc);
    let session = fixture
        .session(request, SoftwareAccelerator::new())
        .await
        .expect("export should prepare");
    assert_eq!(session.spec().codec, CodecSelector::Hevc);
    assert_eq!(session.spec().video_codecs, vec![VideoCodec::ProRes422]);
    let output = session.spec().output.clone();
    session.export().await.expect("export should succeed");

    assert_eq!(output, input.with_file_name("wide_upscaled.mov"));
    let manifest = written(&output);
    assert_eq!(manifest.container, ContainerFormat::Mov);
    assert_eq!(
        manifest.track(1).and_then(|t| t.settings.video().map(|v| v.codec)),
        Some(VideoCodec::ProRes422)
    );
}

#[tokio::test]
async fn stereo_layers_are_upscaled_together() {
    let fixture = Fixture::new();
    let input = fixture.input("spatial.mov", |asset| {
        asset.with_stereo_video(1, Size::new(4, 4), 30, 5).with_audio(2, 3)
    });

    let (output, result) = fixture.export(ExportRequest::new(&input)).await;
    result.expect("export should succeed");

    let manifest = written(&output);
    let video = manifest.track(1).expect("video");
    let settings = video.settings.video().expect("video settings");
    assert_eq!(settings.spatial.as_ref().map(|s| s.layer_ids), Some([0, 1]));
    assert_eq!(video.samples.len(), 5);
    for sample in &video.samples {
        let WrittenPayload::Tagged { layers } = &sample.payload else {
            panic!("expected tagged payload");
        };
        let mut ids: Vec<_> = layers.iter().filter_map(|layer| layer.layer_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(layers[0].eye, Some(Eye::Left));
        assert_eq!(layers[1].eye, Some(Eye::Right));
        assert!(layers
            .iter()
            .all(|layer| layer.size == Some(Size::new(8, 8))));
    }
}

#[tokio::test]
async fn cancellation_mid_stream_removes_output() {
    let fixture = Fixture::new();
    let input = fixture.input("long.mp4", |asset| {
        asset.with_video(1, Size::new(4, 4), 30, 20_000).with_audio(2, 2_000)
    });

    let session = fixture
        .session(ExportRequest::new(&input), SoftwareAccelerator::new())
        .await
        .expect("export should prepare");
    let output = session.spec().output.clone();
    let progress = session.progress();
    let cancel = session.cancellation_token();
    let export = tokio::spawn(session.export());

    while progress.completed_units() == 0.0 {
        tokio::task::yield_now().await;
    }
    assert!(output.exists());
    cancel.cancel();

    let outcome = export
        .await
        .expect("export task should not panic")
        .expect("cancellation is not an error");
    assert_eq!(outcome, ExportOutcome::Cancelled);
    assert!(!output.exists());
    assert!(!progress.is_complete());
}

#[tokio::test]
async fn cancellation_before_start_removes_output() {
    let fixture = Fixture::new();
    let input = fixture.input("clip.mov", |asset| asset.with_video(1, Size::new(4, 4), 30, 10));

    let session = fixture
        .session(ExportRequest::new(&input), SoftwareAccelerator::new())
        .await
        .expect("export should prepare");
    let output = session.spec().output.clone();
    session.cancellation_token().cancel();

    assert_eq!(
        session.export().await.expect("cancellation is not an error"),
        ExportOutcome::Cancelled
    );
    assert!(!output.exists());
}

#[tokio::test]
async fn missing_image_buffer_fails_whole_export() {
    let fixture = Fixture::new();
    let input = fixture.input("broken.mp4", |asset| {
        let size = Size::new(4, 4);
        let mut frames = video_frames(size, 30, 6);
        frames[3].payload = SamplePayload::Empty;
        asset
            .with_track(TrackDescriptor::video(1, size, 30.0, MediaTime::new(6, 30)), frames)
            .with_audio(2, 4)
    });

    let (output, result) = fixture.export(ExportRequest::new(&input)).await;
    let err = result.expect_err("export should fail");
    assert!(matches!(err, VidscaleError::Track { track_id: 1, .. }), "{err}");
    assert!(err.to_string().contains("no image buffer"));
    assert!(!output.exists());
}

#[tokio::test]
async fn missing_eye_fails_whole_export() {
    let fixture = Fixture::new();
    let input = fixture.input("spatial.mov", |asset| {
        let size = Size::new(4, 4);
        let mut frames = stereo_frames(size, 30, 4);
        frames[2] = SampleBuffer::tagged(
            frames[2].pts,
            frames[2].duration,
            vec![TaggedBuffer::eye(
                Eye::Left,
                vidscale_media::PixelBuffer::solid_bgra(size, [0, 0, 0, 255]),
            )],
        );
        let mut track = TrackDescriptor::video(1, size, 30.0, MediaTime::new(4, 30));
        track.stereo_eyes = vec![Eye::Left, Eye::Right];
        asset.with_track(track, frames)
    });

    let (output, result) = fixture.export(ExportRequest::new(&input)).await;
    let err = result.expect_err("export should fail");
    assert!(err.to_string().contains("left or right eye"), "{err}");
    assert!(!output.exists());
}

#[tokio::test]
async fn gpu_execution_failure_fails_whole_export() {
    let fixture = Fixture::new();
    let input = fixture.input("clip.mp4", |asset| {
        asset.with_video(1, Size::new(4, 4), 30, 10).with_audio(2, 10)
    });

    let (output, result) = fixture
        .export_with(
            ExportRequest::new(&input),
            SoftwareAccelerator::with_fault(SoftwareFault::ExecutionAfter(3)),
        )
        .await;
    let err = result.expect_err("export should fail");
    assert!(matches!(err, VidscaleError::Track { track_id: 1, .. }), "{err}");
    assert!(!output.exists());
}

#[tokio::test]
async fn engine_construction_failure_is_reported_before_writing() {
    let fixture = Fixture::new();
    let input = fixture.input("clip.mp4", |asset| asset.with_video(1, Size::new(4, 4), 30, 3));

    let (output, result) = fixture
        .export_with(
            ExportRequest::new(&input),
            SoftwareAccelerator::with_fault(SoftwareFault::ScalerCreation),
        )
        .await;
    let err = result.expect_err("export should fail");
    assert!(err.to_string().contains("upscale engine"), "{err}");
    assert!(!output.exists());
}

#[tokio::test]
async fn read_failure_fails_whole_export() {
    let fixture = Fixture::new();
    let input = fixture.input("clip.mp4", |asset| {
        asset
            .with_video(1, Size::new(4, 4), 30, 10)
            .with_audio(2, 10)
            .fail_reading_after(2, 4)
    });

    let (output, result) = fixture.export(ExportRequest::new(&input)).await;
    let err = result.expect_err("export should fail");
    assert!(matches!(err, VidscaleError::Track { .. }), "{err}");
    assert!(!output.exists());
}

#[tokio::test]
async fn writer_rejection_fails_whole_export() {
    let fixture = Fixture::new();
    let input = fixture.input("clip.mp4", |asset| {
        asset.with_video(1, Size::new(4, 4), 30, 10).with_audio(2, 10)
    });
    fixture.toolkit.set_writer_faults(WriterFaults {
        reject_after: Some(5),
        ..WriterFaults::default()
    });

    let (output, result) = fixture.export(ExportRequest::new(&input)).await;
    let err = result.expect_err("export should fail");
    assert!(err.to_string().contains("writer rejected"), "{err}");
    assert!(!output.exists());
}

#[tokio::test]
async fn finalize_failure_removes_output() {
    let fixture = Fixture::new();
    let input = fixture.input("clip.mp4", |asset| asset.with_video(1, Size::new(4, 4), 30, 3));
    fixture.toolkit.set_writer_faults(WriterFaults {
        fail_on_finish: true,
        ..WriterFaults::default()
    });

    let (output, result) = fixture.export(ExportRequest::new(&input)).await;
    assert!(result.is_err());
    assert!(!output.exists());
    assert!(fixture.toolkit.written(&output).is_none());
}

#[tokio::test]
async fn refused_track_is_a_setup_error() {
    let fixture = Fixture::new();
    let input = fixture.input("clip.mp4", |asset| {
        asset.with_video(1, Size::new(4, 4), 30, 3).with_audio(2, 3)
    });
    fixture.toolkit.set_writer_faults(WriterFaults {
        refuse_inputs: Some(MediaKind::Audio),
        ..WriterFaults::default()
    });

    let (output, result) = fixture.export(ExportRequest::new(&input)).await;
    assert!(matches!(result, Err(VidscaleError::Setup { .. })));
    assert!(!output.exists());
}

#[tokio::test]
async fn existing_output_is_rejected_up_front() {
    let fixture = Fixture::new();
    let input = fixture.input("clip.mp4", |asset| asset.with_video(1, Size::new(4, 4), 30, 3));
    let existing = input.with_file_name("clip_upscaled.mp4");
    std::fs::write(&existing, b"keep me").expect("write existing output");

    let err = fixture
        .session(ExportRequest::new(&input), SoftwareAccelerator::new())
        .await
        .err()
        .expect("prepare should fail");
    assert!(matches!(err, VidscaleError::OutputAlreadyExists { .. }));
    assert_eq!(std::fs::read(&existing).expect("read"), b"keep me");
}

#[tokio::test]
async fn output_created_after_prepare_is_not_overwritten() {
    let fixture = Fixture::new();
    let input = fixture.input("clip.mp4", |asset| asset.with_video(1, Size::new(4, 4), 30, 3));

    let session = fixture
        .session(ExportRequest::new(&input), SoftwareAccelerator::new())
        .await
        .expect("export should prepare");
    let output = session.spec().output.clone();
    std::fs::write(&output, b"keep me").expect("write competing output");

    assert!(matches!(
        session.export().await,
        Err(VidscaleError::OutputAlreadyExists { .. })
    ));
    assert_eq!(std::fs::read(&output).expect("read"), b"keep me");
}

#[tokio::test]
async fn validation_errors() {
    let fixture = Fixture::new();

    let missing = fixture.dir.path().join("missing.mp4");
    let err = fixture
        .session(ExportRequest::new(&missing), SoftwareAccelerator::new())
        .await
        .err()
        .expect("missing input");
    assert!(matches!(err, VidscaleError::InputNotFound { .. }));

    let mkv = fixture.input("clip.mkv", |asset| asset.with_video(1, Size::new(4, 4), 30, 1));
    let err = fixture
        .session(ExportRequest::new(&mkv), SoftwareAccelerator::new())
        .await
        .err()
        .expect("unsupported extension");
    assert!(matches!(err, VidscaleError::UnsupportedExtension { .. }));

    let audio_only = fixture.input("audio.mov", |asset| asset.with_audio(1, 3));
    let err = fixture
        .session(ExportRequest::new(&audio_only), SoftwareAccelerator::new())
        .await
        .err()
        .expect("no video track");
    assert!(matches!(err, VidscaleError::NoVideoTrack { .. }));

    let input = fixture.input("clip.mp4", |asset| asset.with_video(1, Size::new(4, 4), 30, 1));
    let mut request = ExportRequest::new(&input);
    request.width = Some(20_000);
    let err = fixture
        .session(request, SoftwareAccelerator::new())
        .await
        .err()
        .expect("too wide");
    assert!(matches!(err, VidscaleError::DimensionTooLarge { axis: "width", .. }));
}

#[tokio::test]
async fn creator_tag_does_not_block_completion() {
    let fixture = Fixture::new();
    let input = fixture.input("clip.mov", |asset| asset.with_video(1, Size::new(4, 4), 30, 2));

    let mut request = ExportRequest::new(&input);
    request.creator = Some("vidscale-tests".to_string());
    let (output, result) = fixture.export(request).await;
    assert!(matches!(result, Ok(ExportOutcome::Completed { .. })));

    if let Ok(tag) = vidscale_export::read_creator_tag(&output) {
        assert_eq!(tag.as_deref(), Some("vidscale-tests"));
    }
}
