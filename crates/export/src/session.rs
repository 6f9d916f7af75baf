//! Export session: owns one export from validation to commit or rollback.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use vidscale_common::{AppConfig, VidscaleError, VidscaleResult};
use vidscale_gpu::{Accelerator, Upscaler};
use vidscale_media::{
    Asset, AssetReader, AssetWriter, ContainerFormat, MediaKind, MediaTime, MediaToolkit,
    SessionStatus, TrackDescriptor, TrackOutputSettings, WriterOptions,
};

use crate::metadata::write_creator_tag;
use crate::policy::{
    derive_output_path, resolve_codec, resolve_output_path, resolve_output_size,
    resolve_track_settings, validate_input, CodecSelector, ExportSpec, FormatLimits,
};
use crate::progress::{ProgressTree, ProgressWeights};
use crate::transform::{FrameTransform, Passthrough, SpatialUpscaleTransform, UpscaleTransform};
use crate::worker::{TrackOutcome, TrackWorker};

/// What the caller asked for.
#[derive(Debug, Clone, Default)]
pub struct ExportRequest {
    pub input: PathBuf,
    /// Explicit destination; derived from the input name when absent.
    pub output: Option<PathBuf>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Falls back to the configured default codec.
    pub codec: Option<CodecSelector>,
    pub creator: Option<String>,
}

impl ExportRequest {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            ..Self::default()
        }
    }
}

/// Tunables taken from the application config.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub output_suffix: String,
    pub default_scale: u32,
    pub default_codec: CodecSelector,
    pub queue_depth: usize,
    pub weights: ProgressWeights,
    pub limits: FormatLimits,
}

impl ExportOptions {
    pub fn from_config(config: &AppConfig) -> VidscaleResult<Self> {
        Ok(Self {
            output_suffix: config.export.output_suffix.clone(),
            default_scale: config.export.default_scale.max(1),
            default_codec: config.export.codec.parse()?,
            queue_depth: config.export.writer_queue_depth.max(1),
            weights: ProgressWeights::from(&config.export),
            limits: FormatLimits::from(&config.limits),
        })
    }
}

impl Default for ExportOptions {
    fn default() -> Self {
        let config = AppConfig::default();
        Self {
            output_suffix: config.export.output_suffix,
            default_scale: config.export.default_scale,
            default_codec: CodecSelector::Source,
            queue_depth: config.export.writer_queue_depth,
            weights: ProgressWeights::default(),
            limits: FormatLimits::default(),
        }
    }
}

/// Per-track result of a completed export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackSummary {
    pub track_id: u32,
    pub kind: MediaKind,
    pub samples: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExportOutcome {
    Completed {
        output: PathBuf,
        tracks: Vec<TrackSummary>,
    },
    Cancelled,
}

/// What to do with the output once every worker has stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionDecision {
    Commit,
    RollBackFailed,
    RollBackCancelled,
}

impl SessionDecision {
    /// Failure on either side wins over cancellation.
    pub fn decide(reader: SessionStatus, writer: SessionStatus) -> Self {
        if reader == SessionStatus::Failed || writer == SessionStatus::Failed {
            SessionDecision::RollBackFailed
        } else if reader == SessionStatus::Cancelled || writer == SessionStatus::Cancelled {
            SessionDecision::RollBackCancelled
        } else {
            SessionDecision::Commit
        }
    }
}

/// A validated export, ready to run.
pub struct ExportSession {
    toolkit: Arc<dyn MediaToolkit>,
    accelerator: Arc<dyn Accelerator>,
    asset: Asset,
    spec: ExportSpec,
    queue_depth: usize,
    progress: ProgressTree,
    cancel: CancellationToken,
}

impl ExportSession {
    /// Validate `request` against the input and resolve the output format.
    ///
    /// Nothing is written; failures here are validation errors.
    pub async fn prepare(
        toolkit: Arc<dyn MediaToolkit>,
        accelerator: Arc<dyn Accelerator>,
        request: ExportRequest,
        options: &ExportOptions,
    ) -> VidscaleResult<Self> {
        validate_input(&request.input)?;
        let asset = toolkit.load_asset(&request.input).await?;

        let Some(primary) = asset.video_tracks().next() else {
            return Err(VidscaleError::NoVideoTrack {
                path: request.input.clone(),
            });
        };
        let output_size = resolve_output_size(
            primary.natural_size,
            request.width,
            request.height,
            options.default_scale,
            &options.limits,
        )?;

        let codec = request.codec.unwrap_or(options.default_codec);
        let codecs: Vec<_> = asset
            .video_tracks()
            .map(|track| resolve_codec(codec, track.codec, output_size, &options.limits))
            .collect();
        let output = request
            .output
            .clone()
            .unwrap_or_else(|| derive_output_path(&request.input, &options.output_suffix));
        let output = resolve_output_path(&output, codecs.iter().copied());
        if output.exists() {
            return Err(VidscaleError::OutputAlreadyExists { path: output });
        }

        tracing::info!(
            input = %request.input.display(),
            output = %output.display(),
            width = output_size.width,
            height = output_size.height,
            codec = %codecs.first().map(ToString::to_string).unwrap_or_default(),
            tracks = asset.eligible_tracks().count(),
            "Export prepared"
        );

        Ok(Self {
            toolkit,
            accelerator,
            asset,
            spec: ExportSpec {
                input: request.input,
                output,
                codec,
                video_codecs: codecs,
                output_size,
                creator: request.creator,
                limits: options.limits,
            },
            queue_depth: options.queue_depth,
            progress: ProgressTree::new(options.weights),
            cancel: CancellationToken::new(),
        })
    }

    pub fn spec(&self) -> &ExportSpec {
        &self.spec
    }

    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    /// Progress handle; poll it from any task while the export runs.
    pub fn progress(&self) -> ProgressTree {
        self.progress.clone()
    }

    /// Cancelling this token stops every worker and rolls the output back.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the export to completion.
    pub async fn export(self) -> VidscaleResult<ExportOutcome> {
        let output = self.spec.output.clone();
        if output.exists() {
            return Err(VidscaleError::OutputAlreadyExists { path: output });
        }

        let mut reader = self.toolkit.open_reader(&self.asset)?;
        let mut writer = self.toolkit.open_writer(
            &output,
            WriterOptions {
                container: ContainerFormat::for_path(&output),
                queue_depth: self.queue_depth,
            },
        )?;
        writer.set_metadata(self.asset.metadata.clone());

        let workers = self.attach_tracks(reader.as_mut(), writer.as_mut())?;

        writer.start_writing()?;
        if let Err(e) = reader.start_reading() {
            writer.cancel_writing();
            remove_partial_output(&output);
            return Err(e.into());
        }
        writer.start_session(MediaTime::ZERO);

        let (summaries, first_error) = self.run_workers(workers, reader.as_ref()).await;

        if first_error.is_none() && self.cancel.is_cancelled() {
            reader.cancel_reading();
            writer.cancel_writing();
        }

        match SessionDecision::decide(reader.status(), writer.status()) {
            SessionDecision::RollBackFailed => {
                writer.cancel_writing();
                remove_partial_output(&output);
                let error = first_error
                    .or_else(|| writer.error().map(VidscaleError::session))
                    .or_else(|| reader.error().map(VidscaleError::session))
                    .unwrap_or_else(|| VidscaleError::session("export failed"));
                tracing::error!(output = %output.display(), error = %error, "Export failed, output removed");
                Err(error)
            }
            SessionDecision::RollBackCancelled => {
                remove_partial_output(&output);
                tracing::info!(output = %output.display(), "Export cancelled, output removed");
                Ok(ExportOutcome::Cancelled)
            }
            SessionDecision::Commit => {
                if let Err(e) = writer.finish_writing().await {
                    remove_partial_output(&output);
                    return Err(e.into());
                }
                if let Some(creator) = &self.spec.creator {
                    if let Err(e) = write_creator_tag(&output, creator) {
                        tracing::warn!(output = %output.display(), error = %e, "Could not tag output with creator");
                    }
                }
                tracing::info!(
                    output = %output.display(),
                    tracks = summaries.len(),
                    "Export completed"
                );
                Ok(ExportOutcome::Completed {
                    output,
                    tracks: summaries,
                })
            }
        }
    }

    /// Attach a reader output and a writer input for every carried track.
    fn attach_tracks(
        &self,
        reader: &mut dyn AssetReader,
        writer: &mut dyn AssetWriter,
    ) -> VidscaleResult<Vec<TrackWorker>> {
        let mut workers = Vec::new();
        for track in self.asset.eligible_tracks() {
            let Some(settings) = resolve_track_settings(track, &self.spec) else {
                continue;
            };
            if !reader.can_add_output(track) {
                return Err(VidscaleError::setup(format!(
                    "reader cannot produce {} track {}",
                    track.kind, track.id
                )));
            }
            if !writer.can_add_input(&settings) {
                return Err(VidscaleError::setup(format!(
                    "writer cannot accept {} track {}",
                    track.kind, track.id
                )));
            }

            let transform = self.make_transform(track, &settings)?;
            let output = reader.add_output(track)?;
            let kind = track.kind;
            let input = writer.add_input(track.id, settings)?;
            let progress = self.progress.add_child(
                format!("{kind} track {}", track.id),
                kind,
                track.duration.as_secs_f64(),
            );
            tracing::debug!(
                track_id = track.id,
                kind = %kind,
                transform = transform.name(),
                "Track attached"
            );
            workers.push(TrackWorker::new(track.id, kind, output, input, transform, progress));
        }

        if reader.outputs_count() != writer.inputs_count() {
            return Err(VidscaleError::setup(format!(
                "reader has {} outputs but writer has {} inputs",
                reader.outputs_count(),
                writer.inputs_count()
            )));
        }
        Ok(workers)
    }

    fn make_transform(
        &self,
        track: &TrackDescriptor,
        settings: &TrackOutputSettings,
    ) -> VidscaleResult<Box<dyn FrameTransform>> {
        let Some(video) = settings.video() else {
            return Ok(Box::new(Passthrough));
        };
        let upscaler = Upscaler::new(self.accelerator.as_ref(), track.natural_size, video.size)
            .map_err(|e| {
                VidscaleError::track(track.id, format!("could not create upscale engine: {e}"))
            })?;
        if settings.is_spatial() {
            Ok(Box::new(SpatialUpscaleTransform::new(upscaler)))
        } else {
            Ok(Box::new(UpscaleTransform::new(upscaler)))
        }
    }

    /// Run every worker concurrently and wait for all of them.
    ///
    /// The first failure aborts the reader and cancels the remaining workers.
    async fn run_workers(
        &self,
        workers: Vec<TrackWorker>,
        reader: &dyn AssetReader,
    ) -> (Vec<TrackSummary>, Option<VidscaleError>) {
        let workers_cancel = self.cancel.child_token();
        let mut tasks = JoinSet::new();
        for worker in workers {
            let token = workers_cancel.clone();
            let (track_id, kind) = (worker.track_id(), worker.kind());
            tasks.spawn(async move { (track_id, kind, worker.run(token).await) });
        }

        let mut summaries = Vec::new();
        let mut first_error: Option<VidscaleError> = None;
        while let Some(joined) = tasks.join_next().await {
            let failure = match joined {
                Ok((track_id, kind, TrackOutcome::Finished { samples })) => {
                    summaries.push(TrackSummary {
                        track_id,
                        kind,
                        samples,
                    });
                    continue;
                }
                Ok((_, _, TrackOutcome::Cancelled)) => continue,
                Ok((track_id, _, TrackOutcome::Failed(e))) => e.into_vidscale(track_id),
                Err(e) => VidscaleError::session(format!("track worker ended abnormally: {e}")),
            };
            reader.abort_with_error(failure.to_string());
            workers_cancel.cancel();
            first_error.get_or_insert(failure);
        }

        summaries.sort_by_key(|summary| summary.track_id);
        (summaries, first_error)
    }
}

/// Delete a partially written output. A missing file is not an error.
fn remove_partial_output(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!(output = %path.display(), "Removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(output = %path.display(), error = %e, "Failed to remove partial output")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_commit() {
        assert_eq!(
            SessionDecision::decide(SessionStatus::Finished, SessionStatus::Writing),
            SessionDecision::Commit
        );
    }

    #[test]
    fn test_failure_beats_cancellation() {
        assert_eq!(
            SessionDecision::decide(SessionStatus::Cancelled, SessionStatus::Failed),
            SessionDecision::RollBackFailed
        );
        assert_eq!(
            SessionDecision::decide(SessionStatus::Failed, SessionStatus::Cancelled),
            SessionDecision::RollBackFailed
        );
    }

    #[test]
    fn test_cancellation_on_either_side() {
        assert_eq!(
            SessionDecision::decide(SessionStatus::Reading, SessionStatus::Cancelled),
            SessionDecision::RollBackCancelled
        );
        assert_eq!(
            SessionDecision::decide(SessionStatus::Cancelled, SessionStatus::Writing),
            SessionDecision::RollBackCancelled
        );
    }

    #[test]
    fn test_remove_missing_output_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        remove_partial_output(&dir.path().join("never-written.mp4"));
    }

    #[test]
    fn test_options_from_config() {
        let mut config = AppConfig::default();
        config.export.codec = "prores".to_string();
        config.export.writer_queue_depth = 0;
        let options = ExportOptions::from_config(&config).unwrap();
        assert_eq!(options.default_codec, CodecSelector::ProRes);
        assert_eq!(options.queue_depth, 1);

        config.export.codec = "vp9".to_string();
        assert!(ExportOptions::from_config(&config).is_err());
    }
}
