//! Track pipeline worker: pumps one track from reader output to writer input.

use tokio_util::sync::CancellationToken;
use vidscale_media::{MediaKind, TrackInput, TrackOutput};

use crate::error::TrackError;
use crate::progress::ProgressNode;
use crate::transform::FrameTransform;

/// Terminal state of a worker.
#[derive(Debug)]
pub enum TrackOutcome {
    /// The source was drained, or the writer stopped accepting data.
    Finished { samples: u64 },
    Failed(TrackError),
    Cancelled,
}

/// Everything a single track needs to run to completion on its own task.
pub struct TrackWorker {
    track_id: u32,
    kind: MediaKind,
    output: Box<dyn TrackOutput>,
    input: Box<dyn TrackInput>,
    transform: Box<dyn FrameTransform>,
    progress: ProgressNode,
}

impl TrackWorker {
    pub fn new(
        track_id: u32,
        kind: MediaKind,
        output: Box<dyn TrackOutput>,
        input: Box<dyn TrackInput>,
        transform: Box<dyn FrameTransform>,
        progress: ProgressNode,
    ) -> Self {
        Self {
            track_id,
            kind,
            output,
            input,
            transform,
            progress,
        }
    }

    pub fn track_id(&self) -> u32 {
        self.track_id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Run until the track is drained, fails, or `cancel` fires.
    ///
    /// Samples are appended strictly in read order. Every suspension point
    /// also watches `cancel`, so a cancelled worker always returns.
    pub async fn run(mut self, cancel: CancellationToken) -> TrackOutcome {
        let mut samples: u64 = 0;
        tracing::debug!(
            track_id = self.track_id,
            kind = %self.kind,
            transform = self.transform.name(),
            "Track worker started"
        );

        let outcome = loop {
            let ready = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                ready = self.input.ready_for_more_data() => Some(ready),
            };
            match ready {
                None => break TrackOutcome::Cancelled,
                Some(false) => {
                    tracing::debug!(track_id = self.track_id, "Writer input no longer ready");
                    break TrackOutcome::Finished { samples };
                }
                Some(true) => {}
            }

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                next = self.output.next_sample() => Some(next),
            };
            let sample = match next {
                None => break TrackOutcome::Cancelled,
                Some(Ok(Some(sample))) => sample,
                Some(Ok(None)) => {
                    self.input.mark_finished();
                    self.progress.complete();
                    break TrackOutcome::Finished { samples };
                }
                Some(Err(e)) => break TrackOutcome::Failed(TrackError::Media(e)),
            };

            let pts = sample.pts;
            let transformed = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.transform.apply(sample) => Some(result),
            };
            let sample = match transformed {
                None => break TrackOutcome::Cancelled,
                Some(Ok(sample)) => sample,
                Some(Err(e)) => break TrackOutcome::Failed(e),
            };

            if !self.input.append(sample) {
                tracing::debug!(
                    track_id = self.track_id,
                    pts_secs = pts.as_secs_f64(),
                    "Writer rejected sample"
                );
                break TrackOutcome::Finished { samples };
            }
            samples += 1;
            self.progress.advance_to_secs(pts.as_secs_f64());
        };

        match &outcome {
            TrackOutcome::Finished { samples } => {
                tracing::debug!(track_id = self.track_id, samples, "Track worker finished")
            }
            TrackOutcome::Failed(e) => {
                tracing::warn!(track_id = self.track_id, error = %e, "Track worker failed")
            }
            TrackOutcome::Cancelled => {
                tracing::debug!(track_id = self.track_id, "Track worker cancelled")
            }
        }
        outcome
    }
}
