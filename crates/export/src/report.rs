//! JSON summary of a finished export.

use std::path::{Path, PathBuf};

use serde::Serialize;
use vidscale_common::VidscaleResult;
use vidscale_media::VideoCodec;

use crate::policy::{CodecSelector, ExportSpec};
use crate::session::{ExportOutcome, TrackSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Completed,
    Cancelled,
}

/// Record of one export run.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub requested_codec: CodecSelector,

    /// Codec actually written for each video track.
    pub video_codecs: Vec<VideoCodec>,

    /// RFC 3339 start timestamp.
    pub started_at: String,

    /// RFC 3339 end timestamp.
    pub finished_at: String,

    pub elapsed_secs: f64,
    pub status: ReportStatus,
    pub tracks: Vec<TrackSummary>,
}

impl ExportReport {
    /// Build a report for `spec` that started at `started_at` and ended now.
    pub fn new(
        spec: &ExportSpec,
        started_at: chrono::DateTime<chrono::Utc>,
        outcome: &ExportOutcome,
    ) -> Self {
        let finished_at = chrono::Utc::now();
        let elapsed = finished_at.signed_duration_since(started_at);
        let (status, tracks) = match outcome {
            ExportOutcome::Completed { tracks, .. } => (ReportStatus::Completed, tracks.clone()),
            ExportOutcome::Cancelled => (ReportStatus::Cancelled, Vec::new()),
        };
        Self {
            input: spec.input.clone(),
            output: spec.output.clone(),
            width: spec.output_size.width,
            height: spec.output_size.height,
            requested_codec: spec.codec,
            video_codecs: spec.video_codecs.clone(),
            started_at: started_at.to_rfc3339(),
            finished_at: finished_at.to_rfc3339(),
            elapsed_secs: elapsed.num_milliseconds().max(0) as f64 / 1000.0,
            status,
            tracks,
        }
    }

    pub fn total_samples(&self) -> u64 {
        self.tracks.iter().map(|track| track.samples).sum()
    }

    pub fn to_json(&self) -> VidscaleResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save(&self, path: &Path) -> VidscaleResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::FormatLimits;
    use vidscale_media::{MediaKind, Size};

    fn spec() -> ExportSpec {
        ExportSpec {
            input: PathBuf::from("/videos/clip.mov"),
            output: PathBuf::from("/videos/clip_upscaled.mov"),
            codec: CodecSelector::Hevc,
            video_codecs: vec![VideoCodec::ProRes422],
            output_size: Size::new(3840, 2160),
            creator: None,
            limits: FormatLimits::default(),
        }
    }

    #[test]
    fn test_completed_report() {
        let outcome = ExportOutcome::Completed {
            output: PathBuf::from("/videos/clip_upscaled.mov"),
            tracks: vec![
                TrackSummary {
                    track_id: 1,
                    kind: MediaKind::Video,
                    samples: 48,
                },
                TrackSummary {
                    track_id: 2,
                    kind: MediaKind::Audio,
                    samples: 94,
                },
            ],
        };
        let started = chrono::Utc::now() - chrono::Duration::seconds(2);
        let report = ExportReport::new(&spec(), started, &outcome);

        assert_eq!(report.status, ReportStatus::Completed);
        assert_eq!(report.total_samples(), 142);
        assert!(report.elapsed_secs >= 2.0);

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["requested_codec"], "hevc");
        assert_eq!(
            json["video_codecs"][0],
            serde_json::to_value(VideoCodec::ProRes422).unwrap()
        );
        assert_eq!(json["tracks"][1]["kind"], "audio");
    }

    #[test]
    fn test_save_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/run.json");
        let report = ExportReport::new(&spec(), chrono::Utc::now(), &ExportOutcome::Cancelled);
        report.save(&path).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("\"cancelled\""));
    }
}
