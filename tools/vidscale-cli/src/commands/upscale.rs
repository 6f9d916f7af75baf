//! Upscale a video into a new file.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use vidscale_common::AppConfig;
use vidscale_export::{
    ExportOptions, ExportOutcome, ExportReport, ExportRequest, ExportSession, ProgressSnapshot,
};
use vidscale_gst::GstToolkit;
use vidscale_media::MediaToolkit;

/// How often the progress line is redrawn.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

pub struct UpscaleArgs {
    pub input: PathBuf,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub codec: Option<String>,
    pub creator: Option<String>,
    pub output: Option<PathBuf>,
    pub report: Option<PathBuf>,
}

/// Overall percentage followed by each track's own percentage.
fn progress_line(snapshot: &ProgressSnapshot) -> String {
    let tracks: Vec<String> = snapshot
        .children
        .iter()
        .map(|child| format!("{} {:.0}%", child.label, child.fraction * 100.0))
        .collect();
    format!(
        "  Progress: {:.1}% [{}]  ",
        snapshot.fraction * 100.0,
        tracks.join(", ")
    )
}

pub async fn run(config: &AppConfig, args: UpscaleArgs) -> anyhow::Result<()> {
    let options = ExportOptions::from_config(config)?;
    let toolkit = GstToolkit::new();
    toolkit
        .check()
        .map_err(|e| anyhow::anyhow!("GStreamer toolkit is not usable: {e}"))?;

    let request = ExportRequest {
        input: args.input,
        output: args.output,
        width: args.width,
        height: args.height,
        codec: args.codec.as_deref().map(str::parse).transpose()?,
        creator: args.creator,
    };

    let session = ExportSession::prepare(
        Arc::new(toolkit),
        vidscale_gpu::default_accelerator(),
        request,
        &options,
    )
    .await?;

    let spec = session.spec().clone();
    println!("Upscaling: {}", spec.input.display());
    println!("  Output: {}", spec.output.display());
    println!("  Resolution: {}", spec.output_size);
    let codecs: Vec<String> = spec.video_codecs.iter().map(ToString::to_string).collect();
    println!("  Codec: {} (requested {})", codecs.join(", "), spec.codec);

    let progress = session.progress();
    let cancel = session.cancellation_token();
    let started_at = chrono::Utc::now();

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling...");
            ctrl_c.cancel();
        }
    });

    let mut export = tokio::spawn(session.export());
    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    let result = loop {
        tokio::select! {
            joined = &mut export => break joined?,
            _ = ticker.tick() => {
                print!("\r{}", progress_line(&progress.snapshot()));
                std::io::stdout().flush().ok();
            }
        }
    };

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            println!("\nExport failed: {e}");
            return Err(e.into());
        }
    };

    match &outcome {
        ExportOutcome::Completed { output, tracks } => {
            println!("\r  Progress: 100.0%  ");
            println!("Export complete: {}", output.display());
            for track in tracks {
                println!(
                    "  Track {} ({}): {} samples",
                    track.track_id, track.kind, track.samples
                );
            }
        }
        ExportOutcome::Cancelled => println!("\nExport cancelled; partial output removed."),
    }

    if let Some(path) = args.report {
        let report = ExportReport::new(&spec, started_at, &outcome);
        report.save(&path)?;
        println!("Report written: {}", path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidscale_export::{ProgressTree, ProgressWeights};
    use vidscale_media::MediaKind;

    #[test]
    fn test_progress_line_lists_tracks() {
        let tree = ProgressTree::new(ProgressWeights::default());
        let video = tree.add_child("video track 1", MediaKind::Video, 2.0);
        let audio = tree.add_child("audio track 2", MediaKind::Audio, 2.0);
        video.advance_to_secs(1.0);
        audio.complete();

        let line = progress_line(&tree.snapshot());
        assert_eq!(
            line,
            "  Progress: 54.5% [video track 1 50%, audio track 2 100%]  "
        );
    }
}
