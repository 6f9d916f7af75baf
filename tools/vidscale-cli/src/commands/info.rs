//! Show the tracks of a video.

use std::path::PathBuf;

use vidscale_gst::GstToolkit;
use vidscale_media::{MediaKind, MediaToolkit};

pub async fn run(input: PathBuf, json: bool) -> anyhow::Result<()> {
    let asset = GstToolkit::new()
        .load_asset(&input)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to probe {}: {e}", input.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&asset)?);
        return Ok(());
    }

    println!("Asset: {}", asset.path.display());
    println!("  Duration: {:.2}s", asset.duration.as_secs_f64());
    println!();

    println!("Tracks:");
    for track in &asset.tracks {
        let eligible = if track.kind.is_eligible() { "" } else { " (skipped on export)" };
        match track.kind {
            MediaKind::Video => {
                println!(
                    "  #{} video {} @ {:.3}fps, {}{}",
                    track.id,
                    track.natural_size,
                    track.nominal_frame_rate,
                    track
                        .codec
                        .map(|codec| codec.to_string())
                        .unwrap_or_else(|| "unknown codec".to_string()),
                    eligible
                );
                let rotation = track.preferred_transform.rotation_degrees();
                if rotation != 0 {
                    println!("     rotation: {rotation} deg");
                }
                if let Some(color) = track.color.properties() {
                    println!(
                        "     color: {:?} / {:?} / {:?}",
                        color.primaries, color.transfer, color.matrix
                    );
                }
                if track.is_spatial() {
                    println!("     stereo: left and right eye layers");
                }
            }
            MediaKind::Audio => {
                let format = track
                    .audio_format
                    .as_ref()
                    .map(|f| format!("{} {} Hz, {} ch", f.codec, f.sample_rate, f.channels))
                    .unwrap_or_else(|| "unknown format".to_string());
                println!("  #{} audio {format}{eligible}", track.id);
            }
            other => println!("  #{} {other}{eligible}", track.id),
        }
    }

    if !asset.metadata.is_empty() {
        println!();
        println!("Metadata:");
        for item in &asset.metadata {
            println!("  {}: {}", item.key, item.value);
        }
    }

    Ok(())
}
