//! Vidscale GStreamer Toolkit
//!
//! A [`MediaToolkit`] for Linux hosts: assets are probed with `ffprobe`,
//! each source track is read by its own `appsink` pipeline, and every
//! output track is fed through an `appsrc` branch into a single
//! `qtmux`/`mp4mux` pipeline. Only video is re-encoded; audio is parsed and
//! muxed as it was read.
//!
//! ```text
//! filesrc ! qtdemux ! decodebin ! videoconvert ! appsink   (video)
//! filesrc ! qtdemux ! parser ! appsink                     (audio)
//!                                                   │
//!                                              TrackWorker
//!                                                   │
//! appsrc ! videoconvert ! encoder ! queue ─┐        ▼
//! appsrc ! parser ! queue ─────────────────┴─► mux ! filesink
//! ```
//!
//! Multi-layer (stereo) video and audio that cannot be passed through (ALAC,
//! Opus, PCM outside QuickTime) are refused when attached.

pub mod launch;
pub mod probe;
pub mod reader;
pub mod writer;

use std::path::Path;

use async_trait::async_trait;
use vidscale_media::{
    Asset, AssetReader, AssetWriter, MediaError, MediaResult, MediaToolkit, WriterOptions,
};

pub use probe::{ffprobe_available, parse_probe, probe_asset};
pub use reader::GstReader;
pub use writer::GstWriter;

/// Media toolkit backed by GStreamer and ffprobe.
#[derive(Debug, Default, Clone, Copy)]
pub struct GstToolkit;

impl GstToolkit {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaToolkit for GstToolkit {
    fn name(&self) -> &'static str {
        "gstreamer"
    }

    fn check(&self) -> MediaResult<()> {
        launch::init_gstreamer()?;
        if !ffprobe_available() {
            return Err(MediaError::unsupported("ffprobe was not found in PATH"));
        }
        let missing = launch::missing_elements(launch::REQUIRED_ELEMENTS);
        if !missing.is_empty() {
            return Err(MediaError::unsupported(format!(
                "missing GStreamer elements: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }

    async fn load_asset(&self, path: &Path) -> MediaResult<Asset> {
        let path = path.to_path_buf();
        let asset = tokio::task::spawn_blocking(move || probe_asset(&path))
            .await
            .map_err(|e| MediaError::probe(format!("probe task failed: {e}")))??;
        tracing::debug!(
            path = %asset.path.display(),
            tracks = asset.tracks.len(),
            duration_secs = asset.duration.as_secs_f64(),
            "Asset probed"
        );
        Ok(asset)
    }

    fn open_reader(&self, asset: &Asset) -> MediaResult<Box<dyn AssetReader>> {
        Ok(Box::new(GstReader::new(asset.clone())?))
    }

    fn open_writer(&self, path: &Path, options: WriterOptions) -> MediaResult<Box<dyn AssetWriter>> {
        Ok(Box::new(GstWriter::new(path, options)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toolkit_name() {
        assert_eq!(GstToolkit::new().name(), "gstreamer");
    }

    #[tokio::test]
    async fn test_missing_file_fails_to_load() {
        if !ffprobe_available() {
            eprintln!("Skipping: ffprobe not installed");
            return;
        }
        let result = GstToolkit::new()
            .load_asset(Path::new("/nonexistent/vidscale/clip.mov"))
            .await;
        assert!(result.is_err());
    }
}
