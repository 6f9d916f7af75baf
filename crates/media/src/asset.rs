//! Source assets and container formats.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::track::{MediaKind, TrackDescriptor};
use crate::time::MediaTime;

/// Output container types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Mov,
    M4v,
    Mp4,
}

impl ContainerFormat {
    /// Container for a file extension. Unknown extensions map to MP4.
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "mov" => ContainerFormat::Mov,
            "m4v" => ContainerFormat::M4v,
            _ => ContainerFormat::Mp4,
        }
    }

    /// Container for a path, judged by its extension.
    pub fn for_path(path: &Path) -> Self {
        Self::from_extension(
            path.extension()
                .and_then(|ext| ext.to_str())
                .unwrap_or_default(),
        )
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Mov => "mov",
            ContainerFormat::M4v => "m4v",
            ContainerFormat::Mp4 => "mp4",
        }
    }

    /// Whether input files with this extension are accepted.
    pub fn is_supported_extension(extension: &str) -> bool {
        matches!(
            extension.to_ascii_lowercase().as_str(),
            "mov" | "m4v" | "mp4"
        )
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// One asset-level metadata entry (title, creation date, location, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataItem {
    pub key: String,
    pub value: String,
}

impl MetadataItem {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A loaded source asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub path: PathBuf,
    pub duration: MediaTime,
    pub tracks: Vec<TrackDescriptor>,
    #[serde(default)]
    pub metadata: Vec<MetadataItem>,
}

impl Asset {
    pub fn video_tracks(&self) -> impl Iterator<Item = &TrackDescriptor> {
        self.tracks
            .iter()
            .filter(|track| track.kind == MediaKind::Video)
    }

    /// Tracks the export pipeline carries into the output.
    pub fn eligible_tracks(&self) -> impl Iterator<Item = &TrackDescriptor> {
        self.tracks.iter().filter(|track| track.kind.is_eligible())
    }

    pub fn has_video(&self) -> bool {
        self.video_tracks().next().is_some()
    }

    pub fn track(&self, id: u32) -> Option<&TrackDescriptor> {
        self.tracks.iter().find(|track| track.id == id)
    }
}
