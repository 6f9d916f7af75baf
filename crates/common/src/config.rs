//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default export parameters.
    pub export: ExportDefaults,

    /// Encoder and accelerator limits used by the format policy.
    pub limits: LimitsConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Suffix appended to the input file stem to name the output.
    pub output_suffix: String,

    /// Scale factor applied when neither width nor height is requested.
    pub default_scale: u32,

    /// Default output codec selector ("source", "hevc", "prores", "h264").
    pub codec: String,

    /// Progress weighting for audio tracks, in units per second of duration.
    pub audio_units_per_sec: u32,

    /// Progress weighting for video and spatial tracks, in units per second.
    pub video_units_per_sec: u32,

    /// Samples a writer input may buffer before it stops reporting ready.
    pub writer_queue_depth: usize,
}

/// Size limits enforced by the format policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Hard per-dimension maximum.
    pub max_dimension: u32,

    /// Pixel area above which non-ProRes codecs are replaced by ProRes 422.
    pub max_non_prores_area: u64,

    /// Pixel area above which ProRes 422 is forced unconditionally.
    pub prores_only_area: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "vidscale_export=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            output_suffix: "_upscaled".to_string(),
            default_scale: 2,
            codec: "source".to_string(),
            audio_units_per_sec: 1,
            video_units_per_sec: 10,
            writer_queue_depth: 8,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_dimension: 16384,
            max_non_prores_area: 3840 * 2160,
            prores_only_area: 14500 * 8156,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &std::path::Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &std::path::Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("vidscale").join("config.json")
}
