//! Configuration management for flightpath

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Playback timing
    #[serde(default)]
    pub animation: AnimationConfig,

    /// Map framing margins
    #[serde(default)]
    pub viewport: ViewportConfig,

    /// Screen-capture setup and output
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Summary overlay behavior
    #[serde(default)]
    pub summary: SummaryConfig,

    /// Location search
    #[serde(default)]
    pub geocoding: GeocodingConfig,

    /// Local persistence
    #[serde(default)]
    pub storage: StorageConfig,

    /// Log file level, location and retention
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Path to config file (not serialized)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimationConfig {
    /// Time the marker spends on each segment (ms)
    #[serde(default = "default_segment_duration")]
    pub segment_duration_ms: u64,

    /// Redraw cadence while playing (ms)
    #[serde(default = "default_frame_interval")]
    pub frame_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewportConfig {
    /// Margin when fitting the whole path (px)
    #[serde(default = "default_full_path_padding")]
    pub full_path_padding_px: u32,

    /// Margin when fitting a single segment (px)
    #[serde(default = "default_segment_padding")]
    pub segment_padding_px: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Pause after hiding the control panel so the map can resize (ms)
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Pause for the establishing-shot fit animation (ms)
    #[serde(default = "default_establishing_delay")]
    pub establishing_delay_ms: u64,

    /// Still frame before recording starts (ms)
    #[serde(default = "default_preroll_delay")]
    pub preroll_delay_ms: u64,

    /// Recorder container/codec
    #[serde(default = "default_mime_type")]
    pub mime_type: String,

    /// Downloaded file name prefix
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// Where finished recordings are saved
    #[serde(default = "default_output_directory_option")]
    pub output_directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// How long the summary stays on screen before a recording auto-stops (ms)
    #[serde(default = "default_auto_stop_delay")]
    pub auto_stop_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingConfig {
    /// Search endpoint (Nominatim-compatible)
    #[serde(default = "default_geocoding_endpoint")]
    pub endpoint: String,

    /// Maximum number of candidates per query
    #[serde(default = "default_result_limit")]
    pub result_limit: usize,

    /// User-Agent sent with lookups
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for persisted waypoints (defaults to the platform data dir)
    pub data_directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directives used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log directory (defaults to the platform state dir)
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Days to keep rotated log files; 0 keeps them forever
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u64,
}

// Default value functions
fn default_segment_duration() -> u64 {
    5000
}

fn default_frame_interval() -> u64 {
    16 // ~60 Hz
}

fn default_full_path_padding() -> u32 {
    50
}

fn default_segment_padding() -> u32 {
    100
}

fn default_settle_delay() -> u64 {
    100
}

fn default_establishing_delay() -> u64 {
    1500
}

fn default_preroll_delay() -> u64 {
    500
}

fn default_mime_type() -> String {
    "video/webm;codecs=vp9".to_string()
}

fn default_file_prefix() -> String {
    "flight-path".to_string()
}

fn default_output_directory() -> PathBuf {
    directories::UserDirs::new()
        .and_then(|dirs| dirs.download_dir().map(Path::to_path_buf))
        .unwrap_or_else(std::env::temp_dir)
        .join("flightpath")
}

fn default_output_directory_option() -> Option<PathBuf> {
    Some(default_output_directory())
}

fn default_auto_stop_delay() -> u64 {
    3000
}

fn default_geocoding_endpoint() -> String {
    "https://nominatim.openstreetmap.org/search".to_string()
}

fn default_result_limit() -> usize {
    5
}

fn default_user_agent() -> String {
    format!("flightpath/{}", env!("CARGO_PKG_VERSION"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_retention_days() -> u64 {
    7
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            segment_duration_ms: default_segment_duration(),
            frame_interval_ms: default_frame_interval(),
        }
    }
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            full_path_padding_px: default_full_path_padding(),
            segment_padding_px: default_segment_padding(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay(),
            establishing_delay_ms: default_establishing_delay(),
            preroll_delay_ms: default_preroll_delay(),
            mime_type: default_mime_type(),
            file_prefix: default_file_prefix(),
            output_directory: default_output_directory_option(),
        }
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            auto_stop_delay_ms: default_auto_stop_delay(),
        }
    }
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_geocoding_endpoint(),
            result_limit: default_result_limit(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
            retention_days: default_log_retention_days(),
        }
    }
}

impl LoggingConfig {
    /// None when rotated files are never pruned
    pub fn retention(&self) -> Option<Duration> {
        (self.retention_days > 0).then(|| Duration::from_secs(60 * 60 * 24 * self.retention_days))
    }
}

impl AnimationConfig {
    pub fn segment_duration(&self) -> Duration {
        Duration::from_millis(self.segment_duration_ms.max(1))
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

impl CaptureConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn establishing_delay(&self) -> Duration {
        Duration::from_millis(self.establishing_delay_ms)
    }

    pub fn preroll_delay(&self) -> Duration {
        Duration::from_millis(self.preroll_delay_ms)
    }

    pub fn output_directory(&self) -> PathBuf {
        self.output_directory
            .clone()
            .unwrap_or_else(default_output_directory)
    }
}

impl SummaryConfig {
    pub fn auto_stop_delay(&self) -> Duration {
        Duration::from_millis(self.auto_stop_delay_ms)
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from(config_path)
    }

    /// Load configuration from an explicit path, writing defaults if it is missing
    pub fn load_from(config_path: PathBuf) -> Result<Self> {
        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

            let mut config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

            config.config_path = Some(config_path);
            Ok(config)
        } else {
            let config = Config {
                config_path: Some(config_path),
                ..Config::default()
            };
            config.save()?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = self.config_path()?;

        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }

    /// Get the config file path
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config_path {
            Some(path) => Ok(path.clone()),
            None => Self::default_config_path(),
        }
    }

    /// Directory holding persisted waypoints and flags
    pub fn data_directory(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.storage.data_directory {
            return Ok(dir.clone());
        }
        let proj_dirs = directories::ProjectDirs::from("dev", "flightpath", "flightpath")
            .context("Failed to determine data directory")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    /// Get default config path
    fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = directories::ProjectDirs::from("dev", "flightpath", "flightpath")
            .context("Failed to determine config directory")?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }
}
