use crate::chunk::ContainerFormat;
use crate::profile::ResolutionProfile;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RecorderConfig {
    pub camera: CameraConfig,
    pub recording: RecordingConfig,
    pub archive: ArchiveConfig,
    pub export: ExportConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CameraConfig {
    /// Camera device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_camera_index")]
    pub index: u32,

    /// Resolution profile label (360p, 480p, 720p, 1080p, 2160p)
    #[serde(default = "default_camera_profile")]
    pub profile: String,

    /// Capture audio alongside video
    #[serde(default = "default_camera_audio")]
    pub audio: bool,

    /// Frames per second requested from the device
    #[serde(default = "default_camera_fps")]
    pub fps: u32,

    /// Capture backend
    #[serde(default)]
    pub backend: CameraBackend,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CameraBackend {
    /// Generated test pattern, always available
    #[default]
    Synthetic,
    /// V4L2 camera through GStreamer (requires the `gstreamer` feature)
    Gstreamer,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RecordingConfig {
    /// Container produced by the encoder
    #[serde(default)]
    pub container: ContainerFormat,

    /// Interval at which the encoder hands over a chunk
    #[serde(default = "default_timeslice_ms")]
    pub timeslice_ms: u64,

    /// Bound of the chunk channel between encoder and session
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ArchiveConfig {
    /// Directory holding archive databases
    #[serde(default = "default_archive_path")]
    pub path: String,

    /// Database name
    #[serde(default = "default_archive_database")]
    pub database: String,

    /// Collection holding recordings
    #[serde(default = "default_archive_collection")]
    pub collection: String,

    /// Schema version; opening with a higher version runs schema setup
    #[serde(default = "default_archive_version")]
    pub version: u32,

    /// Timezone used when displaying record timestamps
    #[serde(default = "default_archive_timezone")]
    pub timezone: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExportConfig {
    /// Destination directory for exported recordings
    #[serde(default = "default_export_directory")]
    pub directory: String,

    /// File name prefix, files are named <prefix>-<n>.<ext>
    #[serde(default = "default_export_file_prefix")]
    pub file_prefix: String,
}

impl RecorderConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("camrec.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.index", default_camera_index())?
            .set_default("camera.profile", default_camera_profile())?
            .set_default("camera.audio", default_camera_audio())?
            .set_default("camera.fps", default_camera_fps())?
            .set_default("camera.backend", "synthetic")?
            .set_default("recording.container", "webm")?
            .set_default("recording.timeslice_ms", default_timeslice_ms())?
            .set_default(
                "recording.channel_capacity",
                default_channel_capacity() as i64,
            )?
            .set_default("archive.path", default_archive_path())?
            .set_default("archive.database", default_archive_database())?
            .set_default("archive.collection", default_archive_collection())?
            .set_default("archive.version", default_archive_version())?
            .set_default("archive.timezone", default_archive_timezone())?
            .set_default("export.directory", default_export_directory())?
            .set_default("export.file_prefix", default_export_file_prefix())?
            .add_source(File::with_name(&path_str).required(false))
            // CAMREC__ARCHIVE__PATH=/data overrides archive.path
            .add_source(
                Environment::with_prefix("CAMREC")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: RecorderConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if ResolutionProfile::find(&self.camera.profile).is_none() {
            return Err(ConfigError::Message(format!(
                "Unknown camera profile '{}'",
                self.camera.profile
            )));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if self.recording.timeslice_ms == 0 {
            return Err(ConfigError::Message(
                "Recording timeslice_ms must be greater than 0".to_string(),
            ));
        }

        if self.recording.channel_capacity == 0 {
            return Err(ConfigError::Message(
                "Recording channel_capacity must be greater than 0".to_string(),
            ));
        }

        if self.archive.version == 0 {
            return Err(ConfigError::Message(
                "Archive version must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("archive.path", &self.archive.path),
            ("archive.database", &self.archive.database),
            ("archive.collection", &self.archive.collection),
            ("export.directory", &self.export.directory),
            ("export.file_prefix", &self.export.file_prefix),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Message(format!("{} must not be empty", name)));
            }
        }

        for (name, value) in [
            ("archive.database", &self.archive.database),
            ("archive.collection", &self.archive.collection),
        ] {
            if value.contains(['/', '\\']) || value == ".." || value == "." {
                return Err(ConfigError::Message(format!(
                    "{} must be a plain name, got '{}'",
                    name, value
                )));
            }
        }

        if self.archive.timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(ConfigError::Message(format!(
                "Unknown archive timezone '{}'",
                self.archive.timezone
            )));
        }

        Ok(())
    }

    /// Resolved resolution profile, falling back to the default label
    pub fn profile(&self) -> ResolutionProfile {
        ResolutionProfile::find(&self.camera.profile)
            .or_else(|| ResolutionProfile::find(&default_camera_profile()))
            .unwrap_or(crate::profile::PROFILES[2])
    }

    /// Directory of the archive database
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.archive.path).join(&self.archive.database)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                index: default_camera_index(),
                profile: default_camera_profile(),
                audio: default_camera_audio(),
                fps: default_camera_fps(),
                backend: CameraBackend::default(),
            },
            recording: RecordingConfig {
                container: ContainerFormat::default(),
                timeslice_ms: default_timeslice_ms(),
                channel_capacity: default_channel_capacity(),
            },
            archive: ArchiveConfig {
                path: default_archive_path(),
                database: default_archive_database(),
                collection: default_archive_collection(),
                version: default_archive_version(),
                timezone: default_archive_timezone(),
            },
            export: ExportConfig {
                directory: default_export_directory(),
                file_prefix: default_export_file_prefix(),
            },
        }
    }
}

// Default value functions
fn default_camera_index() -> u32 {
    0
}
fn default_camera_profile() -> String {
    "720p".to_string()
}
fn default_camera_audio() -> bool {
    true
}
fn default_camera_fps() -> u32 {
    30
}

fn default_timeslice_ms() -> u64 {
    1000
}
fn default_channel_capacity() -> usize {
    64
}

fn default_archive_path() -> String {
    "./archive".to_string()
}
fn default_archive_database() -> String {
    "video-store".to_string()
}
fn default_archive_collection() -> String {
    "videos".to_string()
}
fn default_archive_version() -> u32 {
    2
}
fn default_archive_timezone() -> String {
    "UTC".to_string()
}

fn default_export_directory() -> String {
    "./downloads".to_string()
}
fn default_export_file_prefix() -> String {
    "downloaded-video".to_string()
}
