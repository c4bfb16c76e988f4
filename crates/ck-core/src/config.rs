//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries the
//! capture root, the segment layout, the polling cadences and the camera
//! fleet. Every section defaults sensibly so a file only has to list its
//! cameras.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::segment::SegmentNaming;
use crate::Error;

/// Track mapping used when a stream does not specify one: video only.
pub const DEFAULT_STREAM_MAP: &str = "0:0";

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub root_path: PathBuf,
    pub capture_dir: PathBuf,
    pub segment: SegmentConfig,
    pub health: HealthConfig,
    pub disk: DiskConfig,
    pub repair: RepairConfig,
    pub tools: ToolsConfig,
    pub cameras: Vec<CameraConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("/data"),
            capture_dir: PathBuf::from("capture"),
            segment: SegmentConfig::default(),
            health: HealthConfig::default(),
            disk: DiskConfig::default(),
            repair: RepairConfig::default(),
            tools: ToolsConfig::default(),
            cameras: Vec::new(),
        }
    }
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Read, parse and check a configuration file.
    ///
    /// Unlike a server that can limp along on defaults, the capture and
    /// repair loops are useless without a camera list, so a missing or
    /// malformed file is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::not_found("config file", path.display())
            } else {
                Error::Io { source: e }
            }
        })?;
        let config = Self::from_json(&contents)?;
        config.check()?;
        Ok(config)
    }

    /// Directory holding one sub-directory per camera.
    pub fn capture_root(&self) -> PathBuf {
        self.root_path.join(&self.capture_dir)
    }

    /// Recording directory for a camera.
    pub fn camera_dir(&self, camera: &str) -> PathBuf {
        self.capture_root().join(camera)
    }

    /// Segment naming rules for a camera.
    pub fn segment_naming(&self, camera: &str) -> SegmentNaming {
        SegmentNaming::new(camera, self.segment.wrap)
    }

    /// Reject configurations the loops cannot run with.
    pub fn check(&self) -> Result<()> {
        if self.segment.wrap < 2 {
            return Err(Error::Validation(format!(
                "segment.wrap must be at least 2 (got {})",
                self.segment.wrap
            )));
        }
        if self.segment.length_secs == 0 {
            return Err(Error::Validation("segment.length_secs must be positive".into()));
        }
        if self.health.poll_interval_secs == 0 {
            return Err(Error::Validation(
                "health.poll_interval_secs must be positive".into(),
            ));
        }
        if self.repair.interval_secs == 0 {
            return Err(Error::Validation("repair.interval_secs must be positive".into()));
        }
        if self.repair.copy_chunk_bytes == 0 {
            return Err(Error::Validation(
                "repair.copy_chunk_bytes must be positive".into(),
            ));
        }
        if self.disk.min_free_percent > 100 {
            return Err(Error::Validation(format!(
                "disk.min_free_percent must be at most 100 (got {})",
                self.disk.min_free_percent
            )));
        }

        let mut names = HashSet::new();
        for cam in &self.cameras {
            if !is_valid_name(&cam.name) {
                return Err(Error::Validation(format!(
                    "camera name '{}' may only contain letters, digits, '_' and '-'",
                    cam.name
                )));
            }
            if !names.insert(cam.name.as_str()) {
                return Err(Error::Validation(format!(
                    "camera '{}' is declared more than once",
                    cam.name
                )));
            }
            if cam.streams.is_empty() {
                return Err(Error::Validation(format!(
                    "camera '{}' has no streams",
                    cam.name
                )));
            }
            let mut stream_names = HashSet::new();
            for stream in &cam.streams {
                if !is_valid_name(&stream.name) {
                    return Err(Error::Validation(format!(
                        "stream name '{}' of camera '{}' may only contain letters, digits, '_' and '-'",
                        stream.name, cam.name
                    )));
                }
                if !stream_names.insert(stream.name.as_str()) {
                    return Err(Error::Validation(format!(
                        "camera '{}' declares stream '{}' more than once",
                        cam.name, stream.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.cameras.is_empty() {
            warnings.push("no cameras are configured".into());
        }

        if self.health.dead_time_secs == 0 {
            warnings.push(
                "health.dead_time_secs is 0; every capture will be judged dead unless written this second"
                    .into(),
            );
        }

        for (i, cam) in self.cameras.iter().enumerate() {
            if cam.reboot_on_failure && cam.onvif_port.is_none() {
                warnings.push(format!(
                    "cameras[{i}] ({}) has reboot_on_failure set but no onvif_port; standard recovery will be used",
                    cam.name
                ));
            }
            if cam.username.is_empty() {
                warnings.push(format!("cameras[{i}] ({}).username is empty", cam.name));
            }
        }

        warnings
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Recording segment layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Duration of each recording segment.
    pub length_secs: u64,
    /// Number of segment slots before numbering wraps back to zero.
    pub wrap: u32,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            length_secs: 900,
            wrap: 1000,
        }
    }
}

/// Liveness polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub poll_interval_secs: u64,
    /// Seconds an output file may go unmodified before its capture is dead.
    pub dead_time_secs: u64,
    pub reboot_timeout_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            dead_time_secs: 30,
            reboot_timeout_secs: 10,
        }
    }
}

impl HealthConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn dead_time(&self) -> Duration {
        Duration::from_secs(self.dead_time_secs)
    }

    pub fn reboot_timeout(&self) -> Duration {
        Duration::from_secs(self.reboot_timeout_secs)
    }
}

/// Disk eviction threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskConfig {
    pub min_free_percent: u8,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            min_free_percent: 10,
        }
    }
}

/// Corrupt segment repair settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    pub interval_secs: u64,
    /// Chunk size used when rewriting a repaired segment in place.
    pub copy_chunk_bytes: usize,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            copy_chunk_bytes: 1024 * 1024,
        }
    }
}

impl RepairConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub untrunc_path: Option<PathBuf>,
    /// Upper bound for one probe, repair or remux invocation.
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            untrunc_path: None,
            timeout_secs: 300,
        }
    }
}

impl ToolsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// One IP camera.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub name: String,
    pub ip: String,
    #[serde(default = "default_rtsp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// ONVIF device service port; required for reboot-on-failure.
    #[serde(default)]
    pub onvif_port: Option<u16>,
    #[serde(default)]
    pub reboot_on_failure: bool,
    pub streams: Vec<StreamConfig>,
}

fn default_rtsp_port() -> u16 {
    554
}

impl CameraConfig {
    /// The stream persisted to disk: always the first declared one.
    pub fn primary_stream(&self) -> Option<&StreamConfig> {
        self.streams.first()
    }

    /// Whether failures escalate to a camera reboot instead of local restarts.
    pub fn reboots_on_failure(&self) -> bool {
        self.reboot_on_failure && self.onvif_port.is_some()
    }

    /// RTSP transport URL for one of this camera's streams.
    pub fn rtsp_url(&self, stream: &StreamConfig) -> String {
        format!(
            "rtsp://{}:{}@{}:{}{}",
            self.username, self.password, self.ip, self.port, stream.path
        )
    }

    /// Same as [`rtsp_url`](Self::rtsp_url) with the password masked, for logs.
    pub fn redacted_rtsp_url(&self, stream: &StreamConfig) -> String {
        format!(
            "rtsp://{}:***@{}:{}{}",
            self.username, self.ip, self.port, stream.path
        )
    }
}

/// One stream (profile) of a camera.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamConfig {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub map: Option<String>,
    #[serde(default)]
    pub include_audio: bool,
    #[serde(default)]
    pub vtag: Option<String>,
    #[serde(default)]
    pub aspect: Option<String>,
    /// Extra whitespace-separated arguments for the live preview invocation.
    #[serde(default)]
    pub xargs: Option<String>,
}

impl StreamConfig {
    pub fn map_arg(&self) -> &str {
        self.map.as_deref().unwrap_or(DEFAULT_STREAM_MAP)
    }
}
