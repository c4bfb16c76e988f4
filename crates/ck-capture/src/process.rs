//! Long-running ffmpeg capture processes.
//!
//! A [`CaptureProcess`] owns at most one child at a time. Liveness is judged
//! from outside: the child must still be running *and* its output file must
//! have been touched within the dead time. ffmpeg happily sits connected to a
//! camera that stopped sending frames, so the process state alone is not
//! enough.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, SystemTime};

use ck_core::config::{CameraConfig, Config, StreamConfig};
use ck_core::segment::{list_segments, next_start_number};
use ck_core::{Error, Result, SegmentNaming};
use tokio::process::{Child, Command};

use crate::args::{live_args, recording_args, LIVE_PLAYLIST};

/// How long a terminated capture gets to finalize its output before it is
/// killed outright.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// What a capture process produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    /// Segmented MP4 recording of the primary stream.
    Recording,
    /// HLS live preview of one stream.
    Live,
}

/// Everything needed to (re)launch one capture.
#[derive(Debug, Clone)]
pub struct CaptureSpec {
    pub kind: CaptureKind,
    pub camera: CameraConfig,
    pub stream: StreamConfig,
    pub camera_dir: PathBuf,
    pub naming: SegmentNaming,
    pub segment_length_secs: u64,
    pub dead_time: Duration,
    pub ffmpeg: PathBuf,
}

impl CaptureSpec {
    /// Recording of the camera's primary stream.
    pub fn recording(config: &Config, camera: &CameraConfig, ffmpeg: PathBuf) -> Result<Self> {
        let stream = camera.primary_stream().ok_or_else(|| {
            Error::Validation(format!("camera '{}' has no streams", camera.name))
        })?;
        Ok(Self {
            kind: CaptureKind::Recording,
            camera: camera.clone(),
            stream: stream.clone(),
            camera_dir: config.camera_dir(&camera.name),
            naming: config.segment_naming(&camera.name),
            segment_length_secs: config.segment.length_secs,
            dead_time: config.health.dead_time(),
            ffmpeg,
        })
    }

    /// Live preview of one of the camera's streams.
    pub fn live(
        config: &Config,
        camera: &CameraConfig,
        stream: &StreamConfig,
        ffmpeg: PathBuf,
    ) -> Self {
        Self {
            kind: CaptureKind::Live,
            camera: camera.clone(),
            stream: stream.clone(),
            camera_dir: config.camera_dir(&camera.name),
            naming: config.segment_naming(&camera.name),
            segment_length_secs: config.segment.length_secs,
            dead_time: config.health.dead_time(),
            ffmpeg,
        }
    }

    /// Short identifier used in logs and tick reports, e.g. `front:recording`
    /// or `front:live/main`.
    pub fn label(&self) -> String {
        match self.kind {
            CaptureKind::Recording => format!("{}:recording", self.camera.name),
            CaptureKind::Live => format!("{}:live/{}", self.camera.name, self.stream.name),
        }
    }

    pub fn live_dir(&self) -> PathBuf {
        self.camera_dir.join(&self.stream.name)
    }

    pub fn playlist(&self) -> PathBuf {
        self.live_dir().join(LIVE_PLAYLIST)
    }

    fn args(&self, input_url: &str, start_number: u32) -> Vec<String> {
        match self.kind {
            CaptureKind::Recording => recording_args(
                &self.stream,
                input_url,
                &self.naming,
                self.segment_length_secs,
                start_number,
                &self.camera_dir,
            ),
            CaptureKind::Live => live_args(&self.stream, input_url, &self.playlist()),
        }
    }
}

/// Whether a file modified at `modified` is recent enough at `now`.
///
/// Age is truncated to whole seconds, so an age of exactly `dead_time` is
/// still fresh. Timestamps in the future count as fresh.
pub fn is_fresh(modified: SystemTime, now: SystemTime, dead_time: Duration) -> bool {
    let age = now.duration_since(modified).unwrap_or_default();
    age.as_secs() <= dead_time.as_secs()
}

/// Handle to one running capture invocation.
#[derive(Debug)]
pub struct CaptureProcess {
    spec: CaptureSpec,
    child: Option<Child>,
}

impl CaptureProcess {
    /// Launch the capture and return immediately; readiness is judged later by
    /// [`is_alive`](Self::is_alive).
    pub fn start(spec: CaptureSpec) -> Result<Self> {
        let mut process = Self { spec, child: None };
        process.launch()?;
        Ok(process)
    }

    pub fn spec(&self) -> &CaptureSpec {
        &self.spec
    }

    pub fn label(&self) -> String {
        self.spec.label()
    }

    fn prepare_output(&self) -> Result<()> {
        std::fs::create_dir_all(&self.spec.camera_dir)?;

        if self.spec.kind == CaptureKind::Live {
            let dir = self.spec.live_dir();
            if dir.is_dir() {
                tracing::info!(dir = %dir.display(), "Removing stale live preview directory");
                std::fs::remove_dir_all(&dir)?;
            }
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    fn launch(&mut self) -> Result<()> {
        self.prepare_output()?;

        let start_number = match self.spec.kind {
            CaptureKind::Recording => {
                let segments = list_segments(&self.spec.camera_dir, &self.spec.naming)?;
                next_start_number(&segments, &self.spec.naming)
            }
            CaptureKind::Live => 0,
        };

        let camera = &self.spec.camera;
        let args = self.spec.args(&camera.rtsp_url(&self.spec.stream), start_number);
        let shown = self
            .spec
            .args(&camera.redacted_rtsp_url(&self.spec.stream), start_number);
        tracing::info!(
            camera = %camera.name,
            stream = %self.spec.stream.name,
            command = %format!("{} {}", self.spec.ffmpeg.display(), shown.join(" ")),
            "Starting capture"
        );

        let child = Command::new(&self.spec.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::tool(
                    ck_av::FFMPEG,
                    format!("failed to spawn {}: {e}", self.spec.label()),
                )
            })?;
        self.child = Some(child);
        Ok(())
    }

    /// Whether the child is still running, reaping it if it has exited.
    fn is_running(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                tracing::debug!(capture = %self.spec.label(), %status, "Capture process exited");
                false
            }
            Err(e) => {
                tracing::warn!(capture = %self.spec.label(), error = %e, "Failed to poll capture process");
                false
            }
        }
    }

    fn newest_output(&self) -> Option<SystemTime> {
        match self.spec.kind {
            CaptureKind::Live => std::fs::symlink_metadata(self.spec.playlist())
                .and_then(|m| m.modified())
                .ok(),
            CaptureKind::Recording => {
                match list_segments(&self.spec.camera_dir, &self.spec.naming) {
                    Ok(segments) => segments.last().map(|s| s.modified),
                    Err(e) => {
                        tracing::warn!(
                            camera = %self.spec.camera.name,
                            error = %e,
                            "Failed to list segments"
                        );
                        None
                    }
                }
            }
        }
    }

    /// Running, and the output (playlist or newest segment) was updated
    /// within the dead time.
    pub fn is_alive(&mut self, now: SystemTime) -> bool {
        if !self.is_running() {
            return false;
        }
        self.newest_output()
            .is_some_and(|modified| is_fresh(modified, now, self.spec.dead_time))
    }

    /// Kill any current child and launch a fresh one. A recording resumes at
    /// one past the newest segment on disk.
    pub async fn restart(&mut self) -> Result<()> {
        self.kill().await;
        self.launch()
    }

    /// Stop the child, if any. ffmpeg gets a chance to close the current
    /// segment cleanly before it is killed.
    pub async fn kill(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if matches!(child.try_wait(), Ok(Some(_))) {
            return;
        }

        terminate(&mut child);
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
            tracing::warn!(
                capture = %self.spec.label(),
                "Capture did not exit after terminate; killing"
            );
            if let Err(e) = child.kill().await {
                tracing::debug!(capture = %self.spec.label(), error = %e, "Kill failed");
            }
        }
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            tracing::debug!(pid, error = %e, "SIGTERM failed");
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}
