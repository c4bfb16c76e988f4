//! The capture loop: start every camera, then periodically recover dead
//! captures and free disk space.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use ck_av::{ToolRegistry, FFMPEG};
use ck_core::config::Config;
use ck_core::Result;
use tokio_util::sync::CancellationToken;

use crate::eviction::{DiskEvictor, DiskUsageProbe, EvictionReport, StatvfsProbe};
use crate::process::{CaptureProcess, CaptureSpec};
use crate::reboot::OnvifRebooter;
use crate::supervisor::{CameraSupervisor, ManagedCapture, TickReport};

/// All cameras' supervisors plus the shared disk evictor.
pub struct CaptureService {
    supervisors: Vec<CameraSupervisor>,
    evictor: DiskEvictor,
    poll_interval: Duration,
}

impl std::fmt::Debug for CaptureService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureService")
            .field("supervisors", &self.supervisors.len())
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl CaptureService {
    /// Launch recording and live captures for every configured camera.
    ///
    /// # Errors
    ///
    /// Fails when ffmpeg is missing or a capture cannot be spawned at all.
    /// Captures already started are killed when the partial service drops.
    pub fn start(config: &Config, tools: &ToolRegistry) -> Result<Self> {
        Self::start_with_probe(config, tools, Box::new(StatvfsProbe))
    }

    pub fn start_with_probe(
        config: &Config,
        tools: &ToolRegistry,
        probe: Box<dyn DiskUsageProbe>,
    ) -> Result<Self> {
        let ffmpeg = tools.require(FFMPEG)?.path.clone();
        std::fs::create_dir_all(config.capture_root())?;

        let mut supervisors = Vec::with_capacity(config.cameras.len());
        for camera in &config.cameras {
            let recording = CaptureProcess::start(CaptureSpec::recording(
                config,
                camera,
                ffmpeg.clone(),
            )?)?;

            let mut live: Vec<Box<dyn ManagedCapture>> = Vec::with_capacity(camera.streams.len());
            for stream in &camera.streams {
                let spec = CaptureSpec::live(config, camera, stream, ffmpeg.clone());
                live.push(Box::new(CaptureProcess::start(spec)?));
            }

            let mut supervisor = CameraSupervisor::new(&camera.name, Box::new(recording), live);
            if camera.reboots_on_failure() {
                let rebooter = OnvifRebooter::new(camera, config.health.reboot_timeout())?;
                tracing::info!(
                    camera = %camera.name,
                    endpoint = rebooter.endpoint(),
                    "Reboot on failure enabled"
                );
                supervisor = supervisor.with_rebooter(Arc::new(rebooter));
            }

            tracing::info!(
                camera = %camera.name,
                streams = camera.streams.len(),
                "Camera capture started"
            );
            supervisors.push(supervisor);
        }

        let evictor = DiskEvictor::new(
            config.capture_root(),
            config
                .cameras
                .iter()
                .map(|c| config.segment_naming(&c.name))
                .collect(),
            config.disk.min_free_percent,
            probe,
        );

        Ok(Self {
            supervisors,
            evictor,
            poll_interval: config.health.poll_interval(),
        })
    }

    /// One health pass: liveness recovery for each camera in turn, then
    /// eviction.
    pub async fn tick(&mut self, now: SystemTime) -> Result<(Vec<TickReport>, EvictionReport)> {
        let mut reports = Vec::with_capacity(self.supervisors.len());
        for supervisor in &mut self.supervisors {
            let report = supervisor.tick(now).await;
            if report != TickReport::default() {
                tracing::debug!(camera = supervisor.camera(), ?report, "Health check");
            }
            reports.push(report);
        }

        let eviction = self.evictor.evict()?;
        if !eviction.deleted.is_empty() {
            tracing::info!(
                deleted = eviction.deleted.len(),
                bytes_freed = eviction.bytes_freed,
                "Freed disk space"
            );
        }
        Ok((reports, eviction))
    }

    /// Run health passes every poll interval until `cancel` fires, then stop
    /// all captures.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        tracing::info!(
            cameras = self.supervisors.len(),
            poll_interval_secs = self.poll_interval.as_secs(),
            "Capture loop running"
        );

        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
            if let Err(e) = self.tick(SystemTime::now()).await {
                break Err(e);
            }
        };

        self.shutdown().await;
        result
    }

    pub async fn shutdown(&mut self) {
        for supervisor in &mut self.supervisors {
            supervisor.shutdown().await;
        }
        tracing::info!("Capture stopped");
    }
}
