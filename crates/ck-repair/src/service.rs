//! The repair loop: scan every camera, sleep, repeat.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ck_av::ToolRegistry;
use ck_core::config::Config;
use ck_core::{Result, SegmentNaming};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::scanner::{ScanReport, SegmentRepairer};

struct CameraTarget {
    dir: PathBuf,
    naming: SegmentNaming,
}

/// Periodic repair over all configured cameras.
pub struct RepairService {
    repairer: Arc<SegmentRepairer>,
    cameras: Vec<CameraTarget>,
    interval: Duration,
}

impl RepairService {
    pub fn new(config: &Config, repairer: Arc<SegmentRepairer>) -> Self {
        let cameras = config
            .cameras
            .iter()
            .map(|c| CameraTarget {
                dir: config.camera_dir(&c.name),
                naming: config.segment_naming(&c.name),
            })
            .collect();
        Self {
            repairer,
            cameras,
            interval: config.repair.interval(),
        }
    }

    /// Service backed by ffmpeg and untrunc. Fails if either is missing.
    pub fn from_config(config: &Config, tools: &ToolRegistry) -> Result<Self> {
        let repairer = SegmentRepairer::from_registry(tools, &config.repair)?;
        Ok(Self::new(config, Arc::new(repairer)))
    }

    /// Scan every camera once. Camera directories are disjoint, so cameras
    /// are scanned concurrently; within a camera everything is sequential.
    pub async fn run_once(&self) -> Vec<(String, Result<ScanReport>)> {
        let scans = self.cameras.iter().map(|target| async move {
            let camera = target.naming.camera().to_string();
            let result = self.repairer.scan(&target.dir, &target.naming).await;
            match &result {
                Ok(report) if report.is_quiet() => {
                    tracing::debug!(camera = %camera, checked = report.checked.len(), "Scan complete");
                }
                Ok(report) => {
                    tracing::info!(
                        camera = %camera,
                        checked = report.checked.len(),
                        repaired = report.repaired.len(),
                        failed = report.failed.len(),
                        pending = report.pending.len(),
                        "Scan complete"
                    );
                }
                Err(e) => {
                    tracing::error!(camera = %camera, error = %e, "Scan failed");
                }
            }
            (camera, result)
        });
        join_all(scans).await
    }

    /// Scan, then wait the repair interval, until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            cameras = self.cameras.len(),
            interval_secs = self.interval.as_secs(),
            "Repair loop running"
        );
        loop {
            self.run_once().await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        tracing::info!("Repair loop stopped");
    }
}
