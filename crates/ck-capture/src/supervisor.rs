//! Per-camera liveness checks and recovery.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use ck_core::Result;

use crate::process::CaptureProcess;
use crate::reboot::CameraRebooter;

/// A capture the supervisor can check and restart.
#[async_trait]
pub trait ManagedCapture: Send {
    fn label(&self) -> String;
    fn is_alive(&mut self, now: SystemTime) -> bool;
    async fn restart(&mut self) -> Result<()>;
    async fn kill(&mut self);
}

#[async_trait]
impl ManagedCapture for CaptureProcess {
    fn label(&self) -> String {
        CaptureProcess::label(self)
    }

    fn is_alive(&mut self, now: SystemTime) -> bool {
        CaptureProcess::is_alive(self, now)
    }

    async fn restart(&mut self) -> Result<()> {
        CaptureProcess::restart(self).await
    }

    async fn kill(&mut self) {
        CaptureProcess::kill(self).await
    }
}

/// Where a reboot-on-failure camera is in its recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryState {
    #[default]
    Normal,
    /// A reboot was accepted; every capture restarts on the next tick.
    RebootPending,
}

/// Outcome of one supervisor tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Captures found dead this tick.
    pub dead: Vec<String>,
    /// Captures successfully restarted.
    pub restarted: Vec<String>,
    /// Captures whose restart failed.
    pub failed: Vec<String>,
    pub reboot_issued: bool,
}

/// Watches one camera's recording and live captures.
pub struct CameraSupervisor {
    camera: String,
    captures: Vec<Box<dyn ManagedCapture>>,
    rebooter: Option<Arc<dyn CameraRebooter>>,
    state: RecoveryState,
}

impl CameraSupervisor {
    /// `recording` first, then one live capture per stream.
    pub fn new(
        camera: impl Into<String>,
        recording: Box<dyn ManagedCapture>,
        live: Vec<Box<dyn ManagedCapture>>,
    ) -> Self {
        let mut captures = Vec::with_capacity(live.len() + 1);
        captures.push(recording);
        captures.extend(live);
        Self {
            camera: camera.into(),
            captures,
            rebooter: None,
            state: RecoveryState::Normal,
        }
    }

    /// Switch to reboot-on-failure: dead captures trigger a camera reboot
    /// instead of individual restarts.
    pub fn with_rebooter(mut self, rebooter: Arc<dyn CameraRebooter>) -> Self {
        self.rebooter = Some(rebooter);
        self
    }

    pub fn camera(&self) -> &str {
        &self.camera
    }

    pub fn state(&self) -> RecoveryState {
        self.state
    }

    fn dead_captures(&mut self, now: SystemTime) -> Vec<usize> {
        self.captures
            .iter_mut()
            .enumerate()
            .filter_map(|(i, c)| (!c.is_alive(now)).then_some(i))
            .collect()
    }

    async fn restart_one(&mut self, index: usize, report: &mut TickReport) {
        let capture = &mut self.captures[index];
        let label = capture.label();
        match capture.restart().await {
            Ok(()) => {
                tracing::info!(camera = %self.camera, capture = %label, "Restarted capture");
                report.restarted.push(label);
            }
            Err(e) => {
                tracing::error!(
                    camera = %self.camera,
                    capture = %label,
                    error = %e,
                    "Failed to restart capture"
                );
                report.failed.push(label);
            }
        }
    }

    /// Check every capture once and recover what is dead.
    pub async fn tick(&mut self, now: SystemTime) -> TickReport {
        let mut report = TickReport::default();

        let Some(rebooter) = self.rebooter.clone() else {
            for index in self.dead_captures(now) {
                let label = self.captures[index].label();
                tracing::warn!(camera = %self.camera, capture = %label, "Capture is dead");
                report.dead.push(label);
                self.restart_one(index, &mut report).await;
            }
            return report;
        };

        match self.state {
            RecoveryState::RebootPending => {
                tracing::info!(camera = %self.camera, "Restarting all captures after reboot");
                for index in 0..self.captures.len() {
                    self.restart_one(index, &mut report).await;
                }
                self.state = RecoveryState::Normal;
            }
            RecoveryState::Normal => {
                let dead = self.dead_captures(now);
                if dead.is_empty() {
                    return report;
                }
                report.dead = dead.iter().map(|&i| self.captures[i].label()).collect();
                tracing::warn!(camera = %self.camera, dead = ?report.dead, "Rebooting camera");

                match rebooter.reboot().await {
                    Ok(()) => {
                        report.reboot_issued = true;
                        self.state = RecoveryState::RebootPending;
                    }
                    Err(e) => {
                        tracing::error!(camera = %self.camera, error = %e, "Camera reboot failed");
                    }
                }
            }
        }

        report
    }

    /// Stop every capture.
    pub async fn shutdown(&mut self) {
        for capture in &mut self.captures {
            capture.kill().await;
        }
    }
}
