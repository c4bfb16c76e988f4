//! The long-running commands.

use anyhow::{Context, Result};
use ck_av::ToolRegistry;
use ck_capture::CaptureService;
use ck_core::config::Config;
use ck_repair::RepairService;
use tokio_util::sync::CancellationToken;

/// Start every camera and supervise until SIGINT/SIGTERM.
pub async fn capture(config: &Config, tools: &ToolRegistry) -> Result<()> {
    let service = CaptureService::start(config, tools).context("Failed to start capture")?;

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    service.run(cancel).await.context("Capture loop failed")
}

/// Repair recordings, once or until SIGINT/SIGTERM.
pub async fn repair(config: &Config, tools: &ToolRegistry, once: bool) -> Result<()> {
    let service = RepairService::from_config(config, tools).context("Failed to start repair")?;

    if once {
        let mut failures = 0;
        for (camera, result) in service.run_once().await {
            match result {
                Ok(report) => println!(
                    "{camera}: checked {}, repaired {}, failed {}, pending {}",
                    report.checked.len(),
                    report.repaired.len(),
                    report.failed.len(),
                    report.pending.len()
                ),
                Err(e) => {
                    failures += 1;
                    println!("{camera}: scan failed: {e}");
                }
            }
        }
        if failures > 0 {
            anyhow::bail!("{failures} camera scan(s) failed");
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));
    service.run(cancel).await;
    Ok(())
}

/// Cancel `cancel` on SIGINT or SIGTERM.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received");
    cancel.cancel();
}
