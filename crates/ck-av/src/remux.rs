//! Faststart remux: moves the `moov` atom to the front of an MP4.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::command::ToolCommand;
use crate::repair::with_suffix;
use crate::tools::{ToolRegistry, FFMPEG};

/// Suffix of the remuxed intermediate written next to a damaged segment.
pub const FASTSTART_SUFFIX: &str = "_faststart.mp4";

/// Path of the faststart intermediate for `damaged`.
pub fn faststart_path(damaged: &Path) -> PathBuf {
    with_suffix(damaged, FASTSTART_SUFFIX)
}

/// Rewrites a file so its container metadata precedes the media data.
#[async_trait]
pub trait Remuxer: Send + Sync {
    /// Remux `input` into `output`. On error, `output` must not be relied on.
    async fn faststart(&self, input: &Path, output: &Path) -> ck_core::Result<()>;
}

/// Remuxes with `ffmpeg -i <in> -c:a copy -c:v copy -movflags faststart <out>`.
#[derive(Debug, Clone)]
pub struct FfmpegRemuxer {
    ffmpeg: PathBuf,
    timeout: Duration,
}

impl FfmpegRemuxer {
    pub fn new(ffmpeg: PathBuf, timeout: Duration) -> Self {
        Self { ffmpeg, timeout }
    }

    pub fn from_registry(tools: &ToolRegistry) -> ck_core::Result<Self> {
        let tool = tools.require(FFMPEG)?;
        Ok(Self::new(tool.path.clone(), tool.timeout))
    }
}

#[async_trait]
impl Remuxer for FfmpegRemuxer {
    async fn faststart(&self, input: &Path, output: &Path) -> ck_core::Result<()> {
        ToolCommand::new(self.ffmpeg.clone())
            .args(["-hide_banner", "-nostdin", "-loglevel", "error", "-i"])
            .arg(input.to_string_lossy())
            .args(["-c:a", "copy", "-c:v", "copy", "-movflags", "faststart"])
            .arg(output.to_string_lossy())
            .timeout(self.timeout)
            .execute()
            .await?;

        if !output.is_file() {
            return Err(ck_core::Error::tool(
                FFMPEG,
                format!("faststart output {} was not created", output.display()),
            ));
        }
        Ok(())
    }
}
