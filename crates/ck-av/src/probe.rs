//! Detecting segments whose container metadata is missing.
//!
//! A segment cut short by a power loss or a killed capture process has its
//! media data on disk but no `moov` atom, so players and duration tools
//! cannot open it. ffmpeg reports this clearly at trace verbosity.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::command::ToolCommand;
use crate::tools::{ToolRegistry, FFMPEG};

/// Substrings (lowercase) in probe output that mean the container index is
/// absent or unreadable.
pub const MISSING_METADATA_SIGNATURES: &[&str] = &["moov atom not found", "invalid"];

/// Whether probe diagnostics indicate missing or invalid container metadata.
pub fn is_missing_metadata(diagnostics: &str) -> bool {
    let text = diagnostics.to_lowercase();
    MISSING_METADATA_SIGNATURES
        .iter()
        .any(|sig| text.contains(sig))
}

/// Produces diagnostic text for a media file.
#[async_trait]
pub trait MetadataProbe: Send + Sync {
    /// Return the probe's diagnostic output for `file`.
    async fn diagnose(&self, file: &Path) -> ck_core::Result<String>;
}

/// Probes with `ffmpeg -v trace -i <file>`.
///
/// ffmpeg exits non-zero here because no output is given; only the text
/// matters.
#[derive(Debug, Clone)]
pub struct FfmpegProbe {
    ffmpeg: PathBuf,
    timeout: Duration,
}

impl FfmpegProbe {
    pub fn new(ffmpeg: PathBuf, timeout: Duration) -> Self {
        Self { ffmpeg, timeout }
    }

    pub fn from_registry(tools: &ToolRegistry) -> ck_core::Result<Self> {
        let tool = tools.require(FFMPEG)?;
        Ok(Self::new(tool.path.clone(), tool.timeout))
    }
}

#[async_trait]
impl MetadataProbe for FfmpegProbe {
    async fn diagnose(&self, file: &Path) -> ck_core::Result<String> {
        let output = ToolCommand::new(self.ffmpeg.clone())
            .args(["-hide_banner", "-nostdin", "-v", "trace", "-i"])
            .arg(file.to_string_lossy())
            .timeout(self.timeout)
            .output()
            .await?;
        Ok(output.combined())
    }
}
