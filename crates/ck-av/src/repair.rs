//! Restoring a missing `moov` atom with untrunc.
//!
//! untrunc rebuilds the index of a damaged file from a reference recorded by
//! the same camera with the same settings, writing `<damaged>_fixed.mp4`
//! next to the damaged file.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;

use crate::command::ToolCommand;
use crate::tools::{ToolRegistry, UNTRUNC};

/// Suffix untrunc appends to the damaged file's name.
pub const RESTORED_SUFFIX: &str = "_fixed.mp4";

/// Path untrunc writes the restored copy of `damaged` to.
pub fn restored_path(damaged: &Path) -> PathBuf {
    with_suffix(damaged, RESTORED_SUFFIX)
}

pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Synthesizes a metadata-restored copy of a damaged segment.
#[async_trait]
pub trait MetadataRepair: Send + Sync {
    /// Restore `damaged` using `reference` as the metadata donor.
    ///
    /// Returns the path where the restored copy is expected. The tool may
    /// "succeed" without producing anything, so the caller validates the file
    /// itself.
    async fn restore(&self, reference: &Path, damaged: &Path) -> ck_core::Result<PathBuf>;
}

/// Repairs with `untrunc <reference> <damaged>`.
#[derive(Debug, Clone)]
pub struct UntruncRepair {
    untrunc: PathBuf,
    timeout: Duration,
}

impl UntruncRepair {
    pub fn new(untrunc: PathBuf, timeout: Duration) -> Self {
        Self { untrunc, timeout }
    }

    pub fn from_registry(tools: &ToolRegistry) -> ck_core::Result<Self> {
        let tool = tools.require(UNTRUNC)?;
        Ok(Self::new(tool.path.clone(), tool.timeout))
    }
}

#[async_trait]
impl MetadataRepair for UntruncRepair {
    async fn restore(&self, reference: &Path, damaged: &Path) -> ck_core::Result<PathBuf> {
        let output = ToolCommand::new(self.untrunc.clone())
            .arg(reference.to_string_lossy())
            .arg(damaged.to_string_lossy())
            .timeout(self.timeout)
            .output()
            .await?;

        if !output.status.success() {
            tracing::debug!(
                damaged = %damaged.display(),
                status = %output.status,
                "untrunc exited unsuccessfully"
            );
        }

        Ok(restored_path(damaged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restored_path_appends_to_full_name() {
        assert_eq!(
            restored_path(Path::new("/data/capture/front/front_007.mp4")),
            PathBuf::from("/data/capture/front/front_007.mp4_fixed.mp4")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn untrunc_is_called_with_reference_then_damaged() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("untrunc");
        // Copies the damaged file to "<damaged>_fixed.mp4" and records its arguments.
        std::fs::write(
            &fake,
            format!(
                "#!/bin/sh\necho \"$1 $2\" > {}\ncp \"$2\" \"$2_fixed.mp4\"\n",
                dir.path().join("args").display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let good = dir.path().join("front_001.mp4");
        let bad = dir.path().join("front_002.mp4");
        std::fs::write(&good, b"good").unwrap();
        std::fs::write(&bad, b"bad").unwrap();

        let repair = UntruncRepair::new(fake, Duration::from_secs(5));
        let restored = repair.restore(&good, &bad).await.unwrap();

        assert_eq!(restored, restored_path(&bad));
        assert_eq!(std::fs::read(&restored).unwrap(), b"bad");
        let args = std::fs::read_to_string(dir.path().join("args")).unwrap();
        assert_eq!(args.trim(), format!("{} {}", good.display(), bad.display()));
    }
}
