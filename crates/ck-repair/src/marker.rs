//! The per-camera check marker.
//!
//! A small file in each camera directory holding the name of the newest
//! segment known to be playable, so each scan only probes what was recorded
//! since the previous one. The name `.moov_check` is what the recordings web
//! server already hides from its listings.

use std::io::Write;
use std::path::{Path, PathBuf};

use ck_core::Result;

pub const MARKER_FILE: &str = ".moov_check";

#[derive(Debug, Clone)]
pub struct CheckMarker {
    path: PathBuf,
}

impl CheckMarker {
    pub fn new(camera_dir: &Path) -> Self {
        Self {
            path: camera_dir.join(MARKER_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The last verified segment's file name, or `None` when no marker has
    /// been written yet.
    pub fn read(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => {
                let name = text.trim();
                Ok((!name.is_empty()).then(|| name.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Record `file_name` as verified. The write is synced before returning.
    pub fn write(&self, file_name: &str) -> Result<()> {
        let mut file = std::fs::File::create(&self.path)?;
        file.write_all(file_name.as_bytes())?;
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }
}
