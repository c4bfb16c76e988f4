//! Keeping the capture filesystem from filling up.
//!
//! When free space drops below the configured percentage, the single oldest
//! recording across all cameras is deleted and the check repeats, so the
//! cameras share the disk as a ring buffer ordered by wall-clock age.

use std::path::{Path, PathBuf};

use ck_core::segment::{list_segments, Segment};
use ck_core::{Error, Result, SegmentNaming};

/// Size and free space of a filesystem, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsageSnapshot {
    pub total: u64,
    pub free: u64,
}

impl DiskUsageSnapshot {
    /// Whole-number percentage of free space, rounded down.
    pub fn free_percent(&self) -> Result<u8> {
        if self.total == 0 {
            return Err(Error::Disk("filesystem reports zero total size".into()));
        }
        let percent = u128::from(self.free) * 100 / u128::from(self.total);
        Ok(percent.min(100) as u8)
    }
}

/// Source of disk usage figures.
pub trait DiskUsageProbe: Send + Sync {
    fn usage(&self, path: &Path) -> Result<DiskUsageSnapshot>;
}

/// Reads usage from `statvfs(3)`. Free space is what an unprivileged writer
/// can use, excluding blocks reserved for root.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatvfsProbe;

impl DiskUsageProbe for StatvfsProbe {
    #[cfg(unix)]
    fn usage(&self, path: &Path) -> Result<DiskUsageSnapshot> {
        use nix::sys::statvfs::statvfs;

        let stat = statvfs(path)
            .map_err(|e| Error::Disk(format!("statvfs {} failed: {e}", path.display())))?;
        let fragment = stat.fragment_size() as u64;
        Ok(DiskUsageSnapshot {
            total: stat.blocks() as u64 * fragment,
            free: stat.blocks_available() as u64 * fragment,
        })
    }

    #[cfg(not(unix))]
    fn usage(&self, path: &Path) -> Result<DiskUsageSnapshot> {
        Err(Error::Disk(format!(
            "disk usage is not supported on this platform ({})",
            path.display()
        )))
    }
}

/// What one eviction pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    pub deleted: Vec<PathBuf>,
    pub bytes_freed: u64,
    /// Free space was still short but no recordings were left to delete.
    pub exhausted: bool,
}

/// Deletes the oldest recordings until the free-space target is met.
pub struct DiskEvictor {
    capture_root: PathBuf,
    cameras: Vec<SegmentNaming>,
    min_free_percent: u8,
    probe: Box<dyn DiskUsageProbe>,
}

impl DiskEvictor {
    pub fn new(
        capture_root: PathBuf,
        cameras: Vec<SegmentNaming>,
        min_free_percent: u8,
        probe: Box<dyn DiskUsageProbe>,
    ) -> Self {
        Self {
            capture_root,
            cameras,
            min_free_percent,
            probe,
        }
    }

    /// Oldest recording by modification time across every camera.
    fn oldest_segment(&self) -> Result<Option<Segment>> {
        let mut oldest: Option<Segment> = None;
        for naming in &self.cameras {
            let dir = self.capture_root.join(naming.camera());
            let candidate = list_segments(&dir, naming)?
                .into_iter()
                .min_by_key(|s| s.modified);
            if let Some(candidate) = candidate {
                if oldest.as_ref().map_or(true, |o| candidate.modified < o.modified) {
                    oldest = Some(candidate);
                }
            }
        }
        Ok(oldest)
    }

    /// Run one eviction pass.
    ///
    /// # Errors
    ///
    /// Fails only when disk usage cannot be read or a camera directory cannot
    /// be listed. Running out of candidates and failed deletions are logged
    /// and end the pass normally.
    pub fn evict(&self) -> Result<EvictionReport> {
        let mut report = EvictionReport::default();

        loop {
            let usage = self.probe.usage(&self.capture_root)?;
            let free_percent = usage.free_percent()?;
            if free_percent >= self.min_free_percent {
                break;
            }

            let Some(segment) = self.oldest_segment()? else {
                tracing::error!(
                    free_percent,
                    min_free_percent = self.min_free_percent,
                    "Disk below free-space target and no recordings left to delete"
                );
                report.exhausted = true;
                break;
            };

            if let Err(e) = std::fs::remove_file(&segment.path) {
                tracing::warn!(
                    segment = %segment.path.display(),
                    error = %e,
                    "Failed to delete oldest recording"
                );
                break;
            }

            tracing::info!(
                segment = %segment.file_name,
                bytes = segment.len,
                free_percent,
                "Deleted oldest recording"
            );
            report.bytes_freed += segment.len;
            report.deleted.push(segment.path);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{File, FileTimes};
    use std::time::{Duration, SystemTime};

    /// A disk of fixed size whose only contents are the camera directories.
    struct FakeDisk {
        total: u64,
        cameras: Vec<PathBuf>,
    }

    impl DiskUsageProbe for FakeDisk {
        fn usage(&self, _path: &Path) -> Result<DiskUsageSnapshot> {
            let mut used = 0;
            for dir in &self.cameras {
                if let Ok(entries) = std::fs::read_dir(dir) {
                    for entry in entries.flatten() {
                        used += entry.metadata().map(|m| m.len()).unwrap_or(0);
                    }
                }
            }
            Ok(DiskUsageSnapshot {
                total: self.total,
                free: self.total.saturating_sub(used),
            })
        }
    }

    fn write(dir: &Path, name: &str, bytes: usize, age_secs: u64) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, vec![0u8; bytes]).unwrap();
        let mtime = SystemTime::now() - Duration::from_secs(age_secs);
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_times(FileTimes::new().set_modified(mtime))
            .unwrap();
        path
    }

    fn evictor(root: &Path, total: u64, min_free: u8) -> DiskEvictor {
        let names = ["front", "back"];
        DiskEvictor::new(
            root.to_path_buf(),
            names.iter().map(|n| SegmentNaming::new(*n, 1000)).collect(),
            min_free,
            Box::new(FakeDisk {
                total,
                cameras: names.iter().map(|n| root.join(n)).collect(),
            }),
        )
    }

    #[test]
    fn free_percent_rounds_down() {
        let s = DiskUsageSnapshot { total: 1000, free: 99 };
        assert_eq!(s.free_percent().unwrap(), 9);
        let s = DiskUsageSnapshot { total: 1000, free: 100 };
        assert_eq!(s.free_percent().unwrap(), 10);
    }

    #[test]
    fn zero_total_is_an_error() {
        let s = DiskUsageSnapshot { total: 0, free: 0 };
        assert!(matches!(s.free_percent(), Err(Error::Disk(_))));
    }

    #[test]
    fn nothing_deleted_when_space_is_sufficient() {
        let tmp = tempfile::tempdir().unwrap();
        let seg = write(&tmp.path().join("front"), "front_000.mp4", 100, 100);
        let report = evictor(tmp.path(), 1000, 10).evict().unwrap();
        assert_eq!(report, EvictionReport::default());
        assert!(seg.exists());
    }

    #[test]
    fn oldest_across_cameras_goes_first_and_stops_when_satisfied() {
        let tmp = tempfile::tempdir().unwrap();
        let front = tmp.path().join("front");
        let back = tmp.path().join("back");
        let f0 = write(&front, "front_000.mp4", 300, 500);
        let b0 = write(&back, "back_000.mp4", 300, 400);
        let f1 = write(&front, "front_001.mp4", 300, 300);
        let b1 = write(&back, "back_001.mp4", 50, 200);
        // Used 950 of 1000: 5% free. Target 40% needs 350 bytes back.

        let report = evictor(tmp.path(), 1000, 40).evict().unwrap();

        assert_eq!(report.deleted, vec![f0.clone(), b0.clone()]);
        assert_eq!(report.bytes_freed, 600);
        assert!(!report.exhausted);
        assert!(!f0.exists() && !b0.exists());
        assert!(f1.exists() && b1.exists());
    }

    #[test]
    fn exhausts_gracefully() {
        let tmp = tempfile::tempdir().unwrap();
        let front = tmp.path().join("front");
        let only = write(&front, "front_007.mp4", 500, 10);
        // Not a recording of this camera; never a candidate.
        let other = write(&front, "notes.txt", 480, 1000);

        let report = evictor(tmp.path(), 1000, 60).evict().unwrap();

        assert_eq!(report.deleted, vec![only]);
        assert!(report.exhausted);
        assert!(other.exists());
    }

    #[test]
    fn missing_camera_directory_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let report = evictor(tmp.path(), 1000, 10).evict().unwrap();
        assert!(report.deleted.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn statvfs_reads_a_real_filesystem() {
        let tmp = tempfile::tempdir().unwrap();
        let usage = StatvfsProbe.usage(tmp.path()).unwrap();
        assert!(usage.total > 0);
        assert!(usage.free <= usage.total);
    }
}
