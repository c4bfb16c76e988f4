//! Finding and repairing segments that lost their `moov` atom.
//!
//! Each scan walks the segments recorded since the check marker, probes
//! them, and repairs the broken ones with a known-good segment from the same
//! camera as the metadata reference. The newest segment is never touched: it
//! is most likely still being written.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ck_av::{
    faststart_path, is_missing_metadata, restored_path, FfmpegProbe, FfmpegRemuxer,
    MetadataProbe, MetadataRepair, Remuxer, ToolRegistry, UntruncRepair,
};
use ck_core::config::RepairConfig;
use ck_core::segment::{list_segments, split_active, Segment};
use ck_core::{Error, Result, SegmentNaming};

use crate::marker::CheckMarker;
use crate::replace::{replace_in_place, SegmentTimes};

/// What one scan of a camera directory did. Entries are segment file names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Segments probed.
    pub checked: Vec<String>,
    /// Zero-byte segments passed over.
    pub skipped_empty: Vec<String>,
    pub repaired: Vec<String>,
    pub failed: Vec<String>,
    /// Broken segments left alone because no reference segment was available.
    pub pending: Vec<String>,
    /// The marker named a segment in the scan list and the scan started
    /// after it.
    pub marker_applied: bool,
    /// Marker value at the end of the scan, if this scan advanced it.
    pub marker_written: Option<String>,
}

impl ScanReport {
    pub fn is_quiet(&self) -> bool {
        self.repaired.is_empty() && self.failed.is_empty() && self.pending.is_empty()
    }
}

/// Repairs one camera directory at a time.
pub struct SegmentRepairer {
    probe: Arc<dyn MetadataProbe>,
    repair: Arc<dyn MetadataRepair>,
    remuxer: Arc<dyn Remuxer>,
    copy_chunk_bytes: usize,
}

enum Verdict {
    Good,
    Broken,
}

impl SegmentRepairer {
    pub fn new(
        probe: Arc<dyn MetadataProbe>,
        repair: Arc<dyn MetadataRepair>,
        remuxer: Arc<dyn Remuxer>,
        copy_chunk_bytes: usize,
    ) -> Self {
        Self {
            probe,
            repair,
            remuxer,
            copy_chunk_bytes,
        }
    }

    /// ffmpeg and untrunc backed repairer. Fails if either tool is missing.
    pub fn from_registry(tools: &ToolRegistry, config: &RepairConfig) -> Result<Self> {
        Ok(Self::new(
            Arc::new(FfmpegProbe::from_registry(tools)?),
            Arc::new(UntruncRepair::from_registry(tools)?),
            Arc::new(FfmpegRemuxer::from_registry(tools)?),
            config.copy_chunk_bytes,
        ))
    }

    async fn verdict(&self, segment: &Segment) -> Result<Verdict> {
        let diagnostics = self.probe.diagnose(&segment.path).await?;
        Ok(if is_missing_metadata(&diagnostics) {
            Verdict::Broken
        } else {
            Verdict::Good
        })
    }

    /// Scan `camera_dir` once.
    ///
    /// Segments are handled strictly one after another. The marker advances
    /// over every segment found good or repaired, up to the first one that
    /// could not be fixed; everything from there on is probed again next
    /// scan.
    ///
    /// # Errors
    ///
    /// Only listing the directory and reading or writing the marker are
    /// fatal for the scan. Per-segment failures are logged and reported.
    pub async fn scan(&self, camera_dir: &Path, naming: &SegmentNaming) -> Result<ScanReport> {
        let camera = naming.camera();
        let marker = CheckMarker::new(camera_dir);
        let marked = marker.read()?;

        let (segments, active) = split_active(list_segments(camera_dir, naming)?);
        let mut report = ScanReport::default();

        let start = match &marked {
            None => 0,
            Some(name) => match segments.iter().position(|s| &s.file_name == name) {
                Some(i) => {
                    report.marker_applied = true;
                    i + 1
                }
                None => {
                    tracing::error!(
                        camera,
                        marker = %name,
                        active = active.as_ref().map(|s| s.file_name.as_str()).unwrap_or("-"),
                        candidates = segments.len(),
                        "Check marker not among recordings; checking all"
                    );
                    0
                }
            },
        };

        let mut reference: Option<PathBuf> = None;
        let mut last_good: Option<PathBuf> = None;
        let mut held = false;
        let mut deferred: Vec<&Segment> = Vec::new();

        for segment in &segments[start..] {
            if let Some(result) = self.resume_copy(segment).await {
                report.checked.push(segment.file_name.clone());
                match result {
                    Ok(()) => {
                        tracing::info!(camera, segment = %segment.file_name, "Finished interrupted repair");
                        report.repaired.push(segment.file_name.clone());
                        last_good = Some(segment.path.clone());
                    }
                    Err(e) => {
                        tracing::error!(camera, segment = %segment.file_name, error = %e, "Failed to finish interrupted repair");
                        report.failed.push(segment.file_name.clone());
                        held = true;
                        continue;
                    }
                }
                if !held {
                    marker.write(&segment.file_name)?;
                    report.marker_written = Some(segment.file_name.clone());
                }
                continue;
            }

            if segment.len == 0 {
                tracing::debug!(camera, segment = %segment.file_name, "Skipping empty segment");
                report.skipped_empty.push(segment.file_name.clone());
                continue;
            }

            tracing::info!(
                camera,
                segment = %segment.file_name,
                size = segment.len,
                total = segments.len() + usize::from(active.is_some()),
                "Checking"
            );
            report.checked.push(segment.file_name.clone());

            let verdict = match self.verdict(segment).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::error!(camera, segment = %segment.file_name, error = %e, "Probe failed");
                    report.failed.push(segment.file_name.clone());
                    held = true;
                    continue;
                }
            };

            if !segment.path.exists() {
                tracing::warn!(camera, segment = %segment.file_name, "Segment vanished during check");
                continue;
            }

            match verdict {
                Verdict::Good => {
                    last_good = Some(segment.path.clone());
                }
                Verdict::Broken => {
                    if reference.is_none() {
                        reference = reference_from_marker(&marker, camera_dir)?;
                    }
                    let Some(good) = reference.clone().or_else(|| last_good.clone()) else {
                        tracing::warn!(
                            camera,
                            segment = %segment.file_name,
                            "Missing moov atom and no good segment to use as reference yet"
                        );
                        deferred.push(segment);
                        held = true;
                        continue;
                    };

                    if !self.repair_logged(&good, segment, &mut report).await {
                        held = true;
                        continue;
                    }
                }
            }

            if !held {
                marker.write(&segment.file_name)?;
                report.marker_written = Some(segment.file_name.clone());
            }
        }

        // A broken segment seen before any good one can still be fixed with
        // a good segment found later in the same scan.
        for segment in deferred {
            match last_good.as_deref() {
                Some(good) => {
                    self.repair_logged(good, segment, &mut report).await;
                }
                None => report.pending.push(segment.file_name.clone()),
            }
        }

        Ok(report)
    }

    /// Repair one segment, recording the outcome. Returns whether it worked.
    async fn repair_logged(&self, reference: &Path, segment: &Segment, report: &mut ScanReport) -> bool {
        match self.repair_segment(reference, segment).await {
            Ok(()) => {
                tracing::info!(segment = %segment.file_name, "Repaired missing moov atom");
                report.repaired.push(segment.file_name.clone());
                true
            }
            Err(e) if e.is_not_found() => {
                tracing::warn!(segment = %segment.file_name, error = %e, "Segment vanished during repair");
                report.failed.push(segment.file_name.clone());
                false
            }
            Err(e) => {
                tracing::error!(segment = %segment.file_name, error = %e, "Failed to repair");
                report.failed.push(segment.file_name.clone());
                false
            }
        }
    }

    /// Restore, remux and copy back one broken segment.
    ///
    /// The restored and remuxed intermediates are removed on every failure
    /// before the copy back. If the copy back itself fails, the segment has
    /// already been truncated and the remuxed file is kept for
    /// [`resume_copy`](Self::resume_copy) on the next scan.
    pub async fn repair_segment(&self, reference: &Path, segment: &Segment) -> Result<()> {
        let restored = restored_path(&segment.path);
        let faststart = faststart_path(&segment.path);
        let times = SegmentTimes::of(&segment.path)?;

        let prepared = self.prepare(reference, segment, &faststart).await;
        remove_if_present(&restored);
        if let Err(e) = prepared {
            remove_if_present(&faststart);
            return Err(e);
        }

        self.copy_back(segment, &faststart, times).await
    }

    async fn prepare(&self, reference: &Path, segment: &Segment, faststart: &Path) -> Result<()> {
        let restored = self.repair.restore(reference, &segment.path).await?;
        let outcome = self
            .remux_restored(&segment.file_name, &restored, segment, faststart)
            .await;
        if restored != restored_path(&segment.path) {
            remove_if_present(&restored);
        }
        outcome
    }

    async fn copy_back(&self, segment: &Segment, faststart: &Path, times: SegmentTimes) -> Result<()> {
        let target = segment.path.clone();
        let source = faststart.to_path_buf();
        let chunk = self.copy_chunk_bytes;
        let copied =
            tokio::task::spawn_blocking(move || replace_in_place(&target, &source, times, chunk))
                .await
                .map_err(|e| Error::Internal(format!("copy task failed: {e}")))?;

        match copied {
            Ok(bytes) => {
                tracing::debug!(segment = %segment.file_name, bytes, "Copied repaired data into place");
                remove_if_present(faststart);
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    segment = %segment.file_name,
                    kept = %faststart.display(),
                    error = %e,
                    "Copy back failed; keeping repaired copy for the next scan"
                );
                Err(e)
            }
        }
    }

    /// Finish a repair whose copy back was interrupted, if a complete
    /// remuxed copy of `segment` is lying next to it. Returns `None` when
    /// there is nothing to resume; an incomplete copy is discarded.
    async fn resume_copy(&self, segment: &Segment) -> Option<Result<()>> {
        let faststart = faststart_path(&segment.path);
        let len = std::fs::metadata(&faststart)
            .ok()
            .filter(|m| m.is_file())
            .map(|m| m.len())?;

        let complete = len > 0
            && matches!(
                self.probe.diagnose(&faststart).await,
                Ok(diagnostics) if !is_missing_metadata(&diagnostics)
            );
        if !complete {
            tracing::warn!(
                segment = %segment.file_name,
                path = %faststart.display(),
                "Discarding incomplete repaired copy"
            );
            remove_if_present(&faststart);
            return None;
        }

        let times = match SegmentTimes::of(&segment.path) {
            Ok(times) => times,
            Err(e) => return Some(Err(e)),
        };
        Some(self.copy_back(segment, &faststart, times).await)
    }

    async fn remux_restored(
        &self,
        name: &str,
        restored: &Path,
        segment: &Segment,
        faststart: &Path,
    ) -> Result<()> {
        let restored_len = match std::fs::metadata(restored) {
            Ok(m) => m.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::repair(
                    name,
                    format!("{} was not created", restored.display()),
                ));
            }
            Err(e) => return Err(e.into()),
        };
        if restored_len == 0 {
            return Err(Error::repair(
                name,
                format!("{} is empty", restored.display()),
            ));
        }

        let original_len = std::fs::metadata(&segment.path)?.len();
        if restored_len < original_len {
            tracing::warn!(
                segment = name,
                original = original_len,
                restored = restored_len,
                lost = original_len - restored_len,
                "Restored segment is smaller than the original"
            );
        }

        // ffmpeg refuses to overwrite an existing output.
        remove_if_present(faststart);
        self.remuxer.faststart(restored, faststart).await?;
        if !faststart.is_file() {
            return Err(Error::repair(
                name,
                format!("{} was not created", faststart.display()),
            ));
        }
        Ok(())
    }
}

fn reference_from_marker(marker: &CheckMarker, camera_dir: &Path) -> Result<Option<PathBuf>> {
    Ok(marker
        .read()?
        .map(|name| camera_dir.join(name))
        .filter(|path| path.is_file()))
}

fn remove_if_present(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove intermediate file"),
    }
}
