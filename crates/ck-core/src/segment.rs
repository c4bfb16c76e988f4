//! Recording segment naming and ordering.
//!
//! A camera records into `<camera>_<NNN>.mp4` where `NNN` is a zero-padded
//! sequence number that wraps back to zero after `wrap` segments. Ordering is
//! by modification time, with a correction for the instant around a segment
//! switch where mtime and sequence number briefly disagree: the capture tool
//! opens the next segment before it finishes (and touches) the previous one.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::Result;

/// Extension of every recording segment.
pub const SEGMENT_EXTENSION: &str = "mp4";

/// A single recording file on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub path: PathBuf,
    pub file_name: String,
    pub number: u32,
    pub modified: SystemTime,
    pub len: u64,
}

/// Naming rules for one camera's segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentNaming {
    camera: String,
    wrap: u32,
}

impl SegmentNaming {
    pub fn new(camera: impl Into<String>, wrap: u32) -> Self {
        Self {
            camera: camera.into(),
            wrap,
        }
    }

    pub fn camera(&self) -> &str {
        &self.camera
    }

    pub fn wrap(&self) -> u32 {
        self.wrap
    }

    /// Highest sequence number the capture tool ever writes.
    pub fn max_number(&self) -> u32 {
        self.wrap.saturating_sub(1)
    }

    /// Number of digits in a segment number: the digits in `wrap - 1`.
    pub fn width(&self) -> usize {
        self.max_number().to_string().len()
    }

    /// `printf`-style output template handed to the capture tool.
    pub fn template(&self) -> String {
        format!("{}_%0{}d.{SEGMENT_EXTENSION}", self.camera, self.width())
    }

    /// File name of the segment with the given number.
    pub fn file_name(&self, number: u32) -> String {
        format!(
            "{}_{:0width$}.{SEGMENT_EXTENSION}",
            self.camera,
            number,
            width = self.width()
        )
    }

    /// Parse the sequence number out of a file name belonging to this camera.
    ///
    /// Returns `None` for anything that is not exactly
    /// `<camera>_<digits>.mp4` (intermediate repair artifacts, playlists,
    /// other cameras' files).
    pub fn parse_number(&self, file_name: &str) -> Option<u32> {
        let rest = file_name.strip_prefix(self.camera.as_str())?;
        let rest = rest.strip_prefix('_')?;
        let dot = rest.rfind('.')?;
        let (digits, ext) = rest.split_at(dot);
        if !ext[1..].eq_ignore_ascii_case(SEGMENT_EXTENSION) {
            return None;
        }
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }
}

/// List a camera's segments, oldest first, with the wrap-boundary correction
/// applied to the two newest entries.
///
/// A missing directory yields an empty list. Files that disappear while the
/// directory is being read are skipped.
pub fn list_segments(dir: &Path, naming: &SegmentNaming) -> Result<Vec<Segment>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut segments = Vec::new();
    for entry in entries {
        let entry = entry?;
        let Some(file_name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        let Some(number) = naming.parse_number(&file_name) else {
            continue;
        };
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        if !metadata.is_file() {
            continue;
        }
        segments.push(Segment {
            path: entry.path(),
            file_name,
            number,
            modified: metadata.modified()?,
            len: metadata.len(),
        });
    }

    segments.sort_by(|a, b| {
        a.modified
            .cmp(&b.modified)
            .then_with(|| a.file_name.cmp(&b.file_name))
    });
    correct_wrap_order(&mut segments, naming.max_number());

    Ok(segments)
}

/// Swap the two newest segments when their mtimes disagree with their
/// sequence numbers by one step.
///
/// - newest number lower than its predecessor while the predecessor is not
///   the wrap maximum: the newer segment was opened before the older one was
///   closed;
/// - newest number is the wrap maximum while its predecessor is 0 or 1 (and
///   not simply the number before it): the same anomaly straddling the wrap.
pub fn correct_wrap_order(segments: &mut [Segment], max_number: u32) {
    let n = segments.len();
    if n < 2 {
        return;
    }
    let last = segments[n - 1].number;
    let prev = segments[n - 2].number;

    let reordered = (last < prev && prev != max_number)
        || (last == max_number && prev <= 1 && prev + 1 != last);
    if reordered {
        tracing::debug!(
            newer = %segments[n - 1].file_name,
            older = %segments[n - 2].file_name,
            "Swapping order of the two newest segments"
        );
        segments.swap(n - 1, n - 2);
    }
}

/// Split off the most recent segment, which may still be open for writing.
pub fn split_active(mut segments: Vec<Segment>) -> (Vec<Segment>, Option<Segment>) {
    let active = segments.pop();
    (segments, active)
}

/// Sequence number a restarted recording should resume at: one past the
/// newest segment, modulo wrap. Starts at zero for an empty directory.
pub fn next_start_number(segments: &[Segment], naming: &SegmentNaming) -> u32 {
    match segments.last() {
        Some(newest) => {
            let wrap = u64::from(naming.wrap().max(1));
            ((u64::from(newest.number) + 1) % wrap) as u32
        }
        None => 0,
    }
}
