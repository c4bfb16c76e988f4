//! Replacing a segment's contents without replacing the file.
//!
//! Recording duration is derived from a segment's birth and modification
//! times, so a repaired segment must keep its inode and its timestamps. The
//! repaired data is copied into the original file rather than renamed over
//! it.

use std::fs::{File, FileTimes, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use std::time::SystemTime;

use ck_core::Result;

/// A segment's access and modification times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentTimes {
    pub accessed: SystemTime,
    pub modified: SystemTime,
}

impl SegmentTimes {
    /// Read the current times of `path`. Take this before any tool opens
    /// the file, since reads may move the access time.
    pub fn of(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path)?;
        Ok(Self {
            accessed: metadata.accessed()?,
            modified: metadata.modified()?,
        })
    }

    fn apply(&self, file: &File) -> std::io::Result<()> {
        file.set_times(
            FileTimes::new()
                .set_accessed(self.accessed)
                .set_modified(self.modified),
        )
    }
}

/// Truncate `target` and refill it with the contents of `source`, then set
/// `target`'s times to `times`.
///
/// Once `target` has been truncated its times are reset on every exit, so
/// a failed copy leaves an empty or partial segment that still sorts where
/// it did. The caller must keep `source` in that case: it is the only
/// repaired copy.
///
/// Returns the number of bytes copied. Blocking; run it off the async
/// executor.
pub fn replace_in_place(
    target: &Path,
    source: &Path,
    times: SegmentTimes,
    chunk_bytes: usize,
) -> Result<u64> {
    let mut src = File::open(source)?;
    let mut dst = OpenOptions::new().write(true).truncate(true).open(target)?;

    let copied = copy_chunks(&mut src, &mut dst, chunk_bytes);
    let reset = times.apply(&dst);
    let copied = copied?;
    reset?;
    Ok(copied)
}

fn copy_chunks(src: &mut File, dst: &mut File, chunk_bytes: usize) -> std::io::Result<u64> {
    let mut buf = vec![0u8; chunk_bytes.max(1)];
    let mut copied = 0u64;
    loop {
        let n = src.read(&mut buf)?;
        if n == 0 {
            break;
        }
        dst.write_all(&buf[..n])?;
        copied += n as u64;
    }
    dst.sync_all()?;
    Ok(copied)
}
