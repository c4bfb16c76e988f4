//! ck-repair: incremental repair of recordings that lost their `moov` atom.
//!
//! A segment whose capture process died mid-write has all its media but no
//! index, so it will not play and has no duration. [`SegmentRepairer`]
//! finds such segments and rebuilds them in place using a healthy segment
//! from the same camera as the reference.

pub mod marker;
pub mod replace;
pub mod scanner;
pub mod service;

pub use marker::{CheckMarker, MARKER_FILE};
pub use replace::{replace_in_place, SegmentTimes};
pub use scanner::{ScanReport, SegmentRepairer};
pub use service::RepairService;
