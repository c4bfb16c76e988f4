//! ck-core: shared configuration, errors, and the recording segment model.
//!
//! This crate is the foundational dependency for all other ck-* crates. The
//! segment model lives here because both the capture supervisor (to pick the
//! next segment number) and the repairer (to pick its scan range) must agree
//! on exactly the same ordering rules.

pub mod config;
pub mod error;
pub mod segment;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use segment::{Segment, SegmentNaming};
