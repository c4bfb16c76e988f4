//! ck-av: external media tool plumbing.
//!
//! camkeep never touches video data itself. It drives ffmpeg and untrunc
//! through the capabilities in this crate and judges the results by the files
//! they leave behind:
//!
//! - [`ToolCommand`]: one-shot invocation with captured output and a timeout
//! - [`ToolRegistry`]: locating the tools on disk
//! - [`MetadataProbe`], [`MetadataRepair`], [`Remuxer`]: the three steps of
//!   a segment repair, each behind a trait so the repairer can be exercised
//!   without the real tools

pub mod command;
pub mod probe;
pub mod remux;
pub mod repair;
pub mod tools;

pub use command::{ToolCommand, ToolOutput};
pub use probe::{is_missing_metadata, FfmpegProbe, MetadataProbe};
pub use remux::{faststart_path, FfmpegRemuxer, Remuxer};
pub use repair::{restored_path, MetadataRepair, UntruncRepair};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry, FFMPEG, UNTRUNC};
