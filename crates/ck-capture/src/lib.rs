//! ck-capture: keeping cameras recording.
//!
//! For every camera the service runs one segmented recording of the primary
//! stream and one HLS preview per stream, checks each on a fixed cadence,
//! restarts (or reboots the camera for) whatever stopped producing output,
//! and deletes the oldest recordings when the disk runs low.

pub mod args;
pub mod eviction;
pub mod process;
pub mod reboot;
pub mod service;
pub mod supervisor;

pub use eviction::{DiskEvictor, DiskUsageProbe, DiskUsageSnapshot, EvictionReport, StatvfsProbe};
pub use process::{is_fresh, CaptureKind, CaptureProcess, CaptureSpec};
pub use reboot::{CameraRebooter, OnvifRebooter};
pub use service::CaptureService;
pub use supervisor::{CameraSupervisor, ManagedCapture, RecoveryState, TickReport};
