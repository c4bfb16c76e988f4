//! Unified error type for camkeep.
//!
//! All crates funnel their failures into [`Error`]. Most variants describe a
//! failure local to one segment or one camera; callers log them and move on
//! to the next item rather than stopping the loop.

use std::fmt;

/// Unified error type covering all failure modes in camkeep.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "camera", "tool").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Configuration or input failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool (ffmpeg, untrunc) failed or could not be run.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// A segment repair step failed.
    #[error("Repair error [{segment}]: {message}")]
    Repair {
        /// File name of the segment being repaired.
        segment: String,
        /// Human-readable error description.
        message: String,
    },

    /// A camera reboot request failed.
    #[error("Reboot error [{camera}]: {message}")]
    Reboot {
        /// Name of the camera.
        camera: String,
        /// Human-readable error description.
        message: String,
    },

    /// Disk usage could not be determined.
    #[error("Disk error: {0}")]
    Disk(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Repair`].
    pub fn repair(segment: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Repair {
            segment: segment.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Reboot`].
    pub fn reboot(camera: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Reboot {
            camera: camera.into(),
            message: message.into(),
        }
    }

    /// True when the error is a filesystem `NotFound`.
    ///
    /// Eviction may delete a segment while the repairer is working on it;
    /// such errors mean "skip, retry later".
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Io { source } => source.kind() == std::io::ErrorKind::NotFound,
            Error::NotFound { .. } => true,
            _ => false,
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = Error::not_found("camera", "front");
        assert_eq!(err.to_string(), "camera not found: front");
        assert!(err.is_not_found());
    }

    #[test]
    fn validation_display() {
        let err = Error::Validation("segment.wrap must be at least 2".into());
        assert_eq!(
            err.to_string(),
            "Validation error: segment.wrap must be at least 2"
        );
        assert!(!err.is_not_found());
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
        assert!(err.is_not_found());
    }

    #[test]
    fn io_other_kind_is_not_missing() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(!Error::from(io_err).is_not_found());
    }

    #[test]
    fn tool_display() {
        let err = Error::tool("untrunc", "exit code 1");
        assert_eq!(err.to_string(), "Tool error [untrunc]: exit code 1");
    }

    #[test]
    fn repair_display() {
        let err = Error::repair("front_007.mp4", "restored copy is empty");
        assert_eq!(
            err.to_string(),
            "Repair error [front_007.mp4]: restored copy is empty"
        );
    }

    #[test]
    fn reboot_display() {
        let err = Error::reboot("garage", "HTTP 401");
        assert_eq!(err.to_string(), "Reboot error [garage]: HTTP 401");
    }

    #[test]
    fn disk_display() {
        let err = Error::Disk("statvfs failed".into());
        assert_eq!(err.to_string(), "Disk error: statvfs failed");
    }

    #[test]
    fn result_alias() {
        fn ok_fn() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(ok_fn().unwrap(), 42);

        fn err_fn() -> Result<i32> {
            Err(Error::Internal("boom".into()))
        }
        assert!(err_fn().is_err());
    }
}
