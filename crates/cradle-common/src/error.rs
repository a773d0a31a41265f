//! Unified error types for the Cradle workspace.
//!
//! Collaborator failures are wrapped with enough context (component,
//! resource kind, container ID) to be actionable by the caller.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum CradleError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value or combination is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A permission or capability error.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Description of the denied operation.
        message: String,
    },

    /// An operation was requested in an incompatible lifecycle state.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of the state conflict.
        message: String,
    },

    /// Acquiring a namespace or storage resource failed.
    #[error("setting up {resource} for container {id}: {source}")]
    ResourceSetup {
        /// Resource kind being acquired ("network namespace", "storage").
        resource: &'static str,
        /// Container the resource was being acquired for.
        id: String,
        /// Underlying failure.
        source: Box<CradleError>,
    },

    /// A best-effort cleanup failed after a primary error.
    ///
    /// Carries both so the caller sees the original failure and the
    /// cleanup failure in one message.
    #[error("{primary}; {cleanup} also failed: {source}")]
    CleanupFailed {
        /// Rendered primary error that triggered the cleanup.
        primary: String,
        /// Cleanup step that failed ("unmounting storage", "tearing down network").
        cleanup: &'static str,
        /// Error raised by the cleanup step.
        source: Box<CradleError>,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CradleError>;

impl CradleError {
    /// Wraps an I/O error with the path it occurred at.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true if this error bottoms out in a missing file or
    /// directory.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            Self::NotFound { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_not_found_is_detected() {
        let err = CradleError::io(
            "/no/such/file",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(err.is_not_found());
    }

    #[test]
    fn config_error_is_not_not_found() {
        let err = CradleError::Config {
            message: "bad manager".into(),
        };
        assert!(!err.is_not_found());
    }

    #[test]
    fn cleanup_failed_renders_both_errors() {
        let primary = CradleError::Config {
            message: "network unreachable".into(),
        };
        let err = CradleError::CleanupFailed {
            primary: primary.to_string(),
            cleanup: "unmounting storage",
            source: Box::new(CradleError::PermissionDenied {
                message: "busy".into(),
            }),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("network unreachable"));
        assert!(rendered.contains("unmounting storage"));
        assert!(rendered.contains("busy"));
    }
}
