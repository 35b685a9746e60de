//! Error types for hub bootstrapping and reconciliation
//!
//! The taxonomy is closed: every failure the core can produce maps to exactly
//! one variant, and remote API failures are classified once at the store
//! boundary (see [`crate::store::ApiErrorKind`]) rather than re-inspected by
//! callers.

use std::path::PathBuf;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for bootstrap operations
#[derive(Debug, Error)]
pub enum Error {
    /// Required input is missing or malformed; raised before any network call
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
        /// The flag or field at fault (e.g., "hub-token")
        field: Option<String>,
    },

    /// Local file read or write failed
    #[error("io error on {}: {source}", path.display())]
    Io {
        /// File that could not be read or written
        path: PathBuf,
        /// The underlying io error
        #[source]
        source: std::io::Error,
    },

    /// Explicit CA data could not be decoded
    #[error("encoding error: {message}")]
    Encoding {
        /// Description of what failed to decode
        message: String,
    },

    /// CA or endpoint discovery failed for a reason other than "absent"
    #[error("trust discovery error: {message}")]
    TrustDiscovery {
        /// Description of what failed
        message: String,
    },

    /// Network, timeout or server-side failure; the whole call may be retried
    #[error("transient error [{context}]: {message}")]
    Transient {
        /// Description of what failed
        message: String,
        /// Operation that failed (e.g., "get", "create", "patch")
        context: String,
    },

    /// Serialization, patch construction or rejected request; not retried
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "reconcile", "render")
        context: String,
    },

    /// A create lost the race against a concurrent creator
    #[error("{kind} {name} already exists")]
    ConflictRace {
        /// Kind of the object
        kind: String,
        /// `namespace/name` or `name` of the object
        name: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error naming the offending field
    pub fn validation_for_field(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create an io error for the given path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an encoding error with the given message
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding {
            message: msg.into(),
        }
    }

    /// Create a trust discovery error with the given message
    pub fn trust_discovery(msg: impl Into<String>) -> Self {
        Self::TrustDiscovery {
            message: msg.into(),
        }
    }

    /// Create a transient error with context
    pub fn transient_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transient {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Create a conflict-race error for an object that already exists
    pub fn conflict_race(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::ConflictRace {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Only transient errors are: re-running the whole operation re-derives
    /// the fetch-diff-write sequence from fresh state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transient { .. })
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Transient { context, .. } => Some(context),
            Error::Internal { context, .. } => Some(context),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Story: missing flags are reported by name before anything touches the network
    #[test]
    fn story_validation_names_the_missing_flag() {
        let err = Error::validation_for_field("hub-token", "token is missing");
        assert!(err.to_string().contains("validation error"));
        assert!(err.to_string().contains("token is missing"));
        match &err {
            Error::Validation { field, .. } => assert_eq!(field.as_deref(), Some("hub-token")),
            _ => panic!("Expected Validation variant"),
        }
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_io_error_includes_path() {
        let err = Error::io(
            "/etc/hub/ca.crt",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        );
        assert!(err.to_string().contains("/etc/hub/ca.crt"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(Error::transient_with_context("patch", "connection reset").is_retryable());
        assert!(!Error::internal("bad patch").is_retryable());
        assert!(!Error::encoding("invalid base64").is_retryable());
        assert!(!Error::trust_discovery("no clusters").is_retryable());
        assert!(!Error::conflict_race("Namespace", "ns1").is_retryable());
    }

    #[test]
    fn test_context_accessor() {
        let err = Error::transient_with_context("get", "timed out");
        assert_eq!(err.context(), Some("get"));
        assert!(err.to_string().contains("[get]"));

        let err = Error::internal("unexpected state");
        assert_eq!(err.context(), Some(UNKNOWN_CONTEXT));
        assert!(err.to_string().contains("[unknown]"));

        assert_eq!(Error::validation("x").context(), None);
    }

    #[test]
    fn test_conflict_race_message() {
        let err = Error::conflict_race("Secret", "ns1/bootstrap-hub-kubeconfig");
        assert_eq!(
            err.to_string(),
            "Secret ns1/bootstrap-hub-kubeconfig already exists"
        );
    }
}
