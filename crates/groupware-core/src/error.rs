//! Unified error types for the extension engine.
//!
//! All engine crates map their failures into [`EngineError`] for
//! consistent propagation through the ? operator.

use std::fmt;
use thiserror::Error;

/// Top-level error kind categorization used across the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// A configuration value was malformed or contradictory.
    Configuration,
    /// An extension descriptor was rejected at registration time.
    Registration,
    /// The ordering algorithm detected a before/after cycle.
    Ordering,
    /// A dispatch pass failed as a whole (not a single extension).
    Dispatch,
    /// The requested point or extension was not found.
    NotFound,
    /// An internal invariant was violated.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Registration => write!(f, "REGISTRATION"),
            Self::Ordering => write!(f, "ORDERING"),
            Self::Dispatch => write!(f, "DISPATCH"),
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// The unified error used throughout the engine.
///
/// Registration and ordering failures are developer-facing
/// misconfiguration: they surface synchronously from the mutating
/// call. Per-extension runtime failures never become an
/// `EngineError` at the dispatch boundary; they are captured into
/// the dispatch report instead.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct EngineError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl EngineError {
    /// Create a new engine error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new engine error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create a registration error.
    pub fn registration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Registration, message)
    }

    /// Create an ordering error.
    pub fn ordering(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Ordering, message)
    }

    /// Create a dispatch error.
    pub fn dispatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Dispatch, message)
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Whether this error is of the given kind.
    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_kind_and_message() {
        let err = EngineError::ordering("cycle on point 'io.ox/mail/toolbar'");
        assert_eq!(
            err.to_string(),
            "ORDERING: cycle on point 'io.ox/mail/toolbar'"
        );
    }

    #[test]
    fn test_kind_check() {
        let err = EngineError::registration("duplicate");
        assert!(err.is_kind(ErrorKind::Registration));
        assert!(!err.is_kind(ErrorKind::Ordering));
    }
}
