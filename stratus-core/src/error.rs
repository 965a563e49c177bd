//! Error types for STRATUS.
//!
//! All errors use `thiserror` and carry a structural kind: services and the
//! RPC boundary branch on [`StratusError::kind`], never on message text.
//! Decoration (adding the operation and resource reference on the way up)
//! wraps the error without changing its kind.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for STRATUS operations.
pub type Result<T> = std::result::Result<T, StratusError>;

/// Main error type for STRATUS.
#[derive(Error, Debug)]
pub enum StratusError {
    // Resource errors
    #[error("{kind} '{reference}' not found")]
    NotFound { kind: &'static str, reference: String },

    #[error("{kind} '{reference}' already exists")]
    AlreadyExists { kind: &'static str, reference: String },

    // Caller errors
    #[error("invalid {field}: {reason}")]
    InvalidRequest { field: String, reason: String },

    // Wall-clock ceiling exceeded; carries the last underlying error
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        operation: String,
        duration: Duration,
        #[source]
        cause: Option<Box<StratusError>>,
    },

    // Retriable at the caller's discretion
    #[error("transient failure: {0}")]
    Transient(String),

    // Provider-reported, unrecoverable
    #[error("infrastructure error: {0}")]
    Infra(String),

    // Invariant violation in our own layer
    #[error("{0}")]
    Logic(String),

    #[error("operation cancelled")]
    Cancelled,

    // Decoration: operation context wrapped around an inner error
    #[error("{operation}: {source}")]
    Op {
        operation: String,
        #[source]
        source: Box<StratusError>,
    },
}

/// Structural kind of an error, independent of decoration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    InvalidRequest,
    Timeout,
    Transient,
    Infra,
    Logic,
    Cancelled,
}

impl StratusError {
    pub fn not_found(kind: &'static str, reference: impl Into<String>) -> Self {
        Self::NotFound { kind, reference: reference.into() }
    }

    pub fn already_exists(kind: &'static str, reference: impl Into<String>) -> Self {
        Self::AlreadyExists { kind, reference: reference.into() }
    }

    pub fn invalid_request(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRequest { field: field.into(), reason: reason.into() }
    }

    pub fn timeout(
        operation: impl Into<String>,
        duration: Duration,
        cause: Option<StratusError>,
    ) -> Self {
        Self::Timeout { operation: operation.into(), duration, cause: cause.map(Box::new) }
    }

    pub fn transient(reason: impl Into<String>) -> Self {
        Self::Transient(reason.into())
    }

    pub fn infra(reason: impl Into<String>) -> Self {
        Self::Infra(reason.into())
    }

    pub fn logic(reason: impl Into<String>) -> Self {
        Self::Logic(reason.into())
    }

    /// Wrap this error with operation context, preserving the kind.
    pub fn decorate(self, operation: impl Into<String>) -> Self {
        Self::Op { operation: operation.into(), source: Box::new(self) }
    }

    /// Structural kind, looking through any decoration layers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Transient(_) => ErrorKind::Transient,
            Self::Infra(_) => ErrorKind::Infra,
            Self::Logic(_) => ErrorKind::Logic,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Op { source, .. } => source.kind(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    /// Whether a retry loop may attempt the operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient | ErrorKind::Timeout)
    }
}

/// Extension for decorating a `Result` with operation context.
pub trait ResultExt<T> {
    fn decorate(self, operation: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn decorate(self, operation: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.decorate(operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoration_preserves_kind() {
        let err = StratusError::not_found("host", "easyvm")
            .decorate("deleting host 'easyvm'")
            .decorate("rpc HostService.Delete");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.is_not_found());
        let msg = err.to_string();
        assert!(msg.contains("rpc HostService.Delete"));
        assert!(msg.contains("not found"));
    }

    #[test]
    fn timeout_carries_cause() {
        let err = StratusError::timeout(
            "waiting host state",
            Duration::from_secs(300),
            Some(StratusError::transient("server not ready yet")),
        );
        assert!(err.is_timeout());
        let source = std::error::Error::source(&err).expect("cause retained");
        assert!(source.to_string().contains("not ready"));
    }
}
