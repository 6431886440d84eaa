//! Top-level error type and classification.

use core::fmt;

use crate::{ProtocolError, ResourceError};

/// Top-level error returned by every fallible lifecycle operation.
#[derive(Debug, thiserror::Error)]
pub enum SphereError {
    /// An OS primitive or lifecycle precondition failed.
    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),

    /// A cloud call returned a non-OK status.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Configuration could not be parsed or failed validation.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SphereError {
    /// Get the error category for classification.
    pub fn category(&self) -> ErrorCategory {
        match self {
            SphereError::Resource(_) => ErrorCategory::Resource,
            SphereError::Protocol(_) => ErrorCategory::Protocol,
            SphereError::Config(_) => ErrorCategory::Config,
        }
    }

    /// Get the error severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SphereError::Resource(e) => e.severity(),
            SphereError::Protocol(_) => ErrorSeverity::Warning,
            SphereError::Config(_) => ErrorSeverity::Error,
        }
    }

    /// Check if this error is recoverable without restarting the application.
    pub fn is_recoverable(&self) -> bool {
        self.severity() < ErrorSeverity::Critical
    }

    /// Create a configuration error with a message.
    pub fn config(msg: impl Into<String>) -> Self {
        SphereError::Config(msg.into())
    }

    /// Returns the inner resource error, if any.
    pub fn as_resource(&self) -> Option<&ResourceError> {
        match self {
            SphereError::Resource(e) => Some(e),
            _ => None,
        }
    }
}

/// Error category for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCategory {
    /// OS primitive or lifecycle precondition errors
    Resource = 0,
    /// Cloud protocol errors
    Protocol = 1,
    /// Configuration errors
    Config = 2,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Resource => write!(f, "Resource"),
            ErrorCategory::Protocol => write!(f, "Protocol"),
            ErrorCategory::Config => write!(f, "Config"),
        }
    }
}

/// Error severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ErrorSeverity {
    /// Informational, no action required
    Info = 0,
    /// Warning, may require attention
    Warning = 1,
    /// Error, operation failed
    Error = 2,
    /// Critical, the application cannot keep running
    Critical = 3,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARN"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}
