//! Resource errors.
//!
//! A resource error means an OS primitive could not be created, registered or
//! released, or that a lifecycle operation was called in the wrong state. They
//! are propagated synchronously with no automatic retry.

use std::io;

use crate::common::ErrorSeverity;

/// Failure to create, register or release an OS primitive, or a violated
/// lifecycle precondition.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// Event loop creation, registration or wait failed.
    #[error("event loop {operation} failed: {source}")]
    EventLoop {
        /// The operation that failed.
        operation: &'static str,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Timer creation, arming or release failed.
    #[error("timer {operation} failed: {source}")]
    Timer {
        /// The operation that failed.
        operation: &'static str,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// Signal handler installation or restoration failed.
    #[error("signal {operation} failed: {source}")]
    Signal {
        /// The operation that failed.
        operation: &'static str,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// A platform service (reboot, suspend, update deferral, time sync) failed.
    #[error("platform {operation} failed: {source}")]
    Platform {
        /// The operation that failed.
        operation: &'static str,
        /// The underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The component was already initialized.
    #[error("{0} is already initialized")]
    AlreadyInitialized(&'static str),

    /// The component is not initialized.
    #[error("{0} is not initialized")]
    NotInitialized(&'static str),

    /// The feature governing the operation was not enabled at init time.
    #[error("feature {0} is not enabled")]
    FeatureDisabled(&'static str),

    /// A parameter was rejected.
    #[error("invalid argument {name}: {reason}")]
    InvalidArgument {
        /// The parameter name.
        name: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// Process signal handlers are already owned by another instance.
    #[error("process signal handlers are already installed by another instance")]
    AlreadyInstalled,
}

impl ResourceError {
    /// Create an event loop error.
    #[must_use]
    pub fn event_loop(operation: &'static str, source: io::Error) -> Self {
        Self::EventLoop { operation, source }
    }

    /// Create a timer error.
    #[must_use]
    pub fn timer(operation: &'static str, source: io::Error) -> Self {
        Self::Timer { operation, source }
    }

    /// Create a signal error.
    #[must_use]
    pub fn signal(operation: &'static str, source: io::Error) -> Self {
        Self::Signal { operation, source }
    }

    /// Create a platform error.
    #[must_use]
    pub fn platform(operation: &'static str, source: io::Error) -> Self {
        Self::Platform { operation, source }
    }

    /// Create an invalid argument error.
    #[must_use]
    pub fn invalid_argument(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ResourceError::EventLoop { .. } => ErrorSeverity::Critical,
            ResourceError::Timer { .. }
            | ResourceError::Signal { .. }
            | ResourceError::Platform { .. } => ErrorSeverity::Error,
            ResourceError::AlreadyInitialized(_)
            | ResourceError::NotInitialized(_)
            | ResourceError::FeatureDisabled(_)
            | ResourceError::InvalidArgument { .. }
            | ResourceError::AlreadyInstalled => ErrorSeverity::Warning,
        }
    }

    /// Check whether this error reports a lifecycle precondition rather than
    /// an OS failure.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            ResourceError::AlreadyInitialized(_)
                | ResourceError::NotInitialized(_)
                | ResourceError::FeatureDisabled(_)
                | ResourceError::InvalidArgument { .. }
                | ResourceError::AlreadyInstalled
        )
    }
}
