//! Cloud protocol errors.

use core::fmt;

/// Stage of a cloud call at which a failure was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureStage {
    /// Arguments were rejected before any network activity.
    ParameterValidation,
    /// The network or the device identity was not ready yet.
    NetworkNotReady,
    /// Device provisioning service rejected or failed the request.
    Provisioning,
    /// The hub transport client failed.
    HubTransport,
}

impl FailureStage {
    /// Get the stage as a static string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FailureStage::ParameterValidation => "parameter validation",
            FailureStage::NetworkNotReady => "network not ready",
            FailureStage::Provisioning => "provisioning",
            FailureStage::HubTransport => "hub transport",
        }
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cloud call returned a non-OK status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{stage}: {message}")]
pub struct ProtocolError {
    /// Where the failure happened.
    pub stage: FailureStage,
    /// Diagnostic message.
    pub message: String,
}

impl ProtocolError {
    /// Create a protocol error.
    #[must_use]
    pub fn new(stage: FailureStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}
