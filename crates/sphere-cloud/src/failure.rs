//! Classification of connection attempt failures.

use sphere_errors::{FailureStage, ProtocolError};

/// Why a connection attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectFailure {
    /// The request was rejected before any network activity.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The device has no network yet.
    #[error("network is not ready")]
    NetworkNotReady,

    /// The device authentication service has not issued credentials yet.
    #[error("device authentication is not ready")]
    DeviceAuthNotReady,

    /// The provisioning service failed.
    #[error("provisioning failed: {0}")]
    Provisioning(String),

    /// The hub transport client failed.
    #[error("hub transport failed: {0}")]
    HubTransport(String),
}

impl ConnectFailure {
    /// The stage the failure is attributed to.
    #[must_use]
    pub fn stage(&self) -> FailureStage {
        match self {
            ConnectFailure::InvalidParameter(_) => FailureStage::ParameterValidation,
            ConnectFailure::NetworkNotReady | ConnectFailure::DeviceAuthNotReady => {
                FailureStage::NetworkNotReady
            }
            ConnectFailure::Provisioning(_) => FailureStage::Provisioning,
            ConnectFailure::HubTransport(_) => FailureStage::HubTransport,
        }
    }

    /// Diagnostic message without the stage prefix.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            ConnectFailure::InvalidParameter(detail)
            | ConnectFailure::Provisioning(detail)
            | ConnectFailure::HubTransport(detail) => detail.clone(),
            ConnectFailure::NetworkNotReady => "network is not ready".to_owned(),
            ConnectFailure::DeviceAuthNotReady => "device authentication is not ready".to_owned(),
        }
    }

    /// Classify into a (stage, message) pair.
    #[must_use]
    pub fn classify(&self) -> ProtocolError {
        ProtocolError::new(self.stage(), self.message())
    }
}

impl From<ConnectFailure> for ProtocolError {
    fn from(failure: ConnectFailure) -> Self {
        failure.classify()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let cases = [
            (
                ConnectFailure::InvalidParameter("empty scope id".into()),
                FailureStage::ParameterValidation,
                "empty scope id",
            ),
            (
                ConnectFailure::NetworkNotReady,
                FailureStage::NetworkNotReady,
                "network is not ready",
            ),
            (
                ConnectFailure::DeviceAuthNotReady,
                FailureStage::NetworkNotReady,
                "device authentication is not ready",
            ),
            (
                ConnectFailure::Provisioning("PROV_DEVICE_RESULT_UNAUTHORIZED".into()),
                FailureStage::Provisioning,
                "PROV_DEVICE_RESULT_UNAUTHORIZED",
            ),
            (
                ConnectFailure::HubTransport("IOTHUB_CLIENT_ERROR".into()),
                FailureStage::HubTransport,
                "IOTHUB_CLIENT_ERROR",
            ),
        ];
        for (failure, stage, message) in cases {
            let classified = failure.classify();
            assert_eq!(classified.stage, stage);
            assert_eq!(classified.message, message);
        }
    }

    #[test]
    fn test_into_protocol_error() {
        let err: ProtocolError = ConnectFailure::NetworkNotReady.into();
        assert_eq!(err.to_string(), "network not ready: network is not ready");
    }
}
