//! Connection status, retry policy and diagnostics snapshot.

use std::fmt;

use serde::{Deserialize, Serialize};
use sphere_errors::ProtocolError;

/// Why the transport is not authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectReason {
    /// Authenticated; no disconnect.
    Ok,
    /// The shared access token expired.
    ExpiredToken,
    /// The device was disabled in the backend.
    DeviceDisabled,
    /// The credentials were rejected.
    BadCredential,
    /// The transport gave up retrying.
    RetryExpired,
    /// No network.
    NoNetwork,
    /// Generic communication failure.
    CommunicationError,
}

impl DisconnectReason {
    /// Get the reason as a static string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DisconnectReason::Ok => "ok",
            DisconnectReason::ExpiredToken => "expired token",
            DisconnectReason::DeviceDisabled => "device disabled",
            DisconnectReason::BadCredential => "bad credential",
            DisconnectReason::RetryExpired => "retry expired",
            DisconnectReason::NoNetwork => "no network",
            DisconnectReason::CommunicationError => "communication error",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status reported by the transport through the connection-status callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    /// Whether the transport is authenticated with the hub.
    pub authenticated: bool,
    /// Reason code accompanying the status.
    pub reason: DisconnectReason,
}

impl ConnectionStatus {
    /// An authenticated status.
    #[must_use]
    pub fn authenticated() -> Self {
        Self {
            authenticated: true,
            reason: DisconnectReason::Ok,
        }
    }

    /// A non-authenticated status with `reason`.
    #[must_use]
    pub fn disconnected(reason: DisconnectReason) -> Self {
        Self {
            authenticated: false,
            reason,
        }
    }
}

/// Reconnection policy installed on a live transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Exponential backoff, capped at `max_interval_secs`.
    ExponentialBackoff {
        /// Ceiling between transport reconnection attempts.
        max_interval_secs: u32,
    },
    /// Never reconnect automatically.
    None,
}

impl RetryPolicy {
    /// Exponential backoff with the given ceiling.
    #[must_use]
    pub fn exponential(max_interval_secs: u32) -> Self {
        RetryPolicy::ExponentialBackoff { max_interval_secs }
    }
}

/// Snapshot of the connectivity state for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityStatus {
    /// Last status reported by the transport.
    pub connected: bool,
    /// A connection handle exists.
    pub has_connection: bool,
    /// A retry attempt is scheduled.
    pub retry_scheduled: bool,
    /// Delay the next failure will schedule, in seconds.
    pub retry_interval_secs: u32,
    /// Retry ceiling, in seconds.
    pub max_retry_interval_secs: u32,
    /// Connection attempts made.
    pub attempts: u64,
    /// Failed connection attempts.
    pub failures: u64,
    /// The most recent attempt failure.
    pub last_failure: Option<ProtocolError>,
    /// The most recent disconnect reason reported by the transport.
    pub last_disconnect: Option<DisconnectReason>,
}
