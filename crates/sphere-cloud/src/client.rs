//! Seams to the cloud provisioning and hub transport.

use std::time::Duration;

use sphere_errors::ProtocolError;
use sphere_runtime::CallbackSlot;

use crate::failure::ConnectFailure;
use crate::status::{ConnectionStatus, RetryPolicy};

/// Provisions the device and opens a hub connection.
pub trait CloudClient {
    /// Provision `scope_id` and connect, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns the classified reason the attempt failed.
    fn connect(
        &self,
        scope_id: &str,
        timeout: Duration,
    ) -> Result<Box<dyn CloudConnection>, ConnectFailure>;
}

/// A live hub connection.
///
/// Status changes are reported through the callback registered with
/// [`set_status_callback`](Self::set_status_callback), on the loop thread.
pub trait CloudConnection {
    /// Set the keepalive period.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] if the transport rejects the option.
    fn set_keepalive(&self, period_secs: u32) -> Result<(), ProtocolError>;

    /// Install the transport's own reconnection policy.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] if the transport rejects the policy.
    fn set_retry_policy(&self, policy: RetryPolicy) -> Result<(), ProtocolError>;

    /// Register the status callback, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolError`] if the transport rejects the registration.
    fn set_status_callback(
        &self,
        callback: CallbackSlot<ConnectionStatus>,
    ) -> Result<(), ProtocolError>;

    /// Close the connection. No callback is invoked afterwards.
    fn close(&self);
}
