//! In-process cloud stub for demos and bring-up without a backend.

use std::cell::{Cell, RefCell};
use std::time::Duration;

use sphere_errors::ProtocolError;
use sphere_runtime::CallbackSlot;
use tracing::debug;

use crate::client::{CloudClient, CloudConnection};
use crate::failure::ConnectFailure;
use crate::status::{ConnectionStatus, RetryPolicy};

/// Cloud client that reports the network as not ready for a fixed number of
/// attempts, then hands out connections that authenticate immediately.
#[derive(Debug, Default)]
pub struct LoopbackCloud {
    unready_attempts: u32,
    attempts: Cell<u32>,
}

impl LoopbackCloud {
    /// Fail the first `unready_attempts` attempts with
    /// [`ConnectFailure::NetworkNotReady`].
    #[must_use]
    pub fn new(unready_attempts: u32) -> Self {
        Self {
            unready_attempts,
            attempts: Cell::new(0),
        }
    }

    /// Attempts made so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.get()
    }
}

impl CloudClient for LoopbackCloud {
    fn connect(
        &self,
        scope_id: &str,
        _timeout: Duration,
    ) -> Result<Box<dyn CloudConnection>, ConnectFailure> {
        let attempt = self.attempts.get().saturating_add(1);
        self.attempts.set(attempt);
        if attempt <= self.unready_attempts {
            return Err(ConnectFailure::NetworkNotReady);
        }
        debug!(scope_id, attempt, "loopback connection opened");
        Ok(Box::new(LoopbackConnection::default()))
    }
}

#[derive(Default)]
struct LoopbackConnection {
    status: RefCell<Option<CallbackSlot<ConnectionStatus>>>,
}

impl CloudConnection for LoopbackConnection {
    fn set_keepalive(&self, period_secs: u32) -> Result<(), ProtocolError> {
        debug!(period_secs, "loopback keepalive set");
        Ok(())
    }

    fn set_retry_policy(&self, policy: RetryPolicy) -> Result<(), ProtocolError> {
        debug!(?policy, "loopback retry policy set");
        Ok(())
    }

    fn set_status_callback(
        &self,
        callback: CallbackSlot<ConnectionStatus>,
    ) -> Result<(), ProtocolError> {
        callback.invoke(ConnectionStatus::authenticated());
        *self.status.borrow_mut() = Some(callback);
        Ok(())
    }

    fn close(&self) {
        self.status.borrow_mut().take();
        debug!("loopback connection closed");
    }
}
