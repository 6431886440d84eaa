//! Scripted cloud client.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use sphere_cloud::{CloudClient, CloudConnection, ConnectFailure, ConnectionStatus, RetryPolicy};
use sphere_errors::{FailureStage, ProtocolError};
use sphere_runtime::CallbackSlot;

use crate::journal::Journal;

/// What the next connection attempt returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// The attempt fails with this reason.
    Fail(ConnectFailure),
    /// The attempt succeeds.
    Connect,
    /// The attempt succeeds but the transport rejects the keepalive option.
    ConnectRejectingKeepalive,
}

/// Something the client or one of its connections observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudEvent {
    /// `connect(scope_id, timeout)`.
    Connect {
        /// Scope identity passed in.
        scope_id: String,
        /// Timeout passed in.
        timeout: Duration,
    },
    /// `set_keepalive(secs)` on connection `id`.
    Keepalive {
        /// Connection index, counting successful attempts from 0.
        id: usize,
        /// Period.
        period_secs: u32,
    },
    /// `set_retry_policy(policy)` on connection `id`.
    RetryPolicy {
        /// Connection index.
        id: usize,
        /// Policy.
        policy: RetryPolicy,
    },
    /// `set_status_callback(..)` on connection `id`.
    StatusCallback {
        /// Connection index.
        id: usize,
    },
    /// `close()` on connection `id`.
    Close {
        /// Connection index.
        id: usize,
    },
}

#[derive(Default)]
struct Script {
    outcomes: RefCell<VecDeque<ConnectOutcome>>,
    events: RefCell<Vec<CloudEvent>>,
    status_callbacks: RefCell<Vec<Option<CallbackSlot<ConnectionStatus>>>>,
    journal: RefCell<Option<Journal>>,
}

impl Script {
    fn record(&self, event: CloudEvent) {
        let label = match event {
            CloudEvent::Connect { .. } => "cloud.connect",
            CloudEvent::Keepalive { .. } => "cloud.keepalive",
            CloudEvent::RetryPolicy { .. } => "cloud.retry_policy",
            CloudEvent::StatusCallback { .. } => "cloud.status_callback",
            CloudEvent::Close { .. } => "cloud.close",
        };
        self.events.borrow_mut().push(event);
        if let Some(journal) = self.journal.borrow().as_ref() {
            journal.record(label);
        }
    }
}

/// Cloud client whose attempts return queued outcomes.
///
/// With an empty queue every attempt fails with
/// [`ConnectFailure::NetworkNotReady`]. Clones share the script and the log.
#[derive(Clone, Default)]
pub struct ScriptedCloud {
    script: Rc<Script>,
}

impl ScriptedCloud {
    /// Create a client with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also record calls in `journal` as `cloud.connect`, `cloud.close` and so on.
    pub fn with_journal(self, journal: &Journal) -> Self {
        *self.script.journal.borrow_mut() = Some(journal.clone());
        self
    }

    /// Queue the outcome of a future attempt.
    pub fn push(&self, outcome: ConnectOutcome) -> &Self {
        self.script.outcomes.borrow_mut().push_back(outcome);
        self
    }

    /// Everything observed so far.
    pub fn events(&self) -> Vec<CloudEvent> {
        self.script.events.borrow().clone()
    }

    /// Number of connection attempts.
    pub fn attempts(&self) -> usize {
        self.script
            .events
            .borrow()
            .iter()
            .filter(|e| matches!(e, CloudEvent::Connect { .. }))
            .count()
    }

    /// Number of connections handed out.
    pub fn connections(&self) -> usize {
        self.script.status_callbacks.borrow().len()
    }

    /// Report `status` through connection `id`'s callback, as the transport
    /// would. Returns `false` if the connection has no callback or is closed.
    pub fn report(&self, id: usize, status: ConnectionStatus) -> bool {
        let callback = self
            .script
            .status_callbacks
            .borrow()
            .get(id)
            .cloned()
            .flatten();
        match callback {
            Some(callback) => {
                callback.invoke(status);
                true
            }
            None => false,
        }
    }

    /// Report status through the most recent connection.
    pub fn report_latest(&self, status: ConnectionStatus) -> bool {
        match self.connections().checked_sub(1) {
            Some(id) => self.report(id, status),
            None => false,
        }
    }
}

impl CloudClient for ScriptedCloud {
    fn connect(
        &self,
        scope_id: &str,
        timeout: Duration,
    ) -> Result<Box<dyn CloudConnection>, ConnectFailure> {
        self.script.record(CloudEvent::Connect {
            scope_id: scope_id.to_owned(),
            timeout,
        });
        let outcome = self
            .script
            .outcomes
            .borrow_mut()
            .pop_front()
            .unwrap_or(ConnectOutcome::Fail(ConnectFailure::NetworkNotReady));

        let reject_keepalive = match outcome {
            ConnectOutcome::Fail(failure) => return Err(failure),
            ConnectOutcome::Connect => false,
            ConnectOutcome::ConnectRejectingKeepalive => true,
        };
        let id = {
            let mut callbacks = self.script.status_callbacks.borrow_mut();
            callbacks.push(None);
            callbacks.len() - 1
        };
        Ok(Box::new(ScriptedConnection {
            id,
            reject_keepalive,
            script: Rc::clone(&self.script),
        }))
    }
}

struct ScriptedConnection {
    id: usize,
    reject_keepalive: bool,
    script: Rc<Script>,
}

impl CloudConnection for ScriptedConnection {
    fn set_keepalive(&self, period_secs: u32) -> Result<(), ProtocolError> {
        if self.reject_keepalive {
            return Err(ProtocolError::new(
                FailureStage::HubTransport,
                "IOTHUB_CLIENT_INVALID_ARG",
            ));
        }
        self.script.record(CloudEvent::Keepalive {
            id: self.id,
            period_secs,
        });
        Ok(())
    }

    fn set_retry_policy(&self, policy: RetryPolicy) -> Result<(), ProtocolError> {
        self.script
            .record(CloudEvent::RetryPolicy { id: self.id, policy });
        Ok(())
    }

    fn set_status_callback(
        &self,
        callback: CallbackSlot<ConnectionStatus>,
    ) -> Result<(), ProtocolError> {
        self.script
            .record(CloudEvent::StatusCallback { id: self.id });
        if let Some(slot) = self.script.status_callbacks.borrow_mut().get_mut(self.id) {
            *slot = Some(callback);
        }
        Ok(())
    }

    fn close(&self) {
        self.script.record(CloudEvent::Close { id: self.id });
        if let Some(slot) = self.script.status_callbacks.borrow_mut().get_mut(self.id) {
            *slot = None;
        }
    }
}
