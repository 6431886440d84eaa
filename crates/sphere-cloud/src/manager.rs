//! Connect/retry state machine.
//!
//! ```text
//!                 attempt ok
//! Disconnected ───────────────► Connected
//!      │  ▲                        │
//!      │  │ retry timer fires      │ status: not authenticated
//!      ▼  │                        ▼
//! RetryScheduled               Disconnected (no retry is armed)
//!   (attempt failed)
//! ```

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use sphere_errors::{InvariantViolation, ProtocolError, ResourceError, SphereResult, fatal};
use sphere_runtime::{CallbackSlot, EventLoopHandle, TimerService};
use tracing::{debug, info, warn};

use crate::backoff::{DEFAULT_INITIAL_RETRY_SECS, DEFAULT_MAX_RETRY_SECS, RetryBackoff};
use crate::client::{CloudClient, CloudConnection};
use crate::status::{ConnectionStatus, ConnectivityStatus, DisconnectReason, RetryPolicy};

/// Longest accepted scope identity, in bytes.
pub const MAX_SCOPE_ID_LEN: usize = 64;
/// Default bound on a single connection attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Validate a device scope identity: non-empty, ASCII alphanumeric, at most
/// [`MAX_SCOPE_ID_LEN`] bytes.
///
/// # Errors
///
/// Returns [`ResourceError::InvalidArgument`] describing the first violation.
pub fn validate_scope_id(scope_id: &str) -> SphereResult<()> {
    if scope_id.is_empty() {
        return Err(ResourceError::invalid_argument("scope id", "must not be empty").into());
    }
    if scope_id.len() > MAX_SCOPE_ID_LEN {
        return Err(ResourceError::invalid_argument(
            "scope id",
            format!("longer than {MAX_SCOPE_ID_LEN} bytes"),
        )
        .into());
    }
    if !scope_id.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(
            ResourceError::invalid_argument("scope id", "must be ASCII alphanumeric").into(),
        );
    }
    Ok(())
}

/// Settings for a [`ConnectivityManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivityConfig {
    /// Device scope identity passed to every attempt.
    pub scope_id: String,
    /// Bound on a single attempt.
    pub connect_timeout: Duration,
    /// First retry delay, in seconds.
    pub initial_retry_secs: u32,
    /// Retry ceiling, in seconds.
    pub max_retry_secs: u32,
    /// Keepalive period applied on connect; `None` leaves the transport default.
    pub keepalive_secs: Option<u32>,
}

impl ConnectivityConfig {
    /// Default settings for `scope_id`.
    #[must_use]
    pub fn new(scope_id: impl Into<String>) -> Self {
        Self {
            scope_id: scope_id.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            initial_retry_secs: DEFAULT_INITIAL_RETRY_SECS,
            max_retry_secs: DEFAULT_MAX_RETRY_SECS,
            keepalive_secs: None,
        }
    }

    /// Apply a keepalive period on every successful connect.
    #[must_use]
    pub fn with_keepalive(mut self, period_secs: u32) -> Self {
        self.keepalive_secs = Some(period_secs);
        self
    }

    /// Set the retry bounds.
    #[must_use]
    pub fn with_retry_bounds(mut self, initial_secs: u32, max_secs: u32) -> Self {
        self.initial_retry_secs = initial_secs;
        self.max_retry_secs = max_secs;
        self
    }

    /// Validate the settings.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidArgument`] for a bad scope id, a zero
    /// keepalive or timeout, or inconsistent retry bounds.
    pub fn validate(&self) -> SphereResult<()> {
        validate_scope_id(&self.scope_id)?;
        if self.keepalive_secs == Some(0) {
            return Err(
                ResourceError::invalid_argument("keepalive period", "must be greater than 0")
                    .into(),
            );
        }
        if self.connect_timeout.is_zero() {
            return Err(
                ResourceError::invalid_argument("connect timeout", "must be greater than 0").into(),
            );
        }
        RetryBackoff::new(self.initial_retry_secs, self.max_retry_secs)?;
        Ok(())
    }
}

struct ManagerInner {
    weak_self: Weak<ManagerInner>,
    client: Rc<dyn CloudClient>,
    scope_id: String,
    connect_timeout: Duration,
    keepalive_secs: Cell<Option<u32>>,
    backoff: Cell<RetryBackoff>,
    retry_timer: TimerService,
    /// Delay the retry timer was last armed with.
    pending_delay: Cell<u32>,
    connection: RefCell<Option<Box<dyn CloudConnection>>>,
    connected: Cell<bool>,
    attempts: Cell<u64>,
    failures: Cell<u64>,
    last_failure: RefCell<Option<ProtocolError>>,
    last_disconnect: Cell<Option<DisconnectReason>>,
    active: Cell<bool>,
}

impl ManagerInner {
    fn try_connect(&self) -> SphereResult<()> {
        if !self.active.get() {
            return Err(ResourceError::NotInitialized("connectivity").into());
        }
        self.attempts.set(self.attempts.get().saturating_add(1));

        match self.client.connect(&self.scope_id, self.connect_timeout) {
            Ok(connection) => self.on_connected(connection),
            Err(failure) => {
                let error = failure.classify();
                warn!(
                    scope_id = %self.scope_id,
                    stage = %error.stage,
                    message = %error.message,
                    "cloud connection attempt failed"
                );
                self.failures.set(self.failures.get().saturating_add(1));
                *self.last_failure.borrow_mut() = Some(error);

                let mut backoff = self.backoff.get();
                let delay = backoff.current();
                self.retry_timer
                    .start_one_shot(Duration::from_secs(u64::from(delay)))?;
                self.pending_delay.set(delay);
                backoff.advance();
                self.backoff.set(backoff);

                info!(delay_secs = delay, next_secs = backoff.current(), "connection retry scheduled");
                Ok(())
            }
        }
    }

    fn on_connected(&self, connection: Box<dyn CloudConnection>) -> SphereResult<()> {
        // The new handle is unauthenticated until its own status callback says otherwise.
        let was_connected = self.connected.replace(false);
        let applied = self.apply_options(connection.as_ref());
        if let Err(e) = applied {
            connection.close();
            self.connected.set(was_connected);
            return Err(e);
        }

        if let Some(previous) = self.connection.replace(Some(connection)) {
            debug!("replacing previous cloud connection");
            previous.close();
        }
        info!(scope_id = %self.scope_id, "cloud connection established");
        if self.retry_timer.is_armed() {
            debug!("cancelling pending retry after successful attempt");
            self.retry_timer.stop()?;
        }
        Ok(())
    }

    fn apply_options(&self, connection: &dyn CloudConnection) -> SphereResult<()> {
        if let Some(period) = self.keepalive_secs.get() {
            connection.set_keepalive(period)?;
        }
        connection.set_retry_policy(RetryPolicy::exponential(self.backoff.get().max()))?;

        let mut callback = CallbackSlot::new();
        if let Some(me) = self.weak_self.upgrade() {
            callback.bind_method(&me, ManagerInner::on_status);
        }
        connection.set_status_callback(callback)?;
        Ok(())
    }

    fn on_retry_timer(&self, (): ()) {
        debug!("connection retry timer fired");
        if let Err(e) = self.try_connect() {
            fatal(InvariantViolation::RetryPathBroken(e.to_string()));
        }
    }

    fn on_status(&self, status: ConnectionStatus) {
        if !self.active.get() {
            return;
        }
        self.connected.set(status.authenticated);
        if status.authenticated {
            info!("cloud connection authenticated");
        } else {
            self.last_disconnect.set(Some(status.reason));
            warn!(reason = %status.reason, "cloud connection not authenticated");
        }
    }
}

/// Owns the cloud connection and its retry schedule.
///
/// Failed attempts schedule a one-shot retry at the current backoff delay and
/// square the delay for next time, up to the ceiling. A successful attempt
/// applies the keepalive and transport retry policy and registers for status
/// changes. Losing authentication later only clears the connected flag; no
/// retry is armed for it.
pub struct ConnectivityManager {
    inner: Rc<ManagerInner>,
}

impl ConnectivityManager {
    /// Create the manager and its retry timer. No attempt is made yet.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidArgument`] for invalid settings, or a
    /// timer error if the retry timer cannot be created.
    pub fn new(
        event_loop: &EventLoopHandle,
        client: Rc<dyn CloudClient>,
        config: ConnectivityConfig,
    ) -> SphereResult<Self> {
        config.validate()?;
        let backoff = RetryBackoff::new(config.initial_retry_secs, config.max_retry_secs)?;

        let inner = Rc::new_cyclic(|weak_self| ManagerInner {
            weak_self: weak_self.clone(),
            client,
            scope_id: config.scope_id,
            connect_timeout: config.connect_timeout,
            keepalive_secs: Cell::new(config.keepalive_secs),
            backoff: Cell::new(backoff),
            retry_timer: TimerService::new(event_loop),
            pending_delay: Cell::new(0),
            connection: RefCell::new(None),
            connected: Cell::new(false),
            attempts: Cell::new(0),
            failures: Cell::new(0),
            last_failure: RefCell::new(None),
            last_disconnect: Cell::new(None),
            active: Cell::new(true),
        });
        inner.retry_timer.init()?;
        inner
            .retry_timer
            .bind_method(&inner, ManagerInner::on_retry_timer);

        Ok(Self { inner })
    }

    /// Make a connection attempt now.
    ///
    /// A failed attempt is not an error: it is logged and a retry is scheduled.
    ///
    /// # Errors
    ///
    /// Returns an error if the retry cannot be scheduled, or if options cannot
    /// be applied to a new connection.
    pub fn try_connect(&self) -> SphereResult<()> {
        self.inner.try_connect()
    }

    /// Change the retry ceiling.
    ///
    /// While connected, the live transport's retry policy is updated. Otherwise
    /// the next delay is clamped to the new ceiling, and a pending retry armed
    /// with a longer delay is re-armed at the ceiling. A pending retry that is
    /// already shorter than the ceiling keeps its schedule.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidArgument`] for zero, or the transport or
    /// timer error.
    pub fn set_max_retry_interval(&self, max_secs: u32) -> SphereResult<()> {
        let inner = &self.inner;
        let mut backoff = inner.backoff.get();

        if inner.connected.get() {
            if max_secs == 0 {
                return Err(ResourceError::invalid_argument(
                    "max retry interval",
                    "must be greater than 0",
                )
                .into());
            }
            if let Some(connection) = inner.connection.borrow().as_ref() {
                connection.set_retry_policy(RetryPolicy::exponential(max_secs))?;
            }
            backoff.set_max(max_secs)?;
            inner.backoff.set(backoff);
            debug!(max_secs, "retry ceiling pushed to live connection");
            return Ok(());
        }

        backoff.set_max(max_secs)?;
        inner.backoff.set(backoff);
        if inner.retry_timer.is_armed() && inner.pending_delay.get() > max_secs {
            inner
                .retry_timer
                .start_one_shot(Duration::from_secs(u64::from(max_secs)))?;
            inner.pending_delay.set(max_secs);
            info!(delay_secs = max_secs, "pending retry re-armed at new ceiling");
        }
        Ok(())
    }

    /// Change the keepalive period, applying it live when connected.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidArgument`] for zero, or the transport error.
    pub fn set_keepalive_period(&self, period_secs: u32) -> SphereResult<()> {
        if period_secs == 0 {
            return Err(
                ResourceError::invalid_argument("keepalive period", "must be greater than 0")
                    .into(),
            );
        }
        self.inner.keepalive_secs.set(Some(period_secs));
        if self.inner.connected.get() {
            if let Some(connection) = self.inner.connection.borrow().as_ref() {
                connection.set_keepalive(period_secs)?;
            }
        }
        debug!(period_secs, "keepalive period changed");
        Ok(())
    }

    /// Stop the retry timer and close any live connection.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotInitialized`] on a second call, or the timer
    /// error (the connection is closed regardless).
    pub fn teardown(&self) -> SphereResult<()> {
        let inner = &self.inner;
        if !inner.active.replace(false) {
            return Err(ResourceError::NotInitialized("connectivity").into());
        }

        let timer = inner.retry_timer.destroy();
        if let Some(connection) = inner.connection.borrow_mut().take() {
            connection.close();
        }
        inner.connected.set(false);
        debug!("connectivity torn down");
        timer
    }

    /// Last status reported by the transport.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.get()
    }

    /// Check whether a retry attempt is pending.
    #[must_use]
    pub fn is_retry_scheduled(&self) -> bool {
        self.inner.retry_timer.is_armed()
    }

    /// Delay the next failure will schedule, in seconds.
    #[must_use]
    pub fn retry_interval_secs(&self) -> u32 {
        self.inner.backoff.get().current()
    }

    /// Retry ceiling, in seconds.
    #[must_use]
    pub fn max_retry_interval_secs(&self) -> u32 {
        self.inner.backoff.get().max()
    }

    /// Keepalive period applied on connect.
    #[must_use]
    pub fn keepalive_secs(&self) -> Option<u32> {
        self.inner.keepalive_secs.get()
    }

    /// Diagnostics snapshot.
    #[must_use]
    pub fn status(&self) -> ConnectivityStatus {
        let inner = &self.inner;
        let backoff = inner.backoff.get();
        ConnectivityStatus {
            connected: inner.connected.get(),
            has_connection: inner.connection.borrow().is_some(),
            retry_scheduled: inner.retry_timer.is_armed(),
            retry_interval_secs: backoff.current(),
            max_retry_interval_secs: backoff.max(),
            attempts: inner.attempts.get(),
            failures: inner.failures.get(),
            last_failure: inner.last_failure.borrow().clone(),
            last_disconnect: inner.last_disconnect.get(),
        }
    }
}

impl Drop for ConnectivityManager {
    fn drop(&mut self) {
        if self.inner.active.get() {
            if let Err(e) = self.teardown() {
                debug!(error = %e, "connectivity teardown on drop failed");
            }
        }
    }
}

impl fmt::Debug for ConnectivityManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectivityManager")
            .field("scope_id", &self.inner.scope_id)
            .field("status", &self.status())
            .finish()
    }
}
