//! Platform update notifications.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use sphere_errors::{ResourceError, SphereResult};
use sphere_runtime::{
    CallbackSlot, EventLoopHandle, Platform, UpdateEvent, UpdateKind, UpdateSubscription,
};
use tracing::{debug, error, info};

/// Application reactions to the update lifecycle.
///
/// Every method has a default, so an implementation only overrides what it
/// cares about. The pending hooks default to doing nothing, which lets the
/// platform apply the update on its own schedule.
pub trait LifecycleHooks {
    /// A system update is pending. The platform honors deferrals of up to
    /// `max_deferral_minutes`.
    fn on_system_update_pending(&self, max_deferral_minutes: u32) {
        let _ = max_deferral_minutes;
    }

    /// An update of this application is pending.
    fn on_application_update_pending(&self, max_deferral_minutes: u32) {
        let _ = max_deferral_minutes;
    }

    /// An update of this application finished installing.
    ///
    /// The default requests a reboot so the new image starts.
    ///
    /// # Errors
    ///
    /// Returns the platform error if the reboot request fails.
    fn on_application_update_complete(&self, platform: &dyn Platform) -> SphereResult<()> {
        platform.request_reboot()
    }
}

/// Hooks with every default behavior.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl LifecycleHooks for DefaultHooks {}

struct NotifierInner {
    platform: Rc<dyn Platform>,
    hooks: Rc<dyn LifecycleHooks>,
    last_event: Cell<Option<UpdateEvent>>,
    received: Cell<u64>,
}

impl NotifierInner {
    fn on_event(&self, event: UpdateEvent) {
        self.last_event.set(Some(event));
        self.received.set(self.received.get().saturating_add(1));

        match event {
            UpdateEvent::Pending {
                kind,
                max_deferral_minutes,
            } => {
                info!(%kind, max_deferral_minutes, "update pending");
                match kind {
                    UpdateKind::System => self.hooks.on_system_update_pending(max_deferral_minutes),
                    UpdateKind::Application => {
                        self.hooks.on_application_update_pending(max_deferral_minutes);
                    }
                }
            }
            UpdateEvent::Complete {
                kind: UpdateKind::Application,
            } => {
                info!("application update complete");
                if let Err(e) = self
                    .hooks
                    .on_application_update_complete(self.platform.as_ref())
                {
                    error!(error = %e, "application update completion hook failed");
                }
            }
            UpdateEvent::Complete {
                kind: UpdateKind::System,
            } => debug!("system update complete"),
        }
    }
}

/// Subscription to update notifications with deferral control.
pub struct UpdateNotifier {
    inner: Rc<NotifierInner>,
    subscription: RefCell<Option<Box<dyn UpdateSubscription>>>,
    deferred: Cell<bool>,
}

impl UpdateNotifier {
    /// Create an unregistered notifier.
    #[must_use]
    pub fn new(platform: Rc<dyn Platform>, hooks: Rc<dyn LifecycleHooks>) -> Self {
        Self {
            inner: Rc::new(NotifierInner {
                platform,
                hooks,
                last_event: Cell::new(None),
                received: Cell::new(0),
            }),
            subscription: RefCell::new(None),
            deferred: Cell::new(false),
        }
    }

    /// Subscribe to update notifications, delivered on `event_loop`'s thread.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::AlreadyInitialized`] if already registered, or
    /// the platform error.
    pub fn register(&self, event_loop: &EventLoopHandle) -> SphereResult<()> {
        if self.is_registered() {
            return Err(ResourceError::AlreadyInitialized("update notifications").into());
        }
        let mut handler = CallbackSlot::new();
        handler.bind_method(&self.inner, NotifierInner::on_event);
        let subscription = self
            .inner
            .platform
            .subscribe_updates(event_loop, handler)?;
        *self.subscription.borrow_mut() = Some(subscription);
        debug!("update notifications registered");
        Ok(())
    }

    /// Defer pending updates for `minutes`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotInitialized`] when unregistered,
    /// [`ResourceError::InvalidArgument`] for zero, or the platform error.
    pub fn block_update(&self, minutes: u32) -> SphereResult<()> {
        if minutes == 0 {
            return Err(
                ResourceError::invalid_argument("deferral", "must be at least one minute").into(),
            );
        }
        let subscription = self.subscription.borrow();
        let subscription = subscription
            .as_ref()
            .ok_or(ResourceError::NotInitialized("update notifications"))?;
        subscription.defer(Duration::from_secs(u64::from(minutes) * 60))?;
        self.deferred.set(true);
        info!(minutes, "updates deferred");
        Ok(())
    }

    /// Cancel any active deferral.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotInitialized`] when unregistered, or the
    /// platform error.
    pub fn allow_update(&self) -> SphereResult<()> {
        let subscription = self.subscription.borrow();
        let subscription = subscription
            .as_ref()
            .ok_or(ResourceError::NotInitialized("update notifications"))?;
        subscription.resume()?;
        self.deferred.set(false);
        info!("updates allowed");
        Ok(())
    }

    /// Drop the subscription.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotInitialized`] when unregistered, or the
    /// platform error.
    pub fn unregister(&self) -> SphereResult<()> {
        let subscription = self
            .subscription
            .borrow_mut()
            .take()
            .ok_or(ResourceError::NotInitialized("update notifications"))?;
        self.deferred.set(false);
        subscription.unsubscribe()?;
        debug!("update notifications unregistered");
        Ok(())
    }

    /// Check whether the subscription is live.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.subscription.borrow().is_some()
    }

    /// Check whether a deferral was requested and not since allowed.
    #[must_use]
    pub fn is_deferred(&self) -> bool {
        self.deferred.get()
    }

    /// The most recent notification.
    #[must_use]
    pub fn last_event(&self) -> Option<UpdateEvent> {
        self.inner.last_event.get()
    }

    /// Number of notifications received.
    #[must_use]
    pub fn received(&self) -> u64 {
        self.inner.received.get()
    }
}

impl fmt::Debug for UpdateNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateNotifier")
            .field("registered", &self.is_registered())
            .field("deferred", &self.is_deferred())
            .field("last_event", &self.last_event())
            .finish()
    }
}
