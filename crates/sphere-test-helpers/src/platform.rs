//! Recording platform.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use sphere_errors::{ResourceError, SphereResult};
use sphere_runtime::{CallbackSlot, EventLoopHandle, Platform, UpdateEvent, UpdateSubscription};

use crate::journal::Journal;

/// A request observed by a [`FakePlatform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformRequest {
    /// `request_reboot()`.
    Reboot,
    /// `request_suspend(duration)`.
    Suspend(Duration),
    /// `enable_time_sync()`.
    EnableTimeSync,
    /// `subscribe_updates(..)`.
    Subscribe,
    /// `defer(duration)` on the subscription.
    Defer(Duration),
    /// `resume()` on the subscription.
    Resume,
    /// `unsubscribe()` on the subscription.
    Unsubscribe,
}

impl PlatformRequest {
    /// Journal entry for this request.
    pub fn label(&self) -> &'static str {
        match self {
            PlatformRequest::Reboot => "platform.reboot",
            PlatformRequest::Suspend(_) => "platform.suspend",
            PlatformRequest::EnableTimeSync => "platform.time_sync",
            PlatformRequest::Subscribe => "platform.subscribe",
            PlatformRequest::Defer(_) => "platform.defer",
            PlatformRequest::Resume => "platform.resume",
            PlatformRequest::Unsubscribe => "platform.unsubscribe",
        }
    }
}

#[derive(Default)]
struct Shared {
    requests: RefCell<Vec<PlatformRequest>>,
    handler: RefCell<Option<CallbackSlot<UpdateEvent>>>,
    fail_reboot: Cell<bool>,
    journal: RefCell<Option<Journal>>,
}

impl Shared {
    fn record(&self, request: PlatformRequest) {
        self.requests.borrow_mut().push(request);
        if let Some(journal) = self.journal.borrow().as_ref() {
            journal.record(request.label());
        }
    }
}

/// Platform that records every request and lets tests emit update events.
///
/// Clones share the same state, so a test can keep one clone and hand the
/// other to the code under test.
#[derive(Clone, Default)]
pub struct FakePlatform {
    shared: Rc<Shared>,
}

impl FakePlatform {
    /// Create a platform with no recorded requests.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also record requests in `journal`, labelled by [`PlatformRequest::label`].
    pub fn with_journal(self, journal: &Journal) -> Self {
        *self.shared.journal.borrow_mut() = Some(journal.clone());
        self
    }

    /// Every request so far, in order.
    pub fn requests(&self) -> Vec<PlatformRequest> {
        self.shared.requests.borrow().clone()
    }

    /// Number of reboot requests.
    pub fn reboots(&self) -> usize {
        self.count(|r| matches!(r, PlatformRequest::Reboot))
    }

    /// Count requests matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&PlatformRequest) -> bool) -> usize {
        self.shared
            .requests
            .borrow()
            .iter()
            .filter(|r| predicate(r))
            .count()
    }

    /// Check whether an update subscription is active.
    pub fn is_subscribed(&self) -> bool {
        self.shared.handler.borrow().is_some()
    }

    /// Make reboot requests fail.
    pub fn fail_reboots(&self, fail: bool) {
        self.shared.fail_reboot.set(fail);
    }

    /// Deliver `event` to the active subscription, as the platform would on
    /// the loop thread. Returns `false` if nobody is subscribed.
    pub fn emit(&self, event: UpdateEvent) -> bool {
        let handler = self.shared.handler.borrow().clone();
        match handler {
            Some(handler) => {
                handler.invoke(event);
                true
            }
            None => false,
        }
    }
}

impl Platform for FakePlatform {
    fn request_reboot(&self) -> SphereResult<()> {
        self.shared.record(PlatformRequest::Reboot);
        if self.shared.fail_reboot.get() {
            return Err(
                ResourceError::platform("reboot", std::io::Error::other("reboot refused")).into(),
            );
        }
        Ok(())
    }

    fn request_suspend(&self, duration: Duration) -> SphereResult<()> {
        self.shared.record(PlatformRequest::Suspend(duration));
        Ok(())
    }

    fn enable_time_sync(&self) -> SphereResult<()> {
        self.shared.record(PlatformRequest::EnableTimeSync);
        Ok(())
    }

    fn subscribe_updates(
        &self,
        _event_loop: &EventLoopHandle,
        handler: CallbackSlot<UpdateEvent>,
    ) -> SphereResult<Box<dyn UpdateSubscription>> {
        if self.is_subscribed() {
            return Err(ResourceError::AlreadyInitialized("update subscription").into());
        }
        self.shared.record(PlatformRequest::Subscribe);
        *self.shared.handler.borrow_mut() = Some(handler);
        Ok(Box::new(FakeSubscription {
            shared: Rc::clone(&self.shared),
        }))
    }
}

struct FakeSubscription {
    shared: Rc<Shared>,
}

impl UpdateSubscription for FakeSubscription {
    fn defer(&self, duration: Duration) -> SphereResult<()> {
        self.shared.record(PlatformRequest::Defer(duration));
        Ok(())
    }

    fn resume(&self) -> SphereResult<()> {
        self.shared.record(PlatformRequest::Resume);
        Ok(())
    }

    fn unsubscribe(self: Box<Self>) -> SphereResult<()> {
        self.shared.record(PlatformRequest::Unsubscribe);
        self.shared.handler.borrow_mut().take();
        Ok(())
    }
}
