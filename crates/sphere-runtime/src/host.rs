//! Linux host implementation of [`Platform`].

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use sphere_errors::{ResourceError, SphereResult};
use tracing::{debug, info, warn};

use crate::callback::CallbackSlot;
use crate::event_loop::{
    EventLoopHandle, EventLoopWaker, IoHandler, Readiness, WakeRegistration,
};
use crate::platform::{Platform, UpdateEvent, UpdateSubscription};

#[derive(Default)]
struct QueueState {
    events: VecDeque<UpdateEvent>,
    waker: Option<EventLoopWaker>,
    subscribed: bool,
    deferred_until: Option<Instant>,
}

impl QueueState {
    /// Remove the events that may be delivered at `now`, leaving held ones queued.
    fn take_deliverable(&mut self, now: Instant) -> Vec<UpdateEvent> {
        let deferred = self.deferred_until.is_some_and(|until| now < until);
        if !deferred && self.deferred_until.take().is_some() {
            debug!("update deferral window elapsed");
        }
        let (held, ready): (VecDeque<UpdateEvent>, VecDeque<UpdateEvent>) = self
            .events
            .drain(..)
            .partition(|event| deferred && matches!(event, UpdateEvent::Pending { .. }));
        self.events = held;
        ready.into()
    }
}

/// Thread-safe source of update notifications.
///
/// Any thread may push events through an [`UpdateInjector`]; they are
/// delivered on the loop thread to the active subscription. Events pushed
/// before anyone subscribes are held until a subscription exists.
///
/// While a deferral is active, `Pending` events stay queued. They are
/// delivered after [`UpdateSubscription::resume`], or on the first wake once
/// the deferral window has passed. `Complete` events are never held.
#[derive(Clone, Default)]
pub struct PlatformEventQueue {
    state: Arc<Mutex<QueueState>>,
}

impl PlatformEventQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a handle for pushing events from any thread.
    #[must_use]
    pub fn injector(&self) -> UpdateInjector {
        UpdateInjector {
            state: Arc::clone(&self.state),
        }
    }

    /// Number of events not yet delivered.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().events.len()
    }

    /// Deadline of the active deferral, if any.
    #[must_use]
    pub fn deferred_until(&self) -> Option<Instant> {
        self.state.lock().deferred_until
    }

    fn subscribe(
        &self,
        event_loop: &EventLoopHandle,
        handler: CallbackSlot<UpdateEvent>,
    ) -> SphereResult<Box<dyn UpdateSubscription>> {
        let waker = event_loop.waker();
        let backlog = {
            let mut state = self.state.lock();
            if state.subscribed {
                return Err(ResourceError::AlreadyInitialized("update subscription").into());
            }
            state.subscribed = true;
            state.waker = Some(waker.clone());
            !state.events.is_empty()
        };

        let listener = Rc::new(QueueListener {
            state: Arc::clone(&self.state),
            handler: RefCell::new(handler),
        });
        let weak = Rc::downgrade(&listener);
        let weak: Weak<dyn IoHandler> = weak;
        let registration = event_loop.register_wake_listener(weak);

        if backlog {
            waker
                .wake()
                .map_err(|e| ResourceError::platform("wake", e))?;
        }
        debug!("update notifications subscribed");
        Ok(Box::new(QueueSubscription {
            event_loop: Rc::downgrade(event_loop),
            listener,
            registration,
        }))
    }
}

/// Cross-thread handle that pushes update events into a [`PlatformEventQueue`].
#[derive(Clone)]
pub struct UpdateInjector {
    state: Arc<Mutex<QueueState>>,
}

impl UpdateInjector {
    /// Queue `event` and wake the subscribed loop.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the loop could not be woken. The event stays queued.
    pub fn inject(&self, event: UpdateEvent) -> io::Result<()> {
        let waker = {
            let mut state = self.state.lock();
            state.events.push_back(event);
            state.waker.clone()
        };
        match waker {
            Some(waker) => waker.wake(),
            None => Ok(()),
        }
    }
}

struct QueueListener {
    state: Arc<Mutex<QueueState>>,
    handler: RefCell<CallbackSlot<UpdateEvent>>,
}

impl IoHandler for QueueListener {
    fn on_ready(&self, _readiness: Readiness) {
        let events = self.state.lock().take_deliverable(Instant::now());
        if events.is_empty() {
            return;
        }
        let handler = self.handler.borrow().clone();
        for event in events {
            debug!(?event, "delivering update event");
            handler.invoke(event);
        }
    }
}

struct QueueSubscription {
    event_loop: Weak<crate::EventLoop>,
    listener: Rc<QueueListener>,
    registration: WakeRegistration,
}

impl UpdateSubscription for QueueSubscription {
    fn defer(&self, duration: Duration) -> SphereResult<()> {
        let until = Instant::now().checked_add(duration).ok_or_else(|| {
            ResourceError::invalid_argument("duration", "deferral window overflows")
        })?;
        self.listener.state.lock().deferred_until = Some(until);
        info!(minutes = duration.as_secs() / 60, "updates deferred");
        Ok(())
    }

    fn resume(&self) -> SphereResult<()> {
        let waker = {
            let mut state = self.listener.state.lock();
            state.deferred_until = None;
            if state.events.is_empty() {
                None
            } else {
                state.waker.clone()
            }
        };
        info!("update deferral cleared");
        if let Some(waker) = waker {
            waker
                .wake()
                .map_err(|e| ResourceError::platform("wake", e))?;
        }
        Ok(())
    }

    fn unsubscribe(self: Box<Self>) -> SphereResult<()> {
        if let Some(event_loop) = self.event_loop.upgrade() {
            event_loop.unregister_wake_listener(self.registration);
        }
        let mut state = self.listener.state.lock();
        state.subscribed = false;
        state.waker = None;
        state.deferred_until = None;
        debug!("update notifications unsubscribed");
        Ok(())
    }
}

/// [`Platform`] backed by the running Linux host.
///
/// Reboot uses `reboot(2)` after `sync(2)`. Suspend programs the RTC wake
/// alarm and writes `mem` to the power state file. Time sync runs
/// `timedatectl set-ntp true`. In dry-run mode every request is logged and
/// reported as successful without touching the system.
#[derive(Clone)]
pub struct HostPlatform {
    sysfs_root: PathBuf,
    dry_run: bool,
    updates: PlatformEventQueue,
}

impl HostPlatform {
    /// Create a platform acting on the real host.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sysfs_root: PathBuf::from("/sys"),
            dry_run: false,
            updates: PlatformEventQueue::new(),
        }
    }

    /// Log requests instead of performing them.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Use a different sysfs mount point.
    #[must_use]
    pub fn with_sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_root = root.into();
        self
    }

    /// Check whether requests are only logged.
    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// The queue update notifications are delivered from.
    #[must_use]
    pub fn update_queue(&self) -> &PlatformEventQueue {
        &self.updates
    }

    fn wakealarm_path(&self) -> PathBuf {
        self.sysfs_root.join("class/rtc/rtc0/wakealarm")
    }

    fn power_state_path(&self) -> PathBuf {
        self.sysfs_root.join("power/state")
    }

    fn write_sysfs(path: &Path, value: &str) -> SphereResult<()> {
        fs::write(path, value).map_err(|e| ResourceError::platform("sysfs write", e))?;
        Ok(())
    }
}

impl Default for HostPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for HostPlatform {
    fn request_reboot(&self) -> SphereResult<()> {
        warn!(dry_run = self.dry_run, "system reboot requested");
        if self.dry_run {
            return Ok(());
        }

        // SAFETY: sync(2) has no preconditions.
        unsafe { libc::sync() };
        // SAFETY: reboot(2) with RB_AUTOBOOT takes no pointers; on success it
        // does not return.
        let rc = unsafe { libc::reboot(libc::RB_AUTOBOOT) };
        if rc != 0 {
            return Err(ResourceError::platform("reboot", io::Error::last_os_error()).into());
        }
        Ok(())
    }

    fn request_suspend(&self, duration: Duration) -> SphereResult<()> {
        info!(secs = duration.as_secs(), dry_run = self.dry_run, "system suspend requested");
        if self.dry_run {
            return Ok(());
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ResourceError::platform("clock", io::Error::other(e)))?;
        let wake_at = now.saturating_add(duration).as_secs();

        let wakealarm = self.wakealarm_path();
        // The RTC rejects a new alarm while one is set.
        Self::write_sysfs(&wakealarm, "0")?;
        Self::write_sysfs(&wakealarm, &wake_at.to_string())?;
        Self::write_sysfs(&self.power_state_path(), "mem")
    }

    fn enable_time_sync(&self) -> SphereResult<()> {
        info!(dry_run = self.dry_run, "enabling network time sync");
        if self.dry_run {
            return Ok(());
        }

        let status = Command::new("timedatectl")
            .args(["set-ntp", "true"])
            .status()
            .map_err(|e| ResourceError::platform("time sync", e))?;
        if !status.success() {
            return Err(ResourceError::platform(
                "time sync",
                io::Error::other(format!("timedatectl exited with {status}")),
            )
            .into());
        }
        Ok(())
    }

    fn subscribe_updates(
        &self,
        event_loop: &EventLoopHandle,
        handler: CallbackSlot<UpdateEvent>,
    ) -> SphereResult<Box<dyn UpdateSubscription>> {
        self.updates.subscribe(event_loop, handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventLoop;
    use crate::platform::UpdateKind;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_suspend_programs_rtc_and_power_state() -> TestResult {
        let root = tempfile::tempdir()?;
        fs::create_dir_all(root.path().join("class/rtc/rtc0"))?;
        fs::create_dir_all(root.path().join("power"))?;

        let platform = HostPlatform::new().with_sysfs_root(root.path());
        platform.request_suspend(Duration::from_secs(30))?;

        let wake_at: u64 = fs::read_to_string(root.path().join("class/rtc/rtc0/wakealarm"))?
            .trim()
            .parse()?;
        assert!(wake_at > 30);
        assert_eq!(fs::read_to_string(root.path().join("power/state"))?, "mem");
        Ok(())
    }

    #[test]
    fn test_suspend_without_rtc_fails() -> TestResult {
        let root = tempfile::tempdir()?;
        let platform = HostPlatform::new().with_sysfs_root(root.path());
        assert!(platform.request_suspend(Duration::from_secs(1)).is_err());
        Ok(())
    }

    #[test]
    fn test_dry_run_requests_succeed() -> TestResult {
        let platform = HostPlatform::new().with_dry_run(true);
        platform.request_reboot()?;
        platform.request_suspend(Duration::from_secs(5))?;
        platform.enable_time_sync()?;
        Ok(())
    }

    #[test]
    fn test_injected_events_reach_subscriber() -> TestResult {
        let el = EventLoop::create()?;
        let platform = HostPlatform::new().with_dry_run(true);
        let injector = platform.update_queue().injector();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let on_event = Rc::new(move |event: UpdateEvent| sink.borrow_mut().push(event));
        let mut slot = CallbackSlot::new();
        slot.bind_closure(&on_event);

        // Queued before subscribing: delivered once a subscription exists.
        injector.inject(UpdateEvent::Complete {
            kind: UpdateKind::System,
        })?;
        let subscription = platform.subscribe_updates(&el, slot)?;

        std::thread::spawn(move || {
            injector.inject(UpdateEvent::Pending {
                kind: UpdateKind::Application,
                max_deferral_minutes: 10,
            })
        })
        .join()
        .map_err(|_| "injector thread panicked")??;

        while seen.borrow().len() < 2 {
            el.run_once(Some(Duration::from_secs(1)))?;
        }
        assert_eq!(
            seen.borrow().first(),
            Some(&UpdateEvent::Complete {
                kind: UpdateKind::System
            })
        );
        assert_eq!(platform.update_queue().pending(), 0);

        subscription.defer(Duration::from_secs(600))?;
        assert!(platform.update_queue().deferred_until().is_some());
        subscription.resume()?;
        assert!(platform.update_queue().deferred_until().is_none());
        subscription.unsubscribe()?;
        Ok(())
    }

    #[test]
    fn test_deferral_holds_pending_events() -> TestResult {
        let el = EventLoop::create()?;
        let platform = HostPlatform::new().with_dry_run(true);
        let injector = platform.update_queue().injector();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let on_event = Rc::new(move |event: UpdateEvent| sink.borrow_mut().push(event));
        let mut slot = CallbackSlot::new();
        slot.bind_closure(&on_event);
        let subscription = platform.subscribe_updates(&el, slot)?;

        subscription.defer(Duration::from_secs(600))?;
        let pending = UpdateEvent::Pending {
            kind: UpdateKind::System,
            max_deferral_minutes: 60,
        };
        let complete = UpdateEvent::Complete {
            kind: UpdateKind::Application,
        };
        injector.inject(pending)?;
        injector.inject(complete)?;

        while seen.borrow().is_empty() {
            el.run_once(Some(Duration::from_secs(1)))?;
        }
        el.run_once(Some(Duration::from_millis(50)))?;
        assert_eq!(*seen.borrow(), vec![complete]);
        assert_eq!(platform.update_queue().pending(), 1);

        subscription.resume()?;
        while seen.borrow().len() < 2 {
            el.run_once(Some(Duration::from_secs(1)))?;
        }
        assert_eq!(*seen.borrow(), vec![complete, pending]);
        assert_eq!(platform.update_queue().pending(), 0);
        subscription.unsubscribe()?;
        Ok(())
    }

    #[test]
    fn test_elapsed_deferral_releases_pending() {
        let now = Instant::now();
        let mut state = QueueState {
            deferred_until: Some(now + Duration::from_secs(5)),
            ..QueueState::default()
        };
        state.events.push_back(UpdateEvent::Pending {
            kind: UpdateKind::Application,
            max_deferral_minutes: 5,
        });

        assert!(state.take_deliverable(now).is_empty());
        assert_eq!(state.events.len(), 1);

        let later = now + Duration::from_secs(6);
        assert_eq!(state.take_deliverable(later).len(), 1);
        assert!(state.deferred_until.is_none());
        assert!(state.events.is_empty());
    }

    #[test]
    fn test_second_subscription_rejected() -> TestResult {
        let el = EventLoop::create()?;
        let platform = HostPlatform::new().with_dry_run(true);
        let first = platform.subscribe_updates(&el, CallbackSlot::new())?;
        assert!(platform.subscribe_updates(&el, CallbackSlot::new()).is_err());
        first.unsubscribe()?;
        let again = platform.subscribe_updates(&el, CallbackSlot::new())?;
        again.unsubscribe()?;
        Ok(())
    }
}
