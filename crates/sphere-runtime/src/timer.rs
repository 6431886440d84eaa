//! Monotonic one-shot and periodic timers driven by the event loop.
//!
//! Each [`TimerService`] owns a `timerfd` and its event-loop registration. The
//! two are created together by [`TimerService::init`] and released together by
//! [`TimerService::destroy`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd};
use std::rc::{Rc, Weak};
use std::time::Duration;

use rustix::io::Errno;
use rustix::time::{
    Itimerspec, TimerfdClockId, TimerfdFlags, TimerfdTimerFlags, Timespec, timerfd_create,
    timerfd_settime,
};
use sphere_errors::{ResourceError, SphereResult};
use tracing::{trace, warn};

use crate::callback::CallbackSlot;
use crate::event_loop::{EventLoopHandle, EventRegistration, IoHandler, Readiness};

/// Arming state of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerState {
    /// Not armed. Initial state, and the state after `stop` or a one-shot fire.
    #[default]
    Unarmed,
    /// Armed to fire once.
    OneShotArmed,
    /// Armed to fire repeatedly at a fixed period.
    PeriodicArmed,
}

struct TimerInner {
    fd: RefCell<Option<OwnedFd>>,
    registration: Cell<Option<EventRegistration>>,
    callback: RefCell<CallbackSlot>,
    state: Cell<TimerState>,
    fires: Cell<u64>,
}

impl TimerInner {
    fn drain(&self) -> bool {
        let fd = self.fd.borrow();
        let Some(fd) = fd.as_ref() else {
            return false;
        };
        // The payload is the expiry count; only the occurrence matters.
        let mut buf = [0u8; 8];
        match rustix::io::read(fd, &mut buf) {
            Ok(_) => true,
            Err(Errno::AGAIN) => false,
            Err(e) => {
                warn!(error = %e, "failed to drain timer");
                false
            }
        }
    }

    fn settime(&self, interval: Timespec, value: Timespec) -> io::Result<()> {
        let fd = self.fd.borrow();
        let fd = fd
            .as_ref()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        let spec = Itimerspec {
            it_interval: interval,
            it_value: value,
        };
        timerfd_settime(fd, TimerfdTimerFlags::empty(), &spec)?;
        Ok(())
    }
}

impl IoHandler for TimerInner {
    fn on_ready(&self, _readiness: Readiness) {
        if !self.drain() {
            return;
        }
        if self.state.get() == TimerState::OneShotArmed {
            self.state.set(TimerState::Unarmed);
        }
        self.fires.set(self.fires.get().saturating_add(1));

        // Copy the slot out so the callback may rebind or re-arm this timer.
        let callback = self.callback.borrow().clone();
        callback.call();
    }
}

fn to_timespec(duration: Duration) -> Timespec {
    Timespec {
        tv_sec: duration.as_secs().try_into().unwrap_or(i64::MAX),
        tv_nsec: duration.subsec_nanos().into(),
    }
}

/// Whole microseconds in `duration`, saturating at `u64::MAX`.
fn micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

const DISARMED: Timespec = Timespec {
    tv_sec: 0,
    tv_nsec: 0,
};

/// One-shot or periodic timer that invokes a bound callback on the loop thread.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use sphere_runtime::{EventLoop, TimerService};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let event_loop = EventLoop::create()?;
/// let timer = TimerService::new(&event_loop);
/// timer.init()?;
/// timer.bind_fn(|()| println!("tick"));
/// timer.start_periodic(Duration::from_millis(500))?;
/// event_loop.run()?;
/// # Ok(())
/// # }
/// ```
pub struct TimerService {
    event_loop: EventLoopHandle,
    inner: Rc<TimerInner>,
}

impl TimerService {
    /// Create an uninitialized timer bound to `event_loop`.
    #[must_use]
    pub fn new(event_loop: &EventLoopHandle) -> Self {
        Self {
            event_loop: Rc::clone(event_loop),
            inner: Rc::new(TimerInner {
                fd: RefCell::new(None),
                registration: Cell::new(None),
                callback: RefCell::new(CallbackSlot::new()),
                state: Cell::new(TimerState::Unarmed),
                fires: Cell::new(0),
            }),
        }
    }

    /// Create the OS timer and register it with the event loop.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::AlreadyInitialized`] on a second call, or an OS
    /// error if the timer cannot be created or registered. On failure nothing
    /// is left allocated.
    pub fn init(&self) -> SphereResult<()> {
        if self.is_initialized() {
            return Err(ResourceError::AlreadyInitialized("timer").into());
        }

        let fd = timerfd_create(
            TimerfdClockId::Monotonic,
            TimerfdFlags::NONBLOCK | TimerfdFlags::CLOEXEC,
        )
        .map_err(|e| ResourceError::timer("create", e.into()))?;

        let handler = Rc::downgrade(&self.inner);

        let handler: Weak<dyn IoHandler> = handler;
        let registration = self.event_loop.register_io(fd.as_raw_fd(), handler)?;

        *self.inner.fd.borrow_mut() = Some(fd);
        self.inner.registration.set(Some(registration));
        self.inner.state.set(TimerState::Unarmed);
        trace!(fd = registration.fd(), "timer initialized");
        Ok(())
    }

    /// Check whether [`init`](Self::init) succeeded and
    /// [`destroy`](Self::destroy) has not been called since.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.fd.borrow().is_some()
    }

    /// Arm the timer to fire once after `delay`, replacing any pending expiry.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotInitialized`] before `init`, or
    /// [`ResourceError::Timer`] if the OS rejects the setting.
    pub fn start_one_shot(&self, delay: Duration) -> SphereResult<()> {
        self.ensure_initialized()?;
        // A zero value would disarm the timer.
        let value = to_timespec(delay.max(Duration::from_nanos(1)));
        self.inner
            .settime(DISARMED, value)
            .map_err(|e| ResourceError::timer("arm", e))?;
        self.inner.state.set(TimerState::OneShotArmed);
        trace!(delay_us = micros(delay), "timer armed one-shot");
        Ok(())
    }

    /// Arm the timer to fire every `period`, starting one period from now.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidArgument`] for a zero period,
    /// [`ResourceError::NotInitialized`] before `init`, or
    /// [`ResourceError::Timer`] if the OS rejects the setting.
    pub fn start_periodic(&self, period: Duration) -> SphereResult<()> {
        self.ensure_initialized()?;
        if period.is_zero() {
            return Err(ResourceError::invalid_argument("period", "must be greater than 0").into());
        }
        let spec = to_timespec(period);
        self.inner
            .settime(spec, spec)
            .map_err(|e| ResourceError::timer("arm", e))?;
        self.inner.state.set(TimerState::PeriodicArmed);
        trace!(period_us = micros(period), "timer armed periodic");
        Ok(())
    }

    /// Disarm the timer. Stopping an unarmed timer is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotInitialized`] before `init`, or
    /// [`ResourceError::Timer`] if the OS rejects the setting.
    pub fn stop(&self) -> SphereResult<()> {
        self.ensure_initialized()?;
        self.inner
            .settime(DISARMED, DISARMED)
            .map_err(|e| ResourceError::timer("disarm", e))?;
        self.inner.state.set(TimerState::Unarmed);
        Ok(())
    }

    /// Disarm, unregister from the event loop and release the OS timer.
    ///
    /// The descriptor is released even when unregistration fails.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotInitialized`] if not initialized, or the
    /// first OS error met while tearing down.
    pub fn destroy(&self) -> SphereResult<()> {
        self.ensure_initialized()?;

        let disarmed: SphereResult<()> = self
            .inner
            .settime(DISARMED, DISARMED)
            .map_err(|e| ResourceError::timer("disarm", e).into());
        let unregistered = match self.inner.registration.take() {
            Some(registration) if !self.event_loop.is_closed() => {
                self.event_loop.unregister_io(registration)
            }
            _ => Ok(()),
        };
        self.inner.fd.borrow_mut().take();
        self.inner.state.set(TimerState::Unarmed);

        trace!("timer destroyed");
        disarmed.and(unregistered)
    }

    /// Current arming state.
    #[must_use]
    pub fn state(&self) -> TimerState {
        self.inner.state.get()
    }

    /// Check whether the timer is armed.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.state() != TimerState::Unarmed
    }

    /// Number of expiries dispatched since creation.
    #[must_use]
    pub fn fire_count(&self) -> u64 {
        self.inner.fires.get()
    }

    /// Replace the expiry callback.
    pub fn set_callback(&self, callback: CallbackSlot) {
        *self.inner.callback.borrow_mut() = callback;
    }

    /// Bind a method on a shared object as the expiry callback.
    pub fn bind_method<T: 'static>(&self, target: &Rc<T>, method: fn(&T, ())) {
        self.inner.callback.borrow_mut().bind_method(target, method);
    }

    /// Bind a free function as the expiry callback.
    pub fn bind_fn(&self, function: fn(())) {
        self.inner.callback.borrow_mut().bind_fn(function);
    }

    /// Bind a shared closure as the expiry callback.
    pub fn bind_closure<F: Fn(()) + 'static>(&self, closure: &Rc<F>) {
        self.inner.callback.borrow_mut().bind_closure(closure);
    }

    fn ensure_initialized(&self) -> SphereResult<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(ResourceError::NotInitialized("timer").into())
        }
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        if self.is_initialized() {
            if let Err(e) = self.destroy() {
                trace!(error = %e, "timer teardown on drop failed");
            }
        }
    }
}

impl fmt::Debug for TimerService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerService")
            .field("initialized", &self.is_initialized())
            .field("state", &self.state())
            .field("fires", &self.fire_count())
            .finish()
    }
}
