//! Process signal bridge.
//!
//! The installed handler only records the signal in a lock-free mask and writes
//! one byte to a non-blocking self-pipe. The read end is registered with the
//! event loop; the bridge drains it on the loop thread and dispatches each
//! pending signal to a [`CallbackSlot`] there, where logging, teardown and
//! platform calls are safe.
//!
//! Signal dispositions are process-global, so at most one bridge may exist at
//! a time. [`SignalBridge::new`] claims the process and fails with
//! [`ResourceError::AlreadyInstalled`] while another bridge is alive.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd};
use std::ptr;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

use libc::c_int;
use rustix::io::Errno;
use rustix::pipe::{PipeFlags, pipe_with};
use sphere_errors::{ResourceError, SphereResult};
use tracing::{debug, trace, warn};

use crate::callback::CallbackSlot;
use crate::event_loop::{EventLoopHandle, EventRegistration, IoHandler, Readiness};

static CLAIMED: AtomicBool = AtomicBool::new(false);
static WAKE_FD: AtomicI32 = AtomicI32::new(-1);
static PENDING: AtomicU32 = AtomicU32::new(0);

/// Signals the bridge can own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessSignal {
    /// `SIGTERM`: graceful shutdown.
    Terminate,
    /// `SIGALRM`: watchdog expiry.
    Alarm,
}

impl ProcessSignal {
    /// Dispatch order when several signals are pending: ascending signal number.
    pub const DISPATCH_ORDER: [ProcessSignal; 2] = [ProcessSignal::Alarm, ProcessSignal::Terminate];

    /// The OS signal number.
    #[must_use]
    pub fn signo(self) -> c_int {
        match self {
            ProcessSignal::Terminate => libc::SIGTERM,
            ProcessSignal::Alarm => libc::SIGALRM,
        }
    }

    /// Map an OS signal number back to a bridge signal.
    #[must_use]
    pub fn from_signo(signo: c_int) -> Option<Self> {
        match signo {
            libc::SIGTERM => Some(ProcessSignal::Terminate),
            libc::SIGALRM => Some(ProcessSignal::Alarm),
            _ => None,
        }
    }

    fn bit(self) -> u32 {
        match self {
            ProcessSignal::Terminate => 1 << 0,
            ProcessSignal::Alarm => 1 << 1,
        }
    }

    /// Short name for logs.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ProcessSignal::Terminate => "SIGTERM",
            ProcessSignal::Alarm => "SIGALRM",
        }
    }
}

impl fmt::Display for ProcessSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// Async-signal context: atomics and write(2) only.
extern "C" fn on_signal(signo: c_int) {
    // SAFETY: `__errno_location` returns the calling thread's errno slot, valid
    // for the lifetime of the thread.
    let errno = unsafe { libc::__errno_location() };
    // SAFETY: `errno` points to this thread's errno slot (see above).
    let saved = unsafe { errno.read() };

    let bit = match ProcessSignal::from_signo(signo) {
        Some(signal) => signal.bit(),
        None => return,
    };
    PENDING.fetch_or(bit, Ordering::SeqCst);

    let fd = WAKE_FD.load(Ordering::SeqCst);
    if fd >= 0 {
        let byte = 1u8;
        // SAFETY: write(2) is async-signal-safe; `byte` is a live one-byte
        // buffer. A full pipe returns EAGAIN, which is fine: a wake-up is
        // already queued.
        unsafe { libc::write(fd, ptr::from_ref(&byte).cast(), 1) };
    }

    // SAFETY: see above; restores the interrupted code's errno.
    unsafe { errno.write(saved) };
}

struct SavedDisposition {
    signal: ProcessSignal,
    action: libc::sigaction,
}

struct BridgeInner {
    read_end: OwnedFd,
    write_end: OwnedFd,
    registration: Cell<Option<EventRegistration>>,
    saved: RefCell<Vec<SavedDisposition>>,
    handler: RefCell<CallbackSlot<ProcessSignal>>,
    active: Cell<bool>,
}

impl BridgeInner {
    fn drain_pipe(&self) {
        let mut buf = [0u8; 64];
        loop {
            match rustix::io::read(&self.read_end, &mut buf) {
                Ok(0) | Err(Errno::AGAIN) => break,
                Ok(_) | Err(Errno::INTR) => {}
                Err(e) => {
                    warn!(error = %e, "failed to drain signal pipe");
                    break;
                }
            }
        }
    }

    fn is_installed(&self, signal: ProcessSignal) -> bool {
        self.saved.borrow().iter().any(|s| s.signal == signal)
    }
}

impl IoHandler for BridgeInner {
    fn on_ready(&self, _readiness: Readiness) {
        self.drain_pipe();
        let pending = PENDING.swap(0, Ordering::SeqCst);

        for signal in ProcessSignal::DISPATCH_ORDER {
            if pending & signal.bit() == 0 {
                continue;
            }
            // A handler earlier in this pass may have torn the bridge down.
            if !self.active.get() {
                break;
            }
            debug!(signal = %signal, "signal received");
            let handler = self.handler.borrow().clone();
            if handler.is_bound() {
                handler.invoke(signal);
            } else {
                warn!(signal = %signal, "no signal handler bound; ignoring");
            }
        }
    }
}

/// Owner of the process's termination and alarm signal dispositions.
pub struct SignalBridge {
    event_loop: EventLoopHandle,
    inner: Rc<BridgeInner>,
}

impl SignalBridge {
    /// Claim the process signal dispositions and register the self-pipe.
    ///
    /// No handler is installed yet; call [`install`](Self::install) per signal.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::AlreadyInstalled`] while another bridge is
    /// alive, or an OS error if the pipe cannot be created or registered.
    pub fn new(event_loop: &EventLoopHandle) -> SphereResult<Self> {
        if CLAIMED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ResourceError::AlreadyInstalled.into());
        }

        match Self::open(event_loop) {
            Ok(bridge) => Ok(bridge),
            Err(e) => {
                CLAIMED.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    fn open(event_loop: &EventLoopHandle) -> SphereResult<Self> {
        let (read_end, write_end) = pipe_with(PipeFlags::NONBLOCK | PipeFlags::CLOEXEC)
            .map_err(|e| ResourceError::signal("pipe", e.into()))?;

        let inner = Rc::new(BridgeInner {
            read_end,
            write_end,
            registration: Cell::new(None),
            saved: RefCell::new(Vec::new()),
            handler: RefCell::new(CallbackSlot::new()),
            active: Cell::new(true),
        });
        let handler = Rc::downgrade(&inner);
        let handler: Weak<dyn IoHandler> = handler;
        let registration = event_loop.register_io(inner.read_end.as_raw_fd(), handler)?;
        inner.registration.set(Some(registration));

        PENDING.store(0, Ordering::SeqCst);
        WAKE_FD.store(inner.write_end.as_raw_fd(), Ordering::SeqCst);

        debug!("signal bridge claimed");
        Ok(Self {
            event_loop: Rc::clone(event_loop),
            inner,
        })
    }

    /// Check whether any bridge currently owns the process signal dispositions.
    #[must_use]
    pub fn is_claimed() -> bool {
        CLAIMED.load(Ordering::Acquire)
    }

    /// Install the bridge handler for `signal`, saving the prior disposition.
    ///
    /// Installing an already installed signal is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotInitialized`] after teardown, or
    /// [`ResourceError::Signal`] if `sigaction(2)` fails.
    pub fn install(&self, signal: ProcessSignal) -> SphereResult<()> {
        self.ensure_active()?;
        if self.inner.is_installed(signal) {
            trace!(signal = %signal, "signal already installed");
            return Ok(());
        }

        // SAFETY: `sigaction` is a plain C struct; all-zero is a valid value.
        let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
        action.sa_sigaction = on_signal as extern "C" fn(c_int) as libc::sighandler_t;
        action.sa_flags = libc::SA_RESTART;
        // SAFETY: `action.sa_mask` is a valid, writable sigset_t.
        unsafe { libc::sigemptyset(&mut action.sa_mask) };

        // SAFETY: as above.
        let mut previous: libc::sigaction = unsafe { std::mem::zeroed() };
        // SAFETY: both pointers reference live sigaction values; `on_signal`
        // only performs async-signal-safe operations.
        let rc = unsafe { libc::sigaction(signal.signo(), &action, &mut previous) };
        if rc != 0 {
            return Err(ResourceError::signal("install", io::Error::last_os_error()).into());
        }

        self.inner.saved.borrow_mut().push(SavedDisposition {
            signal,
            action: previous,
        });
        debug!(signal = %signal, "signal handler installed");
        Ok(())
    }

    /// Restore the disposition saved when `signal` was installed.
    ///
    /// Restoring a signal that is not installed is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Signal`] if `sigaction(2)` fails; the saved
    /// disposition is kept so the restore can be retried.
    pub fn restore(&self, signal: ProcessSignal) -> SphereResult<()> {
        let mut saved = self.inner.saved.borrow_mut();
        let Some(index) = saved.iter().position(|s| s.signal == signal) else {
            return Ok(());
        };
        let Some(entry) = saved.get(index) else {
            return Ok(());
        };

        // SAFETY: `entry.action` is the disposition returned by sigaction(2).
        let rc = unsafe { libc::sigaction(signal.signo(), &entry.action, ptr::null_mut()) };
        if rc != 0 {
            return Err(ResourceError::signal("restore", io::Error::last_os_error()).into());
        }
        saved.remove(index);
        debug!(signal = %signal, "signal handler restored");
        Ok(())
    }

    /// Check whether the bridge handler is installed for `signal`.
    #[must_use]
    pub fn is_installed(&self, signal: ProcessSignal) -> bool {
        self.inner.is_installed(signal)
    }

    /// Replace the loop-context handler.
    pub fn set_handler(&self, handler: CallbackSlot<ProcessSignal>) {
        *self.inner.handler.borrow_mut() = handler;
    }

    /// Bind a method on a shared object as the loop-context handler.
    pub fn bind_method<T: 'static>(&self, target: &Rc<T>, method: fn(&T, ProcessSignal)) {
        self.inner.handler.borrow_mut().bind_method(target, method);
    }

    /// Check whether the bridge still owns the process.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    /// Restore every installed disposition, unregister the pipe and release
    /// the process claim.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotInitialized`] if already torn down, or the
    /// first error met. The claim is released regardless.
    pub fn teardown(&self) -> SphereResult<()> {
        self.ensure_active()?;

        let installed: Vec<ProcessSignal> =
            self.inner.saved.borrow().iter().map(|s| s.signal).collect();
        let mut result = Ok(());
        for signal in installed.into_iter().rev() {
            if let Err(e) = self.restore(signal) {
                result = result.and(Err(e));
            }
        }

        WAKE_FD.store(-1, Ordering::SeqCst);
        if let Some(registration) = self.inner.registration.take() {
            if !self.event_loop.is_closed() {
                if let Err(e) = self.event_loop.unregister_io(registration) {
                    result = result.and(Err(e));
                }
            }
        }
        PENDING.store(0, Ordering::SeqCst);
        self.inner.active.set(false);
        CLAIMED.store(false, Ordering::Release);

        debug!("signal bridge released");
        result
    }

    fn ensure_active(&self) -> SphereResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(ResourceError::NotInitialized("signal bridge").into())
        }
    }
}

impl Drop for SignalBridge {
    fn drop(&mut self) {
        if self.is_active() {
            if let Err(e) = self.teardown() {
                warn!(error = %e, "signal bridge teardown on drop failed");
            }
        }
    }
}

impl fmt::Debug for SignalBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let installed: Vec<ProcessSignal> =
            self.inner.saved.borrow().iter().map(|s| s.signal).collect();
        f.debug_struct("SignalBridge")
            .field("active", &self.is_active())
            .field("installed", &installed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signo_mapping() {
        assert_eq!(ProcessSignal::Terminate.signo(), libc::SIGTERM);
        assert_eq!(ProcessSignal::Alarm.signo(), libc::SIGALRM);
        assert_eq!(
            ProcessSignal::from_signo(libc::SIGALRM),
            Some(ProcessSignal::Alarm)
        );
        assert_eq!(ProcessSignal::from_signo(libc::SIGINT), None);
    }

    #[test]
    fn test_dispatch_order_is_ascending_signo() {
        let [first, second] = ProcessSignal::DISPATCH_ORDER;
        assert!(first.signo() < second.signo());
    }

    #[test]
    fn test_bits_are_distinct() {
        assert_ne!(ProcessSignal::Terminate.bit(), ProcessSignal::Alarm.bit());
        assert_eq!(ProcessSignal::Alarm.to_string(), "SIGALRM");
    }
}
