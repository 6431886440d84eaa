//! Single-threaded cooperative event loop.
//!
//! The loop waits for I/O readiness on registered descriptors and invokes the
//! matching [`IoHandler`] on the calling thread, strictly in arrival order.
//! Handlers are held weakly: a component that goes away without unregistering
//! is skipped rather than invoked.
//!
//! Readiness is edge-triggered. Handlers must drain their descriptor on every
//! notification.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::os::fd::RawFd;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::Duration;

use bitflags::bitflags;
use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token, Waker};
use sphere_errors::{ResourceError, SphereResult};
use tracing::{debug, trace};

/// Shared handle to the event loop. Components receive it at construction.
pub type EventLoopHandle = Rc<EventLoop>;

const WAKE_TOKEN: Token = Token(0);
const EVENT_CAPACITY: usize = 64;

bitflags! {
    /// Readiness reported to an [`IoHandler`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Readiness: u8 {
        /// Data is available to read.
        const INPUT  = 0b0000_0001;
        /// The descriptor reported an error condition.
        const ERROR  = 0b0000_0010;
        /// The peer closed its end.
        const HANGUP = 0b0000_0100;
    }
}

/// Receiver of readiness notifications.
pub trait IoHandler {
    /// Called on the loop thread when the registered descriptor becomes ready.
    fn on_ready(&self, readiness: Readiness);
}

/// Registration of a descriptor with the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventRegistration {
    token: Token,
    fd: RawFd,
}

impl EventRegistration {
    /// The registered descriptor.
    #[must_use]
    pub fn fd(&self) -> RawFd {
        self.fd
    }
}

/// Registration of a cross-thread wake listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WakeRegistration(u64);

/// Result of a single wait-and-dispatch pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The wait returned and this many handlers were invoked.
    Dispatched(usize),
    /// The wait was interrupted by signal delivery. Not an error; wait again.
    Interrupted,
}

/// Thread-safe waker that unblocks the loop from another thread.
#[derive(Clone)]
pub struct EventLoopWaker {
    waker: Arc<Waker>,
}

impl EventLoopWaker {
    /// Wake the loop and notify every wake listener on the loop thread.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the wake descriptor could not be written.
    pub fn wake(&self) -> io::Result<()> {
        self.waker.wake()
    }
}

impl fmt::Debug for EventLoopWaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoopWaker").finish_non_exhaustive()
    }
}

/// Cooperative dispatcher over `epoll`.
pub struct EventLoop {
    poll: RefCell<Option<Poll>>,
    events: RefCell<Events>,
    handlers: RefCell<HashMap<Token, Weak<dyn IoHandler>>>,
    wake_listeners: RefCell<Vec<(u64, Weak<dyn IoHandler>)>>,
    waker: Arc<Waker>,
    next_token: Cell<usize>,
    next_listener: Cell<u64>,
    stop_requested: Cell<bool>,
}

impl EventLoop {
    /// Create a new event loop.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::EventLoop`] if the poller or its waker cannot be created.
    pub fn create() -> SphereResult<EventLoopHandle> {
        let poll = Poll::new().map_err(|e| ResourceError::event_loop("create", e))?;
        let waker = Waker::new(poll.registry(), WAKE_TOKEN)
            .map_err(|e| ResourceError::event_loop("create waker", e))?;

        debug!("event loop created");
        Ok(Rc::new(Self {
            poll: RefCell::new(Some(poll)),
            events: RefCell::new(Events::with_capacity(EVENT_CAPACITY)),
            handlers: RefCell::new(HashMap::new()),
            wake_listeners: RefCell::new(Vec::new()),
            waker: Arc::new(waker),
            next_token: Cell::new(1),
            next_listener: Cell::new(0),
            stop_requested: Cell::new(false),
        }))
    }

    /// Check whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.poll.borrow().is_none()
    }

    /// Register a descriptor for read readiness.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotInitialized`] if the loop is closed, or
    /// [`ResourceError::EventLoop`] if the OS rejects the registration.
    pub fn register_io(
        &self,
        fd: RawFd,
        handler: Weak<dyn IoHandler>,
    ) -> SphereResult<EventRegistration> {
        let token = Token(self.next_token.get());
        {
            let poll = self.poll.borrow();
            let poll = poll
                .as_ref()
                .ok_or(ResourceError::NotInitialized("event loop"))?;
            poll.registry()
                .register(&mut SourceFd(&fd), token, Interest::READABLE)
                .map_err(|e| ResourceError::event_loop("register", e))?;
        }
        self.next_token.set(token.0.wrapping_add(1).max(1));
        self.handlers.borrow_mut().insert(token, handler);

        trace!(fd, token = token.0, "registered descriptor");
        Ok(EventRegistration { token, fd })
    }

    /// Remove a registration made with [`register_io`](Self::register_io).
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotInitialized`] if the loop is closed, or
    /// [`ResourceError::EventLoop`] if the registration is unknown or the OS
    /// rejects the removal.
    pub fn unregister_io(&self, registration: EventRegistration) -> SphereResult<()> {
        let poll = self.poll.borrow();
        let poll = poll
            .as_ref()
            .ok_or(ResourceError::NotInitialized("event loop"))?;

        if self.handlers.borrow_mut().remove(&registration.token).is_none() {
            return Err(ResourceError::event_loop(
                "unregister",
                io::Error::from(io::ErrorKind::NotFound),
            )
            .into());
        }
        poll.registry()
            .deregister(&mut SourceFd(&registration.fd))
            .map_err(|e| ResourceError::event_loop("unregister", e))?;

        trace!(fd = registration.fd, token = registration.token.0, "unregistered descriptor");
        Ok(())
    }

    /// Register a listener notified whenever an [`EventLoopWaker`] fires.
    pub fn register_wake_listener(&self, handler: Weak<dyn IoHandler>) -> WakeRegistration {
        let id = self.next_listener.get();
        self.next_listener.set(id.wrapping_add(1));
        self.wake_listeners.borrow_mut().push((id, handler));
        WakeRegistration(id)
    }

    /// Remove a wake listener. Unknown registrations are ignored.
    pub fn unregister_wake_listener(&self, registration: WakeRegistration) {
        self.wake_listeners
            .borrow_mut()
            .retain(|(id, _)| *id != registration.0);
    }

    /// Get a waker usable from other threads.
    #[must_use]
    pub fn waker(&self) -> EventLoopWaker {
        EventLoopWaker {
            waker: Arc::clone(&self.waker),
        }
    }

    /// Wait once for readiness and dispatch every ready handler in arrival order.
    ///
    /// `None` waits indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotInitialized`] if the loop is closed, or
    /// [`ResourceError::EventLoop`] for any wait failure other than an interrupt.
    pub fn run_once(&self, timeout: Option<Duration>) -> SphereResult<RunOutcome> {
        let ready: Vec<(Token, Readiness)> = {
            let mut poll = self.poll.borrow_mut();
            let poll = poll
                .as_mut()
                .ok_or(ResourceError::NotInitialized("event loop"))?;
            let mut events = self.events.borrow_mut();
            match poll.poll(&mut events, timeout) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    return Ok(RunOutcome::Interrupted);
                }
                Err(e) => return Err(ResourceError::event_loop("wait", e).into()),
            }
            events
                .iter()
                .map(|event| {
                    let mut readiness = Readiness::empty();
                    if event.is_readable() {
                        readiness |= Readiness::INPUT;
                    }
                    if event.is_error() {
                        readiness |= Readiness::ERROR;
                    }
                    if event.is_read_closed() {
                        readiness |= Readiness::HANGUP;
                    }
                    (event.token(), readiness)
                })
                .collect()
        };

        let mut dispatched = 0;
        for (token, readiness) in ready {
            if token == WAKE_TOKEN {
                dispatched += self.dispatch_wake();
                continue;
            }
            // Look up at dispatch time: an earlier handler in this batch may
            // have unregistered this one.
            let handler = self.handlers.borrow().get(&token).and_then(Weak::upgrade);
            if let Some(handler) = handler {
                handler.on_ready(readiness);
                dispatched += 1;
            }
        }
        Ok(RunOutcome::Dispatched(dispatched))
    }

    fn dispatch_wake(&self) -> usize {
        let listeners: Vec<Rc<dyn IoHandler>> = self
            .wake_listeners
            .borrow()
            .iter()
            .filter_map(|(_, weak)| weak.upgrade())
            .collect();
        for listener in &listeners {
            listener.on_ready(Readiness::INPUT);
        }
        listeners.len()
    }

    /// Run until [`stop`](Self::stop) is called from a handler.
    ///
    /// Interrupted waits are retried.
    ///
    /// # Errors
    ///
    /// Propagates any error from [`run_once`](Self::run_once).
    pub fn run(&self) -> SphereResult<()> {
        self.stop_requested.set(false);
        while !self.stop_requested.get() {
            self.run_once(None)?;
        }
        Ok(())
    }

    /// Ask [`run`](Self::run) to return after the current dispatch pass.
    pub fn stop(&self) {
        self.stop_requested.set(true);
    }

    /// Check whether a stop was requested since the last [`run`](Self::run).
    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.get()
    }

    /// Close the loop, releasing the poller and forgetting every registration.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotInitialized`] if the loop is already closed.
    pub fn close(&self) -> SphereResult<()> {
        let poll = self
            .poll
            .borrow_mut()
            .take()
            .ok_or(ResourceError::NotInitialized("event loop"))?;
        let leaked = self.handlers.borrow().len();
        if leaked > 0 {
            debug!(leaked, "closing event loop with live registrations");
        }
        self.handlers.borrow_mut().clear();
        self.wake_listeners.borrow_mut().clear();
        self.stop_requested.set(true);
        drop(poll);

        debug!("event loop closed");
        Ok(())
    }

    /// Number of live descriptor registrations.
    #[must_use]
    pub fn registration_count(&self) -> usize {
        self.handlers.borrow().len()
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("closed", &self.is_closed())
            .field("registrations", &self.registration_count())
            .field("stop_requested", &self.stop_requested.get())
            .finish()
    }
}
