//! # sphere-runtime
//!
//! Single-threaded runtime primitives for the Sphere application core.
//!
//! This crate provides:
//! - [`CallbackSlot`]: a single-slot, non-owning callback bound to a method,
//!   free function or closure
//! - [`EventLoop`]: a cooperative dispatcher over `epoll` that invokes
//!   readiness handlers strictly in arrival order
//! - [`TimerService`]: one-shot and periodic `timerfd` timers registered with
//!   an injected event loop
//! - [`SignalBridge`]: self-pipe delivery of `SIGTERM`/`SIGALRM` to the loop
//!   thread, with exact restoration of prior dispositions
//! - [`Platform`]: reboot, suspend, time sync and update notifications, with
//!   [`HostPlatform`] for Linux hosts
//!
//! ## Threading
//!
//! Everything except [`EventLoopWaker`] and [`UpdateInjector`] is `!Send`:
//! components share the loop through an [`EventLoopHandle`] (`Rc<EventLoop>`)
//! and are only ever touched from the loop thread. Asynchronous sources
//! (signals, other threads) reach the loop by writing to a descriptor it polls.
//!
//! ## Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use std::time::Duration;
//! use sphere_runtime::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let event_loop = EventLoop::create()?;
//! let timer = TimerService::new(&event_loop);
//! timer.init()?;
//!
//! let fired = Rc::new(Cell::new(false));
//! let flag = Rc::clone(&fired);
//! let weak_loop = Rc::downgrade(&event_loop);
//! let on_fire = Rc::new(move |()| {
//!     flag.set(true);
//!     if let Some(el) = weak_loop.upgrade() {
//!         el.stop();
//!     }
//! });
//! timer.bind_closure(&on_fire);
//! timer.start_one_shot(Duration::from_millis(1))?;
//!
//! event_loop.run()?;
//! assert!(fired.get());
//! assert_eq!(timer.state(), TimerState::Unarmed);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod callback;
pub mod event_loop;
pub mod host;
pub mod platform;
pub mod prelude;
pub mod signals;
pub mod timer;

pub use callback::{CallbackKind, CallbackSlot};
pub use event_loop::{
    EventLoop, EventLoopHandle, EventLoopWaker, EventRegistration, IoHandler, Readiness,
    RunOutcome, WakeRegistration,
};
pub use host::{HostPlatform, PlatformEventQueue, UpdateInjector};
pub use platform::{Platform, UpdateEvent, UpdateKind, UpdateSubscription};
pub use signals::{ProcessSignal, SignalBridge};
pub use timer::{TimerService, TimerState};
