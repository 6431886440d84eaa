//! # sphere-watchdog
//!
//! Alarm-based application watchdog.
//!
//! The watchdog keeps a single process alarm scheduled one period ahead. Every
//! [`pet`](WatchdogController::pet) pushes it back; if the application stops
//! petting, `SIGALRM` is raised, the signal bridge hands it to the loop thread,
//! and [`WatchdogController::handle_timeout`] requests a reboot.
//!
//! - [`AlarmClock`]: the countdown seam, implemented by [`ProcessAlarm`] (`alarm(2)`)
//! - [`WatchdogController`]: init / pet / set-period / teardown
//! - [`WatchdogState`]: status and metrics
//!
//! ## Example
//!
//! ```
//! use std::cell::Cell;
//! use sphere_watchdog::prelude::*;
//! use sphere_errors::SphereResult;
//!
//! #[derive(Default)]
//! struct Countdown(Cell<Option<u32>>);
//!
//! impl AlarmClock for Countdown {
//!     fn schedule(&self, secs: u32) -> SphereResult<()> {
//!         self.0.set(Some(secs));
//!         Ok(())
//!     }
//!     fn cancel(&self) -> SphereResult<()> {
//!         self.0.set(None);
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> SphereResult<()> {
//! let watchdog = WatchdogController::new(Countdown::default(), 60)?;
//! watchdog.init()?;
//! watchdog.set_period(15)?;
//! assert_eq!(watchdog.clock().0.get(), Some(15));
//! assert_eq!(watchdog.status(), WatchdogStatus::Armed);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod alarm;
pub mod controller;
pub mod prelude;
pub mod state;

pub use alarm::{AlarmClock, ProcessAlarm};
pub use controller::{DEFAULT_WATCHDOG_PERIOD_SECS, WatchdogController};
pub use state::{WatchdogMetrics, WatchdogState, WatchdogStatus};
