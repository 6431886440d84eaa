//! Watchdog controller.

use std::cell::Cell;
use std::fmt;
use std::time::Instant;

use sphere_errors::{ResourceError, SphereResult};
use sphere_runtime::Platform;
use tracing::{debug, error, info};

use crate::alarm::{AlarmClock, ProcessAlarm};
use crate::state::{WatchdogMetrics, WatchdogState, WatchdogStatus};

/// Default watchdog period in seconds.
pub const DEFAULT_WATCHDOG_PERIOD_SECS: u32 = 60;

fn validate_period(period_secs: u32) -> SphereResult<()> {
    if period_secs == 0 {
        return Err(ResourceError::invalid_argument("watchdog period", "must be greater than 0").into());
    }
    Ok(())
}

/// Alarm-based watchdog.
///
/// Once initialized, the alarm is rescheduled `period` seconds ahead on every
/// [`pet`](Self::pet). If the alarm fires first, the owner routes it to
/// [`handle_timeout`](Self::handle_timeout) on the loop thread, which requests
/// a reboot.
///
/// # Example
///
/// ```no_run
/// use sphere_watchdog::{ProcessAlarm, WatchdogController};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let watchdog = WatchdogController::new(ProcessAlarm::new(), 30)?;
/// watchdog.init()?;
/// watchdog.pet()?;
/// watchdog.teardown()?;
/// # Ok(())
/// # }
/// ```
pub struct WatchdogController<C: AlarmClock = ProcessAlarm> {
    clock: C,
    period_secs: Cell<u32>,
    state: WatchdogState,
}

impl<C: AlarmClock> WatchdogController<C> {
    /// Create a disarmed controller.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidArgument`] for a zero period.
    pub fn new(clock: C, period_secs: u32) -> SphereResult<Self> {
        validate_period(period_secs)?;
        Ok(Self {
            clock,
            period_secs: Cell::new(period_secs),
            state: WatchdogState::new(),
        })
    }

    /// Arm the watchdog and pet it immediately.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::AlreadyInitialized`] if already armed, or the
    /// alarm error if the first pet fails (the watchdog is left disarmed).
    pub fn init(&self) -> SphereResult<()> {
        if !self.state.arm() {
            return Err(ResourceError::AlreadyInitialized("watchdog").into());
        }
        if let Err(e) = self.pet() {
            self.state.disarm();
            return Err(e);
        }
        info!(period_secs = self.period_secs.get(), "watchdog armed");
        Ok(())
    }

    /// Reschedule the alarm one period from now, replacing the pending one.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotInitialized`] when disarmed, or the alarm error.
    pub fn pet(&self) -> SphereResult<()> {
        self.ensure_active()?;
        let period = self.period_secs.get();
        self.clock.schedule(period)?;
        let recovered = self.state.status() == WatchdogStatus::TimedOut;
        self.state.pet(Instant::now());
        if recovered {
            info!("watchdog re-armed after timeout");
        }
        Ok(())
    }

    /// Change the period and pet immediately.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidArgument`] for zero, leaving the period
    /// unchanged, or [`ResourceError::NotInitialized`] when disarmed.
    pub fn set_period(&self, period_secs: u32) -> SphereResult<()> {
        validate_period(period_secs)?;
        self.ensure_active()?;
        let previous = self.period_secs.replace(period_secs);
        self.state.period_changed();
        debug!(previous, period_secs, "watchdog period changed");
        self.pet()
    }

    /// Record a watchdog timeout and request a reboot.
    ///
    /// Alarms that arrive while disarmed are ignored.
    ///
    /// # Errors
    ///
    /// Returns the platform error if the reboot request fails.
    pub fn handle_timeout(&self, platform: &dyn Platform) -> SphereResult<()> {
        if !self.state.timeout() {
            debug!(status = %self.state.status(), "ignoring alarm outside armed state");
            return Ok(());
        }
        error!(
            period_secs = self.period_secs.get(),
            "watchdog timed out; requesting reboot"
        );
        platform.request_reboot()
    }

    /// Cancel the pending alarm and disarm.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotInitialized`] when already disarmed, or the
    /// alarm error (the watchdog is disarmed regardless).
    pub fn teardown(&self) -> SphereResult<()> {
        self.ensure_active()?;
        self.state.disarm();
        self.clock.cancel()?;
        debug!("watchdog disarmed");
        Ok(())
    }

    /// Current period in seconds.
    #[must_use]
    pub fn period_secs(&self) -> u32 {
        self.period_secs.get()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> WatchdogStatus {
        self.state.status()
    }

    /// Check whether the watchdog is monitoring.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.state.status().is_active()
    }

    /// Metrics snapshot.
    #[must_use]
    pub fn metrics(&self) -> WatchdogMetrics {
        self.state.metrics()
    }

    /// The alarm source.
    #[must_use]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn ensure_active(&self) -> SphereResult<()> {
        if self.state.status().is_active() {
            Ok(())
        } else {
            Err(ResourceError::NotInitialized("watchdog").into())
        }
    }
}

impl<C: AlarmClock> fmt::Debug for WatchdogController<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchdogController")
            .field("period_secs", &self.period_secs.get())
            .field("status", &self.state.status())
            .finish_non_exhaustive()
    }
}
