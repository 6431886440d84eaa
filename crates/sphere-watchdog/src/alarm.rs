//! Alarm sources that back the watchdog countdown.

use std::rc::Rc;

use sphere_errors::SphereResult;

/// A single pending countdown that raises `SIGALRM` on expiry.
///
/// Scheduling replaces any pending countdown.
pub trait AlarmClock {
    /// Schedule the alarm `secs` seconds from now, replacing any pending alarm.
    ///
    /// # Errors
    ///
    /// Returns a resource error if the alarm cannot be scheduled.
    fn schedule(&self, secs: u32) -> SphereResult<()>;

    /// Cancel the pending alarm, if any.
    ///
    /// # Errors
    ///
    /// Returns a resource error if the alarm cannot be cancelled.
    fn cancel(&self) -> SphereResult<()>;
}

impl<T: AlarmClock + ?Sized> AlarmClock for Rc<T> {
    fn schedule(&self, secs: u32) -> SphereResult<()> {
        (**self).schedule(secs)
    }

    fn cancel(&self) -> SphereResult<()> {
        (**self).cancel()
    }
}

/// The process alarm timer, `alarm(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessAlarm;

impl ProcessAlarm {
    /// Create a handle to the process alarm.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Replace the pending alarm, returning the seconds that were left on it.
    fn set(secs: u32) -> u32 {
        // SAFETY: alarm(2) takes no pointers and cannot fail.
        unsafe { libc::alarm(secs) }
    }
}

impl AlarmClock for ProcessAlarm {
    fn schedule(&self, secs: u32) -> SphereResult<()> {
        let previous = Self::set(secs);
        tracing::trace!(secs, previous, "process alarm scheduled");
        Ok(())
    }

    fn cancel(&self) -> SphereResult<()> {
        let previous = Self::set(0);
        tracing::trace!(previous, "process alarm cancelled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_alarm_replaces_pending() -> SphereResult<()> {
        let alarm = ProcessAlarm::new();
        alarm.schedule(3600)?;
        // Replacing reports the time left on the previous alarm.
        let left = ProcessAlarm::set(7200);
        assert!(left > 3500 && left <= 3600);
        alarm.cancel()?;
        assert_eq!(ProcessAlarm::set(0), 0);
        Ok(())
    }
}
