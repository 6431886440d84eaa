//! Recording alarm clock.

use std::cell::RefCell;
use std::rc::Rc;

use sphere_errors::SphereResult;
use sphere_watchdog::AlarmClock;

use crate::journal::Journal;

/// A call made on a [`FakeAlarm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmCall {
    /// `schedule(secs)`.
    Schedule(u32),
    /// `cancel()`.
    Cancel,
}

/// Alarm clock that records calls instead of arming `alarm(2)`.
///
/// Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct FakeAlarm {
    calls: Rc<RefCell<Vec<AlarmCall>>>,
    journal: Option<Journal>,
}

impl FakeAlarm {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also record calls as `alarm.schedule` and `alarm.cancel` in `journal`.
    pub fn with_journal(mut self, journal: &Journal) -> Self {
        self.journal = Some(journal.clone());
        self
    }

    fn record(&self, call: AlarmCall) {
        self.calls.borrow_mut().push(call);
        if let Some(journal) = &self.journal {
            journal.record(match call {
                AlarmCall::Schedule(_) => "alarm.schedule",
                AlarmCall::Cancel => "alarm.cancel",
            });
        }
    }

    /// Every call so far.
    pub fn calls(&self) -> Vec<AlarmCall> {
        self.calls.borrow().clone()
    }

    /// Seconds of the currently pending alarm, if any.
    pub fn pending(&self) -> Option<u32> {
        match self.calls.borrow().last() {
            Some(AlarmCall::Schedule(secs)) => Some(*secs),
            _ => None,
        }
    }
}

impl AlarmClock for FakeAlarm {
    fn schedule(&self, secs: u32) -> SphereResult<()> {
        self.record(AlarmCall::Schedule(secs));
        Ok(())
    }

    fn cancel(&self) -> SphereResult<()> {
        self.record(AlarmCall::Cancel);
        Ok(())
    }
}
