//! Prelude for sphere-watchdog.

pub use crate::alarm::{AlarmClock, ProcessAlarm};
pub use crate::controller::{DEFAULT_WATCHDOG_PERIOD_SECS, WatchdogController};
pub use crate::state::{WatchdogMetrics, WatchdogState, WatchdogStatus};
