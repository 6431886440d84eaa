//! Watchdog state machine and metrics.
//!
//! ```text
//! Disarmed ──arm()──► Armed ──timeout()──► TimedOut
//!     ▲                │ ▲                    │
//!     │             pet() │                   │
//!     │                └──┘◄──────pet()───────┘
//!     └─────────────────disarm()──────────────┘
//! ```

use std::cell::Cell;
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Watchdog operational status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WatchdogStatus {
    /// Not monitoring.
    #[default]
    Disarmed,
    /// Counting down; must be petted before the period elapses.
    Armed,
    /// The countdown elapsed without a pet. A reboot has been requested.
    TimedOut,
}

impl WatchdogStatus {
    /// Get the status as a string slice.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disarmed => "Disarmed",
            Self::Armed => "Armed",
            Self::TimedOut => "TimedOut",
        }
    }

    /// Check whether the watchdog is monitoring (armed or timed out).
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Armed | Self::TimedOut)
    }
}

impl fmt::Display for WatchdogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counters and timing for monitoring and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatchdogMetrics {
    /// Total number of pets.
    pub pet_count: u64,
    /// Total number of arm operations.
    pub arm_count: u64,
    /// Total number of timeouts.
    pub timeout_count: u64,
    /// Number of accepted period changes.
    pub period_changes: u64,
    /// Longest observed gap between two pets.
    pub max_pet_interval: Duration,
    /// When the watchdog was last petted.
    pub last_pet: Option<Instant>,
}

impl WatchdogMetrics {
    /// Record a pet at `now`.
    pub fn record_pet(&mut self, now: Instant) {
        if let Some(last) = self.last_pet {
            let interval = now.saturating_duration_since(last);
            if interval > self.max_pet_interval {
                self.max_pet_interval = interval;
            }
        }
        self.last_pet = Some(now);
        self.pet_count = self.pet_count.saturating_add(1);
    }

    /// Record an arm operation.
    pub fn record_arm(&mut self) {
        self.arm_count = self.arm_count.saturating_add(1);
    }

    /// Record a timeout.
    pub fn record_timeout(&mut self) {
        self.timeout_count = self.timeout_count.saturating_add(1);
    }

    /// Record an accepted period change.
    pub fn record_period_change(&mut self) {
        self.period_changes = self.period_changes.saturating_add(1);
    }
}

/// Single-threaded watchdog state.
#[derive(Debug, Default)]
pub struct WatchdogState {
    status: Cell<WatchdogStatus>,
    metrics: Cell<WatchdogMetrics>,
}

impl WatchdogState {
    /// Create a disarmed state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> WatchdogStatus {
        self.status.get()
    }

    /// Snapshot of the metrics.
    #[must_use]
    pub fn metrics(&self) -> WatchdogMetrics {
        self.metrics.get()
    }

    /// Transition Disarmed → Armed. Returns `false` from any other state.
    pub fn arm(&self) -> bool {
        if self.status.get() != WatchdogStatus::Disarmed {
            return false;
        }
        self.status.set(WatchdogStatus::Armed);
        self.update(WatchdogMetrics::record_arm);
        true
    }

    /// Record a pet. Re-arms a timed-out watchdog. Returns `false` when disarmed.
    pub fn pet(&self, now: Instant) -> bool {
        if self.status.get() == WatchdogStatus::Disarmed {
            return false;
        }
        self.status.set(WatchdogStatus::Armed);
        self.update(|m| m.record_pet(now));
        true
    }

    /// Transition Armed → TimedOut. Returns `false` from any other state.
    pub fn timeout(&self) -> bool {
        if self.status.get() != WatchdogStatus::Armed {
            return false;
        }
        self.status.set(WatchdogStatus::TimedOut);
        self.update(WatchdogMetrics::record_timeout);
        true
    }

    /// Record an accepted period change.
    pub fn period_changed(&self) {
        self.update(WatchdogMetrics::record_period_change);
    }

    /// Return to Disarmed, keeping the metrics.
    pub fn disarm(&self) {
        self.status.set(WatchdogStatus::Disarmed);
    }

    fn update(&self, f: impl FnOnce(&mut WatchdogMetrics)) {
        let mut metrics = self.metrics.get();
        f(&mut metrics);
        self.metrics.set(metrics);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let state = WatchdogState::new();
        let now = Instant::now();
        assert!(!state.pet(now));
        assert!(!state.timeout());

        assert!(state.arm());
        assert!(!state.arm());
        assert!(state.pet(now));
        assert!(state.timeout());
        assert_eq!(state.status(), WatchdogStatus::TimedOut);
        assert!(!state.timeout());

        assert!(state.pet(now));
        assert_eq!(state.status(), WatchdogStatus::Armed);

        state.disarm();
        assert_eq!(state.status(), WatchdogStatus::Disarmed);
        assert_eq!(state.metrics().timeout_count, 1);
        assert_eq!(state.metrics().pet_count, 2);
    }

    #[test]
    fn test_max_pet_interval() {
        let mut metrics = WatchdogMetrics::default();
        let start = Instant::now();
        metrics.record_pet(start);
        metrics.record_pet(start + Duration::from_secs(5));
        metrics.record_pet(start + Duration::from_secs(7));
        assert_eq!(metrics.max_pet_interval, Duration::from_secs(5));
        assert_eq!(metrics.pet_count, 3);
    }
}
