//! Squaring retry backoff.
//!
//! After each failed attempt the next delay is the square of the current one,
//! capped at the ceiling: `next = min(current², max)`. Starting from 10 s with
//! a 120 s ceiling the schedule is 10, 100, 120, 120, ...

use serde::{Deserialize, Serialize};
use sphere_errors::{ResourceError, SphereResult};

/// Default first retry delay in seconds.
pub const DEFAULT_INITIAL_RETRY_SECS: u32 = 10;
/// Default retry ceiling in seconds.
pub const DEFAULT_MAX_RETRY_SECS: u32 = 120;

/// Current retry delay and its ceiling. Always `current <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBackoff {
    current: u32,
    max: u32,
}

impl RetryBackoff {
    /// Create a schedule starting at `initial_secs`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidArgument`] if either value is zero or
    /// `initial_secs > max_secs`.
    pub fn new(initial_secs: u32, max_secs: u32) -> SphereResult<Self> {
        if max_secs == 0 {
            return Err(
                ResourceError::invalid_argument("max retry interval", "must be greater than 0")
                    .into(),
            );
        }
        if initial_secs == 0 {
            return Err(ResourceError::invalid_argument(
                "initial retry interval",
                "must be greater than 0",
            )
            .into());
        }
        if initial_secs > max_secs {
            return Err(ResourceError::invalid_argument(
                "initial retry interval",
                format!("{initial_secs} exceeds the ceiling of {max_secs}"),
            )
            .into());
        }
        Ok(Self {
            current: initial_secs,
            max: max_secs,
        })
    }

    /// Delay to use for the next retry.
    #[must_use]
    pub fn current(&self) -> u32 {
        self.current
    }

    /// Ceiling.
    #[must_use]
    pub fn max(&self) -> u32 {
        self.max
    }

    /// Return the delay for this retry and grow the next one.
    pub fn advance(&mut self) -> u32 {
        let delay = self.current;
        let squared = u64::from(delay).saturating_mul(u64::from(delay));
        self.current = u32::try_from(squared.min(u64::from(self.max))).unwrap_or(self.max);
        delay
    }

    /// The delays this schedule would produce, starting from a copy of it.
    pub fn delays(self) -> impl Iterator<Item = u32> {
        let mut schedule = self;
        std::iter::from_fn(move || Some(schedule.advance()))
    }

    /// Replace the ceiling, clamping the current delay to it.
    ///
    /// Returns `true` if the current delay was lowered.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::InvalidArgument`] for zero.
    pub fn set_max(&mut self, max_secs: u32) -> SphereResult<bool> {
        if max_secs == 0 {
            return Err(
                ResourceError::invalid_argument("max retry interval", "must be greater than 0")
                    .into(),
            );
        }
        self.max = max_secs;
        if self.current > max_secs {
            self.current = max_secs;
            return Ok(true);
        }
        Ok(false)
    }
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            current: DEFAULT_INITIAL_RETRY_SECS,
            max: DEFAULT_MAX_RETRY_SECS,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let delays: Vec<u32> = RetryBackoff::default().delays().take(5).collect();
        assert_eq!(delays, vec![10, 100, 120, 120, 120]);
    }

    #[test]
    fn test_ceiling_unchanged_by_advancing() -> SphereResult<()> {
        let mut backoff = RetryBackoff::new(10, 120)?;
        backoff.advance();
        backoff.advance();
        assert_eq!(backoff.max(), 120);
        assert_eq!(backoff.current(), 120);
        Ok(())
    }

    #[test]
    fn test_rejects_invalid_bounds() {
        assert!(RetryBackoff::new(0, 10).is_err());
        assert!(RetryBackoff::new(10, 0).is_err());
        assert!(RetryBackoff::new(11, 10).is_err());
        assert!(RetryBackoff::new(10, 10).is_ok());
    }

    #[test]
    fn test_large_values_saturate_at_ceiling() -> SphereResult<()> {
        let mut backoff = RetryBackoff::new(u32::MAX, u32::MAX)?;
        assert_eq!(backoff.advance(), u32::MAX);
        assert_eq!(backoff.current(), u32::MAX);
        Ok(())
    }

    #[test]
    fn test_set_max_clamps() -> SphereResult<()> {
        let mut backoff = RetryBackoff::default();
        backoff.advance();
        assert_eq!(backoff.current(), 100);
        assert!(backoff.set_max(50)?);
        assert_eq!(backoff.current(), 50);
        assert!(!backoff.set_max(500)?);
        assert_eq!(backoff.current(), 50);
        assert!(backoff.set_max(0).is_err());
        assert_eq!(backoff.max(), 500);
        Ok(())
    }
}
