//! Property-based tests for watchdog period handling.

#![cfg(test)]

use std::cell::RefCell;

use proptest::prelude::*;
use sphere_errors::SphereResult;
use sphere_watchdog::prelude::*;

#[derive(Default)]
struct LastSchedule {
    scheduled: RefCell<Vec<u32>>,
}

impl AlarmClock for LastSchedule {
    fn schedule(&self, secs: u32) -> SphereResult<()> {
        self.scheduled.borrow_mut().push(secs);
        Ok(())
    }

    fn cancel(&self) -> SphereResult<()> {
        Ok(())
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_positive_period_reschedules_at_new_period(
        initial in 1u32..=86_400,
        period in 1u32..=u32::MAX,
    ) {
        let watchdog = WatchdogController::new(LastSchedule::default(), initial)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert!(watchdog.init().is_ok());

        prop_assert!(watchdog.set_period(period).is_ok());
        prop_assert_eq!(watchdog.period_secs(), period);
        let scheduled = watchdog.clock().scheduled.borrow().clone();
        prop_assert_eq!(scheduled, vec![initial, period]);
    }

    #[test]
    fn prop_zero_period_never_changes_state(
        initial in 1u32..=86_400,
        attempts in 1usize..10,
    ) {
        let watchdog = WatchdogController::new(LastSchedule::default(), initial)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert!(watchdog.init().is_ok());

        for _ in 0..attempts {
            prop_assert!(watchdog.set_period(0).is_err());
        }
        prop_assert_eq!(watchdog.period_secs(), initial);
        prop_assert_eq!(watchdog.clock().scheduled.borrow().len(), 1);
        prop_assert_eq!(watchdog.metrics().period_changes, 0);
    }

    #[test]
    fn prop_pets_are_counted(pets in 0u64..50) {
        let watchdog = WatchdogController::new(LastSchedule::default(), 10)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert!(watchdog.init().is_ok());
        for _ in 0..pets {
            prop_assert!(watchdog.pet().is_ok());
        }
        prop_assert_eq!(watchdog.metrics().pet_count, pets + 1);
    }
}
