//! Property tests for the squaring retry backoff.

#![cfg(test)]

use proptest::prelude::*;
use sphere_cloud::RetryBackoff;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn bounds() -> impl Strategy<Value = (u32, u32)> {
    (1u32..=100_000).prop_flat_map(|max| (1u32..=max, Just(max)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_delay_never_exceeds_ceiling((initial, max) in bounds(), steps in 1usize..40) {
        let backoff = RetryBackoff::new(initial, max).map_err(|e| TestCaseError::fail(e.to_string()))?;
        for delay in backoff.delays().take(steps) {
            prop_assert!(delay >= 1);
            prop_assert!(delay <= max);
        }
    }

    #[test]
    fn prop_each_delay_is_square_of_previous_capped((initial, max) in bounds()) {
        let delays: Vec<u32> = RetryBackoff::new(initial, max)
            .map_err(|e| TestCaseError::fail(e.to_string()))?
            .delays()
            .take(8)
            .collect();
        for pair in delays.windows(2) {
            if let [previous, next] = pair {
                let expected = (u64::from(*previous) * u64::from(*previous)).min(u64::from(max));
                prop_assert_eq!(u64::from(*next), expected);
            }
        }
    }

    #[test]
    fn prop_set_max_clamps_current((initial, max) in bounds(), new_max in 1u32..=100_000) {
        let mut backoff = RetryBackoff::new(initial, max).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let clamped = backoff.set_max(new_max).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(clamped, initial > new_max);
        prop_assert_eq!(backoff.current(), initial.min(new_max));
        prop_assert_eq!(backoff.max(), new_max);
    }
}

mod backoff_scenarios {
    use super::*;

    /// Scenario: a delay of one second never grows
    #[test]
    fn scenario_unit_delay_stays_unit() -> TestResult {
        let delays: Vec<u32> = RetryBackoff::new(1, 120)?.delays().take(4).collect();
        assert_eq!(delays, [1, 1, 1, 1]);
        Ok(())
    }

    /// Scenario: lowering the ceiling below the next delay clamps it
    #[test]
    fn scenario_lower_ceiling_clamps_schedule() -> TestResult {
        let mut backoff = RetryBackoff::default();
        assert_eq!(backoff.advance(), 10);
        assert!(backoff.set_max(50)?);
        let rest: Vec<u32> = backoff.delays().take(3).collect();
        assert_eq!(rest, [50, 50, 50]);
        Ok(())
    }

    /// Scenario: the schedule serializes for diagnostics
    #[test]
    fn scenario_backoff_serializes() -> TestResult {
        let backoff = RetryBackoff::new(10, 120)?;
        let json = serde_json::to_string(&backoff)?;
        assert_eq!(json, r#"{"current":10,"max":120}"#);
        let back: RetryBackoff = serde_json::from_str(&json)?;
        assert_eq!(back, backoff);
        Ok(())
    }
}
