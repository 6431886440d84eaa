//! Connectivity state machine against a real event loop and a scripted cloud.

#![cfg(test)]

use std::rc::Rc;
use std::time::{Duration, Instant};

use sphere_cloud::prelude::*;
use sphere_errors::{FailureStage, SphereError};
use sphere_runtime::{EventLoop, EventLoopHandle};
use sphere_test_helpers::prelude::*;

const SCOPE: &str = "0ne000ABCDE";

fn pump_until(event_loop: &EventLoop, deadline: Duration, done: impl Fn() -> bool) -> TestResult {
    let start = Instant::now();
    while !done() {
        if start.elapsed() > deadline {
            return Err("condition not reached before deadline".into());
        }
        event_loop.run_once(Some(Duration::from_millis(50)))?;
    }
    Ok(())
}

fn pump_for(event_loop: &EventLoop, duration: Duration) -> TestResult {
    let start = Instant::now();
    while start.elapsed() < duration {
        event_loop.run_once(Some(Duration::from_millis(50)))?;
    }
    Ok(())
}

fn manager(
    el: &EventLoopHandle,
    cloud: &ScriptedCloud,
    config: ConnectivityConfig,
) -> Result<ConnectivityManager, SphereError> {
    let client: Rc<dyn CloudClient> = Rc::new(cloud.clone());
    ConnectivityManager::new(el, client, config)
}

mod retry_scenarios {
    use super::*;

    /// Scenario: consecutive failures schedule retries at 10, 100, then 120 seconds
    #[test]
    fn scenario_failures_follow_squaring_schedule() -> TestResult {
        let el = EventLoop::create()?;
        let cloud = ScriptedCloud::new();
        let connectivity = manager(&el, &cloud, ConnectivityConfig::new(SCOPE))?;

        let mut scheduled = Vec::new();
        for _ in 0..4 {
            scheduled.push(connectivity.retry_interval_secs());
            connectivity.try_connect()?;
            assert!(connectivity.is_retry_scheduled());
        }
        assert_eq!(scheduled, [10, 100, 120, 120]);

        let status = connectivity.status();
        assert_eq!(status.attempts, 4);
        assert_eq!(status.failures, 4);
        assert!(!status.connected);
        assert!(!status.has_connection);
        assert_eq!(cloud.attempts(), 4);
        Ok(())
    }

    /// Scenario: the retry timer makes the next attempt on its own
    #[test]
    fn scenario_retry_timer_reconnects() -> TestResult {
        let el = EventLoop::create()?;
        let cloud = ScriptedCloud::new();
        cloud
            .push(ConnectOutcome::Fail(ConnectFailure::NetworkNotReady))
            .push(ConnectOutcome::Connect);
        let connectivity = manager(
            &el,
            &cloud,
            ConnectivityConfig::new(SCOPE).with_retry_bounds(1, 120),
        )?;

        connectivity.try_connect()?;
        assert!(connectivity.is_retry_scheduled());

        pump_until(&el, Duration::from_secs(3), || cloud.connections() == 1)?;
        assert_eq!(cloud.attempts(), 2);
        assert!(!connectivity.is_retry_scheduled());
        assert!(connectivity.status().has_connection);
        Ok(())
    }

    /// Scenario: lowering the ceiling re-arms a pending retry at the new ceiling
    #[test]
    fn scenario_lower_ceiling_rearms_pending_retry() -> TestResult {
        let el = EventLoop::create()?;
        let cloud = ScriptedCloud::new();
        let connectivity = manager(
            &el,
            &cloud,
            ConnectivityConfig::new(SCOPE).with_retry_bounds(2, 100),
        )?;

        let started = Instant::now();
        connectivity.try_connect()?;
        assert_eq!(connectivity.retry_interval_secs(), 4);

        connectivity.set_max_retry_interval(1)?;
        assert_eq!(connectivity.retry_interval_secs(), 1);
        assert_eq!(connectivity.max_retry_interval_secs(), 1);

        pump_until(&el, Duration::from_secs(3), || cloud.attempts() == 2)?;
        assert!(started.elapsed() < Duration::from_millis(1800));
        Ok(())
    }

    /// Scenario: a ceiling above the pending delay clamps only the next delay
    #[test]
    fn scenario_ceiling_above_pending_delay_keeps_schedule() -> TestResult {
        let el = EventLoop::create()?;
        let cloud = ScriptedCloud::new();
        let connectivity = manager(
            &el,
            &cloud,
            ConnectivityConfig::new(SCOPE).with_retry_bounds(2, 100),
        )?;

        let started = Instant::now();
        connectivity.try_connect()?;
        assert_eq!(connectivity.retry_interval_secs(), 4);

        // The pending retry is 2 s; a 3 s ceiling must not push it out.
        connectivity.set_max_retry_interval(3)?;
        assert_eq!(connectivity.retry_interval_secs(), 3);
        assert!(connectivity.is_retry_scheduled());

        pump_until(&el, Duration::from_secs(4), || cloud.attempts() == 2)?;
        assert!(started.elapsed() < Duration::from_millis(2_800));
        Ok(())
    }

    /// Scenario: a successful attempt cancels a retry that was still pending
    #[test]
    fn scenario_success_cancels_pending_retry() -> TestResult {
        let el = EventLoop::create()?;
        let cloud = ScriptedCloud::new();
        cloud
            .push(ConnectOutcome::Fail(ConnectFailure::NetworkNotReady))
            .push(ConnectOutcome::Connect)
            .push(ConnectOutcome::Connect);
        let connectivity = manager(
            &el,
            &cloud,
            ConnectivityConfig::new(SCOPE).with_retry_bounds(1, 120),
        )?;

        connectivity.try_connect()?;
        assert!(connectivity.is_retry_scheduled());
        connectivity.try_connect()?;
        assert!(!connectivity.is_retry_scheduled());
        assert!(cloud.report_latest(ConnectionStatus::authenticated()));
        assert!(connectivity.is_connected());

        pump_for(&el, Duration::from_millis(1_500))?;
        assert_eq!(cloud.attempts(), 2);
        assert_eq!(cloud.connections(), 1);
        assert!(connectivity.is_connected());
        assert!(!cloud.events().contains(&CloudEvent::Close { id: 0 }));
        Ok(())
    }

    /// Scenario: raising the ceiling leaves a pending retry alone
    #[test]
    fn scenario_higher_ceiling_keeps_pending_retry() -> TestResult {
        let el = EventLoop::create()?;
        let cloud = ScriptedCloud::new();
        let connectivity = manager(&el, &cloud, ConnectivityConfig::new(SCOPE))?;

        connectivity.try_connect()?;
        connectivity.set_max_retry_interval(500)?;
        assert_eq!(connectivity.retry_interval_secs(), 100);
        assert_eq!(connectivity.max_retry_interval_secs(), 500);
        assert!(connectivity.is_retry_scheduled());
        Ok(())
    }

    /// Scenario: a failure is classified by stage and recorded
    #[test]
    fn scenario_failure_is_classified() -> TestResult {
        let el = EventLoop::create()?;
        let cloud = ScriptedCloud::new();
        cloud.push(ConnectOutcome::Fail(ConnectFailure::Provisioning(
            "PROV_DEVICE_RESULT_HUB_NOT_SPECIFIED".into(),
        )));
        let connectivity = manager(&el, &cloud, ConnectivityConfig::new(SCOPE))?;

        connectivity.try_connect()?;
        let failure = must_some(connectivity.status().last_failure, "failure recorded");
        assert_eq!(failure.stage, FailureStage::Provisioning);
        assert_eq!(failure.message, "PROV_DEVICE_RESULT_HUB_NOT_SPECIFIED");
        Ok(())
    }
}

mod connection_scenarios {
    use super::*;

    /// Scenario: a successful attempt applies keepalive, retry policy and status callback
    #[test]
    fn scenario_connect_applies_options() -> TestResult {
        let el = EventLoop::create()?;
        let cloud = ScriptedCloud::new();
        cloud.push(ConnectOutcome::Connect);
        let connectivity = manager(
            &el,
            &cloud,
            ConnectivityConfig::new(SCOPE).with_keepalive(30),
        )?;

        connectivity.try_connect()?;
        assert_eq!(
            cloud.events(),
            [
                CloudEvent::Connect {
                    scope_id: SCOPE.to_owned(),
                    timeout: Duration::from_millis(10_000),
                },
                CloudEvent::Keepalive { id: 0, period_secs: 30 },
                CloudEvent::RetryPolicy {
                    id: 0,
                    policy: RetryPolicy::exponential(120),
                },
                CloudEvent::StatusCallback { id: 0 },
            ]
        );
        assert!(!connectivity.is_retry_scheduled());
        assert!(!connectivity.is_connected());
        Ok(())
    }

    /// Scenario: without a keepalive setting the transport default is kept
    #[test]
    fn scenario_connect_without_keepalive() -> TestResult {
        let el = EventLoop::create()?;
        let cloud = ScriptedCloud::new();
        cloud.push(ConnectOutcome::Connect);
        let connectivity = manager(&el, &cloud, ConnectivityConfig::new(SCOPE))?;

        connectivity.try_connect()?;
        let keepalives = cloud
            .events()
            .into_iter()
            .filter(|e| matches!(e, CloudEvent::Keepalive { .. }))
            .count();
        assert_eq!(keepalives, 0);
        Ok(())
    }

    /// Scenario: status reports toggle the connected flag and never arm a retry
    #[test]
    fn scenario_status_toggles_connected_without_retry() -> TestResult {
        let el = EventLoop::create()?;
        let cloud = ScriptedCloud::new();
        cloud.push(ConnectOutcome::Connect);
        let connectivity = manager(&el, &cloud, ConnectivityConfig::new(SCOPE))?;
        connectivity.try_connect()?;

        assert!(cloud.report_latest(ConnectionStatus::authenticated()));
        assert!(connectivity.is_connected());

        assert!(cloud.report_latest(ConnectionStatus::disconnected(
            DisconnectReason::ExpiredToken
        )));
        assert!(!connectivity.is_connected());
        assert!(!connectivity.is_retry_scheduled());
        assert_eq!(
            connectivity.status().last_disconnect,
            Some(DisconnectReason::ExpiredToken)
        );
        assert_eq!(cloud.attempts(), 1);
        Ok(())
    }

    /// Scenario: a rejected option closes the new connection and reports the error
    #[test]
    fn scenario_rejected_option_closes_connection() -> TestResult {
        let el = EventLoop::create()?;
        let cloud = ScriptedCloud::new();
        cloud.push(ConnectOutcome::ConnectRejectingKeepalive);
        let connectivity = manager(
            &el,
            &cloud,
            ConnectivityConfig::new(SCOPE).with_keepalive(30),
        )?;

        let result = connectivity.try_connect();
        assert!(matches!(result, Err(SphereError::Protocol(_))));
        assert!(cloud.events().contains(&CloudEvent::Close { id: 0 }));
        assert!(!connectivity.status().has_connection);
        Ok(())
    }

    /// Scenario: a second successful attempt replaces and closes the first connection
    #[test]
    fn scenario_reconnect_replaces_connection() -> TestResult {
        let el = EventLoop::create()?;
        let cloud = ScriptedCloud::new();
        cloud.push(ConnectOutcome::Connect).push(ConnectOutcome::Connect);
        let connectivity = manager(&el, &cloud, ConnectivityConfig::new(SCOPE))?;

        connectivity.try_connect()?;
        connectivity.try_connect()?;
        assert_eq!(cloud.connections(), 2);
        assert!(cloud.events().contains(&CloudEvent::Close { id: 0 }));
        assert!(!cloud.events().contains(&CloudEvent::Close { id: 1 }));
        Ok(())
    }

    /// Scenario: a replacement connection is not connected until it authenticates
    #[test]
    fn scenario_replacement_starts_unauthenticated() -> TestResult {
        let el = EventLoop::create()?;
        let cloud = ScriptedCloud::new();
        cloud.push(ConnectOutcome::Connect).push(ConnectOutcome::Connect);
        let connectivity = manager(&el, &cloud, ConnectivityConfig::new(SCOPE))?;

        connectivity.try_connect()?;
        assert!(cloud.report(0, ConnectionStatus::authenticated()));
        assert!(connectivity.is_connected());

        connectivity.try_connect()?;
        assert!(!connectivity.is_connected());
        assert!(!cloud.report(0, ConnectionStatus::authenticated()));
        assert!(!connectivity.is_connected());
        assert!(cloud.report(1, ConnectionStatus::authenticated()));
        assert!(connectivity.is_connected());
        Ok(())
    }

    /// Scenario: runtime changes are pushed to a live connection
    #[test]
    fn scenario_runtime_changes_reach_live_connection() -> TestResult {
        let el = EventLoop::create()?;
        let cloud = ScriptedCloud::new();
        cloud.push(ConnectOutcome::Connect);
        let connectivity = manager(&el, &cloud, ConnectivityConfig::new(SCOPE))?;
        connectivity.try_connect()?;
        assert!(cloud.report_latest(ConnectionStatus::authenticated()));

        connectivity.set_max_retry_interval(300)?;
        connectivity.set_keepalive_period(45)?;

        let events = cloud.events();
        assert!(events.contains(&CloudEvent::RetryPolicy {
            id: 0,
            policy: RetryPolicy::exponential(300),
        }));
        assert!(events.contains(&CloudEvent::Keepalive { id: 0, period_secs: 45 }));
        assert_eq!(connectivity.max_retry_interval_secs(), 300);
        assert_eq!(connectivity.keepalive_secs(), Some(45));
        Ok(())
    }

    /// Scenario: zero values are rejected
    #[test]
    fn scenario_zero_values_rejected() -> TestResult {
        let el = EventLoop::create()?;
        let cloud = ScriptedCloud::new();
        let connectivity = manager(&el, &cloud, ConnectivityConfig::new(SCOPE))?;

        assert!(connectivity.set_max_retry_interval(0).is_err());
        assert!(connectivity.set_keepalive_period(0).is_err());
        assert_eq!(connectivity.max_retry_interval_secs(), 120);
        assert_eq!(connectivity.keepalive_secs(), None);
        Ok(())
    }

    /// Scenario: invalid settings are rejected before any attempt
    #[test]
    fn scenario_invalid_scope_rejected() -> TestResult {
        let el = EventLoop::create()?;
        let cloud = ScriptedCloud::new();
        assert!(manager(&el, &cloud, ConnectivityConfig::new("")).is_err());
        assert!(manager(&el, &cloud, ConnectivityConfig::new("not/valid")).is_err());
        assert_eq!(cloud.attempts(), 0);
        Ok(())
    }

    /// Scenario: teardown closes the connection and stops the retry timer
    #[test]
    fn scenario_teardown_closes_connection() -> TestResult {
        let el = EventLoop::create()?;
        let cloud = ScriptedCloud::new();
        cloud.push(ConnectOutcome::Connect);
        let connectivity = manager(&el, &cloud, ConnectivityConfig::new(SCOPE))?;
        connectivity.try_connect()?;
        assert!(cloud.report_latest(ConnectionStatus::authenticated()));

        connectivity.teardown()?;
        assert!(cloud.events().contains(&CloudEvent::Close { id: 0 }));
        assert!(!connectivity.is_connected());
        assert!(!connectivity.is_retry_scheduled());
        assert!(!cloud.report_latest(ConnectionStatus::authenticated()));
        assert!(connectivity.teardown().is_err());
        assert!(connectivity.try_connect().is_err());
        Ok(())
    }

    /// Scenario: teardown with a retry pending cancels it
    #[test]
    fn scenario_teardown_cancels_pending_retry() -> TestResult {
        let el = EventLoop::create()?;
        let cloud = ScriptedCloud::new();
        let connectivity = manager(
            &el,
            &cloud,
            ConnectivityConfig::new(SCOPE).with_retry_bounds(1, 1),
        )?;
        connectivity.try_connect()?;
        connectivity.teardown()?;

        el.run_once(Some(Duration::from_millis(1300)))?;
        assert_eq!(cloud.attempts(), 1);
        Ok(())
    }
}
