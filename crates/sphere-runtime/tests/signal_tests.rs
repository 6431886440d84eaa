//! Signal bridge tests using real process signals.
//!
//! Dispositions are process-global, so every test holds `SIGNAL_LOCK`.

#![cfg(test)]

use std::cell::RefCell;
use std::ptr;
use std::rc::Rc;
use std::time::Duration;

use parking_lot::{Mutex, const_mutex};
use sphere_errors::{ResourceError, SphereError};
use sphere_runtime::prelude::*;

type TestResult = Result<(), Box<dyn std::error::Error>>;

static SIGNAL_LOCK: Mutex<()> = const_mutex(());

fn raise(signal: ProcessSignal) -> TestResult {
    // SAFETY: raise(3) is called only while the bridge handler is installed
    // for `signal`, so the default (terminating) disposition is never hit.
    let rc = unsafe { libc::raise(signal.signo()) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

fn current_handler(signal: ProcessSignal) -> Result<libc::sighandler_t, std::io::Error> {
    // SAFETY: all-zero is a valid sigaction.
    let mut current: libc::sigaction = unsafe { std::mem::zeroed() };
    // SAFETY: a null new action only queries the current disposition.
    let rc = unsafe { libc::sigaction(signal.signo(), ptr::null(), &mut current) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(current.sa_sigaction)
}

fn recording_handler(
    bridge: &SignalBridge,
) -> (Rc<RefCell<Vec<ProcessSignal>>>, Rc<impl Fn(ProcessSignal)>) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let on_signal = Rc::new(move |signal: ProcessSignal| sink.borrow_mut().push(signal));
    let mut slot = CallbackSlot::new();
    slot.bind_closure(&on_signal);
    bridge.set_handler(slot);
    (seen, on_signal)
}

mod signal_bridge_scenarios {
    use super::*;

    /// Scenario: only one bridge may own the process at a time
    #[test]
    fn scenario_second_bridge_is_rejected() -> TestResult {
        let _guard = SIGNAL_LOCK.lock();
        let el = EventLoop::create()?;

        let first = SignalBridge::new(&el)?;
        assert!(SignalBridge::is_claimed());
        let second = SignalBridge::new(&el);
        assert!(matches!(
            second,
            Err(SphereError::Resource(ResourceError::AlreadyInstalled))
        ));

        first.teardown()?;
        assert!(!SignalBridge::is_claimed());
        let third = SignalBridge::new(&el)?;
        drop(third);
        assert!(!SignalBridge::is_claimed());
        Ok(())
    }

    /// Scenario: a terminate signal is delivered on the loop thread
    #[test]
    fn scenario_terminate_dispatched_in_loop_context() -> TestResult {
        let _guard = SIGNAL_LOCK.lock();
        let el = EventLoop::create()?;
        let bridge = SignalBridge::new(&el)?;
        let (seen, _handler) = recording_handler(&bridge);
        bridge.install(ProcessSignal::Terminate)?;

        raise(ProcessSignal::Terminate)?;
        // The handler only queued the signal; nothing has been dispatched yet.
        assert!(seen.borrow().is_empty());

        el.run_once(Some(Duration::from_secs(1)))?;
        assert_eq!(*seen.borrow(), vec![ProcessSignal::Terminate]);

        bridge.teardown()?;
        Ok(())
    }

    /// Scenario: teardown restores the exact prior dispositions
    #[test]
    fn scenario_teardown_restores_prior_dispositions() -> TestResult {
        let _guard = SIGNAL_LOCK.lock();
        let before_term = current_handler(ProcessSignal::Terminate)?;
        let before_alarm = current_handler(ProcessSignal::Alarm)?;

        let el = EventLoop::create()?;
        let bridge = SignalBridge::new(&el)?;
        bridge.install(ProcessSignal::Terminate)?;
        bridge.install(ProcessSignal::Alarm)?;
        bridge.install(ProcessSignal::Alarm)?;
        assert_ne!(current_handler(ProcessSignal::Terminate)?, before_term);
        assert!(bridge.is_installed(ProcessSignal::Alarm));

        bridge.restore(ProcessSignal::Alarm)?;
        assert_eq!(current_handler(ProcessSignal::Alarm)?, before_alarm);
        assert!(!bridge.is_installed(ProcessSignal::Alarm));

        bridge.teardown()?;
        assert_eq!(current_handler(ProcessSignal::Terminate)?, before_term);
        assert!(bridge.teardown().is_err());
        Ok(())
    }

    /// Scenario: several pending signals dispatch in signal-number order
    #[test]
    fn scenario_pending_signals_dispatch_in_order() -> TestResult {
        let _guard = SIGNAL_LOCK.lock();
        let el = EventLoop::create()?;
        let bridge = SignalBridge::new(&el)?;
        let (seen, _handler) = recording_handler(&bridge);
        bridge.install(ProcessSignal::Terminate)?;
        bridge.install(ProcessSignal::Alarm)?;

        raise(ProcessSignal::Terminate)?;
        raise(ProcessSignal::Alarm)?;
        el.run_once(Some(Duration::from_secs(1)))?;

        assert_eq!(
            *seen.borrow(),
            vec![ProcessSignal::Alarm, ProcessSignal::Terminate]
        );
        bridge.teardown()?;
        Ok(())
    }

    /// Scenario: a handler that tears the bridge down stops further dispatch
    #[test]
    fn scenario_teardown_from_handler_stops_dispatch() -> TestResult {
        let _guard = SIGNAL_LOCK.lock();
        let el = EventLoop::create()?;
        let bridge = Rc::new(SignalBridge::new(&el)?);
        bridge.install(ProcessSignal::Terminate)?;
        bridge.install(ProcessSignal::Alarm)?;

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let weak_bridge = Rc::downgrade(&bridge);
        let on_signal = Rc::new(move |signal: ProcessSignal| {
            sink.borrow_mut().push(signal);
            if let Some(bridge) = weak_bridge.upgrade() {
                if bridge.teardown().is_err() {
                    panic!("teardown from handler failed");
                }
            }
        });
        let mut slot = CallbackSlot::new();
        slot.bind_closure(&on_signal);
        bridge.set_handler(slot);

        raise(ProcessSignal::Terminate)?;
        raise(ProcessSignal::Alarm)?;
        el.run_once(Some(Duration::from_secs(1)))?;

        assert_eq!(*seen.borrow(), vec![ProcessSignal::Alarm]);
        assert!(!bridge.is_active());
        assert!(!SignalBridge::is_claimed());
        Ok(())
    }

    /// Scenario: installing after teardown is rejected
    #[test]
    fn scenario_install_after_teardown_fails() -> TestResult {
        let _guard = SIGNAL_LOCK.lock();
        let el = EventLoop::create()?;
        let bridge = SignalBridge::new(&el)?;
        bridge.teardown()?;
        assert!(bridge.install(ProcessSignal::Terminate).is_err());
        Ok(())
    }
}
