//! Application lifecycle.
//!
//! ```text
//! new ──► init ──► run ─────────────┐
//!          ▲        │ SIGTERM       │
//!          │        ▼               │
//!          └──── destroy ◄──────────┘
//! ```
//!
//! `init` acquires, in order: the event loop, the signal bridge and the
//! termination handler, then (per feature) the update subscription, time
//! sync, the watchdog and its alarm handler, and the first connection
//! attempt. `destroy` releases them in the reverse order.

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use sphere_cloud::{CloudClient, ConnectivityManager, ConnectivityStatus};
use sphere_errors::{InvariantViolation, ResourceError, SphereResult, fatal};
use sphere_runtime::{
    EventLoop, EventLoopHandle, Platform, ProcessSignal, RunOutcome, SignalBridge,
};
use sphere_watchdog::{
    AlarmClock, ProcessAlarm, WatchdogController, WatchdogMetrics, WatchdogStatus,
};
use tracing::{debug, error, info, trace, warn};

use crate::config::AppConfig;
use crate::features::Features;
use crate::updates::{DefaultHooks, LifecycleHooks, UpdateNotifier};

type SharedWatchdog = WatchdogController<Rc<dyn AlarmClock>>;

/// Everything acquired by one `init`.
struct Session {
    features: Features,
    event_loop: EventLoopHandle,
    signals: Option<SignalBridge>,
    updates: Option<UpdateNotifier>,
    watchdog: Option<SharedWatchdog>,
    connectivity: Option<ConnectivityManager>,
}

impl Session {
    fn new(features: Features, event_loop: EventLoopHandle) -> Self {
        Self {
            features,
            event_loop,
            signals: None,
            updates: None,
            watchdog: None,
            connectivity: None,
        }
    }

    /// Release everything in reverse order of acquisition. Every step runs;
    /// the first error is returned.
    fn teardown(mut self) -> SphereResult<()> {
        let mut result = Ok(());

        if let Some(connectivity) = self.connectivity.take() {
            result = result.and(connectivity.teardown());
        }
        if let Some(watchdog) = self.watchdog.take() {
            result = result.and(watchdog.teardown());
            if let Some(signals) = &self.signals {
                result = result.and(signals.restore(ProcessSignal::Alarm));
            }
        }
        if let Some(updates) = self.updates.take() {
            result = result.and(updates.unregister());
        }
        if !self.event_loop.is_closed() {
            result = result.and(self.event_loop.close());
        }
        if let Some(signals) = self.signals.take() {
            result = result.and(signals.restore(ProcessSignal::Terminate));
            result = result.and(signals.teardown());
        }
        result
    }
}

struct AppInner {
    weak_self: Weak<AppInner>,
    platform: Rc<dyn Platform>,
    cloud: Rc<dyn CloudClient>,
    alarm: Rc<dyn AlarmClock>,
    hooks: RefCell<Rc<dyn LifecycleHooks>>,
    session: RefCell<Option<Session>>,
    running: Cell<bool>,
}

impl AppInner {
    fn init(&self, config: &AppConfig) -> SphereResult<()> {
        if self.session.borrow().is_some() {
            return Err(ResourceError::AlreadyInitialized("application").into());
        }
        config.validate()?;

        let event_loop = EventLoop::create()?;
        let mut session = Session::new(config.features, event_loop);
        if let Err(e) = self.acquire(&mut session, config) {
            warn!(error = %e, "initialization failed; releasing acquired resources");
            if let Err(cleanup) = session.teardown() {
                debug!(error = %cleanup, "cleanup after failed initialization");
            }
            return Err(e);
        }

        *self.session.borrow_mut() = Some(session);
        info!(features = %config.features, "application initialized");
        Ok(())
    }

    fn acquire(&self, session: &mut Session, config: &AppConfig) -> SphereResult<()> {
        let me = self
            .weak_self
            .upgrade()
            .ok_or(ResourceError::NotInitialized("application"))?;
        let features = config.features;

        let signals = SignalBridge::new(&session.event_loop)?;
        signals.bind_method(&me, AppInner::on_signal);
        let installed = signals.install(ProcessSignal::Terminate);
        session.signals = Some(signals);
        installed?;

        if features.contains(Features::UPDATE_NOTIFICATION) {
            let hooks = Rc::clone(&*self.hooks.borrow());
            let updates = UpdateNotifier::new(Rc::clone(&self.platform), hooks);
            updates.register(&session.event_loop)?;
            session.updates = Some(updates);
        }

        if features.contains(Features::TIME_SYNC) {
            self.platform.enable_time_sync()?;
        }

        if features.contains(Features::WATCHDOG) {
            let watchdog =
                WatchdogController::new(Rc::clone(&self.alarm), config.watchdog_period_secs)?;
            if let Some(signals) = &session.signals {
                signals.install(ProcessSignal::Alarm)?;
            }
            watchdog.init()?;
            session.watchdog = Some(watchdog);
        }

        if features.contains(Features::CLOUD_CONNECTIVITY) {
            let connectivity = ConnectivityManager::new(
                &session.event_loop,
                Rc::clone(&self.cloud),
                config.connectivity(),
            )?;
            session.connectivity = Some(connectivity);
            if let Some(connectivity) = &session.connectivity {
                connectivity.try_connect()?;
            }
        }
        Ok(())
    }

    fn run(&self) -> SphereResult<()> {
        let event_loop = Rc::clone(&self.session()?.event_loop);
        self.running.set(true);
        info!("application running");

        while self.running.get() {
            match event_loop.run_once(None) {
                Ok(RunOutcome::Interrupted) => trace!("event loop wait interrupted"),
                Ok(RunOutcome::Dispatched(_)) => {}
                Err(e) => fatal(InvariantViolation::EventLoopFailed(e.to_string())),
            }
        }
        info!("application stopped");
        Ok(())
    }

    fn destroy(&self) -> SphereResult<()> {
        let session = self
            .session
            .borrow_mut()
            .take()
            .ok_or(ResourceError::NotInitialized("application"))?;
        self.running.set(false);
        let result = session.teardown();
        match &result {
            Ok(()) => info!("application destroyed"),
            Err(e) => warn!(error = %e, "application destroyed with errors"),
        }
        result
    }

    fn on_signal(&self, signal: ProcessSignal) {
        match signal {
            ProcessSignal::Terminate => {
                info!("termination requested");
                if let Err(e) = self.destroy() {
                    error!(error = %e, "destroy after termination signal failed");
                }
            }
            ProcessSignal::Alarm => {
                let session = self.session.borrow();
                let watchdog = session.as_ref().and_then(|s| s.watchdog.as_ref());
                match watchdog {
                    Some(watchdog) => {
                        if let Err(e) = watchdog.handle_timeout(self.platform.as_ref()) {
                            error!(error = %e, "watchdog reboot request failed");
                        }
                    }
                    None => debug!("alarm without an armed watchdog"),
                }
            }
        }
    }

    fn session(&self) -> SphereResult<Ref<'_, Session>> {
        Ref::filter_map(self.session.borrow(), Option::as_ref)
            .ok()
            .ok_or_else(|| ResourceError::NotInitialized("application").into())
    }

    fn feature(&self, feature: Features) -> SphereResult<Ref<'_, Session>> {
        let session = self.session()?;
        session.features.require(feature)?;
        Ok(session)
    }
}

/// The application core: owns the event loop and every lifecycle component.
///
/// Platform, cloud and alarm services are injected, so the same lifecycle
/// runs against the host or against test fakes. At most one application can
/// be initialized per process, because the termination and alarm signals are
/// process-wide; a second `init` elsewhere fails with
/// [`ResourceError::AlreadyInstalled`].
///
/// # Example
///
/// ```no_run
/// use std::rc::Rc;
/// use sphere_app::prelude::*;
/// use sphere_cloud::LoopbackCloud;
/// use sphere_runtime::HostPlatform;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let app = Application::new(
///     Rc::new(HostPlatform::new()),
///     Rc::new(LoopbackCloud::new(0)),
/// );
/// app.init(
///     &AppConfig::new(Features::WATCHDOG | Features::CLOUD_CONNECTIVITY)
///         .with_scope_id("0ne000ABCDE"),
/// )?;
/// app.run()?;
/// # Ok(())
/// # }
/// ```
pub struct Application {
    inner: Rc<AppInner>,
}

impl Application {
    /// Create an uninitialized application using the process alarm for the watchdog.
    #[must_use]
    pub fn new(platform: Rc<dyn Platform>, cloud: Rc<dyn CloudClient>) -> Self {
        Self::with_alarm(platform, cloud, Rc::new(ProcessAlarm::new()))
    }

    /// Create an uninitialized application with an explicit alarm source.
    #[must_use]
    pub fn with_alarm(
        platform: Rc<dyn Platform>,
        cloud: Rc<dyn CloudClient>,
        alarm: Rc<dyn AlarmClock>,
    ) -> Self {
        let hooks: Rc<dyn LifecycleHooks> = Rc::new(DefaultHooks);
        Self {
            inner: Rc::new_cyclic(|weak_self| AppInner {
                weak_self: weak_self.clone(),
                platform,
                cloud,
                alarm,
                hooks: RefCell::new(hooks),
                session: RefCell::new(None),
                running: Cell::new(false),
            }),
        }
    }

    /// Replace the update lifecycle hooks. Takes effect at the next `init`.
    #[must_use]
    pub fn with_hooks(self, hooks: Rc<dyn LifecycleHooks>) -> Self {
        *self.inner.hooks.borrow_mut() = hooks;
        self
    }

    /// Acquire every resource `config` asks for and make the first
    /// connection attempt.
    ///
    /// On failure everything acquired so far is released again.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::AlreadyInitialized`] without side effects if
    /// already initialized, [`ResourceError::AlreadyInstalled`] if another
    /// application owns the process signals, a validation error, or the first
    /// resource error met.
    pub fn init(&self, config: &AppConfig) -> SphereResult<()> {
        self.inner.init(config)
    }

    /// Dispatch events until [`destroy`](Self::destroy) runs, typically from
    /// the termination signal.
    ///
    /// Interrupted waits are retried; any other event loop failure is fatal.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotInitialized`] before `init`.
    pub fn run(&self) -> SphereResult<()> {
        self.inner.run()
    }

    /// Release everything `init` acquired, in reverse order, and stop `run`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotInitialized`] if not initialized, or the
    /// first error met while releasing (every step still runs).
    pub fn destroy(&self) -> SphereResult<()> {
        self.inner.destroy()
    }

    /// Pet the watchdog.
    ///
    /// # Errors
    ///
    /// Fails if uninitialized or the watchdog feature is disabled.
    pub fn pet_watchdog(&self) -> SphereResult<()> {
        let session = self.inner.feature(Features::WATCHDOG)?;
        session
            .watchdog
            .as_ref()
            .ok_or(ResourceError::NotInitialized("watchdog"))?
            .pet()
    }

    /// Change the watchdog period and pet immediately.
    ///
    /// # Errors
    ///
    /// Fails if uninitialized, the watchdog feature is disabled, or `secs` is zero.
    pub fn set_watchdog_period(&self, secs: u32) -> SphereResult<()> {
        let session = self.inner.feature(Features::WATCHDOG)?;
        session
            .watchdog
            .as_ref()
            .ok_or(ResourceError::NotInitialized("watchdog"))?
            .set_period(secs)
    }

    /// Change the connection retry ceiling.
    ///
    /// # Errors
    ///
    /// Fails if uninitialized, cloud connectivity is disabled, or `secs` is zero.
    pub fn set_max_retry_interval(&self, secs: u32) -> SphereResult<()> {
        let session = self.inner.feature(Features::CLOUD_CONNECTIVITY)?;
        session
            .connectivity
            .as_ref()
            .ok_or(ResourceError::NotInitialized("connectivity"))?
            .set_max_retry_interval(secs)
    }

    /// Change the connection keepalive period.
    ///
    /// # Errors
    ///
    /// Fails if uninitialized, cloud connectivity or keepalive is disabled,
    /// or `secs` is zero.
    pub fn set_keepalive_period(&self, secs: u32) -> SphereResult<()> {
        let session = self
            .inner
            .feature(Features::CLOUD_CONNECTIVITY | Features::KEEPALIVE)?;
        session
            .connectivity
            .as_ref()
            .ok_or(ResourceError::NotInitialized("connectivity"))?
            .set_keepalive_period(secs)
    }

    /// Defer pending updates for `minutes`.
    ///
    /// # Errors
    ///
    /// Fails if uninitialized, update notification is disabled, or `minutes` is zero.
    pub fn block_update(&self, minutes: u32) -> SphereResult<()> {
        let session = self.inner.feature(Features::UPDATE_NOTIFICATION)?;
        session
            .updates
            .as_ref()
            .ok_or(ResourceError::NotInitialized("update notifications"))?
            .block_update(minutes)
    }

    /// Cancel an update deferral.
    ///
    /// # Errors
    ///
    /// Fails if uninitialized or update notification is disabled.
    pub fn allow_update(&self) -> SphereResult<()> {
        let session = self.inner.feature(Features::UPDATE_NOTIFICATION)?;
        session
            .updates
            .as_ref()
            .ok_or(ResourceError::NotInitialized("update notifications"))?
            .allow_update()
    }

    /// Ask the platform to reboot.
    ///
    /// # Errors
    ///
    /// Fails if uninitialized, or the platform error.
    pub fn system_reboot(&self) -> SphereResult<()> {
        self.inner.session()?;
        info!("reboot requested");
        self.inner.platform.request_reboot()
    }

    /// Ask the platform to suspend for `secs` seconds.
    ///
    /// # Errors
    ///
    /// Fails if uninitialized, `secs` is zero, or the platform error.
    pub fn system_suspend(&self, secs: u32) -> SphereResult<()> {
        self.inner.session()?;
        if secs == 0 {
            return Err(
                ResourceError::invalid_argument("suspend duration", "must be greater than 0")
                    .into(),
            );
        }
        info!(secs, "suspend requested");
        self.inner
            .platform
            .request_suspend(Duration::from_secs(u64::from(secs)))
    }

    /// Check whether `init` succeeded and `destroy` has not run since.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.session.borrow().is_some()
    }

    /// Check whether [`run`](Self::run) is dispatching.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    /// Enabled features, or `None` when uninitialized.
    #[must_use]
    pub fn features(&self) -> Option<Features> {
        self.inner.session().ok().map(|s| s.features)
    }

    /// The event loop, for attaching further timers or descriptors.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NotInitialized`] when uninitialized.
    pub fn event_loop(&self) -> SphereResult<EventLoopHandle> {
        Ok(Rc::clone(&self.inner.session()?.event_loop))
    }

    /// Connectivity snapshot, when cloud connectivity is enabled.
    #[must_use]
    pub fn connectivity_status(&self) -> Option<ConnectivityStatus> {
        let session = self.inner.session().ok()?;
        session.connectivity.as_ref().map(ConnectivityManager::status)
    }

    /// Watchdog status, when the watchdog is enabled.
    #[must_use]
    pub fn watchdog_status(&self) -> Option<WatchdogStatus> {
        let session = self.inner.session().ok()?;
        session.watchdog.as_ref().map(SharedWatchdog::status)
    }

    /// Watchdog metrics, when the watchdog is enabled.
    #[must_use]
    pub fn watchdog_metrics(&self) -> Option<WatchdogMetrics> {
        let session = self.inner.session().ok()?;
        session.watchdog.as_ref().map(SharedWatchdog::metrics)
    }

    /// Check whether update deferral is active, when update notification is enabled.
    #[must_use]
    pub fn is_update_deferred(&self) -> Option<bool> {
        let session = self.inner.session().ok()?;
        session.updates.as_ref().map(UpdateNotifier::is_deferred)
    }
}

impl Drop for Application {
    fn drop(&mut self) {
        if self.is_initialized() {
            if let Err(e) = self.destroy() {
                warn!(error = %e, "destroy on drop failed");
            }
        }
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("initialized", &self.is_initialized())
            .field("running", &self.is_running())
            .field("features", &self.features())
            .finish()
    }
}
