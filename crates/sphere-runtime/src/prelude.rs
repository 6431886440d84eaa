//! Prelude for sphere-runtime.

pub use crate::callback::{CallbackKind, CallbackSlot};
pub use crate::event_loop::{EventLoop, EventLoopHandle, IoHandler, Readiness, RunOutcome};
pub use crate::host::{HostPlatform, PlatformEventQueue, UpdateInjector};
pub use crate::platform::{Platform, UpdateEvent, UpdateKind, UpdateSubscription};
pub use crate::signals::{ProcessSignal, SignalBridge};
pub use crate::timer::{TimerService, TimerState};
