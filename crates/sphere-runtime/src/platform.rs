//! Platform services consumed by the application core.
//!
//! The [`Platform`] trait is the seam between the lifecycle core and the host:
//! power management, time synchronization and update-lifecycle notifications.
//! [`HostPlatform`](crate::HostPlatform) implements it for Linux hosts; tests
//! substitute a recording fake.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sphere_errors::SphereResult;

use crate::callback::CallbackSlot;
use crate::event_loop::EventLoopHandle;

/// Scope of a platform update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// Operating system update.
    System,
    /// Update of this application's image.
    Application,
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateKind::System => f.write_str("system"),
            UpdateKind::Application => f.write_str("application"),
        }
    }
}

/// Update-lifecycle notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UpdateEvent {
    /// An update is staged and will be applied unless deferred.
    Pending {
        /// What is being updated.
        kind: UpdateKind,
        /// Longest deferral the platform will honor, in minutes.
        max_deferral_minutes: u32,
    },
    /// An update finished installing.
    Complete {
        /// What was updated.
        kind: UpdateKind,
    },
}

impl UpdateEvent {
    /// The update scope this event refers to.
    #[must_use]
    pub fn kind(&self) -> UpdateKind {
        match self {
            UpdateEvent::Pending { kind, .. } | UpdateEvent::Complete { kind } => *kind,
        }
    }
}

/// Live registration for update notifications.
pub trait UpdateSubscription {
    /// Defer pending updates for `duration`.
    ///
    /// # Errors
    ///
    /// Returns a platform error if the deferral is rejected.
    fn defer(&self, duration: Duration) -> SphereResult<()>;

    /// Cancel any active deferral.
    ///
    /// # Errors
    ///
    /// Returns a platform error if the request is rejected.
    fn resume(&self) -> SphereResult<()>;

    /// Stop receiving notifications.
    ///
    /// # Errors
    ///
    /// Returns a platform error if the registration cannot be released.
    fn unsubscribe(self: Box<Self>) -> SphereResult<()>;
}

/// Host services used by the application core.
pub trait Platform {
    /// Request an immediate system reboot.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Platform`](sphere_errors::ResourceError::Platform)
    /// if the request is refused.
    fn request_reboot(&self) -> SphereResult<()>;

    /// Suspend the system, waking after `duration`.
    ///
    /// # Errors
    ///
    /// Returns a platform error if the request is refused.
    fn request_suspend(&self, duration: Duration) -> SphereResult<()>;

    /// Turn on network time synchronization.
    ///
    /// # Errors
    ///
    /// Returns a platform error if the request is refused.
    fn enable_time_sync(&self) -> SphereResult<()>;

    /// Register for update notifications, delivered to `handler` on the loop thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the registration fails or one is already active.
    fn subscribe_updates(
        &self,
        event_loop: &EventLoopHandle,
        handler: CallbackSlot<UpdateEvent>,
    ) -> SphereResult<Box<dyn UpdateSubscription>>;
}
