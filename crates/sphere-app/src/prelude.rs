//! Prelude for sphere-app.

pub use crate::application::Application;
pub use crate::config::{AppConfig, AppConfigBuilder};
pub use crate::features::Features;
pub use crate::updates::{DefaultHooks, LifecycleHooks, UpdateNotifier};
