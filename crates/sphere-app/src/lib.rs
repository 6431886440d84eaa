//! # sphere-app
//!
//! Application lifecycle for a single-process embedded device.
//!
//! [`Application`] composes the lifecycle components behind `init`, `run` and
//! `destroy`:
//!
//! - the event loop and signal bridge from `sphere-runtime`
//! - update notifications with deferral ([`UpdateNotifier`], [`LifecycleHooks`])
//! - the alarm watchdog from `sphere-watchdog`
//! - cloud connectivity from `sphere-cloud`
//!
//! Each component is gated by a [`Features`] flag in the [`AppConfig`] given
//! to `init`. The termination signal destroys the application from loop
//! context, which makes `run` return; the alarm signal is treated as a
//! watchdog timeout and requests a reboot.
//!
//! ## Example
//!
//! ```
//! use sphere_app::prelude::*;
//!
//! # fn main() -> sphere_errors::SphereResult<()> {
//! let config = AppConfig::builder()
//!     .features(Features::WATCHDOG | Features::CLOUD_CONNECTIVITY)
//!     .scope_id("abc123")
//!     .watchdog_period(30)
//!     .build()?;
//! assert_eq!(config.max_retry_interval_secs, 120);
//! assert!(AppConfig::builder().features(Features::CLOUD_CONNECTIVITY).build().is_err());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code, clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod application;
pub mod config;
pub mod features;
pub mod prelude;
pub mod updates;

pub use application::Application;
pub use config::{
    AppConfig, AppConfigBuilder, DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_KEEPALIVE_PERIOD_SECS,
};
pub use features::Features;
pub use updates::{DefaultHooks, LifecycleHooks, UpdateNotifier};
