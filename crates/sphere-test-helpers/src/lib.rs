//! Shared test utilities for the Sphere application core.
//!
//! This crate provides fakes for every injected seam of the application
//! so tests can drive the lifecycle without rebooting the machine.
//!
//! # Modules
//!
//! - [`mod@must`] - Unwrap helpers with good error messages and `#[track_caller]`
//! - [`alarm`] - [`FakeAlarm`], a recording [`AlarmClock`](sphere_watchdog::AlarmClock)
//! - [`platform`] - [`FakePlatform`], a recording [`Platform`](sphere_runtime::Platform)
//! - [`cloud`] - [`ScriptedCloud`], a [`CloudClient`](sphere_cloud::CloudClient) with queued outcomes
//! - [`journal`] - [`Journal`], call ordering across fakes
//! - [`lock`] - serialization for tests that touch signal dispositions
//! - [`prelude`] - Convenience re-exports
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! sphere-test-helpers = { workspace = true }
//! ```
//!
//! ```rust,ignore
//! use sphere_test_helpers::prelude::*;
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![allow(clippy::unwrap_used, clippy::panic)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod alarm;
pub mod cloud;
pub mod journal;
pub mod lock;
pub mod must;
pub mod platform;
pub mod prelude;

pub use alarm::{AlarmCall, FakeAlarm};
pub use cloud::{CloudEvent, ConnectOutcome, ScriptedCloud};
pub use journal::Journal;
pub use lock::process_lock;
pub use must::*;
pub use platform::{FakePlatform, PlatformRequest};
