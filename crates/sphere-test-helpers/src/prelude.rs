//! Convenience re-exports for common test utilities.
//!
//! ```rust,ignore
//! use sphere_test_helpers::prelude::*;
//! ```

pub use crate::alarm::{AlarmCall, FakeAlarm};
pub use crate::cloud::{CloudEvent, ConnectOutcome, ScriptedCloud};
pub use crate::journal::Journal;
pub use crate::lock::process_lock;
pub use crate::must::{must, must_some, must_with};
pub use crate::platform::{FakePlatform, PlatformRequest};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;
