//! Error taxonomy for the Sphere application lifecycle core.
//!
//! Every crate in the workspace reports failures through the types defined here,
//! so that the outermost lifecycle operation (`init`, `run`, `destroy`) can decide
//! uniformly whether a failure aborts startup, is retried, or terminates the process.
//!
//! # Architecture
//!
//! - [`resource`]: creation or registration of an OS primitive failed (timer, event
//!   loop, signal handler, platform service), or a lifecycle precondition was not met.
//!   Always propagated to the caller.
//! - [`protocol`]: a cloud connect, provisioning or option-set call returned a non-OK
//!   status, classified into a [`FailureStage`] and a message.
//! - [`invariant`]: programmer errors. These are never returned; [`fatal`] logs the
//!   diagnostic and terminates.
//! - [`common`]: the top-level [`SphereError`] and its classification helpers.
//!
//! # Example
//!
//! ```
//! use sphere_errors::prelude::*;
//!
//! fn set_period(secs: u32) -> SphereResult<u32> {
//!     if secs == 0 {
//!         return Err(ResourceError::invalid_argument("period", "must be greater than 0").into());
//!     }
//!     Ok(secs)
//! }
//!
//! assert!(set_period(0).is_err());
//! assert_eq!(set_period(5).ok(), Some(5));
//! ```

#![deny(unsafe_code, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod common;
pub mod invariant;
pub mod prelude;
pub mod protocol;
pub mod resource;

pub use common::{ErrorCategory, ErrorSeverity, SphereError};
pub use invariant::{InvariantViolation, fatal};
pub use protocol::{FailureStage, ProtocolError};
pub use resource::ResourceError;

/// A specialized `Result` type for lifecycle operations.
pub type SphereResult<T = ()> = std::result::Result<T, SphereError>;
