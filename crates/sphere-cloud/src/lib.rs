//! # sphere-cloud
//!
//! Resilient cloud connectivity for the Sphere application core.
//!
//! [`ConnectivityManager`] owns the connection handle and drives a
//! connect/retry state machine on the event loop. Failed attempts are
//! classified into a (stage, message) pair, logged, and retried after a
//! [`RetryBackoff`] delay that squares after every failure:
//!
//! ```
//! use sphere_cloud::RetryBackoff;
//!
//! # fn main() -> sphere_errors::SphereResult<()> {
//! let schedule: Vec<u32> = RetryBackoff::new(10, 120)?.delays().take(4).collect();
//! assert_eq!(schedule, [10, 100, 120, 120]);
//! # Ok(())
//! # }
//! ```
//!
//! The provisioning service and hub transport sit behind the [`CloudClient`]
//! and [`CloudConnection`] traits. [`LoopbackCloud`] is an in-process stub.

#![deny(unsafe_code, clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod backoff;
pub mod client;
pub mod failure;
pub mod loopback;
pub mod manager;
pub mod prelude;
pub mod status;

pub use backoff::{DEFAULT_INITIAL_RETRY_SECS, DEFAULT_MAX_RETRY_SECS, RetryBackoff};
pub use client::{CloudClient, CloudConnection};
pub use failure::ConnectFailure;
pub use loopback::LoopbackCloud;
pub use manager::{
    ConnectivityConfig, ConnectivityManager, DEFAULT_CONNECT_TIMEOUT, MAX_SCOPE_ID_LEN,
    validate_scope_id,
};
pub use status::{ConnectionStatus, ConnectivityStatus, DisconnectReason, RetryPolicy};
