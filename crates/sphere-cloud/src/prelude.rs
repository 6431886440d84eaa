//! Prelude for sphere-cloud.

pub use crate::backoff::RetryBackoff;
pub use crate::client::{CloudClient, CloudConnection};
pub use crate::failure::ConnectFailure;
pub use crate::manager::{ConnectivityConfig, ConnectivityManager};
pub use crate::status::{ConnectionStatus, ConnectivityStatus, DisconnectReason, RetryPolicy};
