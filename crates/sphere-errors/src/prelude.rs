//! Prelude for sphere-errors.

pub use crate::common::{ErrorCategory, ErrorSeverity, SphereError};
pub use crate::invariant::{InvariantViolation, fatal};
pub use crate::protocol::{FailureStage, ProtocolError};
pub use crate::resource::ResourceError;
pub use crate::SphereResult;
