//! Invariant violations.
//!
//! Programmer errors such as invoking an unbound callback are not recoverable.
//! They are logged and the process terminates (release and dev profiles use
//! `panic = "abort"`).

use core::fmt;

/// A broken programming invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// A callback slot was invoked before anything was bound to it.
    UnboundCallback,
    /// A callback slot was invoked after its referent was dropped.
    DanglingCallback,
    /// A retry attempt failed to reschedule itself.
    RetryPathBroken(String),
    /// The event loop failed for a reason other than an interrupted wait.
    EventLoopFailed(String),
    /// Any other violated invariant.
    Other(&'static str),
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantViolation::UnboundCallback => write!(f, "invoked an unbound callback slot"),
            InvariantViolation::DanglingCallback => {
                write!(f, "invoked a callback slot whose target was dropped")
            }
            InvariantViolation::RetryPathBroken(reason) => {
                write!(f, "connection retry path failed: {reason}")
            }
            InvariantViolation::EventLoopFailed(reason) => {
                write!(f, "event loop failed: {reason}")
            }
            InvariantViolation::Other(what) => f.write_str(what),
        }
    }
}

/// Log an invariant violation and terminate.
///
/// # Panics
///
/// Always. The workspace profiles abort on panic, so the process does not
/// continue past this call.
#[cold]
#[track_caller]
pub fn fatal(violation: InvariantViolation) -> ! {
    let location = std::panic::Location::caller();
    tracing::error!(%location, %violation, "invariant violation");
    panic!("invariant violation at {location}: {violation}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_display() {
        assert_eq!(
            InvariantViolation::UnboundCallback.to_string(),
            "invoked an unbound callback slot"
        );
        assert!(
            InvariantViolation::RetryPathBroken("timer arm failed".into())
                .to_string()
                .contains("timer arm failed")
        );
    }

    #[test]
    #[should_panic(expected = "invoked an unbound callback slot")]
    fn test_fatal_terminates() {
        fatal(InvariantViolation::UnboundCallback);
    }
}
