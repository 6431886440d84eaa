//! Serialization of tests that touch process-global state.
//!
//! Signal dispositions and the process alarm are shared by every thread of a
//! test binary. Tests that install signal handlers or create an initialized
//! application hold this lock for their whole body.

use parking_lot::{Mutex, MutexGuard, const_mutex};

static PROCESS_LOCK: Mutex<()> = const_mutex(());

/// Take the process-wide test lock.
pub fn process_lock() -> MutexGuard<'static, ()> {
    PROCESS_LOCK.lock()
}
