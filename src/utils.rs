use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks `mutex`, recovering the guard if a callback panicked while holding it.
///
/// A panicking proxy hook ends the polling thread, but server state stays
/// structurally valid, so host-side queries and a restarted engine keep
/// working instead of propagating the poison.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
