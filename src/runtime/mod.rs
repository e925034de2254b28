//! Runtime support for deferred notification delivery.
//!
//! Debounced notifications are driven through the [`Scheduler`] trait so the
//! store never depends on a particular event loop. Two implementations ship
//! with the crate: [`ThreadScheduler`] sleeps on a background thread and
//! [`ManualScheduler`] runs tasks only when its virtual clock is advanced.

mod manual;
mod scheduler;

pub use manual::ManualScheduler;
pub use scheduler::{Scheduler, Task, ThreadScheduler, TimerHandle};

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

// A panicking callback must not wedge the store, so poisoned locks are
// recovered rather than propagated.

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
