use crate::core::hooks;
use crate::core::types::{MutexAddr, ThreadId, get_current_thread_id};
use parking_lot::{Mutex, MutexGuard};
use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};

/// A mutex wrapper that reports its lock operations to the deadlock detector
///
/// This is the explicit-API counterpart of the `pthread` interposition: hosts
/// that cannot be injected call the hooks from their own wrappers, and Rust
/// hosts use this type directly. The inner mutex is boxed so its address is
/// stable; that address is the mutex's identity in the graph.
pub struct TrackedMutex<T> {
    inner: Box<Mutex<T>>,
}

/// Guard for a [`TrackedMutex`]; reports the release when dropped
pub struct TrackedGuard<'a, T> {
    thread_id: ThreadId,
    mutex_addr: MutexAddr,
    guard: ManuallyDrop<MutexGuard<'a, T>>,
}

impl<T> TrackedMutex<T> {
    pub fn new(value: T) -> Self {
        TrackedMutex {
            inner: Box::new(Mutex::new(value)),
        }
    }

    /// Address of the inner mutex, its identity in the graph
    pub fn addr(&self) -> MutexAddr {
        &*self.inner as *const Mutex<T> as MutexAddr
    }

    /// Acquire the lock, reporting the attempt and the acquisition.
    ///
    /// The wait edge goes in before blocking, so a thread stuck here is
    /// visible to cycle search for as long as it is stuck.
    pub fn lock(&self) -> TrackedGuard<'_, T> {
        let thread_id = get_current_thread_id();
        let mutex_addr = self.addr();

        hooks::on_before_lock(thread_id, mutex_addr);
        let guard = self.inner.lock();
        hooks::on_after_lock(thread_id, mutex_addr);

        TrackedGuard {
            thread_id,
            mutex_addr,
            guard: ManuallyDrop::new(guard),
        }
    }

    /// Acquire the lock without blocking.
    ///
    /// A failed try never blocks the thread, so no wait edge is recorded for
    /// it; a successful try reports the attempt and acquisition back to back.
    pub fn try_lock(&self) -> Option<TrackedGuard<'_, T>> {
        let thread_id = get_current_thread_id();
        let mutex_addr = self.addr();

        let guard = self.inner.try_lock()?;
        hooks::on_before_lock(thread_id, mutex_addr);
        hooks::on_after_lock(thread_id, mutex_addr);

        Some(TrackedGuard {
            thread_id,
            mutex_addr,
            guard: ManuallyDrop::new(guard),
        })
    }
}

impl<T> Deref for TrackedGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.guard.deref()
    }
}

impl<T> DerefMut for TrackedGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.guard.deref_mut()
    }
}

impl<T> Drop for TrackedGuard<'_, T> {
    fn drop(&mut self) {
        hooks::on_before_unlock(self.thread_id, self.mutex_addr);
        // Release the inner lock, then report: after_unlock fires only once
        // the mutex is actually free, matching the hook contract.
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        hooks::on_after_unlock(self.thread_id, self.mutex_addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hooks::{has_hold_edge, has_wait_edge};

    #[test]
    fn test_lock_reports_hold_edge() {
        let mutex = TrackedMutex::new(5_u32);
        let thread_id = get_current_thread_id();

        {
            let mut guard = mutex.lock();
            *guard += 1;
            assert!(has_hold_edge(thread_id, mutex.addr()));
            assert!(!has_wait_edge(thread_id, mutex.addr()));
        }

        assert!(!has_hold_edge(thread_id, mutex.addr()));
        assert_eq!(*mutex.lock(), 6);
    }

    #[test]
    fn test_try_lock_contended_leaves_no_edges() {
        let mutex = TrackedMutex::new(());
        let thread_id = get_current_thread_id();

        let _held = mutex.lock();
        assert!(mutex.try_lock().is_none());
        assert!(!has_wait_edge(thread_id, mutex.addr()));
    }

    #[test]
    fn test_try_lock_success_reports_hold_edge() {
        let mutex = TrackedMutex::new(());
        let thread_id = get_current_thread_id();

        let guard = mutex.try_lock().expect("uncontended try_lock");
        assert!(has_hold_edge(thread_id, mutex.addr()));
        drop(guard);
        assert!(!has_hold_edge(thread_id, mutex.addr()));
    }
}
