use crate::core::hooks;
use crate::core::types::get_current_thread_id;
use std::thread::{self, JoinHandle};

/// A wrapper around `std::thread::JoinHandle` that registers the new thread
/// with the detector, mirroring the `pthread_create` interposition.
pub struct TrackedThread<T>(JoinHandle<T>);

impl<T> TrackedThread<T>
where
    T: Send + 'static,
{
    /// Spawn a new tracked thread.
    ///
    /// The thread's vertex is created as soon as the thread starts, before
    /// the closure runs, and the spawn is recorded in the event log with its
    /// parent thread.
    pub fn spawn<F>(f: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        let parent_tid = get_current_thread_id();

        let handle = thread::spawn(move || {
            let tid = get_current_thread_id();
            hooks::on_thread_create_with_parent(tid, Some(parent_tid));
            f()
        });
        TrackedThread(handle)
    }

    /// Wait for the thread to finish and return its result.
    pub fn join(self) -> thread::Result<T> {
        self.0.join()
    }
}
