use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Thread identifier type
///
/// Uniquely identifies a thread in the application. On the tracked-wrapper
/// path this is a process-local counter value; on the preload path it is the
/// `pthread_t` value of the thread. Only equality matters.
pub type ThreadId = usize;

/// Address of a mutex, used as its identity
///
/// The detector never dereferences it; pointer equality is the interning key.
pub type MutexAddr = usize;

/// Dense vertex index into the resource-allocation graph
pub type VertexIndex = usize;

/// Capacity bound of the resource-allocation graph. Indices are allocated in
/// `[0, MAX_VERTICES)` and never reused within a process lifetime.
pub const MAX_VERTICES: usize = 100;

/// How often the monitor scans the graph for cycles
pub const DEFAULT_MONITOR_PERIOD: Duration = Duration::from_secs(1);

// Global counter for assigning unique thread IDs
static THREAD_ID_COUNTER: AtomicUsize = AtomicUsize::new(1);

// Thread-local storage for each thread's assigned ID
thread_local! {
    static THREAD_ID: ThreadId = {
        // Each thread gets a unique ID once, when this is first accessed
        THREAD_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
    };
}

/// Get a unique identifier of the current thread
/// This will always return the same ID for the lifetime of the thread
pub fn get_current_thread_id() -> ThreadId {
    THREAD_ID.with(|&id| id)
}

/// Payload of a graph vertex: either a thread or a mutex
///
/// A vertex is interned on first reference and its index stays stable for the
/// process lifetime. The discriminator recovers the edge kind from an arc's
/// endpoints: thread → mutex is a wait edge, mutex → thread is a hold edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VertexLabel {
    /// A thread, identified by an opaque thread id
    Thread(ThreadId),
    /// A mutex, identified by its address
    Mutex(MutexAddr),
}

impl VertexLabel {
    pub fn is_thread(&self) -> bool {
        matches!(self, VertexLabel::Thread(_))
    }

    pub fn is_mutex(&self) -> bool {
        matches!(self, VertexLabel::Mutex(_))
    }
}

impl fmt::Display for VertexLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VertexLabel::Thread(id) => write!(f, "Thread {id}"),
            VertexLabel::Mutex(addr) => write!(f, "Mutex {addr:#x}"),
        }
    }
}

/// Represents the type of thread/lock event that occurred
///
/// These events are what the hooks record in the event log; they mirror the
/// observable mutex operations of the host.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Events {
    /// A new thread was created
    Spawn,
    /// Thread is attempting to acquire a mutex
    Attempt,
    /// Thread successfully acquired a mutex
    Acquired,
    /// Thread released a mutex
    Released,
}

/// Represents the result of a deadlock detection
///
/// One record is produced per detected cycle and handed to the deadlock
/// callback (the default callback writes a line to stderr).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlockInfo {
    /// The implicated thread: the scan that found the cycle started here
    pub thread_id: ThreadId,

    /// The ordered cycle of alternating thread and mutex vertices
    ///
    /// For the classic AB-BA deadlock this holds four labels: thread 1,
    /// the mutex it waits on, thread 2, and the mutex thread 2 waits on.
    pub cycle: Vec<VertexLabel>,

    /// ISO-8601 timestamp of when the cycle was detected
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn test_thread_id_consistency() {
        let (tx, rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            let id1 = get_current_thread_id();
            let id2 = get_current_thread_id();
            let id3 = get_current_thread_id();

            // All calls should return the same ID
            assert_eq!(id1, id2);
            assert_eq!(id2, id3);

            tx.send(id1).unwrap();
        });

        let thread_id = rx.recv().unwrap();
        handle.join().unwrap();

        assert!(thread_id > 0);
    }

    #[test]
    fn test_thread_id_uniqueness() {
        let (tx, rx) = mpsc::channel();

        let mut handles = vec![];
        for _ in 0..10 {
            let tx = tx.clone();
            handles.push(thread::spawn(move || {
                let id = get_current_thread_id();
                tx.send(id).unwrap();
            }));
        }

        let mut ids = vec![];
        for _ in 0..10 {
            ids.push(rx.recv().unwrap());
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let mut unique_ids = ids.clone();
        unique_ids.sort();
        unique_ids.dedup();
        assert_eq!(ids.len(), unique_ids.len());
    }

    #[test]
    fn test_label_display() {
        assert_eq!(VertexLabel::Thread(7).to_string(), "Thread 7");
        assert_eq!(VertexLabel::Mutex(0xdead).to_string(), "Mutex 0xdead");
    }
}
