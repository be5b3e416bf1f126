//! # Lockgraph
//!
//! A runtime deadlock detector built around a resource-allocation graph.
//!
//! Lockgraph observes a process's mutex-lock and mutex-unlock operations,
//! maintains a directed graph whose vertices are threads and mutexes, and
//! reports potential deadlocks by searching that graph for cycles. A thread
//! blocked on a mutex contributes a *wait edge* (thread → mutex); a mutex
//! owned by a thread contributes a *hold edge* (mutex → thread). A directed
//! cycle through those edges is a circular wait.
//!
//! ## Usage
//!
//! There are two ways to feed lock events into the detector:
//!
//! - [`TrackedMutex`] and [`TrackedThread`] wrap the standard primitives and
//!   report events from safe Rust. Start the background monitor with the
//!   [`Lockgraph`] builder.
//! - With the `preload` feature, the crate builds as a `cdylib` that
//!   interposes `pthread_create`, `pthread_mutex_lock` and
//!   `pthread_mutex_unlock` when injected into an unmodified host process
//!   via `LD_PRELOAD`. The wrappers delegate to the real implementations and
//!   never change their semantics.
//!
//! The detector is best-effort: it reports cycles, it does not break them,
//! and every internal failure degrades to "the application's mutex call runs
//! with its normal semantics".

mod core;
pub use core::{
    DeadlockInfo, Lockgraph, TrackedMutex, TrackedThread,
    error::DetectorError,
    hooks::{
        DetectorStats, detector_stats, find_cycle_for_thread, has_hold_edge, has_wait_edge,
        on_after_lock, on_after_unlock, on_before_lock, on_before_unlock, on_thread_create,
    },
    shutdown,
    types::{MAX_VERTICES, MutexAddr, ThreadId, VertexIndex, VertexLabel, get_current_thread_id},
};

#[cfg(all(unix, feature = "preload"))]
pub mod ffi;
