use lockgraph::{TrackedMutex, TrackedThread, detector_stats};
use std::sync::Arc;
mod common;
use common::{NO_DEADLOCK_TIMEOUT, assert_no_deadlock, start_detector};

/// Four threads acquire and release their own mutex sequentially, with no
/// overlap. No cycle exists at any point and the graph must be edge-free at
/// quiescence.
#[test]
fn test_linear_lock_sequence_reports_nothing() {
    let harness = start_detector();

    let mutexes: Arc<Vec<TrackedMutex<u32>>> =
        Arc::new((0..4).map(TrackedMutex::new).collect());

    // Spawn and join one thread at a time so acquisitions never overlap
    for i in 0..4 {
        let mutexes = Arc::clone(&mutexes);
        let thread = TrackedThread::spawn(move || {
            let mut guard = mutexes[i].lock();
            *guard += 1;
        });
        thread.join().unwrap();
    }

    assert_no_deadlock(&harness, NO_DEADLOCK_TIMEOUT);

    let stats = detector_stats();
    assert_eq!(stats.edges, 0, "graph must hold no edges at quiescence");
    assert_eq!(stats.mutex_vertices, 4);
    assert_eq!(stats.thread_vertices, 4);
}
