//! Background monitor that periodically scans the graph for cycles

use crate::core::hooks;
use crate::core::types::{DeadlockInfo, VertexIndex};
use chrono::Utc;
use fxhash::FxHashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Callback invoked with each newly detected cycle
pub type DeadlockCallback = Box<dyn Fn(DeadlockInfo) + Send + 'static>;

/// Handle to a running monitor thread
///
/// The monitor stops cooperatively: [`MonitorHandle::shutdown`] raises the
/// stop flag and joins the thread. Dropping the handle raises the flag
/// without joining, leaving the thread to exit on its next wakeup.
pub struct MonitorHandle {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Stop the monitor and wait for its thread to exit
    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Spawn the monitor thread.
///
/// Every `period` the monitor walks the assigned thread vertices and runs one
/// cycle search per thread. Each search holds the graph lock for its full
/// duration; the lock is released between searches and never held across the
/// sleep. A cycle is reported through `callback` once; subsequent scans that
/// find the same vertices again stay silent.
pub fn spawn(period: Duration, callback: DeadlockCallback) -> MonitorHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);
    let handle = thread::Builder::new()
        .name("lockgraph-monitor".into())
        .spawn(move || monitor_loop(period, callback, stop_flag))
        .ok();
    MonitorHandle { stop, handle }
}

fn monitor_loop(period: Duration, callback: DeadlockCallback, stop: Arc<AtomicBool>) {
    let mut reported: FxHashSet<Vec<VertexIndex>> = FxHashSet::default();

    while !stop.load(Ordering::Relaxed) {
        scan_once(&mut reported, &callback);

        // Sleep in short slices so shutdown stays prompt
        let mut slept = Duration::ZERO;
        while slept < period && !stop.load(Ordering::Relaxed) {
            let step = (period - slept).min(Duration::from_millis(50));
            thread::sleep(step);
            slept += step;
        }
    }
}

fn scan_once(reported: &mut FxHashSet<Vec<VertexIndex>>, callback: &DeadlockCallback) {
    for (vertex, thread_id) in hooks::thread_vertices() {
        if let Some((indices, labels)) = hooks::cycle_from_vertex(vertex) {
            if reported.insert(normalize_cycle(&indices)) {
                callback(DeadlockInfo {
                    thread_id,
                    cycle: labels,
                    timestamp: Utc::now().to_rfc3339(),
                });
            }
        }
    }
}

/// Rotate a cycle so its smallest vertex comes first.
///
/// The same cycle is discovered from every thread on it, each time starting
/// at a different vertex; the rotation gives all of them one canonical key.
fn normalize_cycle(cycle: &[VertexIndex]) -> Vec<VertexIndex> {
    let Some(min_pos) = cycle
        .iter()
        .enumerate()
        .min_by_key(|&(_, &v)| v)
        .map(|(pos, _)| pos)
    else {
        return Vec::new();
    };
    let mut normalized = Vec::with_capacity(cycle.len());
    normalized.extend_from_slice(&cycle[min_pos..]);
    normalized.extend_from_slice(&cycle[..min_pos]);
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hooks::{on_after_lock, on_after_unlock, on_before_lock};
    use crate::core::types::VertexLabel;
    use std::sync::mpsc;

    #[test]
    fn test_normalize_cycle_rotations_agree() {
        assert_eq!(normalize_cycle(&[3, 1, 2]), vec![1, 2, 3]);
        assert_eq!(normalize_cycle(&[1, 2, 3]), vec![1, 2, 3]);
        assert_eq!(normalize_cycle(&[2, 3, 1]), vec![1, 2, 3]);
        assert_eq!(normalize_cycle(&[7]), vec![7]);
        assert_eq!(normalize_cycle(&[]), Vec::<VertexIndex>::new());
    }

    #[test]
    fn test_monitor_reports_cycle_once() {
        let (t1, t2) = (9701, 9702);
        let (m1, m2) = (0x9701, 0x9702);

        // Build the AB-BA shape directly through the hooks
        on_before_lock(t1, m1);
        on_after_lock(t1, m1);
        on_before_lock(t2, m2);
        on_after_lock(t2, m2);
        on_before_lock(t1, m2);
        on_before_lock(t2, m1);

        let (tx, rx) = mpsc::channel();
        let handle = spawn(
            Duration::from_millis(20),
            Box::new(move |info| {
                let _ = tx.send(info);
            }),
        );

        // Other tests in this binary share the global graph, so only look at
        // reports that implicate this test's threads.
        let ours = |info: &crate::core::types::DeadlockInfo| {
            info.cycle.contains(&VertexLabel::Thread(t1))
        };
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        let info = loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(info) if ours(&info) => break info,
                Ok(_) => continue,
                Err(_) => panic!("monitor should report the cycle"),
            }
        };
        assert_eq!(info.cycle.len(), 4);
        assert!(info.cycle.contains(&VertexLabel::Thread(t2)));

        // The same cycle must not be reported a second time
        while let Ok(info) = rx.recv_timeout(Duration::from_millis(200)) {
            assert!(!ours(&info), "cycle reported twice");
        }

        handle.shutdown();

        // Return the shared graph to a quiescent state
        on_after_unlock(t1, m1);
        on_after_unlock(t2, m2);
        on_after_lock(t1, m2);
        on_after_unlock(t1, m2);
        on_after_lock(t2, m1);
        on_after_unlock(t2, m1);
    }

    #[test]
    fn test_shutdown_stops_the_thread() {
        let handle = spawn(Duration::from_millis(10), Box::new(|_| {}));
        handle.shutdown();
    }
}
