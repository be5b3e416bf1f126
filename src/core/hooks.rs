//! Mutex event hooks over the global resource-allocation graph
//!
//! Every observable mutex event of the host funnels into one of the free
//! functions here, whether it came from a `pthread` wrapper on the preload
//! path or from a [`crate::TrackedMutex`]. The hooks translate events into
//! edge transitions:
//!
//! - `before_lock`: add wait edge thread → mutex
//! - `after_lock`: remove the wait edge, add hold edge mutex → thread
//! - `before_unlock`: reserved, no graph mutation
//! - `after_unlock`: remove the hold edge
//!
//! Hooks never block beyond the two internal locks and never fail the host:
//! an event the detector cannot record is dropped.

use crate::core::error::DetectorError;
use crate::core::graph::DirectedGraph;
use crate::core::logger;
use crate::core::registry::VertexRegistry;
use crate::core::types::{Events, MAX_VERTICES, MutexAddr, ThreadId, VertexIndex, VertexLabel};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

// The two internal locks of the detector. Lock order is registry before
// graph; these are parking_lot primitives, a different lock class than the
// application mutexes the hooks observe, so the hooks never re-enter
// themselves.
lazy_static::lazy_static! {
    static ref REGISTRY: Mutex<VertexRegistry> =
        Mutex::new(VertexRegistry::with_capacity(MAX_VERTICES));
    static ref GRAPH: Mutex<DirectedGraph<VertexLabel>> =
        Mutex::new(DirectedGraph::with_capacity(MAX_VERTICES));
}

// One diagnostic per distinct failure kind for the process lifetime
static CAPACITY_WARNED: AtomicBool = AtomicBool::new(false);
static FAILURE_WARNED: AtomicBool = AtomicBool::new(false);

/// Force initialization of the global registry and graph.
///
/// Bootstrap calls this so that the first intercepted event does not pay the
/// lazy-initialization cost while the host is inside a lock call.
pub(crate) fn force_init() {
    lazy_static::initialize(&REGISTRY);
    lazy_static::initialize(&GRAPH);
}

fn report_dropped_event(err: &DetectorError) {
    let warned = match err {
        DetectorError::CapacityExhausted => &CAPACITY_WARNED,
        _ => &FAILURE_WARNED,
    };
    if !warned.swap(true, Ordering::SeqCst) {
        eprintln!("lockgraph: dropping lock events: {err}");
    }
}

/// Intern a label, creating its vertex on first reference.
///
/// The fast path resolves an existing vertex under the registry lock alone;
/// only a genuinely new label additionally takes the graph lock to install
/// the payload.
fn intern(label: VertexLabel) -> Result<VertexIndex, DetectorError> {
    let mut registry = REGISTRY.lock();
    if let Some(vertex) = registry.find(&label) {
        return Ok(vertex);
    }
    let mut graph = GRAPH.lock();
    registry.get_or_create(label, &mut graph)
}

/// Look up both vertices of a (thread, mutex) pair without creating them
fn lookup_pair(thread_id: ThreadId, mutex_addr: MutexAddr) -> Option<(VertexIndex, VertexIndex)> {
    let registry = REGISTRY.lock();
    let thread_vertex = registry.find(&VertexLabel::Thread(thread_id))?;
    let mutex_vertex = registry.find(&VertexLabel::Mutex(mutex_addr))?;
    Some((thread_vertex, mutex_vertex))
}

/// Thread `thread_id` is about to block trying to acquire the mutex at
/// `mutex_addr`.
///
/// Ensures both vertices exist and adds the wait edge. Must be called before
/// entering the blocking primitive; the edge is what makes the thread visible
/// to cycle search while it is blocked.
pub fn on_before_lock(thread_id: ThreadId, mutex_addr: MutexAddr) {
    if logger::is_logging_enabled() {
        logger::log_interaction_event(thread_id, mutex_addr, Events::Attempt);
    }

    let thread_vertex = match intern(VertexLabel::Thread(thread_id)) {
        Ok(vertex) => vertex,
        Err(err) => {
            report_dropped_event(&err);
            return;
        }
    };
    let mutex_vertex = match intern(VertexLabel::Mutex(mutex_addr)) {
        Ok(vertex) => vertex,
        Err(err) => {
            report_dropped_event(&err);
            return;
        }
    };

    let mut graph = GRAPH.lock();
    if let Err(err) = graph.add_edge(thread_vertex, mutex_vertex) {
        report_dropped_event(&err);
    }
}

/// Thread `thread_id` has acquired the mutex at `mutex_addr`.
///
/// Replaces the wait edge with the hold edge. An `after_lock` without a prior
/// `before_lock` (a `try_lock` that succeeded immediately, or an event lost
/// to capacity) is recovered by treating the missing wait-edge removal as a
/// no-op; if the vertices themselves are unknown the event is dropped.
pub fn on_after_lock(thread_id: ThreadId, mutex_addr: MutexAddr) {
    if logger::is_logging_enabled() {
        logger::log_interaction_event(thread_id, mutex_addr, Events::Acquired);
    }

    let Some((thread_vertex, mutex_vertex)) = lookup_pair(thread_id, mutex_addr) else {
        return;
    };

    let mut graph = GRAPH.lock();
    graph.remove_edge(thread_vertex, mutex_vertex);
    if let Err(err) = graph.add_edge(mutex_vertex, thread_vertex) {
        report_dropped_event(&err);
    }
}

/// Thread `thread_id` is about to release the mutex at `mutex_addr`.
///
/// Reserved hook: no graph mutation.
pub fn on_before_unlock(_thread_id: ThreadId, _mutex_addr: MutexAddr) {}

/// Thread `thread_id` has released the mutex at `mutex_addr`.
pub fn on_after_unlock(thread_id: ThreadId, mutex_addr: MutexAddr) {
    if logger::is_logging_enabled() {
        logger::log_interaction_event(thread_id, mutex_addr, Events::Released);
    }

    let Some((thread_vertex, mutex_vertex)) = lookup_pair(thread_id, mutex_addr) else {
        return;
    };

    let mut graph = GRAPH.lock();
    graph.remove_edge(mutex_vertex, thread_vertex);
}

/// A new thread has been created; ensure its vertex exists.
pub fn on_thread_create(thread_id: ThreadId) {
    on_thread_create_with_parent(thread_id, None);
}

/// Like [`on_thread_create`], recording the parent thread in the event log.
pub(crate) fn on_thread_create_with_parent(thread_id: ThreadId, parent_id: Option<ThreadId>) {
    if logger::is_logging_enabled() {
        logger::log_thread_event(thread_id, parent_id, Events::Spawn);
    }
    if let Err(err) = intern(VertexLabel::Thread(thread_id)) {
        report_dropped_event(&err);
    }
}

/// Point-in-time counts of the detector state, mainly for tests and
/// diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorStats {
    /// Assigned vertices of either kind
    pub vertices: usize,
    /// Assigned thread vertices
    pub thread_vertices: usize,
    /// Assigned mutex vertices
    pub mutex_vertices: usize,
    /// Wait and hold edges currently in the graph
    pub edges: usize,
}

/// Snapshot the current vertex and edge counts
pub fn detector_stats() -> DetectorStats {
    let (vertices, thread_vertices) = {
        let registry = REGISTRY.lock();
        (registry.len(), registry.thread_vertices().len())
    };
    let edges = GRAPH.lock().edge_count();
    DetectorStats {
        vertices,
        thread_vertices,
        mutex_vertices: vertices - thread_vertices,
        edges,
    }
}

/// Whether the graph holds a wait edge thread → mutex for the pair
pub fn has_wait_edge(thread_id: ThreadId, mutex_addr: MutexAddr) -> bool {
    let Some((thread_vertex, mutex_vertex)) = lookup_pair(thread_id, mutex_addr) else {
        return false;
    };
    GRAPH.lock().has_edge(thread_vertex, mutex_vertex)
}

/// Whether the graph holds a hold edge mutex → thread for the pair
pub fn has_hold_edge(thread_id: ThreadId, mutex_addr: MutexAddr) -> bool {
    let Some((thread_vertex, mutex_vertex)) = lookup_pair(thread_id, mutex_addr) else {
        return false;
    };
    GRAPH.lock().has_edge(mutex_vertex, thread_vertex)
}

/// All assigned thread vertices, for the monitor's scan
pub(crate) fn thread_vertices() -> Vec<(VertexIndex, ThreadId)> {
    REGISTRY.lock().thread_vertices()
}

/// Run one full cycle search from `vertex` under the graph lock.
///
/// Returns the cycle both as raw indices (stable across scans, used to
/// deduplicate reports) and as labels (for the diagnostic).
pub(crate) fn cycle_from_vertex(
    vertex: VertexIndex,
) -> Option<(Vec<VertexIndex>, Vec<VertexLabel>)> {
    let graph = GRAPH.lock();
    let indices = graph.find_cycle_from(vertex)?;
    let labels = indices
        .iter()
        .filter_map(|&v| graph.vertex_data(v).copied())
        .collect();
    Some((indices, labels))
}

/// Search for a cycle reachable from the given thread's vertex.
///
/// Returns the participating vertices in path order, or `None` if the thread
/// is unknown or no cycle is reachable from it.
pub fn find_cycle_for_thread(thread_id: ThreadId) -> Option<Vec<VertexLabel>> {
    let vertex = {
        let registry = REGISTRY.lock();
        registry.find(&VertexLabel::Thread(thread_id))?
    };
    cycle_from_vertex(vertex).map(|(_, labels)| labels)
}
