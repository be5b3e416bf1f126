use crate::core::error::DetectorError;
use crate::core::graph::DirectedGraph;
use crate::core::types::{ThreadId, VertexIndex, VertexLabel};

/// Interns (kind, payload) pairs into stable, dense vertex indices
///
/// The registry is the source of truth for which graph indices have been
/// assigned. Indices are handed out monotonically and never reused; a label
/// interned once keeps its index for the process lifetime, even after the
/// underlying thread exits or mutex is destroyed.
///
/// All mutation goes through [`VertexRegistry::get_or_create`], and the
/// caller holds the registry lock for the whole call so that allocating the
/// index and installing the payload appear atomic to concurrent observers.
pub struct VertexRegistry {
    /// Labels of the assigned vertices; `labels.len()` is the next free index
    labels: Vec<VertexLabel>,
    /// Hard cap on the number of vertices, matching the graph's capacity
    capacity: usize,
}

impl VertexRegistry {
    pub fn with_capacity(capacity: usize) -> Self {
        VertexRegistry {
            labels: Vec::new(),
            capacity,
        }
    }

    /// Number of assigned vertices
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Linear scan of the assigned vertices for `label`.
    ///
    /// Thread labels compare by thread-id equality, mutex labels by address
    /// equality. With at most [`crate::MAX_VERTICES`] vertices the scan is
    /// cheap enough that no index map is kept.
    pub fn find(&self, label: &VertexLabel) -> Option<VertexIndex> {
        self.labels.iter().position(|existing| existing == label)
    }

    /// Return the vertex for `label`, interning it if it is new.
    ///
    /// A new label gets the next free index and its payload is installed into
    /// the graph before the call returns. If installing the payload fails the
    /// reservation is rolled back so the index can be handed out again.
    pub fn get_or_create(
        &mut self,
        label: VertexLabel,
        graph: &mut DirectedGraph<VertexLabel>,
    ) -> Result<VertexIndex, DetectorError> {
        if let Some(vertex) = self.find(&label) {
            return Ok(vertex);
        }

        if self.labels.len() >= self.capacity {
            return Err(DetectorError::CapacityExhausted);
        }

        let vertex = self.labels.len();
        self.labels.push(label);
        if graph.set_vertex_data(vertex, &label).is_err() {
            // Roll back the reservation
            self.labels.pop();
            return Err(DetectorError::AllocationFailed);
        }
        Ok(vertex)
    }

    /// All assigned thread vertices, in index order
    pub fn thread_vertices(&self) -> Vec<(VertexIndex, ThreadId)> {
        self.labels
            .iter()
            .enumerate()
            .filter_map(|(vertex, label)| match label {
                VertexLabel::Thread(id) => Some((vertex, *id)),
                VertexLabel::Mutex(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interned_indices_are_stable() {
        let mut graph = DirectedGraph::with_capacity(8);
        let mut registry = VertexRegistry::with_capacity(8);

        let t1 = registry
            .get_or_create(VertexLabel::Thread(1), &mut graph)
            .unwrap();
        let m1 = registry
            .get_or_create(VertexLabel::Mutex(0x1000), &mut graph)
            .unwrap();
        let t1_again = registry
            .get_or_create(VertexLabel::Thread(1), &mut graph)
            .unwrap();

        assert_eq!(t1, 0);
        assert_eq!(m1, 1);
        assert_eq!(t1, t1_again);
        assert!(!registry.is_empty());
        assert_eq!(registry.len(), 2);
        assert_eq!(graph.vertex_data(t1), Some(&VertexLabel::Thread(1)));
        assert_eq!(graph.vertex_data(m1), Some(&VertexLabel::Mutex(0x1000)));
    }

    #[test]
    fn test_find_misses_unknown_labels() {
        let mut graph = DirectedGraph::with_capacity(4);
        let mut registry = VertexRegistry::with_capacity(4);
        registry
            .get_or_create(VertexLabel::Thread(1), &mut graph)
            .unwrap();

        assert_eq!(registry.find(&VertexLabel::Thread(2)), None);
        // A thread id and a mutex address with the same value are distinct
        assert_eq!(registry.find(&VertexLabel::Mutex(1)), None);
        assert_eq!(registry.find(&VertexLabel::Thread(1)), Some(0));
    }

    #[test]
    fn test_capacity_exhausted() {
        let mut graph = DirectedGraph::with_capacity(2);
        let mut registry = VertexRegistry::with_capacity(2);
        registry
            .get_or_create(VertexLabel::Thread(1), &mut graph)
            .unwrap();
        registry
            .get_or_create(VertexLabel::Mutex(0x10), &mut graph)
            .unwrap();

        assert_eq!(
            registry.get_or_create(VertexLabel::Thread(2), &mut graph),
            Err(DetectorError::CapacityExhausted)
        );
        // Existing vertices are still resolvable
        assert_eq!(registry.find(&VertexLabel::Thread(1)), Some(0));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_failed_install_rolls_back_reservation() {
        // Registry willing to allocate more vertices than the graph can hold
        let mut graph = DirectedGraph::with_capacity(1);
        let mut registry = VertexRegistry::with_capacity(2);
        registry
            .get_or_create(VertexLabel::Thread(1), &mut graph)
            .unwrap();

        assert_eq!(
            registry.get_or_create(VertexLabel::Thread(2), &mut graph),
            Err(DetectorError::AllocationFailed)
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find(&VertexLabel::Thread(2)), None);
    }

    #[test]
    fn test_thread_vertices_skips_mutexes() {
        let mut graph = DirectedGraph::with_capacity(4);
        let mut registry = VertexRegistry::with_capacity(4);
        registry
            .get_or_create(VertexLabel::Thread(5), &mut graph)
            .unwrap();
        registry
            .get_or_create(VertexLabel::Mutex(0x20), &mut graph)
            .unwrap();
        registry
            .get_or_create(VertexLabel::Thread(6), &mut graph)
            .unwrap();

        assert_eq!(registry.thread_vertices(), vec![(0, 5), (2, 6)]);
    }
}
