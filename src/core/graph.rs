use crate::core::error::DetectorError;
use crate::core::types::VertexIndex;

/// Fixed-capacity directed graph with labeled vertices
///
/// This is the store behind the resource-allocation graph: vertices carry an
/// optional payload (the thread id or mutex address they stand for) and each
/// vertex owns an adjacency list of destination indices. Edges are plain
/// directed arcs; whether an arc is a wait edge or a hold edge is recovered
/// from its endpoints' payloads.
///
/// Adjacency lists are ordered newest-first (head insertion) and are treated
/// as multisets: `add_edge` does not deduplicate and `remove_edge` removes a
/// single occurrence. Vertices are referenced by dense indices into an arena,
/// so the in-memory representation stays acyclic in ownership even when the
/// modeled graph is cyclic.
///
/// The graph itself is not synchronized; callers serialize access with the
/// detector's graph lock.
pub struct DirectedGraph<V> {
    /// Per-vertex adjacency list, newest edge first
    adjacency: Vec<Vec<VertexIndex>>,
    /// Per-vertex payload, `None` until the vertex is assigned
    payloads: Vec<Option<V>>,
}

impl<V: Clone> DirectedGraph<V> {
    /// Create a graph with capacity for `capacity` vertices, all unassigned
    pub fn with_capacity(capacity: usize) -> Self {
        DirectedGraph {
            adjacency: vec![Vec::new(); capacity],
            payloads: vec![None; capacity],
        }
    }

    /// Number of vertex slots in the graph
    pub fn capacity(&self) -> usize {
        self.adjacency.len()
    }

    /// Store a clone of `payload` at vertex `vertex`, replacing any previous
    /// payload.
    pub fn set_vertex_data(&mut self, vertex: VertexIndex, payload: &V) -> Result<(), DetectorError> {
        if vertex >= self.capacity() {
            return Err(DetectorError::InvalidParameter);
        }
        self.payloads[vertex] = Some(payload.clone());
        Ok(())
    }

    /// Payload stored at `vertex`, if the vertex has been assigned
    pub fn vertex_data(&self, vertex: VertexIndex) -> Option<&V> {
        self.payloads.get(vertex)?.as_ref()
    }

    /// Add a directed edge `src → dst`, prepending it to `src`'s list.
    ///
    /// No deduplication: under correctly paired lock events duplicates never
    /// arise, and a malformed sequence at worst leaves a second occurrence
    /// that a later `remove_edge` takes out.
    pub fn add_edge(&mut self, src: VertexIndex, dst: VertexIndex) -> Result<(), DetectorError> {
        if src >= self.capacity() || dst >= self.capacity() {
            return Err(DetectorError::InvalidParameter);
        }
        self.adjacency[src].insert(0, dst);
        Ok(())
    }

    /// Remove the first occurrence of `src → dst`.
    ///
    /// Returns whether an edge was removed; removing an absent edge is not an
    /// error and mutates nothing.
    pub fn remove_edge(&mut self, src: VertexIndex, dst: VertexIndex) -> bool {
        if src >= self.capacity() || dst >= self.capacity() {
            return false;
        }
        match self.adjacency[src].iter().position(|&d| d == dst) {
            Some(pos) => {
                self.adjacency[src].remove(pos);
                true
            }
            None => false,
        }
    }

    /// Clear a vertex: drop its payload, its outgoing edges, and every edge
    /// pointing to it from other vertices.
    pub fn remove_vertex(&mut self, vertex: VertexIndex) -> Result<(), DetectorError> {
        if vertex >= self.capacity() {
            return Err(DetectorError::InvalidParameter);
        }
        self.payloads[vertex] = None;
        self.adjacency[vertex].clear();
        for (src, list) in self.adjacency.iter_mut().enumerate() {
            if src != vertex {
                list.retain(|&dst| dst != vertex);
            }
        }
        Ok(())
    }

    /// Whether the graph currently contains at least one `src → dst` edge
    pub fn has_edge(&self, src: VertexIndex, dst: VertexIndex) -> bool {
        self.adjacency
            .get(src)
            .is_some_and(|list| list.contains(&dst))
    }

    /// Total number of edges in the graph
    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(Vec::len).sum()
    }

    /// Outgoing edges of `vertex`, newest first
    #[cfg(test)]
    pub fn neighbors(&self, vertex: VertexIndex) -> &[VertexIndex] {
        &self.adjacency[vertex]
    }

    /// True iff a directed cycle is reachable from `start`
    pub fn search_cycle(&self, start: VertexIndex) -> bool {
        self.find_cycle_from(start).is_some()
    }

    /// Find a directed cycle reachable from `start` and return its vertices
    /// in path order.
    ///
    /// Depth-first search with two per-vertex marks: `visited` (seen in this
    /// search) and `on_path` (currently on the recursion stack). Reaching an
    /// `on_path` neighbor is a back edge and closes a cycle; reaching a
    /// vertex that is merely `visited` does not. The DFS path from the back
    /// edge's target onward is the reported cycle, so a self-loop reports a
    /// one-vertex cycle.
    pub fn find_cycle_from(&self, start: VertexIndex) -> Option<Vec<VertexIndex>> {
        if start >= self.capacity() {
            return None;
        }

        let mut visited = vec![false; self.capacity()];
        let mut on_path = vec![false; self.capacity()];
        let mut path = Vec::new();
        self.dfs(start, &mut visited, &mut on_path, &mut path)
    }

    fn dfs(
        &self,
        vertex: VertexIndex,
        visited: &mut [bool],
        on_path: &mut [bool],
        path: &mut Vec<VertexIndex>,
    ) -> Option<Vec<VertexIndex>> {
        visited[vertex] = true;
        on_path[vertex] = true;
        path.push(vertex);

        for &next in &self.adjacency[vertex] {
            if !visited[next] {
                if let Some(cycle) = self.dfs(next, visited, on_path, path) {
                    return Some(cycle);
                }
            } else if on_path[next] {
                // Back edge: the path from `next` onward is the cycle
                let cycle_start = path.iter().position(|&v| v == next).unwrap();
                return Some(path[cycle_start..].to_vec());
            }
        }

        on_path[vertex] = false;
        path.pop();
        None
    }
}
