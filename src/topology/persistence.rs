//! Persistent Homology of a Filtered Graph
//!
//! A graph with scalar values on its vertices and edges is swept in
//! increasing filtration order. A persistence pair (b, d) records a
//! topological feature that is born at value b and dies at value d.
//!
//! ## Dimension 0 (components)
//!
//! Every vertex starts its own component. When an edge joins two
//! components, the younger one (larger birth value) dies at the edge's
//! value: the elder rule. A connected graph on n vertices produces
//! exactly n - 1 pairs; the surviving component is essential and is not
//! reported.
//!
//! ## Dimension 1 (cycles)
//!
//! An edge whose endpoints are already connected closes an independent
//! cycle. A graph has no 2-simplices to fill it, so every cycle lives to
//! the end of the sweep: its death is the largest edge value of the graph.
//! The number of pairs is the first Betti number β₁ = E - V + β₀.
//!
//! ## Ordering
//!
//! Edges are swept by (value, index). Components are compared by
//! (birth value, root vertex index). Equal values are therefore resolved
//! by the lower original index, which keeps the output (and the
//! generators gradients are routed through) reproducible.

use std::cmp::Ordering;
use std::collections::HashSet;

use super::union_find::UnionFind;

/// The simplex whose filtration value a pair coordinate was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generator {
    /// Vertex index (local to the graph)
    Vertex(usize),
    /// Edge index (local to the graph)
    Edge(usize),
}

/// A persistence pair [birth, death) with its generating simplices
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PersistencePair {
    pub birth: f32,
    pub death: f32,
    pub birth_generator: Generator,
    pub death_generator: Generator,
}

impl PersistencePair {
    /// Lifetime of the feature
    pub fn persistence(&self) -> f32 {
        self.death - self.birth
    }
}

/// Finite persistence pairs of one filtered graph
#[derive(Debug, Clone, Default)]
pub struct GraphDiagram {
    /// Component merges
    pub dim0: Vec<PersistencePair>,
    /// Independent cycles
    pub dim1: Vec<PersistencePair>,
}

impl GraphDiagram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pairs for dimension d (only 0 and 1 exist for graphs)
    pub fn dim(&self, d: usize) -> &[PersistencePair] {
        match d {
            0 => &self.dim0,
            1 => &self.dim1,
            _ => &[],
        }
    }

    /// Total persistence in dimension d
    pub fn total_persistence(&self, d: usize) -> f32 {
        self.dim(d).iter().map(PersistencePair::persistence).sum()
    }
}

/// Total order on filtration values (NaN sorts last, never panics)
fn by_value(values: &[f32], a: usize, b: usize) -> Ordering {
    values[a].total_cmp(&values[b]).then(a.cmp(&b))
}

/// Compute the persistence diagram of one filtered graph.
///
/// # Arguments
/// * `vertex_values` - Filtration value per vertex
/// * `edge_values` - Filtration value per edge (must dominate both endpoints)
/// * `edges` - Edge endpoints, local vertex indices
/// * `with_cycles` - Also report dimension-1 pairs
///
/// Edges repeating an already swept vertex pair (in either direction) and
/// self loops are skipped: they are not new simplices.
pub fn graph_persistence(
    vertex_values: &[f32],
    edge_values: &[f32],
    edges: &[(usize, usize)],
    with_cycles: bool,
) -> GraphDiagram {
    let mut diagram = GraphDiagram::new();
    let mut uf = UnionFind::new(vertex_values.len());

    let mut order: Vec<usize> = (0..edges.len()).collect();
    order.sort_by(|&a, &b| by_value(edge_values, a, b));

    let mut seen: HashSet<(usize, usize)> = HashSet::with_capacity(edges.len());
    let mut cycle_edges: Vec<usize> = Vec::new();
    let mut last_edge: Option<usize> = None;

    for e in order {
        let (u, v) = edges[e];
        if u == v || !seen.insert((u.min(v), u.max(v))) {
            continue;
        }
        last_edge = Some(e);

        let ru = uf.find(u);
        let rv = uf.find(v);

        if ru == rv {
            cycle_edges.push(e);
            continue;
        }

        let (elder, younger) = if by_value(vertex_values, ru, rv) == Ordering::Greater {
            (rv, ru)
        } else {
            (ru, rv)
        };
        uf.merge_into(elder, younger);

        diagram.dim0.push(PersistencePair {
            birth: vertex_values[younger],
            death: edge_values[e],
            birth_generator: Generator::Vertex(younger),
            death_generator: Generator::Edge(e),
        });
    }

    // The sweep ends at the largest edge; with the total order above that is
    // the last unique edge processed.
    if with_cycles {
        if let Some(end) = last_edge {
            diagram.dim1 = cycle_edges
                .into_iter()
                .map(|e| PersistencePair {
                    birth: edge_values[e],
                    death: edge_values[end],
                    birth_generator: Generator::Edge(e),
                    death_generator: Generator::Edge(end),
                })
                .collect();
        }
    }

    diagram
}

/// Index of the first edge whose value precedes one of its endpoints
pub fn first_non_monotone_edge(
    vertex_values: &[f32],
    edge_values: &[f32],
    edges: &[(usize, usize)],
) -> Option<usize> {
    edges.iter().zip(edge_values).position(|(&(u, v), &value)| {
        value < vertex_values[u] || value < vertex_values[v]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge_max(values: &[f32], edges: &[(usize, usize)]) -> Vec<f32> {
        edges.iter().map(|&(u, v)| values[u].max(values[v])).collect()
    }

    #[test]
    fn test_path_components() {
        // 0 - 1 - 2 with values 0, 2, 1
        let values = [0.0, 2.0, 1.0];
        let edges = [(0, 1), (1, 2)];
        let pd = graph_persistence(&values, &edge_max(&values, &edges), &edges, true);

        assert_eq!(pd.dim0.len(), 2);
        assert!(pd.dim1.is_empty());

        // Both edges enter at 2.0; edge 0 first (lower index) kills vertex 1.
        assert_eq!(pd.dim0[0].birth, 2.0);
        assert_eq!(pd.dim0[0].birth_generator, Generator::Vertex(1));
        assert_eq!(pd.dim0[0].death_generator, Generator::Edge(0));
        // Then edge 1 kills the component born at vertex 2 (value 1.0).
        assert_eq!(pd.dim0[1].birth, 1.0);
        assert_eq!(pd.dim0[1].birth_generator, Generator::Vertex(2));
    }

    #[test]
    fn test_connected_graph_has_n_minus_one_pairs() {
        let values = [3.0, 1.0, 4.0, 1.5, 9.0, 2.6];
        let edges = [(0, 1), (1, 2), (2, 3), (3, 4), (4, 5), (5, 0), (1, 4)];
        let pd = graph_persistence(&values, &edge_max(&values, &edges), &edges, true);

        assert_eq!(pd.dim0.len(), values.len() - 1);
        assert_eq!(pd.dim1.len(), edges.len() - values.len() + 1);
        for pair in pd.dim0.iter().chain(pd.dim1.iter()) {
            assert!(pair.death >= pair.birth);
        }
    }

    #[test]
    fn test_square_cycle() {
        let values = [0.0, 1.0, 2.0, 3.0];
        let edges = [(0, 1), (1, 2), (2, 3), (3, 0)];
        let pd = graph_persistence(&values, &edge_max(&values, &edges), &edges, true);

        assert_eq!(pd.dim0.len(), 3);
        assert_eq!(pd.dim1.len(), 1);
        // Edge (2,3) and (3,0) both enter at 3.0; (2,3) has the lower index
        // and merges, (3,0) closes the cycle.
        assert_eq!(pd.dim1[0].birth_generator, Generator::Edge(3));
        assert_eq!(pd.dim1[0].birth, 3.0);
        assert_eq!(pd.dim1[0].death, 3.0);
    }

    #[test]
    fn test_disconnected_components_never_merge() {
        let values = [0.0, 1.0, 5.0, 6.0, 7.0];
        let edges = [(0, 1), (2, 3)];
        let pd = graph_persistence(&values, &edge_max(&values, &edges), &edges, true);

        // 5 vertices, 3 components
        assert_eq!(pd.dim0.len(), 2);
        assert!(pd.dim1.is_empty());
    }

    #[test]
    fn test_reverse_duplicates_and_self_loops_ignored() {
        let values = [0.0, 1.0, 2.0];
        let edges = [(0, 1), (1, 0), (1, 2), (2, 1), (2, 2)];
        let pd = graph_persistence(&values, &edge_max(&values, &edges), &edges, true);

        assert_eq!(pd.dim0.len(), 2);
        assert!(pd.dim1.is_empty());
    }

    #[test]
    fn test_trivial_graphs() {
        let pd = graph_persistence(&[], &[], &[], true);
        assert!(pd.dim0.is_empty() && pd.dim1.is_empty());

        let pd = graph_persistence(&[4.0], &[], &[], true);
        assert!(pd.dim0.is_empty() && pd.dim1.is_empty());
    }

    #[test]
    fn test_elder_rule_keeps_oldest_component() {
        // Two components {0,1} (born 0.0) and {2,3} (born 0.5) joined last
        // by (1,3), which ties with (2,3) at 0.6 but has the higher index.
        let values = [0.0, 0.2, 0.5, 0.6];
        let edges = [(0, 1), (2, 3), (1, 3)];
        let pd = graph_persistence(&values, &edge_max(&values, &edges), &edges, false);

        let last = pd.dim0.last().unwrap();
        assert_eq!(last.birth, 0.5);
        assert_eq!(last.birth_generator, Generator::Vertex(2));
        assert_eq!(last.death, 0.6);
        assert_eq!(last.death_generator, Generator::Edge(2));
    }

    #[test]
    fn test_non_monotone_detection() {
        let values = [0.0, 1.0];
        assert_eq!(first_non_monotone_edge(&values, &[0.5], &[(0, 1)]), Some(0));
        assert_eq!(first_non_monotone_edge(&values, &[1.0], &[(0, 1)]), None);
    }
}
