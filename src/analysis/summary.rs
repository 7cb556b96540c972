//! Fixed-filtration topology of a graph.
//!
//! Filtering by node degree (edges take the larger endpoint degree) gives
//! every graph a diagram without any learned parameters, which is what a
//! topological readout could see before training.

use crate::graph::Graph;
use crate::topology::{graph_persistence, BettiNumbers, GraphDiagram, PersistencePair};

/// Vertex and edge values of the degree filtration
pub fn degree_filtration(graph: &Graph) -> (Vec<f32>, Vec<f32>) {
    let degrees: Vec<f32> = graph.neighbours().iter().map(|n| n.len() as f32).collect();
    let edges = graph.edges.iter().map(|&(u, v)| degrees[u].max(degrees[v])).collect();
    (degrees, edges)
}

#[derive(Debug, Clone)]
pub struct TopologySummary {
    pub betti: BettiNumbers,
    /// Sum of pair lifetimes in dimensions 0 and 1
    pub total_persistence: [f32; 2],
    /// Longest finite lifetime in either dimension
    pub max_persistence: f32,
}

impl TopologySummary {
    pub fn of_graph(graph: &Graph) -> Self {
        let (vertex_values, edge_values) = degree_filtration(graph);
        let diagram = graph_persistence(&vertex_values, &edge_values, &graph.edges, true);
        Self::from_diagram(BettiNumbers::of_graph(graph.n_nodes(), &graph.edges), &diagram)
    }

    fn from_diagram(betti: BettiNumbers, diagram: &GraphDiagram) -> Self {
        let max_persistence = diagram
            .dim0
            .iter()
            .chain(&diagram.dim1)
            .map(PersistencePair::persistence)
            .fold(0.0, f32::max);
        Self {
            betti,
            total_persistence: [diagram.total_persistence(0), diagram.total_persistence(1)],
            max_persistence,
        }
    }

    pub fn euler_characteristic(&self) -> i64 {
        self.betti.euler_characteristic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::synthetic::path_graph;
    use ndarray::Array2;

    fn graph(n: usize, edges: Vec<(usize, usize)>) -> Graph {
        Graph::new(Array2::zeros((n, 1)), edges).unwrap()
    }

    #[test]
    fn test_degree_filtration_values() {
        let (vertex, edge) = degree_filtration(&path_graph(3).unwrap());
        assert_eq!(vertex, vec![1.0, 2.0, 1.0]);
        assert!(edge.iter().all(|&v| v == 2.0));
    }

    #[test]
    fn test_triangle_with_star() {
        // degrees 2, 2, 3, 4, 1, 1, 1; the triangle closes at 3 and lives to 4
        let g = graph(7, vec![(0, 1), (1, 2), (2, 0), (2, 3), (3, 4), (3, 5), (3, 6)]);
        let summary = TopologySummary::of_graph(&g);

        assert_eq!(summary.betti, BettiNumbers { beta_0: 1, beta_1: 1 });
        assert_eq!(summary.euler_characteristic(), 0);
        assert_eq!(summary.total_persistence, [8.0, 1.0]);
        assert_eq!(summary.max_persistence, 3.0);
    }

    #[test]
    fn test_edgeless_graph() {
        let summary = TopologySummary::of_graph(&graph(3, vec![]));
        assert_eq!(summary.betti.beta_0, 3);
        assert_eq!(summary.total_persistence, [0.0, 0.0]);
        assert_eq!(summary.max_persistence, 0.0);
    }
}
