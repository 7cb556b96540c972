//! Betti Numbers of Graphs
//!
//! For a graph viewed as a 1-dimensional complex:
//!
//! - β₀: number of connected components
//! - β₁: number of independent cycles, β₁ = E - V + β₀
//!
//! β₁ bounds the dimension-1 pair count of any filtration of the graph,
//! and V - β₀ is exactly its dimension-0 pair count.

use std::collections::HashSet;

use super::union_find::UnionFind;

/// Betti numbers of a whole graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BettiNumbers {
    pub beta_0: usize, // Connected components
    pub beta_1: usize, // Cycles
}

impl BettiNumbers {
    pub fn of_graph(n_vertices: usize, edges: &[(usize, usize)]) -> Self {
        let unique = unique_edges(edges);
        let mut uf = UnionFind::new(n_vertices);
        for &(u, v) in &unique {
            let (ru, rv) = (uf.find(u), uf.find(v));
            if ru != rv {
                uf.merge_into(ru.min(rv), ru.max(rv));
            }
        }
        let beta_0 = uf.count_roots();
        let beta_1 = unique.len() + beta_0 - n_vertices;

        Self { beta_0, beta_1 }
    }

    /// Euler characteristic χ = β₀ - β₁
    pub fn euler_characteristic(&self) -> i64 {
        self.beta_0 as i64 - self.beta_1 as i64
    }
}

/// Drop self loops and repeated vertex pairs (either direction)
fn unique_edges(edges: &[(usize, usize)]) -> Vec<(usize, usize)> {
    let mut seen = HashSet::with_capacity(edges.len());
    edges
        .iter()
        .filter(|&&(u, v)| u != v && seen.insert((u.min(v), u.max(v))))
        .copied()
        .collect()
}
