//! Topology Module: Persistent Homology of Filtered Graphs
//!
//! Implements the persistence side of the topological layer:
//! - Union-find with elder-rule merging
//! - Per-graph persistence diagrams (components and cycles) with generators
//! - Batched extraction over every (filtration, graph) lane
//! - Host staging of filtration values and on-device re-gathering of pairs
//! - Betti numbers of graphs
//!
//! ## Mathematical Background
//!
//! A graph G = (V, E) with values f: V → ℝ is filtered by sublevel sets
//!
//!   G_t = { v : f(v) ≤ t } ∪ { (u, v) : max(f(u), f(v)) ≤ t }
//!
//! Extending f to edges by max makes every G_t a subgraph, so the sweep
//! t → ∞ is a valid filtration. Its persistent homology tracks the
//! birth and death of connected components (H₀) and cycles (H₁).
//!
//! ## Pair Counts
//!
//! For a graph with n vertices, m distinct edges and k components:
//!
//!   |H₀ pairs| = n - k        |H₁ pairs| = β₁ = m - n + k
//!
//! ## Gradients
//!
//! Pair coordinates are always the value of some vertex or edge (the
//! generator). The persistence sweep itself runs on the host; the values
//! are gathered again from the differentiable filtration tensor, so the
//! diagram is differentiable almost everywhere in the filtration.

mod batched;
mod betti;
mod persistence;
mod staging;
mod union_find;

pub use batched::{
    PairBlock, ParallelPersistence, PersistenceBackend, PersistenceInput, PersistencePairs,
    SequentialPersistence,
};
pub use betti::BettiNumbers;
pub use persistence::{
    first_non_monotone_edge, graph_persistence, Generator, GraphDiagram, PersistencePair,
};
pub use staging::{HostStaging, PairTensors};
pub use union_find::UnionFind;
