//! Synthetic Graph Families
//!
//! Small generators used by the demo binaries and the tests:
//!
//! - `cycle_graph(n)`: C_n, one independent cycle
//! - `path_graph(n)`: P_n, a tree
//! - `random_tree(n)`: uniform attachment tree
//! - `CyclesDataset`: balanced "does this graph contain a cycle?" task
//!
//! With constant node features the cycles task cannot be solved by
//! features alone; a random tree and the same tree with one extra edge
//! differ only in their first Betti number. Undirected edges are stored
//! in both directions.

use std::collections::HashSet;
use std::collections::VecDeque;

use candle_core::Device;
use log::debug;
use ndarray::Array2;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use super::batch::{BatchedGraph, Graph, LabelLevel};
use crate::error::{Result, TopoError};

/// Both directions of every undirected edge
fn symmetric(undirected: &[(usize, usize)]) -> Vec<(usize, usize)> {
    undirected.iter().flat_map(|&(u, v)| [(u, v), (v, u)]).collect()
}

fn constant_features(n: usize) -> Array2<f32> {
    Array2::ones((n, 1))
}

/// Cycle graph C_n (n ≥ 3) with constant features
pub fn cycle_graph(n: usize) -> Result<Graph> {
    if n < 3 {
        return Err(TopoError::config(format!("a cycle needs at least 3 nodes, got {}", n)));
    }
    let edges: Vec<(usize, usize)> = (0..n).map(|i| (i, (i + 1) % n)).collect();
    Graph::new(constant_features(n), symmetric(&edges))
}

/// Path graph P_n (n ≥ 1) with constant features
pub fn path_graph(n: usize) -> Result<Graph> {
    if n == 0 {
        return Err(TopoError::config("a path needs at least one node"));
    }
    let edges: Vec<(usize, usize)> = (1..n).map(|i| (i - 1, i)).collect();
    Graph::new(constant_features(n), symmetric(&edges))
}

/// Undirected edges of a random tree: node i attaches to a uniform earlier node
pub fn random_tree<R: Rng>(n: usize, rng: &mut R) -> Vec<(usize, usize)> {
    (1..n).map(|i| (rng.random_range(0..i), i)).collect()
}

/// Nodes on the tree path between `from` and `to` (inclusive)
fn tree_path(n: usize, tree: &[(usize, usize)], from: usize, to: usize) -> Vec<usize> {
    let mut adj = vec![Vec::new(); n];
    for &(u, v) in tree {
        adj[u].push(v);
        adj[v].push(u);
    }

    let mut parent = vec![usize::MAX; n];
    parent[from] = from;
    let mut queue = VecDeque::from([from]);
    while let Some(u) = queue.pop_front() {
        for &v in &adj[u] {
            if parent[v] == usize::MAX {
                parent[v] = u;
                queue.push_back(v);
            }
        }
    }

    let mut path = vec![to];
    let mut node = to;
    while node != from {
        node = parent[node];
        path.push(node);
    }
    path
}

/// Parameters of the cycles dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CyclesConfig {
    /// Number of graphs
    pub n_graphs: usize,
    /// Smallest graph size (≥ 3)
    pub min_nodes: usize,
    /// Largest graph size (inclusive)
    pub max_nodes: usize,
    /// Feature columns: column 0 is constant 1, the rest are noise
    pub n_features: usize,
    /// Standard deviation of the noise columns
    pub feature_noise: f32,
    /// Graph labels: 1 if the graph has a cycle. Node labels: 1 if the
    /// node lies on a cycle.
    pub labels: LabelLevel,
}

impl Default for CyclesConfig {
    fn default() -> Self {
        Self {
            n_graphs: 200,
            min_nodes: 5,
            max_nodes: 12,
            n_features: 3,
            feature_noise: 0.1,
            labels: LabelLevel::Graph,
        }
    }
}

impl CyclesConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_nodes < 3 || self.max_nodes < self.min_nodes {
            return Err(TopoError::config(format!(
                "graph sizes must satisfy 3 <= min_nodes <= max_nodes, got {}..={}",
                self.min_nodes, self.max_nodes
            )));
        }
        if self.n_features == 0 {
            return Err(TopoError::config("n_features must be positive"));
        }
        if !(self.feature_noise >= 0.0) {
            return Err(TopoError::config(format!("feature_noise must be >= 0, got {}", self.feature_noise)));
        }
        Ok(())
    }
}

/// Balanced dataset of trees (label 0) and trees with one extra edge (label 1)
#[derive(Debug, Clone)]
pub struct CyclesDataset {
    pub graphs: Vec<Graph>,
    pub config: CyclesConfig,
}

impl CyclesDataset {
    pub fn generate<R: Rng>(config: &CyclesConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;
        let noise = Normal::new(0.0f32, config.feature_noise)
            .map_err(|e| TopoError::config(format!("feature noise: {}", e)))?;

        let mut graphs = Vec::with_capacity(config.n_graphs);
        for i in 0..config.n_graphs {
            let n = rng.random_range(config.min_nodes..=config.max_nodes);
            let mut edges = random_tree(n, rng);
            let mut on_cycle = vec![0u32; n];

            let has_cycle = i % 2 == 1;
            if has_cycle {
                let present: HashSet<(usize, usize)> =
                    edges.iter().map(|&(u, v)| (u.min(v), u.max(v))).collect();
                let candidates: Vec<(usize, usize)> = (0..n)
                    .flat_map(|u| (u + 1..n).map(move |v| (u, v)))
                    .filter(|pair| !present.contains(pair))
                    .collect();
                // A tree on n ≥ 3 nodes always has a non-adjacent pair
                if let Some(&(u, v)) = candidates.choose(rng) {
                    for node in tree_path(n, &edges, u, v) {
                        on_cycle[node] = 1;
                    }
                    edges.push((u, v));
                }
            }

            let mut features = Array2::<f32>::zeros((n, config.n_features));
            for mut row in features.rows_mut() {
                row[0] = 1.0;
                for value in row.iter_mut().skip(1) {
                    *value = noise.sample(rng);
                }
            }

            let labels = match config.labels {
                LabelLevel::Graph => vec![has_cycle as u32],
                LabelLevel::Node => on_cycle,
            };
            graphs.push(Graph::new(features, symmetric(&edges))?.with_labels(labels, config.labels));
        }

        debug!(
            "generated {} cycle-task graphs with {}..={} nodes",
            graphs.len(),
            config.min_nodes,
            config.max_nodes
        );
        Ok(Self {
            graphs,
            config: config.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    /// Split off the last `fraction` of the graphs
    pub fn split(&self, fraction: f64) -> (Vec<Graph>, Vec<Graph>) {
        let held_out = ((self.graphs.len() as f64) * fraction.clamp(0.0, 1.0)).round() as usize;
        let (train, test) = self.graphs.split_at(self.graphs.len() - held_out);
        (train.to_vec(), test.to_vec())
    }
}

/// Collate graphs into one batch
pub fn collate(graphs: &[Graph], device: &Device) -> Result<BatchedGraph> {
    BatchedGraph::from_graphs(graphs, device)
}

/// Mini-batches of at most `batch_size` graphs, in a shuffled order when an
/// rng is given.
pub fn mini_batches<R: Rng>(
    graphs: &[Graph],
    batch_size: usize,
    rng: Option<&mut R>,
    device: &Device,
) -> Result<Vec<BatchedGraph>> {
    if batch_size == 0 {
        return Err(TopoError::config("batch_size must be positive"));
    }
    let mut order: Vec<usize> = (0..graphs.len()).collect();
    if let Some(rng) = rng {
        order.shuffle(rng);
    }

    order
        .chunks(batch_size)
        .map(|chunk| {
            let members: Vec<Graph> = chunk.iter().map(|&i| graphs[i].clone()).collect();
            collate(&members, device)
        })
        .collect()
}
