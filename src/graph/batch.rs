//! Batched Graphs: Disjoint Unions with Slice Tables
//!
//! A mini-batch of `B` graphs is packed into one node axis and one edge
//! axis. Graph `i` occupies nodes `[node_slice[i], node_slice[i+1])` and
//! edges `[edge_slice[i], edge_slice[i+1])`; edges are stored with global
//! (batch-level) node indices.
//!
//! ```text
//!   graph 0          graph 1             node_slice = [0, 3, 7]
//!  ┌─────────┐    ┌─────────────┐        edge_slice = [0, 2, 6]
//!  │ 0  1  2 │    │ 3  4  5  6  │
//!  └─────────┘    └─────────────┘
//! ```

use candle_core::{Device, Tensor};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TopoError};

/// What a label is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelLevel {
    /// One label per graph
    Graph,
    /// One label per node
    Node,
}

impl std::fmt::Display for LabelLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LabelLevel::Graph => write!(f, "graph"),
            LabelLevel::Node => write!(f, "node"),
        }
    }
}

/// A single graph on the host, before collation.
#[derive(Debug, Clone)]
pub struct Graph {
    /// Node feature matrix [n_nodes × n_features]
    pub node_features: Array2<f32>,
    /// Edges as (source, target) node indices, local to this graph
    pub edges: Vec<(usize, usize)>,
    /// Labels: one entry for graph labels, one per node for node labels
    pub labels: Vec<u32>,
    pub label_level: LabelLevel,
}

impl Graph {
    /// Create a graph, checking that every edge endpoint exists.
    pub fn new(node_features: Array2<f32>, edges: Vec<(usize, usize)>) -> Result<Self> {
        let n = node_features.nrows();
        if let Some(&(u, v)) = edges.iter().find(|&&(u, v)| u >= n || v >= n) {
            return Err(TopoError::invalid_batch(format!(
                "edge ({}, {}) out of range for graph with {} nodes",
                u, v, n
            )));
        }
        Ok(Self {
            node_features,
            edges,
            labels: Vec::new(),
            label_level: LabelLevel::Graph,
        })
    }

    /// Attach labels of the given level.
    pub fn with_labels(mut self, labels: Vec<u32>, level: LabelLevel) -> Self {
        self.labels = labels;
        self.label_level = level;
        self
    }

    pub fn n_nodes(&self) -> usize {
        self.node_features.nrows()
    }

    pub fn n_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn n_features(&self) -> usize {
        self.node_features.ncols()
    }

    /// Undirected adjacency lists (duplicate and reverse pairs collapsed).
    pub fn neighbours(&self) -> Vec<Vec<usize>> {
        let mut adj = vec![Vec::new(); self.n_nodes()];
        for &(u, v) in &self.edges {
            if u == v {
                continue;
            }
            adj[u].push(v);
            adj[v].push(u);
        }
        for list in adj.iter_mut() {
            list.sort_unstable();
            list.dedup();
        }
        adj
    }
}

/// Edge list of a batch, on host and on the model device.
#[derive(Debug, Clone)]
pub struct EdgeIndex {
    pairs: Vec<(usize, usize)>,
    src: Tensor,
    dst: Tensor,
    in_degree: Vec<f32>,
    num_nodes: usize,
}

impl EdgeIndex {
    fn new(pairs: Vec<(usize, usize)>, num_nodes: usize, device: &Device) -> Result<Self> {
        let e = pairs.len();
        let src: Vec<u32> = pairs.iter().map(|&(u, _)| u as u32).collect();
        let dst: Vec<u32> = pairs.iter().map(|&(_, v)| v as u32).collect();

        let mut in_degree = vec![0.0f32; num_nodes];
        for &(_, v) in &pairs {
            in_degree[v] += 1.0;
        }

        Ok(Self {
            src: Tensor::from_vec(src, e, device)?,
            dst: Tensor::from_vec(dst, e, device)?,
            pairs,
            in_degree,
            num_nodes,
        })
    }

    /// Host copy of the (source, target) pairs
    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    /// Source indices [E] (u32)
    pub fn src(&self) -> &Tensor {
        &self.src
    }

    /// Target indices [E] (u32)
    pub fn dst(&self) -> &Tensor {
        &self.dst
    }

    /// Number of incoming pairs per node
    pub fn in_degree(&self) -> &[f32] {
        &self.in_degree
    }

    pub fn num_edges(&self) -> usize {
        self.pairs.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Immutable view over a disjoint union of graphs.
#[derive(Debug, Clone)]
pub struct BatchedGraph {
    /// Node features [N × Cin]
    node_features: Tensor,
    /// Edge list with global node indices
    edge_index: EdgeIndex,
    /// B+1 node offsets
    node_slice: Vec<usize>,
    /// B+1 edge offsets
    edge_slice: Vec<usize>,
    /// Graph index of every node
    graph_assignment: Vec<usize>,
    /// Same as `graph_assignment`, as a u32 tensor on the model device
    assignment_tensor: Tensor,
    /// Optional labels (u32)
    labels: Option<Tensor>,
    /// Level of `labels`
    label_level: LabelLevel,
}

impl BatchedGraph {
    /// Build a batch from pre-flattened parts, validating every invariant.
    pub fn new(
        node_features: Tensor,
        edge_index: Vec<(usize, usize)>,
        node_slice: Vec<usize>,
        edge_slice: Vec<usize>,
    ) -> Result<Self> {
        let (n, _) = node_features.dims2()?;
        let e = edge_index.len();

        check_slice("node_slice", &node_slice, n)?;
        check_slice("edge_slice", &edge_slice, e)?;
        if node_slice.len() != edge_slice.len() {
            return Err(TopoError::invalid_batch(format!(
                "node_slice describes {} graphs but edge_slice describes {}",
                node_slice.len() - 1,
                edge_slice.len() - 1
            )));
        }
        if n == 0 {
            return Err(TopoError::invalid_batch("batch has no nodes"));
        }

        for g in 0..node_slice.len() - 1 {
            let nodes = node_slice[g]..node_slice[g + 1];
            for (idx, &(u, v)) in edge_index[edge_slice[g]..edge_slice[g + 1]].iter().enumerate() {
                if !nodes.contains(&u) || !nodes.contains(&v) {
                    return Err(TopoError::invalid_batch(format!(
                        "edge {} ({}, {}) of graph {} leaves node range {:?}",
                        edge_slice[g] + idx,
                        u,
                        v,
                        g,
                        nodes
                    )));
                }
            }
        }

        let mut graph_assignment = vec![0usize; n];
        for g in 0..node_slice.len() - 1 {
            for slot in &mut graph_assignment[node_slice[g]..node_slice[g + 1]] {
                *slot = g;
            }
        }

        let device = node_features.device().clone();
        let assignment: Vec<u32> = graph_assignment.iter().map(|&g| g as u32).collect();
        let assignment_tensor = Tensor::from_vec(assignment, n, &device)?;
        let edge_index = EdgeIndex::new(edge_index, n, &device)?;

        Ok(Self {
            node_features,
            edge_index,
            node_slice,
            edge_slice,
            graph_assignment,
            assignment_tensor,
            labels: None,
            label_level: LabelLevel::Graph,
        })
    }

    /// Collate host graphs into one batch (labels concatenated in order).
    pub fn from_graphs(graphs: &[Graph], device: &Device) -> Result<Self> {
        if graphs.is_empty() {
            return Err(TopoError::invalid_batch("cannot collate an empty list of graphs"));
        }
        let n_features = graphs[0].n_features();
        if let Some(bad) = graphs.iter().position(|g| g.n_features() != n_features) {
            return Err(TopoError::invalid_batch(format!(
                "graph {} has {} features, expected {}",
                bad,
                graphs[bad].n_features(),
                n_features
            )));
        }

        let mut labelled = graphs.iter().filter(|g| !g.labels.is_empty());
        let level = labelled.next().map_or(LabelLevel::Graph, |g| g.label_level);
        if let Some(other) = labelled.find(|g| g.label_level != level) {
            return Err(TopoError::invalid_batch(format!(
                "cannot collate {} labels with {} labels",
                level, other.label_level
            )));
        }

        let total_nodes: usize = graphs.iter().map(Graph::n_nodes).sum();
        let mut features = Vec::with_capacity(total_nodes * n_features);
        let mut edges = Vec::new();
        let mut labels = Vec::new();
        let mut node_slice = vec![0usize];
        let mut edge_slice = vec![0usize];

        for graph in graphs {
            let offset = *node_slice.last().unwrap_or(&0);
            features.extend(graph.node_features.iter().copied());
            edges.extend(graph.edges.iter().map(|&(u, v)| (u + offset, v + offset)));
            labels.extend(graph.labels.iter().copied());
            node_slice.push(offset + graph.n_nodes());
            edge_slice.push(edges.len());
        }

        let node_features = Tensor::from_vec(features, (total_nodes, n_features), device)?;
        let batch = Self::new(node_features, edges, node_slice, edge_slice)?;

        if labels.is_empty() {
            Ok(batch)
        } else {
            let n_labels = labels.len();
            batch.with_labels(Tensor::from_vec(labels, n_labels, device)?, level)
        }
    }

    /// Attach labels: [B] for graph labels, [N] for node labels.
    pub fn with_labels(mut self, labels: Tensor, level: LabelLevel) -> Result<Self> {
        let len = labels.dims1()?;
        let expected = match level {
            LabelLevel::Graph => self.num_graphs(),
            LabelLevel::Node => self.num_nodes(),
        };
        if len != expected {
            return Err(TopoError::invalid_batch(format!(
                "{} {} labels for a batch that needs {}",
                len, level, expected
            )));
        }
        self.labels = Some(labels);
        self.label_level = level;
        Ok(self)
    }

    /// Re-pack the batch with graphs in `order` (each graph's internal
    /// node and edge order is kept). Labels follow their graph or node.
    pub fn select_graphs(&self, order: &[usize]) -> Result<Self> {
        let b = self.num_graphs();
        if let Some(&bad) = order.iter().find(|&&g| g >= b) {
            return Err(TopoError::invalid_batch(format!(
                "graph {} out of range for batch of {}",
                bad, b
            )));
        }

        let mut node_order = Vec::with_capacity(self.num_nodes());
        let mut edges = Vec::with_capacity(self.num_edges());
        let mut node_slice = vec![0usize];
        let mut edge_slice = vec![0usize];

        for &g in order {
            let old = self.node_range(g);
            let offset = node_order.len();
            node_order.extend(old.clone().map(|i| i as u32));
            for &(u, v) in &self.edge_index.pairs()[self.edge_range(g)] {
                edges.push((u - old.start + offset, v - old.start + offset));
            }
            node_slice.push(node_order.len());
            edge_slice.push(edges.len());
        }

        let n_selected = node_order.len();
        let index = Tensor::from_vec(node_order, n_selected, self.device())?;
        let features = self.node_features.index_select(&index, 0)?;
        let batch = Self::new(features, edges, node_slice, edge_slice)?;

        match (&self.labels, self.label_level) {
            (Some(labels), LabelLevel::Graph) => {
                let graph_index: Vec<u32> = order.iter().map(|&g| g as u32).collect();
                let graph_index = Tensor::from_vec(graph_index, order.len(), self.device())?;
                batch.with_labels(labels.index_select(&graph_index, 0)?, LabelLevel::Graph)
            }
            (Some(labels), LabelLevel::Node) => batch.with_labels(labels.index_select(&index, 0)?, LabelLevel::Node),
            (None, _) => Ok(batch),
        }
    }

    pub fn node_features(&self) -> &Tensor {
        &self.node_features
    }

    pub fn edge_index(&self) -> &EdgeIndex {
        &self.edge_index
    }

    pub fn node_slice(&self) -> &[usize] {
        &self.node_slice
    }

    pub fn edge_slice(&self) -> &[usize] {
        &self.edge_slice
    }

    pub fn graph_assignment(&self) -> &[usize] {
        &self.graph_assignment
    }

    /// Graph index per node as a u32 tensor [N]
    pub fn assignment_tensor(&self) -> &Tensor {
        &self.assignment_tensor
    }

    pub fn labels(&self) -> Option<&Tensor> {
        self.labels.as_ref()
    }

    pub fn label_level(&self) -> LabelLevel {
        self.label_level
    }

    pub fn device(&self) -> &Device {
        self.node_features.device()
    }

    pub fn num_graphs(&self) -> usize {
        self.node_slice.len() - 1
    }

    pub fn num_nodes(&self) -> usize {
        self.graph_assignment.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edge_index.num_edges()
    }

    pub fn node_range(&self, graph: usize) -> std::ops::Range<usize> {
        self.node_slice[graph]..self.node_slice[graph + 1]
    }

    pub fn edge_range(&self, graph: usize) -> std::ops::Range<usize> {
        self.edge_slice[graph]..self.edge_slice[graph + 1]
    }

    pub fn node_count(&self, graph: usize) -> usize {
        self.node_slice[graph + 1] - self.node_slice[graph]
    }

    pub fn edge_count(&self, graph: usize) -> usize {
        self.edge_slice[graph + 1] - self.edge_slice[graph]
    }
}

/// Offsets must start at 0, end at `total` and never decrease.
fn check_slice(name: &str, slice: &[usize], total: usize) -> Result<()> {
    if slice.len() < 2 {
        return Err(TopoError::invalid_batch(format!(
            "{} needs at least two offsets, got {}",
            name,
            slice.len()
        )));
    }
    if slice[0] != 0 {
        return Err(TopoError::invalid_batch(format!("{} must start at 0, starts at {}", name, slice[0])));
    }
    if slice[slice.len() - 1] != total {
        return Err(TopoError::invalid_batch(format!(
            "{} must end at {}, ends at {}",
            name,
            total,
            slice[slice.len() - 1]
        )));
    }
    if let Some(w) = slice.windows(2).position(|w| w[1] < w[0]) {
        return Err(TopoError::invalid_batch(format!("{} decreases at position {}", name, w + 1)));
    }
    Ok(())
}
