//! Batched Persistence Extraction
//!
//! The persistence routine runs once per (filtration, graph) lane over a
//! whole mini-batch and returns fixed-capacity pair arrays:
//!
//! ```text
//!   input                                  output
//!   vertex_values [F, N]  ─┐
//!   edge_values   [F, E]  ─┤  ┌─────────┐   dim0 [F, B, cap0, 2]
//!   edge_index    [E]     ─┼─▶│ backend │─▶ dim1 [F, B, cap1, 2]  (optional)
//!   node_slice    [B+1]   ─┤  └─────────┘   + counts, generators
//!   edge_slice    [B+1]   ─┘
//! ```
//!
//! Slots beyond a lane's pair count hold the (0, 0) sentinel; `counts` is
//! the explicit validity information. `generators` index the simplex each
//! value was read from in the per-filtration concatenation
//! `[vertex values (N) ; edge values (E)]`, so the values can be gathered
//! again from a differentiable tensor.
//!
//! Lanes are independent: a graph's pairs never depend on the other graphs
//! in the batch or on its position in the batch.

use ndarray::{Array2, Array4, ArrayView2};
use rayon::prelude::*;

use super::persistence::{
    first_non_monotone_edge, graph_persistence, Generator, GraphDiagram, PersistencePair,
};
use crate::error::{Result, TopoError};

/// Host-side input of the persistence routine (filtration-major)
#[derive(Debug, Clone)]
pub struct PersistenceInput<'a> {
    /// Vertex filtration values [F, N]
    pub vertex_values: ArrayView2<'a, f32>,
    /// Edge filtration values [F, E]
    pub edge_values: ArrayView2<'a, f32>,
    /// Edge endpoints, global node indices
    pub edge_index: &'a [(usize, usize)],
    /// B+1 node offsets
    pub node_slice: &'a [usize],
    /// B+1 edge offsets
    pub edge_slice: &'a [usize],
}

impl<'a> PersistenceInput<'a> {
    pub fn num_filtrations(&self) -> usize {
        self.vertex_values.nrows()
    }

    pub fn num_graphs(&self) -> usize {
        self.node_slice.len().saturating_sub(1)
    }

    pub fn num_nodes(&self) -> usize {
        self.vertex_values.ncols()
    }

    pub fn num_edges(&self) -> usize {
        self.edge_values.ncols()
    }

    /// Check that every array agrees with the slice tables
    pub fn validate(&self) -> Result<()> {
        let (f, n, e) = (self.num_filtrations(), self.num_nodes(), self.num_edges());
        if self.edge_values.nrows() != f {
            return Err(TopoError::persistence(format!(
                "{} vertex filtrations but {} edge filtrations",
                f,
                self.edge_values.nrows()
            )));
        }
        if self.edge_index.len() != e {
            return Err(TopoError::persistence(format!(
                "{} edge values per filtration but {} edges",
                e,
                self.edge_index.len()
            )));
        }
        if self.node_slice.len() < 2 || self.node_slice.len() != self.edge_slice.len() {
            return Err(TopoError::persistence(format!(
                "slice tables of lengths {} and {} do not describe a batch",
                self.node_slice.len(),
                self.edge_slice.len()
            )));
        }
        if self.node_slice.last() != Some(&n) || self.edge_slice.last() != Some(&e) {
            return Err(TopoError::persistence(format!(
                "slice tables end at ({:?}, {:?}) but input has {} nodes and {} edges",
                self.node_slice.last(),
                self.edge_slice.last(),
                n,
                e
            )));
        }
        Ok(())
    }

    /// Local view of graph `g` under filtration `f`
    fn lane(&self, f: usize, g: usize) -> Result<Lane> {
        let nodes = self.node_slice[g]..self.node_slice[g + 1];
        let edges = self.edge_slice[g]..self.edge_slice[g + 1];
        let offset = nodes.start;

        let vertex_row = self.vertex_values.row(f);
        let edge_row = self.edge_values.row(f);
        let vertex_values: Vec<f32> = nodes.clone().map(|i| vertex_row[i]).collect();
        let edge_values: Vec<f32> = edges.clone().map(|e| edge_row[e]).collect();

        let mut local_edges = Vec::with_capacity(edges.len());
        for &(u, v) in &self.edge_index[edges.clone()] {
            if !nodes.contains(&u) || !nodes.contains(&v) {
                return Err(TopoError::persistence(format!(
                    "edge ({}, {}) of graph {} leaves node range {:?}",
                    u, v, g, nodes
                )));
            }
            local_edges.push((u - offset, v - offset));
        }

        if let Some(bad) = first_non_monotone_edge(&vertex_values, &edge_values, &local_edges) {
            return Err(TopoError::persistence(format!(
                "edge {} of graph {} enters the filtration ({}) before one of its endpoints",
                edges.start + bad,
                g,
                edge_values[bad]
            )));
        }

        Ok(Lane {
            vertex_values,
            edge_values,
            edges: local_edges,
            node_offset: offset,
            edge_offset: edges.start,
        })
    }
}

/// One (filtration, graph) unit of work, in local indices
struct Lane {
    vertex_values: Vec<f32>,
    edge_values: Vec<f32>,
    edges: Vec<(usize, usize)>,
    node_offset: usize,
    edge_offset: usize,
}

impl Lane {
    fn run(&self, with_cycles: bool) -> GraphDiagram {
        graph_persistence(&self.vertex_values, &self.edge_values, &self.edges, with_cycles)
    }
}

/// Fixed-capacity pairs of one homology dimension
#[derive(Debug, Clone)]
pub struct PairBlock {
    /// (birth, death) per slot [F, B, cap, 2]; (0, 0) in unused slots
    pub values: Array4<f32>,
    /// Generator index into [vertices (N) ; edges (E)] per slot [F, B, cap, 2]
    pub generators: Array4<usize>,
    /// Valid pairs per lane [F, B]
    pub counts: Array2<usize>,
}

impl PairBlock {
    pub fn num_filtrations(&self) -> usize {
        self.values.shape()[0]
    }

    pub fn num_graphs(&self) -> usize {
        self.values.shape()[1]
    }

    pub fn capacity(&self) -> usize {
        self.values.shape()[2]
    }

    /// Valid (birth, death) pairs of graph `g` under filtration `f`
    pub fn pairs(&self, f: usize, g: usize) -> Vec<(f32, f32)> {
        (0..self.counts[[f, g]])
            .map(|slot| (self.values[[f, g, slot, 0]], self.values[[f, g, slot, 1]]))
            .collect()
    }

    /// Validity mask [F, B, cap] as 0/1 values, row-major
    pub fn mask(&self) -> Vec<f32> {
        let (f, b, cap) = (self.num_filtrations(), self.num_graphs(), self.capacity());
        let mut mask = Vec::with_capacity(f * b * cap);
        for fi in 0..f {
            for g in 0..b {
                let count = self.counts[[fi, g]];
                mask.extend((0..cap).map(|slot| if slot < count { 1.0 } else { 0.0 }));
            }
        }
        mask
    }

    /// Valid pairs of filtration `f` as (flat slot `g * cap + slot`, global
    /// index of the birth generator). Component pairs are born at a vertex,
    /// and every vertex dies at most once, so the births are distinct.
    pub fn births(&self, f: usize) -> (Vec<u32>, Vec<u32>) {
        let (b, cap) = (self.num_graphs(), self.capacity());
        (0..b)
            .flat_map(|g| (0..self.counts[[f, g]]).map(move |slot| (g, slot)))
            .map(|(g, slot)| ((g * cap + slot) as u32, self.generators[[f, g, slot, 0]] as u32))
            .unzip()
    }

    /// Total number of valid pairs
    pub fn total_pairs(&self) -> usize {
        self.counts.sum()
    }
}

/// Output of one persistence call
#[derive(Debug, Clone)]
pub struct PersistencePairs {
    /// Component merges
    pub dim0: PairBlock,
    /// Cycles, when requested
    pub dim1: Option<PairBlock>,
}

impl PersistencePairs {
    pub fn num_filtrations(&self) -> usize {
        self.dim0.num_filtrations()
    }

    pub fn num_graphs(&self) -> usize {
        self.dim0.num_graphs()
    }

    /// Pack per-lane diagrams (lane index = f * B + g) into fixed blocks
    fn assemble(
        input: &PersistenceInput<'_>,
        lanes: &[(usize, usize)],
        diagrams: Vec<GraphDiagram>,
        with_cycles: bool,
    ) -> Self {
        let (f, b) = (input.num_filtrations(), input.num_graphs());
        let n = input.num_nodes();
        let dim0 = pack_block(f, b, n, lanes, &diagrams, |d| d.dim0.as_slice());
        let dim1 = with_cycles.then(|| pack_block(f, b, n, lanes, &diagrams, |d| d.dim1.as_slice()));
        Self { dim0, dim1 }
    }
}

fn pack_block(
    f: usize,
    b: usize,
    n: usize,
    lanes: &[(usize, usize)],
    diagrams: &[GraphDiagram],
    select: impl Fn(&GraphDiagram) -> &[PersistencePair],
) -> PairBlock {
    let cap = diagrams.iter().map(|d| select(d).len()).max().unwrap_or(0).max(1);

    let mut values = Array4::<f32>::zeros((f, b, cap, 2));
    let mut generators = Array4::<usize>::zeros((f, b, cap, 2));
    let mut counts = Array2::<usize>::zeros((f, b));

    for (lane, diagram) in diagrams.iter().enumerate() {
        let (fi, g) = (lane / b, lane % b);
        let (node_offset, edge_offset) = lanes[lane];
        let pairs = select(diagram);
        counts[[fi, g]] = pairs.len();

        for (slot, pair) in pairs.iter().enumerate() {
            values[[fi, g, slot, 0]] = pair.birth;
            values[[fi, g, slot, 1]] = pair.death;
            generators[[fi, g, slot, 0]] = global_index(pair.birth_generator, node_offset, edge_offset, n);
            generators[[fi, g, slot, 1]] = global_index(pair.death_generator, node_offset, edge_offset, n);
        }
    }

    PairBlock {
        values,
        generators,
        counts,
    }
}

/// Position of a generator in [vertices (N) ; edges (E)]
fn global_index(generator: Generator, node_offset: usize, edge_offset: usize, n: usize) -> usize {
    match generator {
        Generator::Vertex(v) => node_offset + v,
        Generator::Edge(e) => n + edge_offset + e,
    }
}

/// A conforming persistence routine.
///
/// Implementations must be deterministic, treat every (filtration, graph)
/// lane independently, and block until all lanes are done.
pub trait PersistenceBackend: Send + Sync {
    fn compute(&self, input: &PersistenceInput<'_>, with_cycles: bool) -> Result<PersistencePairs>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Lanes processed one after another
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialPersistence;

/// Lanes processed on the rayon thread pool
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelPersistence;

fn build_lanes(input: &PersistenceInput<'_>) -> Result<Vec<Lane>> {
    input.validate()?;
    let (f, b) = (input.num_filtrations(), input.num_graphs());
    (0..f * b).map(|lane| input.lane(lane / b, lane % b)).collect()
}

fn offsets(lanes: &[Lane]) -> Vec<(usize, usize)> {
    lanes.iter().map(|l| (l.node_offset, l.edge_offset)).collect()
}

impl PersistenceBackend for SequentialPersistence {
    fn compute(&self, input: &PersistenceInput<'_>, with_cycles: bool) -> Result<PersistencePairs> {
        let lanes = build_lanes(input)?;
        let diagrams: Vec<GraphDiagram> = lanes.iter().map(|lane| lane.run(with_cycles)).collect();
        Ok(PersistencePairs::assemble(input, &offsets(&lanes), diagrams, with_cycles))
    }

    fn name(&self) -> &'static str {
        "sequential"
    }
}

impl PersistenceBackend for ParallelPersistence {
    fn compute(&self, input: &PersistenceInput<'_>, with_cycles: bool) -> Result<PersistencePairs> {
        let lanes = build_lanes(input)?;
        // par_iter + collect keeps lane order
        let diagrams: Vec<GraphDiagram> = lanes.par_iter().map(|lane| lane.run(with_cycles)).collect();
        Ok(PersistencePairs::assemble(input, &offsets(&lanes), diagrams, with_cycles))
    }

    fn name(&self) -> &'static str {
        "parallel"
    }
}
