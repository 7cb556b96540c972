//! Weisfeiler–Lehman Relabelling
//!
//! Colour refinement with node degrees as the initial colours:
//!
//! ```text
//!   ℓ₀(v)     = deg(v)
//!   ℓₕ₊₁(v)   = compress(ℓₕ(v), sort{ℓₕ(u) : u ∈ N(v)})
//! ```
//!
//! One compression dictionary per iteration is shared by all graphs, so a
//! colour means the same rooted subtree in every graph. Two graphs whose
//! colour histograms agree at every iteration cannot be told apart by the
//! test (nor by any message-passing GNN of that depth).

use std::collections::HashMap;

use log::debug;
use ndarray::Array2;

use crate::graph::Graph;

/// Bincount of node degrees
pub fn degree_histogram(graph: &Graph) -> Vec<usize> {
    bincount(graph.neighbours().iter().map(Vec::len))
}

/// Mean degree histogram over graphs, shorter histograms zero-padded
pub fn mean_degree_histogram(graphs: &[Graph]) -> Vec<f64> {
    let histograms: Vec<Vec<usize>> = graphs.iter().map(degree_histogram).collect();
    let width = histograms.iter().map(Vec::len).max().unwrap_or(0);
    let mut mean = vec![0.0; width];
    for histogram in &histograms {
        for (slot, &count) in mean.iter_mut().zip(histogram) {
            *slot += count as f64;
        }
    }
    if !histograms.is_empty() {
        mean.iter_mut().for_each(|m| *m /= histograms.len() as f64);
    }
    mean
}

fn bincount(values: impl Iterator<Item = usize>) -> Vec<usize> {
    let mut counts = Vec::new();
    for v in values {
        if v >= counts.len() {
            counts.resize(v + 1, 0);
        }
        counts[v] += 1;
    }
    counts
}

/// Colours of every node of every graph, per iteration
#[derive(Debug, Clone, Default)]
pub struct WeisfeilerLehman {
    /// levels[h][g][v]
    levels: Vec<Vec<Vec<usize>>>,
    /// Number of distinct colours at each level
    vocabulary: Vec<usize>,
}

impl WeisfeilerLehman {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `iterations` refinement steps; levels 0..=iterations are kept.
    pub fn fit_transform(&mut self, graphs: &[Graph], iterations: usize) -> &[Vec<Vec<usize>>] {
        let adjacency: Vec<Vec<Vec<usize>>> = graphs.iter().map(Graph::neighbours).collect();

        let degrees: Vec<Vec<usize>> = adjacency
            .iter()
            .map(|adj| adj.iter().map(Vec::len).collect())
            .collect();
        let max_degree = degrees.iter().flatten().copied().max();

        self.vocabulary = vec![max_degree.map_or(0, |d| d + 1)];
        self.levels = vec![degrees];

        for h in 0..iterations {
            let previous = &self.levels[h];
            let mut dictionary: HashMap<(usize, Vec<usize>), usize> = HashMap::new();

            let next: Vec<Vec<usize>> = adjacency
                .iter()
                .zip(previous)
                .map(|(adj, colours)| {
                    adj.iter()
                        .enumerate()
                        .map(|(v, neighbours)| {
                            let mut signature: Vec<usize> = neighbours.iter().map(|&u| colours[u]).collect();
                            signature.sort_unstable();
                            let fresh = dictionary.len();
                            *dictionary.entry((colours[v], signature)).or_insert(fresh)
                        })
                        .collect()
                })
                .collect();

            debug!("WL iteration {}: {} colours", h + 1, dictionary.len());
            self.vocabulary.push(dictionary.len());
            self.levels.push(next);
        }

        &self.levels
    }

    pub fn num_iterations(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    pub fn num_graphs(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    pub fn labels(&self, level: usize, graph: usize) -> Option<&[usize]> {
        self.levels.get(level)?.get(graph).map(Vec::as_slice)
    }

    /// One row per graph: colour histograms of every level, concatenated.
    ///
    /// Each level occupies a fixed block of columns (its vocabulary size),
    /// so equal columns count the same colour across graphs.
    pub fn feature_matrix(&self) -> Array2<f64> {
        let width: usize = self.vocabulary.iter().sum();
        let mut features = Array2::<f64>::zeros((self.num_graphs(), width));

        let mut offset = 0;
        for (level, &size) in self.levels.iter().zip(&self.vocabulary) {
            for (g, colours) in level.iter().enumerate() {
                for &c in colours {
                    features[[g, offset + c]] += 1.0;
                }
            }
            offset += size;
        }
        features
    }
}
