//! Task-dependent readout and loss.
//!
//! The task is fixed at construction and selects two functions once:
//!
//! ```text
//!   graph classification:  pool = mean (GCN) | add (GIN)   loss = CE
//!   node classification:   pool = identity                  loss = weighted CE
//! ```

use candle_core::{DType, Tensor, D};
use candle_nn::ops;
use serde::{Deserialize, Serialize};

use crate::config::ConvKind;
use crate::error::{Result, TopoError};
use crate::graph::{BatchedGraph, LabelLevel};

/// Node embeddings [N, C] -> readout ([B, C] or [N, C])
pub type PoolFn = fn(&Tensor, &BatchedGraph) -> Result<Tensor>;

/// (logits [M, K], targets u32 [M]) -> scalar loss
pub type LossFn = fn(&Tensor, &Tensor) -> Result<Tensor>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    GraphClassification,
    NodeClassification,
}

impl Task {
    pub fn is_node_level(&self) -> bool {
        matches!(self, Task::NodeClassification)
    }

    /// Readout for this task; graph tasks pool the way the convolution
    /// aggregates (GCN averages, GIN sums).
    pub fn pooling(&self, conv: ConvKind) -> PoolFn {
        match (self, conv) {
            (Task::NodeClassification, _) => identity_pool,
            (Task::GraphClassification, ConvKind::Gcn) => global_mean_pool,
            (Task::GraphClassification, ConvKind::Gin) => global_add_pool,
        }
    }

    pub fn loss(&self) -> LossFn {
        match self {
            Task::GraphClassification => cross_entropy,
            Task::NodeClassification => weighted_cross_entropy,
        }
    }

    /// Level of the labels this task trains on
    pub fn label_level(&self) -> LabelLevel {
        if self.is_node_level() {
            LabelLevel::Node
        } else {
            LabelLevel::Graph
        }
    }

    /// Number of labels a batch must carry for this task
    pub fn expected_labels(&self, batch: &BatchedGraph) -> usize {
        if self.is_node_level() {
            batch.num_nodes()
        } else {
            batch.num_graphs()
        }
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Task::GraphClassification => write!(f, "graph classification"),
            Task::NodeClassification => write!(f, "node classification"),
        }
    }
}

/// Σ over each graph's nodes [N, C] -> [B, C]
pub fn global_add_pool(x: &Tensor, batch: &BatchedGraph) -> Result<Tensor> {
    let (_, c) = x.dims2()?;
    let zeros = Tensor::zeros((batch.num_graphs(), c), x.dtype(), x.device())?;
    Ok(zeros.index_add(batch.assignment_tensor(), x, 0)?)
}

/// Mean over each graph's nodes [N, C] -> [B, C]; empty graphs give zero
pub fn global_mean_pool(x: &Tensor, batch: &BatchedGraph) -> Result<Tensor> {
    let counts: Vec<f32> = (0..batch.num_graphs())
        .map(|g| batch.node_count(g).max(1) as f32)
        .collect();
    let counts = Tensor::from_vec(counts, (batch.num_graphs(), 1), x.device())?.to_dtype(x.dtype())?;
    Ok(global_add_pool(x, batch)?.broadcast_div(&counts)?)
}

pub fn identity_pool(x: &Tensor, _batch: &BatchedGraph) -> Result<Tensor> {
    Ok(x.clone())
}

pub fn cross_entropy(logits: &Tensor, targets: &Tensor) -> Result<Tensor> {
    Ok(candle_nn::loss::cross_entropy(logits, targets)?)
}

/// Per-class weights (V - count_c) / V, zero for absent classes.
///
/// Rare classes weigh more; V is the number of labelled items.
pub fn class_weights(targets: &[u32], num_classes: usize) -> Vec<f32> {
    let mut counts = vec![0usize; num_classes];
    for &t in targets {
        if let Some(c) = counts.get_mut(t as usize) {
            *c += 1;
        }
    }
    let v = targets.len() as f32;
    counts
        .iter()
        .map(|&c| if c == 0 { 0.0 } else { (v - c as f32) / v })
        .collect()
}

/// Cross-entropy with `class_weights` recomputed from the batch.
///
///   L = - Σ_i w_{y_i} log p_i(y_i) / Σ_i w_{y_i}
///
/// When only one class is present every weight is zero; the denominator
/// is clamped so the loss is 0 instead of NaN.
pub fn weighted_cross_entropy(logits: &Tensor, targets: &Tensor) -> Result<Tensor> {
    let (m, k) = logits.dims2()?;
    let labels = targets.to_vec1::<u32>()?;
    if labels.len() != m {
        return Err(TopoError::shape("weighted cross-entropy targets", m, labels.len()));
    }
    if let Some(&bad) = labels.iter().find(|&&t| t as usize >= k) {
        return Err(TopoError::invalid_batch(format!("label {} out of range for {} classes", bad, k)));
    }

    let weights = Tensor::from_vec(class_weights(&labels, k), k, logits.device())?.to_dtype(logits.dtype())?;
    let per_item = weights.index_select(targets, 0)?;

    let log_probs = ops::log_softmax(logits, D::Minus1)?;
    let picked = log_probs.gather(&targets.unsqueeze(1)?, 1)?.squeeze(1)?;

    let numerator = (picked * &per_item)?.sum_all()?.neg()?;
    let denominator = per_item.sum_all()?.maximum(f32::EPSILON as f64)?;
    Ok(numerator.broadcast_div(&denominator)?)
}

/// argmax over classes, as host u32
pub fn predictions(logits: &Tensor) -> Result<Vec<u32>> {
    Ok(logits.argmax(D::Minus1)?.to_dtype(DType::U32)?.to_vec1::<u32>()?)
}
