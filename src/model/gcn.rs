//! Baseline classifier without persistence.
//!
//! ```text
//!   x ─▶ conv1 ─▶ ReLU ─▶ dropout ─▶ stand-in ─▶ ReLU ─▶ dropout ─▶ conv3
//!                                                                    │
//!                                    Linear ─▶ ReLU ─▶ Linear ◀── pool (task)
//! ```
//!
//! The stand-in sits where `FiltrationGcnModel` has its topological layer,
//! so the comparison isolates what persistence adds: either a Linear layer
//! or inducing-point attention over the nodes of each graph.

use std::fmt;

use candle_core::{Module, Tensor};
use candle_nn::{linear, Linear, VarBuilder};
use log::info;

use super::filtration_gcn::{build_conv, dropout};
use super::steps::{Classifier, StepRecorder};
use super::task::PoolFn;
use crate::aggregate::AttentionAggregator;
use crate::config::ModelConfig;
use crate::error::Result;
use crate::graph::{BatchedGraph, MessagePassing};

/// Nodes of every graph as one padded set: ([B, width, C], mask [B, width],
/// row of every node in the flattened [B * width] layout)
fn node_sets(x: &Tensor, batch: &BatchedGraph) -> Result<(Tensor, Tensor, Tensor)> {
    let (_, c) = x.dims2()?;
    let b = batch.num_graphs();
    let width = (0..b).map(|g| batch.node_count(g)).max().unwrap_or(0).max(1);

    let mut index = vec![0u32; b * width];
    let mut mask = vec![0.0f32; b * width];
    let mut rows = Vec::with_capacity(batch.num_nodes());
    for g in 0..b {
        for (slot, node) in batch.node_range(g).enumerate() {
            index[g * width + slot] = node as u32;
            mask[g * width + slot] = 1.0;
            rows.push((g * width + slot) as u32);
        }
    }

    let device = x.device();
    let padded = x
        .index_select(&Tensor::from_vec(index, b * width, device)?, 0)?
        .reshape((b, width, c))?;
    let mask = Tensor::from_vec(mask, (b, width), device)?.to_dtype(x.dtype())?;
    let n = rows.len();
    Ok((padded, mask, Tensor::from_vec(rows, n, device)?))
}

/// Takes the topological layer's place in the baseline
#[derive(Debug, Clone)]
enum StandIn {
    Linear(Linear),
    Attention(AttentionAggregator),
}

impl StandIn {
    fn output_dim(&self, config: &ModelConfig) -> usize {
        match self {
            StandIn::Linear(_) => config.hidden_dim,
            StandIn::Attention(_) => config.set_out_dim,
        }
    }

    fn forward(&self, x: &Tensor, batch: &BatchedGraph) -> Result<Tensor> {
        match self {
            StandIn::Linear(lin) => Ok(lin.forward(x)?),
            StandIn::Attention(attention) => {
                let (sets, mask, rows) = node_sets(x, batch)?;
                let (b, width, _) = sets.dims3()?;
                let out = attention.isab(&sets, &mask)?;
                let dim = out.dims()[2];
                Ok(out.reshape((b * width, dim))?.index_select(&rows, 0)?)
            }
        }
    }
}

pub struct GcnModel {
    config: ModelConfig,
    conv1: Box<dyn MessagePassing>,
    stand_in: StandIn,
    conv3: Box<dyn MessagePassing>,
    classifier_hidden: Linear,
    classifier_out: Linear,
    pool: PoolFn,
    recorder: StepRecorder,
}

impl fmt::Debug for GcnModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcnModel")
            .field("task", &self.config.task)
            .field("conv1", &self.conv1)
            .field("stand_in", &self.stand_in)
            .field("conv3", &self.conv3)
            .finish_non_exhaustive()
    }
}

impl GcnModel {
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let hidden = config.hidden_dim;

        let conv1 = build_conv(config, config.num_node_features, hidden, vb.pp("conv1"))?;
        let stand_in = if config.attention {
            StandIn::Attention(AttentionAggregator::new(
                hidden,
                config.set_out_dim,
                config.heads,
                config.num_inds,
                vb.pp("fake_topo"),
            )?)
        } else {
            StandIn::Linear(linear(hidden, hidden, vb.pp("fake_topo"))?)
        };
        let conv3 = build_conv(config, stand_in.output_dim(config), hidden, vb.pp("conv3"))?;
        let classifier_hidden = linear(hidden, hidden, vb.pp("classif.0"))?;
        let classifier_out = linear(hidden, config.num_classes, vb.pp("classif.2"))?;

        info!(
            "GcnModel: {} with {:?} convolutions, hidden {}, attention stand-in {}",
            config.task, config.conv, hidden, config.attention
        );

        Ok(Self {
            config: config.clone(),
            conv1,
            stand_in,
            conv3,
            classifier_hidden,
            classifier_out,
            pool: config.task.pooling(config.conv),
            recorder: StepRecorder::new(config.task, config.num_classes),
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }
}

impl Classifier for GcnModel {
    fn forward_t(&self, batch: &BatchedGraph, train: bool) -> Result<Tensor> {
        let edges = batch.edge_index();
        let p = self.config.dropout;

        let x = self.conv1.forward(batch.node_features(), edges)?.relu()?;
        let x = dropout(x, p, train)?;
        let x = self.stand_in.forward(&x, batch)?.relu()?;
        let x = dropout(x, p, train)?;
        let x = self.conv3.forward(&x, edges)?;

        let readout = (self.pool)(&x, batch)?;
        let h = self.classifier_hidden.forward(&readout)?.relu()?;
        Ok(self.classifier_out.forward(&h)?)
    }

    fn recorder(&mut self) -> &mut StepRecorder {
        &mut self.recorder
    }
}
