//! Host classifier with one topological layer in the middle.
//!
//! ```text
//!   x ─▶ conv1 ─▶ ReLU ─▶ dropout ─▶ TopologyLayer ─▶ ReLU ─▶ dropout ─▶ conv3
//!                                         │                              │
//!                                  cycle embedding                    pool (task)
//!                                         │                              │
//!                                         └────────────── cat ───────────┘
//!                                                          │
//!                                         Linear ─▶ ReLU ─▶ Linear ─▶ logits
//! ```
//!
//! Cycle embeddings are graph-level and only exist for graph tasks.

use std::fmt;

use candle_core::{Module, Tensor};
use candle_nn::{linear, ops, Linear, VarBuilder};
use log::info;

use super::steps::{Classifier, StepRecorder};
use super::task::PoolFn;
use crate::config::{ConvKind, ModelConfig};
use crate::error::Result;
use crate::graph::{BatchedGraph, GcnConv, GinConv, MessagePassing};
use crate::layer::TopologyLayer;

/// GCN or GIN convolution mapping `in_dim` to `out_dim`
pub(crate) fn build_conv(
    config: &ModelConfig,
    in_dim: usize,
    out_dim: usize,
    vb: VarBuilder,
) -> Result<Box<dyn MessagePassing>> {
    let conv: Box<dyn MessagePassing> = match config.conv {
        ConvKind::Gcn => Box::new(GcnConv::new(in_dim, out_dim, vb)?),
        ConvKind::Gin => Box::new(GinConv::new(in_dim, out_dim, config.train_eps, vb)?),
    };
    Ok(conv)
}

/// Inverted dropout while training, identity otherwise
pub(crate) fn dropout(x: Tensor, p: f64, train: bool) -> Result<Tensor> {
    if train && p > 0.0 {
        Ok(ops::dropout(&x, p as f32)?)
    } else {
        Ok(x)
    }
}

pub struct FiltrationGcnModel {
    config: ModelConfig,
    conv1: Box<dyn MessagePassing>,
    topo: TopologyLayer,
    conv3: Box<dyn MessagePassing>,
    classifier_hidden: Linear,
    classifier_out: Linear,
    pool: PoolFn,
    recorder: StepRecorder,
}

impl fmt::Debug for FiltrationGcnModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FiltrationGcnModel")
            .field("task", &self.config.task)
            .field("conv1", &self.conv1)
            .field("topo", &self.topo)
            .field("conv3", &self.conv3)
            .finish_non_exhaustive()
    }
}

impl FiltrationGcnModel {
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let hidden = config.hidden_dim;

        let conv1 = build_conv(config, config.num_node_features, hidden, vb.pp("conv1"))?;
        let conv3 = build_conv(config, hidden, hidden, vb.pp("conv3"))?;

        let topo = TopologyLayer::new(&config.topology_config(), vb.pp("topo1"))?;
        let readout_dim = hidden + topo.cycles_dim();
        let classifier_hidden = linear(readout_dim, hidden, vb.pp("classif.0"))?;
        let classifier_out = linear(hidden, config.num_classes, vb.pp("classif.2"))?;

        info!(
            "FiltrationGcnModel: {} with {:?} convolutions, hidden {}, {} filtrations, cycles {}",
            config.task, config.conv, hidden, config.num_filtrations, config.dim1
        );

        Ok(Self {
            config: config.clone(),
            conv1,
            topo,
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

    pub fn topology(&self) -> &TopologyLayer {
        &self.topo
    }
}

impl Classifier for FiltrationGcnModel {
    fn forward_t(&self, batch: &BatchedGraph, train: bool) -> Result<Tensor> {
        let edges = batch.edge_index();
        let p = self.config.dropout;

        let x = self.conv1.forward(batch.node_features(), edges)?.relu()?;
        let x = dropout(x, p, train)?;

        let topo = self.topo.forward(&x, batch)?;
        let x = dropout(topo.node_embedding.relu()?, p, train)?;
        let x = self.conv3.forward(&x, edges)?;

        let mut readout = (self.pool)(&x, batch)?;
        if let Some(cycles) = &topo.cycle_embedding {
            readout = Tensor::cat(&[&readout, cycles], 1)?;
        }

        let h = self.classifier_hidden.forward(&readout)?.relu()?;
        Ok(self.classifier_out.forward(&h)?)
    }

    fn recorder(&mut self) -> &mut StepRecorder {
        &mut self.recorder
    }
}
