//! Deeper baseline: a feature embedding, `depth` convolution blocks and a
//! three-layer head.
//!
//! Each block is `conv -> [batch norm] -> ReLU -> dropout`, with the block
//! input added back when residual connections are on. Readout follows the
//! task, so node tasks classify every node directly.

use std::fmt;

use candle_core::{Module, ModuleT, Tensor};
use candle_nn::{batch_norm, linear, BatchNorm, BatchNormConfig, Linear, VarBuilder};
use log::info;

use super::filtration_gcn::{build_conv, dropout};
use super::steps::{Classifier, StepRecorder};
use super::task::PoolFn;
use crate::config::ModelConfig;
use crate::error::Result;
use crate::graph::{BatchedGraph, EdgeIndex, MessagePassing};

#[derive(Debug)]
struct ConvBlock {
    conv: Box<dyn MessagePassing>,
    norm: Option<BatchNorm>,
    residual: bool,
}

impl ConvBlock {
    fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        let hidden = config.hidden_dim;
        let norm = if config.batch_norm {
            Some(batch_norm(hidden, BatchNormConfig::default(), vb.pp("norm"))?)
        } else {
            None
        };
        Ok(Self {
            conv: build_conv(config, hidden, hidden, vb.pp("conv"))?,
            norm,
            residual: config.residual,
        })
    }

    fn forward(&self, x: &Tensor, edges: &EdgeIndex, p: f64, train: bool) -> Result<Tensor> {
        let mut h = self.conv.forward(x, edges)?;
        if let Some(norm) = &self.norm {
            h = norm.forward_t(&h, train)?;
        }
        let h = dropout(h.relu()?, p, train)?;
        if self.residual {
            Ok((h + x)?)
        } else {
            Ok(h)
        }
    }
}

pub struct DeepGcnModel {
    config: ModelConfig,
    embedding: Linear,
    blocks: Vec<ConvBlock>,
    head: [Linear; 3],
    pool: PoolFn,
    recorder: StepRecorder,
}

impl fmt::Debug for DeepGcnModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeepGcnModel")
            .field("task", &self.config.task)
            .field("blocks", &self.blocks)
            .finish_non_exhaustive()
    }
}

impl DeepGcnModel {
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let hidden = config.hidden_dim;

        let embedding = linear(config.num_node_features, hidden, vb.pp("embedding"))?;
        let blocks = (0..config.depth)
            .map(|i| ConvBlock::new(config, vb.pp(format!("layers.{}", i))))
            .collect::<Result<Vec<_>>>()?;
        let head = [
            linear(hidden, hidden / 2, vb.pp("classif.0"))?,
            linear(hidden / 2, hidden / 4, vb.pp("classif.2"))?,
            linear(hidden / 4, config.num_classes, vb.pp("classif.4"))?,
        ];

        info!(
            "DeepGcnModel: {} with {} {:?} blocks, hidden {}, batch norm {}, residual {}",
            config.task, config.depth, config.conv, hidden, config.batch_norm, config.residual
        );

        Ok(Self {
            config: config.clone(),
            embedding,
            blocks,
            head,
            pool: config.task.pooling(config.conv),
            recorder: StepRecorder::new(config.task, config.num_classes),
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn depth(&self) -> usize {
        self.blocks.len()
    }
}

impl Classifier for DeepGcnModel {
    fn forward_t(&self, batch: &BatchedGraph, train: bool) -> Result<Tensor> {
        let edges = batch.edge_index();
        let p = self.config.dropout;

        let mut x = self.embedding.forward(batch.node_features())?;
        for block in &self.blocks {
            x = block.forward(&x, edges, p, train)?;
        }

        let [first, second, out] = &self.head;
        let h = first.forward(&(self.pool)(&x, batch)?)?.relu()?;
        let h = second.forward(&h)?.relu()?;
        Ok(out.forward(&h)?)
    }

    fn recorder(&mut self) -> &mut StepRecorder {
        &mut self.recorder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConvKind, ModelKind};
    use crate::graph::{CyclesConfig, CyclesDataset, LabelLevel};
    use crate::model::{Phase, Task};
    use candle_core::{DType, Device};
    use candle_nn::VarMap;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config(task: Task) -> ModelConfig {
        ModelConfig {
            model: ModelKind::DeepGcn,
            hidden_dim: 8,
            depth: 3,
            dropout: 0.0,
            ..ModelConfig::new(3, 2, task)
        }
    }

    fn batch(labels: LabelLevel) -> BatchedGraph {
        let config = CyclesConfig {
            n_graphs: 4,
            labels,
            ..CyclesConfig::default()
        };
        let graphs = CyclesDataset::generate(&config, &mut StdRng::seed_from_u64(11)).unwrap().graphs;
        BatchedGraph::from_graphs(&graphs, &Device::Cpu).unwrap()
    }

    #[test]
    fn test_graph_task_shapes() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let mut model = DeepGcnModel::new(&config(Task::GraphClassification), vb).unwrap();
        assert_eq!(model.depth(), 3);

        let batch = batch(LabelLevel::Graph);
        assert_eq!(model.forward(&batch).unwrap().dims(), &[4, 2]);
        assert!(model.training_step(&batch).unwrap().loss_value.is_finite());
        assert_eq!(model.end_epoch(Phase::Train).steps, 1);
    }

    #[test]
    fn test_node_task_without_norm_or_residual() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let config = ModelConfig {
            conv: ConvKind::Gin,
            batch_norm: false,
            residual: false,
            depth: 1,
            ..config(Task::NodeClassification)
        };
        let mut model = DeepGcnModel::new(&config, vb).unwrap();

        let batch = batch(LabelLevel::Node);
        assert_eq!(model.forward(&batch).unwrap().dims(), &[batch.num_nodes(), 2]);
        assert!(model.test_step(&batch).unwrap().loss_value.is_finite());
    }

    #[test]
    fn test_one_block_per_layer_of_depth() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let config = ModelConfig {
            depth: 2,
            ..config(Task::GraphClassification)
        };
        DeepGcnModel::new(&config, vb).unwrap();

        let names: Vec<String> = varmap.data().lock().unwrap().keys().cloned().collect();
        assert!(names.iter().any(|n| n.starts_with("layers.1.conv")));
        assert!(names.iter().any(|n| n.starts_with("layers.1.norm")));
        assert!(!names.iter().any(|n| n.starts_with("layers.2")));
    }

    #[test]
    fn test_rejects_zero_depth() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let config = ModelConfig {
            depth: 0,
            ..config(Task::GraphClassification)
        };
        assert!(DeepGcnModel::new(&config, vb).is_err());
    }
}
