//! Host Graph Classifiers
//!
//! `FiltrationGcnModel` places the topological layer between two
//! convolutions. `GcnModel` keeps that layout with a stand-in for the
//! topological layer, and `DeepGcnModel` stacks `depth` residual blocks.
//! All three implement `Classifier`, which supplies the task-specific
//! loss and the epoch bookkeeping of a training driver.
//!
//! ## Tasks
//!
//! | task                  | readout            | loss          | metric            |
//! |-----------------------|--------------------|---------------|-------------------|
//! | graph classification  | mean (GCN) / add (GIN) pool | CE   | accuracy          |
//! | node classification   | identity           | weighted CE   | weighted accuracy |

mod deep_gcn;
mod filtration_gcn;
mod gcn;
mod metrics;
mod schedule;
mod steps;
mod task;

pub use deep_gcn::DeepGcnModel;
pub use filtration_gcn::FiltrationGcnModel;
pub use gcn::GcnModel;
pub use metrics::{Accuracy, EpochSummary, Metric, Phase, WeightedAccuracy};
pub use schedule::PlateauScheduler;
pub use steps::{Classifier, StepOutput, StepRecorder};
pub use task::{
    class_weights, cross_entropy, global_add_pool, global_mean_pool, identity_pool, predictions,
    weighted_cross_entropy, LossFn, PoolFn, Task,
};

use candle_nn::VarBuilder;

use crate::config::{ModelConfig, ModelKind};
use crate::error::Result;

/// The classifier `config.model` names
pub fn build_model(config: &ModelConfig, vb: VarBuilder) -> Result<Box<dyn Classifier>> {
    let model: Box<dyn Classifier> = match config.model {
        ModelKind::FiltrationGcn => Box::new(FiltrationGcnModel::new(config, vb)?),
        ModelKind::Gcn => Box::new(GcnModel::new(config, vb)?),
        ModelKind::DeepGcn => Box::new(DeepGcnModel::new(config, vb)?),
    };
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_build_model_follows_kind() {
        for (kind, name) in [
            (ModelKind::FiltrationGcn, "FiltrationGcnModel"),
            (ModelKind::Gcn, "GcnModel"),
            (ModelKind::DeepGcn, "DeepGcnModel"),
        ] {
            let varmap = VarMap::new();
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
            let config = ModelConfig {
                model: kind,
                hidden_dim: 8,
                ..ModelConfig::new(3, 2, Task::GraphClassification)
            };
            let model = build_model(&config, vb).unwrap();
            assert!(format!("{:?}", model).starts_with(name));
        }
    }
}
