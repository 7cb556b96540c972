//! Configuration
//!
//! Plain structs with research defaults, serde-(de)serialisable and
//! checked once at construction. A `ModelConfig` selects the classifier
//! and derives the `TopologyConfig` of its topological layer.
//!
//! ```json
//! {
//!   "model": "filtration_gcn",
//!   "num_node_features": 3,
//!   "num_classes": 2,
//!   "task": "graph_classification",
//!   "dim1": true
//! }
//! ```
//!
//! Omitted fields take their defaults.

use std::collections::BTreeMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::coord::{resolve_widths, CoordFunKind};
use crate::error::{Result, TopoError};
use crate::model::Task;

/// How coordinate activations are reduced over the valid pairs of a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    Mean,
    Sum,
}

/// Message-passing operator of the host model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvKind {
    Gcn,
    Gin,
}

/// Which classifier a `ModelConfig` builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Two convolutions around a topological layer
    FiltrationGcn,
    /// Same layout with a Linear or attention stand-in for the topological layer
    Gcn,
    /// Embedding, `depth` convolution blocks and a three-layer head
    DeepGcn,
}

/// Persistence routine used by the topological layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Sequential,
    Parallel,
}

/// Set aggregation policy for one homology dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregatorConfig {
    /// Coordinate functions, pooled over the valid pairs
    Coordinates {
        /// Family name -> output width
        widths: BTreeMap<String, usize>,
        reduction: Reduction,
    },
    /// Inducing-point attention over the raw pairs
    Attention {
        out_dim: usize,
        heads: usize,
        num_inds: usize,
    },
}

impl AggregatorConfig {
    /// Every family with the same width
    pub fn all_families(width: usize, reduction: Reduction) -> Self {
        let widths = CoordFunKind::ALL
            .iter()
            .map(|kind| (kind.name().to_string(), width))
            .collect();
        AggregatorConfig::Coordinates { widths, reduction }
    }

    pub fn attention(out_dim: usize, heads: usize, num_inds: usize) -> Self {
        AggregatorConfig::Attention {
            out_dim,
            heads,
            num_inds,
        }
    }

    /// Width of the per-graph vector for one filtration
    pub fn output_dim(&self) -> usize {
        match self {
            AggregatorConfig::Coordinates { widths, .. } => widths.values().sum(),
            AggregatorConfig::Attention { out_dim, .. } => *out_dim,
        }
    }

    pub fn validate(&self, context: &str) -> Result<()> {
        match self {
            AggregatorConfig::Coordinates { widths, .. } => resolve_widths(widths)
                .map(|_| ())
                .map_err(|e| TopoError::config(format!("{}: {}", context, e))),
            AggregatorConfig::Attention {
                out_dim,
                heads,
                num_inds,
            } => {
                if *out_dim == 0 || *heads == 0 || *num_inds == 0 {
                    return Err(TopoError::config(format!(
                        "{}: attention sizes must be positive (out_dim {}, heads {}, num_inds {})",
                        context, out_dim, heads, num_inds
                    )));
                }
                if out_dim % heads != 0 {
                    return Err(TopoError::config(format!(
                        "{}: out_dim {} is not divisible by {} heads",
                        context, out_dim, heads
                    )));
                }
                Ok(())
            }
        }
    }
}

/// Configuration of one `TopologyLayer`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyConfig {
    /// Input node feature width Cin
    pub features_in: usize,
    /// Output node embedding width
    pub features_out: usize,
    /// Number of learned filtrations F
    pub num_filtrations: usize,
    /// Hidden width of every filtration head
    pub filtration_hidden: usize,
    /// Embedding of component (dimension 0) pairs; each pair stays with
    /// its birth vertex, so `reduction` is not applied
    pub dim0: AggregatorConfig,
    /// Aggregation of cycle (dimension 1) pairs; `None` skips cycles
    pub dim1: Option<AggregatorConfig>,
    pub backend: BackendKind,
}

impl TopologyConfig {
    /// Defaults for a layer mapping `features_in` to `features_out`
    pub fn new(features_in: usize, features_out: usize) -> Self {
        Self {
            features_in,
            features_out,
            num_filtrations: 2,
            filtration_hidden: 15,
            dim0: AggregatorConfig::all_families(3, Reduction::Mean),
            dim1: None,
            backend: BackendKind::Parallel,
        }
    }

    pub fn with_dim1(mut self, aggregator: AggregatorConfig) -> Self {
        self.dim1 = Some(aggregator);
        self
    }

    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("features_in", self.features_in),
            ("features_out", self.features_out),
            ("num_filtrations", self.num_filtrations),
            ("filtration_hidden", self.filtration_hidden),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, value)| *value == 0) {
            return Err(TopoError::config(format!("{} must be positive", name)));
        }
        self.dim0.validate("dim0 aggregator")?;
        if let Some(dim1) = &self.dim1 {
            dim1.validate("dim1 aggregator")?;
        }
        Ok(())
    }

    /// Width of the cycle embedding, F * out1 (0 without cycles)
    pub fn cycles_dim(&self) -> usize {
        self.dim1
            .as_ref()
            .map_or(0, |agg| self.num_filtrations * agg.output_dim())
    }
}

/// Configuration of the host classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub model: ModelKind,
    pub num_node_features: usize,
    pub num_classes: usize,
    pub task: Task,
    pub conv: ConvKind,
    /// Learn ε in GIN layers
    pub train_eps: bool,
    pub hidden_dim: usize,
    pub filtration_hidden: usize,
    pub num_filtrations: usize,
    /// Width of each coordinate family for component pairs
    pub num_coord_funs: usize,
    /// Also embed cycles
    pub dim1: bool,
    /// Width of each coordinate family for cycle pairs
    pub num_coord_funs1: usize,
    /// Replace coordinate functions by the attention aggregator (and the
    /// baseline's Linear stand-in by node-set attention)
    pub attention: bool,
    pub set_out_dim: usize,
    pub heads: usize,
    pub num_inds: usize,
    /// Pooling of cycle pairs
    pub dim1_reduction: Reduction,
    pub dropout: f64,
    /// Learning rate used by the training driver
    pub lr: f64,
    pub backend: BackendKind,
    /// Convolution blocks of the deep model
    pub depth: usize,
    pub batch_norm: bool,
    pub residual: bool,
    /// Epochs without validation improvement before the learning rate halves
    pub lr_patience: usize,
    pub min_lr: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: ModelKind::FiltrationGcn,
            num_node_features: 1,
            num_classes: 2,
            task: Task::GraphClassification,
            conv: ConvKind::Gcn,
            train_eps: true,
            hidden_dim: 34,
            filtration_hidden: 15,
            num_filtrations: 2,
            num_coord_funs: 3,
            dim1: false,
            num_coord_funs1: 3,
            attention: false,
            set_out_dim: 32,
            heads: 4,
            num_inds: 256,
            dim1_reduction: Reduction::Sum,
            dropout: 0.2,
            lr: 0.005,
            backend: BackendKind::Parallel,
            depth: 4,
            batch_norm: true,
            residual: true,
            lr_patience: 10,
            min_lr: 1e-5,
        }
    }
}

impl ModelConfig {
    pub fn new(num_node_features: usize, num_classes: usize, task: Task) -> Self {
        Self {
            num_node_features,
            num_classes,
            task,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        parse_checked(json, Self::validate)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_node_features == 0 || self.hidden_dim == 0 {
            return Err(TopoError::config(format!(
                "feature widths must be positive (num_node_features {}, hidden_dim {})",
                self.num_node_features, self.hidden_dim
            )));
        }
        if self.num_classes < 2 {
            return Err(TopoError::config(format!("need at least 2 classes, got {}", self.num_classes)));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(TopoError::config(format!("dropout must be in [0, 1), got {}", self.dropout)));
        }
        match self.model {
            ModelKind::FiltrationGcn => {
                if self.dim1 && self.task == Task::NodeClassification {
                    return Err(TopoError::config("cycle embeddings are not supported for node classification"));
                }
                self.topology_config().validate()
            }
            ModelKind::Gcn if self.attention => {
                AggregatorConfig::attention(self.set_out_dim, self.heads, self.num_inds).validate("node-set attention")
            }
            ModelKind::Gcn => Ok(()),
            ModelKind::DeepGcn => {
                if self.depth == 0 {
                    return Err(TopoError::config("depth must be positive"));
                }
                if self.hidden_dim < 4 {
                    return Err(TopoError::config(format!(
                        "the deep model's head needs hidden_dim >= 4, got {}",
                        self.hidden_dim
                    )));
                }
                Ok(())
            }
        }
    }

    /// The topological layer maps hidden_dim -> hidden_dim
    pub fn topology_config(&self) -> TopologyConfig {
        let aggregator = |width: usize, reduction: Reduction| {
            if self.attention {
                AggregatorConfig::attention(self.set_out_dim, self.heads, self.num_inds)
            } else {
                AggregatorConfig::all_families(width, reduction)
            }
        };

        TopologyConfig {
            features_in: self.hidden_dim,
            features_out: self.hidden_dim,
            num_filtrations: self.num_filtrations,
            filtration_hidden: self.filtration_hidden,
            dim0: aggregator(self.num_coord_funs, Reduction::Mean),
            dim1: self
                .dim1
                .then(|| aggregator(self.num_coord_funs1, self.dim1_reduction)),
            backend: self.backend,
        }
    }
}

fn parse_checked<T: DeserializeOwned>(json: &str, check: impl Fn(&T) -> Result<()>) -> Result<T> {
    let value: T = serde_json::from_str(json)?;
    check(&value)?;
    Ok(value)
}

impl TopologyConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        parse_checked(json, Self::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ModelConfig::default();
        config.validate().unwrap();
        assert_eq!(config.topology_config().dim0.output_dim(), 12);
        assert_eq!(config.topology_config().cycles_dim(), 0);
    }

    #[test]
    fn test_node_task_rejects_cycles() {
        let config = ModelConfig {
            dim1: true,
            ..ModelConfig::new(3, 2, Task::NodeClassification)
        };
        assert!(matches!(config.validate(), Err(TopoError::Config(_))));
    }

    #[test]
    fn test_model_kind_checks() {
        let config = ModelConfig {
            model: ModelKind::DeepGcn,
            depth: 0,
            ..ModelConfig::default()
        };
        assert!(matches!(config.validate(), Err(TopoError::Config(_))));

        let config = ModelConfig {
            model: ModelKind::DeepGcn,
            hidden_dim: 3,
            ..ModelConfig::default()
        };
        assert!(config.validate().is_err());

        // Cycles only matter to the topological model
        let config = ModelConfig {
            model: ModelKind::Gcn,
            dim1: true,
            ..ModelConfig::new(3, 2, Task::NodeClassification)
        };
        assert!(config.validate().is_ok());

        let config = ModelConfig {
            model: ModelKind::Gcn,
            attention: true,
            set_out_dim: 30,
            heads: 4,
            ..ModelConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_attention_heads_must_divide_width() {
        let config = ModelConfig {
            attention: true,
            set_out_dim: 30,
            heads: 4,
            ..ModelConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(AggregatorConfig::attention(32, 4, 8).validate("test").is_ok());
    }

    #[test]
    fn test_topology_config_rejections() {
        let mut config = TopologyConfig::new(8, 8);
        config.dim1 = Some(AggregatorConfig::Coordinates {
            widths: BTreeMap::new(),
            reduction: Reduction::Sum,
        });
        assert!(config.validate().is_err());

        let mut config = TopologyConfig::new(8, 8);
        config.dim0 = AggregatorConfig::Coordinates {
            widths: [("octagon".to_string(), 2)].into_iter().collect(),
            reduction: Reduction::Mean,
        };
        assert!(config.validate().is_err());

        let mut config = TopologyConfig::new(8, 8);
        config.num_filtrations = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_round_trip_and_partial() {
        let config = ModelConfig::from_json_str(
            r#"{"num_node_features": 3, "task": "graph_classification", "dim1": true, "conv": "gin"}"#,
        )
        .unwrap();
        assert_eq!(config.num_node_features, 3);
        assert_eq!(config.conv, ConvKind::Gin);
        assert_eq!(config.hidden_dim, 34);
        assert_eq!(config.topology_config().cycles_dim(), 2 * 12);

        assert_eq!(config.model, ModelKind::FiltrationGcn);

        let back = ModelConfig::from_json_str(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);

        let deep = ModelConfig::from_json_str(r#"{"model": "deep_gcn", "depth": 2, "residual": false}"#).unwrap();
        assert_eq!((deep.model, deep.depth, deep.residual), (ModelKind::DeepGcn, 2, false));

        assert!(matches!(
            ModelConfig::from_json_str("{\"hidden_dim\": "),
            Err(TopoError::Serialization(_))
        ));
    }

    #[test]
    fn test_topology_json() {
        let json = r#"{
            "features_in": 4, "features_out": 4, "num_filtrations": 1, "filtration_hidden": 8,
            "dim0": {"kind": "coordinates", "widths": {"Triangle_transform": 2}, "reduction": "mean"},
            "dim1": {"kind": "attention", "out_dim": 8, "heads": 2, "num_inds": 4},
            "backend": "sequential"
        }"#;
        let config = TopologyConfig::from_json_str(json).unwrap();
        assert_eq!(config.dim0.output_dim(), 2);
        assert_eq!(config.cycles_dim(), 8);
    }
}
