//! Topological Aggregation Layer
//!
//! One forward pass over a batched graph:
//!
//! ```text
//!   x [N, Cin] ──▶ filtrations ──▶ node values [N, F] ──max──▶ edge values [E, F]
//!                                        │                          │
//!                                        └────────── stage ─────────┘
//!                                                      │
//!                                            persistence backend (host)
//!                                                      │
//!                                 gather pair values by generator (device)
//!                                     │                         │
//!                             dim 0 [F, B, cap0, 2]     dim 1 [F, B, cap1, 2]
//!                                     │                         │
//!                          embed every pair            aggregate per filtration
//!                                     │                         │
//!                  route to birth vertex [N, F·out0]    [B, F·out1]
//!                                     │                  cycle embedding
//!                    cat(x, ·) ─▶ Linear ─▶ [N, Cout]
//! ```
//!
//! A component pair is born at the vertex whose component dies, so its
//! activation belongs to that vertex. The vertex that survives in each
//! component has no finite pair and gets zero activations. Cycle pairs are
//! not node-local and stay at graph level; the caller joins them after
//! graph pooling.

use std::fmt;

use candle_core::{Module, Tensor};
use candle_nn::{linear, Linear, VarBuilder};
use log::{debug, warn};

use crate::aggregate::{build_aggregator, PairSet, SetAggregator};
use crate::config::{BackendKind, TopologyConfig};
use crate::error::{Result, TopoError};
use crate::filtration::{extend_to_edges, FiltrationFunctions};
use crate::graph::BatchedGraph;
use crate::topology::{
    HostStaging, PairBlock, PairTensors, ParallelPersistence, PersistenceBackend,
    PersistencePairs, SequentialPersistence,
};

/// Output of `TopologyLayer::forward`
#[derive(Debug, Clone)]
pub struct TopologyOutput {
    /// Per-node topological embedding [N, features_out]
    pub node_embedding: Tensor,
    /// Per-graph cycle embedding [B, F * out1], when cycles are enabled
    pub cycle_embedding: Option<Tensor>,
}

/// Filtration values and persistence pairs of one batch
#[derive(Debug, Clone)]
pub struct FilteredPersistence {
    /// [N, F]
    pub node_values: Tensor,
    /// [E, F]
    pub edge_values: Tensor,
    /// Host pairs with counts and generators
    pub pairs: PersistencePairs,
    /// Dimension-0 pairs gathered on the model device
    pub dim0: PairTensors,
    /// Dimension-1 pairs gathered on the model device
    pub dim1: Option<PairTensors>,
}

pub struct TopologyLayer {
    config: TopologyConfig,
    filtrations: FiltrationFunctions,
    dim0: Box<dyn SetAggregator>,
    dim1: Option<Box<dyn SetAggregator>>,
    out: Linear,
    backend: Box<dyn PersistenceBackend>,
}

impl fmt::Debug for TopologyLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopologyLayer")
            .field("config", &self.config)
            .field("dim0", &self.dim0)
            .field("dim1", &self.dim1)
            .field("backend", &self.backend.name())
            .finish()
    }
}

fn default_backend(kind: BackendKind) -> Box<dyn PersistenceBackend> {
    match kind {
        BackendKind::Sequential => Box::new(SequentialPersistence),
        BackendKind::Parallel => Box::new(ParallelPersistence),
    }
}

impl TopologyLayer {
    /// Build every component from a config.
    pub fn new(config: &TopologyConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let dim0 = build_aggregator(&config.dim0, vb.pp("dim0"))?;
        let dim1 = config
            .dim1
            .as_ref()
            .map(|agg| build_aggregator(agg, vb.pp("dim1")))
            .transpose()?;
        Self::with_aggregators(config, dim0, dim1, vb)
    }

    /// Build with caller-supplied aggregators (the config's aggregator
    /// sections are ignored; `dim1` decides whether cycles are computed).
    pub fn with_aggregators(
        config: &TopologyConfig,
        dim0: Box<dyn SetAggregator>,
        dim1: Option<Box<dyn SetAggregator>>,
        vb: VarBuilder,
    ) -> Result<Self> {
        let filtrations = FiltrationFunctions::new(
            config.features_in,
            config.filtration_hidden,
            config.num_filtrations,
            vb.pp("filtration"),
        )?;
        if config.features_out == 0 {
            return Err(TopoError::config("features_out must be positive"));
        }
        let concat_dim = config.features_in + config.num_filtrations * dim0.output_dim();
        let out = linear(concat_dim, config.features_out, vb.pp("out"))?;

        Ok(Self {
            config: config.clone(),
            filtrations,
            dim0,
            dim1,
            out,
            backend: default_backend(config.backend),
        })
    }

    /// Replace the persistence routine.
    pub fn with_backend(mut self, backend: Box<dyn PersistenceBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    pub fn num_filtrations(&self) -> usize {
        self.filtrations.num_filtrations()
    }

    pub fn features_out(&self) -> usize {
        self.config.features_out
    }

    /// Width of the cycle embedding (0 without cycles)
    pub fn cycles_dim(&self) -> usize {
        self.dim1
            .as_ref()
            .map_or(0, |agg| self.num_filtrations() * agg.output_dim())
    }

    pub fn has_cycles(&self) -> bool {
        self.dim1.is_some()
    }

    /// Filtration values and persistence pairs for `x` on `batch`.
    pub fn persistence(&self, x: &Tensor, batch: &BatchedGraph) -> Result<FilteredPersistence> {
        let (n, cin) = x.dims2()?;
        if n != batch.num_nodes() {
            return Err(TopoError::shape("topology layer input", format!("[{}, {}]", batch.num_nodes(), cin), format!("[{}, {}]", n, cin)));
        }

        let node_values = self.filtrations.forward(x)?;
        let edge_values = extend_to_edges(&node_values, batch)?;

        let pairs = {
            let staging = HostStaging::stage(&node_values, &edge_values)?;
            staging.run(batch, self.backend.as_ref(), self.has_cycles())?
        };
        self.check_pairs(&pairs, batch)?;

        if pairs.dim0.total_pairs() == 0 {
            warn!(
                "no component merges in a batch of {} graphs; dimension-0 features are all zero",
                batch.num_graphs()
            );
        }

        let all_values = if batch.num_edges() == 0 {
            node_values.t()?.contiguous()?
        } else {
            Tensor::cat(&[&node_values.t()?, &edge_values.t()?], 1)?
        };
        let dim0 = pairs.dim0.to_device(&all_values)?;
        let dim1 = pairs
            .dim1
            .as_ref()
            .map(|block| block.to_device(&all_values))
            .transpose()?;

        Ok(FilteredPersistence {
            node_values,
            edge_values,
            pairs,
            dim0,
            dim1,
        })
    }

    fn check_pairs(&self, pairs: &PersistencePairs, batch: &BatchedGraph) -> Result<()> {
        let expected = (self.num_filtrations(), batch.num_graphs());
        let check = |block: &PairBlock, context: &str| {
            let actual = (block.num_filtrations(), block.num_graphs());
            if actual != expected {
                return Err(TopoError::shape(
                    context,
                    format!("{} filtrations x {} graphs", expected.0, expected.1),
                    format!("{} filtrations x {} graphs", actual.0, actual.1),
                ));
            }
            Ok(())
        };

        check(&pairs.dim0, "dimension-0 persistence output")?;
        match (&pairs.dim1, self.has_cycles()) {
            (Some(block), true) => check(block, "dimension-1 persistence output"),
            (None, false) => Ok(()),
            (Some(_), false) => Err(TopoError::shape("dimension-1 persistence output", "none", "pairs")),
            (None, true) => Err(TopoError::shape("dimension-1 persistence output", "pairs", "none")),
        }
    }

    /// Aggregate every filtration and concatenate: [B, F * out]
    fn aggregate(&self, aggregator: &dyn SetAggregator, pairs: &PairTensors) -> Result<Tensor> {
        let per_filtration = (0..self.num_filtrations())
            .map(|f| aggregator.reduce(&PairSet::from_tensors(pairs, f)?))
            .collect::<Result<Vec<_>>>()?;
        Ok(Tensor::cat(&per_filtration, 1)?)
    }

    /// Component pair embeddings added onto their birth vertex:
    /// [N, F * out0]
    pub fn component_activations(&self, persistence: &FilteredPersistence) -> Result<Tensor> {
        let block = &persistence.pairs.dim0;
        let (n, _) = persistence.node_values.dims2()?;
        let (b, cap) = (block.num_graphs(), block.capacity());
        let width = self.dim0.output_dim();
        let device = persistence.node_values.device();

        let per_filtration = (0..self.num_filtrations())
            .map(|f| -> Result<Tensor> {
                let slots = self
                    .dim0
                    .embed(&PairSet::from_tensors(&persistence.dim0, f)?)?
                    .reshape((b * cap, width))?;
                let zeros = Tensor::zeros((n, width), slots.dtype(), device)?;

                let (rows, births) = block.births(f);
                if rows.is_empty() {
                    return Ok(zeros);
                }
                if let Some(&bad) = births.iter().find(|&&v| v as usize >= n) {
                    return Err(TopoError::shape("component birth vertex", format!("< {}", n), bad));
                }
                let count = rows.len();
                let rows = Tensor::from_vec(rows, count, device)?;
                let births = Tensor::from_vec(births, count, device)?;
                Ok(zeros.index_add(&births, &slots.index_select(&rows, 0)?, 0)?)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Tensor::cat(&per_filtration, 1)?)
    }

    pub fn forward(&self, x: &Tensor, batch: &BatchedGraph) -> Result<TopologyOutput> {
        let persistence = self.persistence(x, batch)?;

        let node_activations = self.component_activations(&persistence)?;
        let node_embedding = self.out.forward(&Tensor::cat(&[x, &node_activations], 1)?)?;

        let cycle_embedding = match (&self.dim1, &persistence.dim1) {
            (Some(aggregator), Some(pairs)) => Some(self.aggregate(aggregator.as_ref(), pairs)?),
            _ => None,
        };

        debug!(
            "topology layer: N = {}, B = {}, cap0 = {}, node embedding {:?}, cycle embedding {:?}",
            batch.num_nodes(),
            batch.num_graphs(),
            persistence.pairs.dim0.capacity(),
            node_embedding.dims(),
            cycle_embedding.as_ref().map(|t| t.dims().to_vec())
        );

        Ok(TopologyOutput {
            node_embedding,
            cycle_embedding,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AggregatorConfig, Reduction};
    use crate::graph::Graph;
    use crate::topology::PersistenceInput;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;
    use ndarray::{array, Array2, Array4};

    /// Graph A: 4-cycle, graph B: 4-path, identical node features
    fn cycle_and_path() -> BatchedGraph {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let cycle = Graph::new(x.clone(), vec![(0, 1), (1, 2), (2, 3), (3, 0)]).unwrap();
        let path = Graph::new(x, vec![(0, 1), (1, 2), (2, 3)]).unwrap();
        BatchedGraph::from_graphs(&[cycle, path], &Device::Cpu).unwrap()
    }

    fn config(dim1: AggregatorConfig) -> TopologyConfig {
        TopologyConfig {
            num_filtrations: 1,
            filtration_hidden: 1,
            ..TopologyConfig::new(1, 4)
        }
        .with_dim1(dim1)
    }

    /// Layer whose single filtration is f(x) = relu(x) = x on x >= 0
    fn identity_layer(varmap: &mut VarMap, config: &TopologyConfig) -> TopologyLayer {
        let vb = VarBuilder::from_varmap(varmap, DType::F32, &Device::Cpu);
        let layer = TopologyLayer::new(config, vb).unwrap();
        let one = Tensor::new(&[[1.0f32]], &Device::Cpu).unwrap();
        let zero = Tensor::new(&[0.0f32], &Device::Cpu).unwrap();
        for head in ["filtration.0.0", "filtration.0.2"] {
            varmap.set_one(format!("{}.weight", head), &one).unwrap();
            varmap.set_one(format!("{}.bias", head), &zero).unwrap();
        }
        layer
    }

    #[test]
    fn test_cycle_vs_path_pairs() {
        let mut varmap = VarMap::new();
        let config = config(AggregatorConfig::all_families(3, Reduction::Sum));
        let layer = identity_layer(&mut varmap, &config);
        let batch = cycle_and_path();

        let p = layer.persistence(batch.node_features(), &batch).unwrap();
        assert_eq!(p.pairs.dim0.counts, array![[3usize, 3]]);
        assert_eq!(p.pairs.dim1.as_ref().unwrap().counts, array![[1usize, 0]]);

        let nodes: Vec<Vec<f32>> = p.node_values.to_vec2().unwrap();
        assert_eq!(nodes[5][0], 1.0);
        for g in 0..2 {
            for (birth, death) in p.pairs.dim0.pairs(0, g) {
                assert!(death >= birth);
            }
        }
    }

    #[test]
    fn test_graph_without_cycles_has_zero_cycle_embedding() {
        let mut varmap = VarMap::new();
        let config = config(AggregatorConfig::all_families(3, Reduction::Sum));
        let layer = identity_layer(&mut varmap, &config);
        let batch = cycle_and_path();

        let out = layer.forward(batch.node_features(), &batch).unwrap();
        assert_eq!(out.node_embedding.dims(), &[8, 4]);
        let cycles: Vec<Vec<f32>> = out.cycle_embedding.unwrap().to_vec2().unwrap();
        assert_eq!(cycles[0].len(), 12);
        assert!(cycles[1].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_forward_is_deterministic() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let layer = TopologyLayer::new(&config(AggregatorConfig::attention(8, 2, 4)), vb).unwrap();
        let batch = cycle_and_path();

        let a = layer.forward(batch.node_features(), &batch).unwrap();
        let b = layer.forward(batch.node_features(), &batch).unwrap();
        let a0: Vec<Vec<f32>> = a.node_embedding.to_vec2().unwrap();
        let b0: Vec<Vec<f32>> = b.node_embedding.to_vec2().unwrap();
        assert_eq!(a0, b0);
        let a1: Vec<Vec<f32>> = a.cycle_embedding.unwrap().to_vec2().unwrap();
        let b1: Vec<Vec<f32>> = b.cycle_embedding.unwrap().to_vec2().unwrap();
        assert_eq!(a1, b1);
    }

    fn assert_rows_close(a: &[Vec<f32>], b: &[Vec<f32>], tolerance: f32) {
        for (x, y) in a.iter().zip(b) {
            for (u, v) in x.iter().zip(y) {
                assert!((u - v).abs() <= tolerance, "{} vs {}", u, v);
            }
        }
    }

    /// Embeddings of the batch and of the same batch with its graphs swapped
    fn forward_both_orders(dim1: AggregatorConfig) -> (TopologyOutput, TopologyOutput, TopologyLayer) {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let mut config = config(dim1.clone());
        config.dim0 = dim1;
        config.num_filtrations = 2;
        config.filtration_hidden = 4;
        let layer = TopologyLayer::new(&config, vb).unwrap();

        let batch = cycle_and_path();
        let swapped = batch.select_graphs(&[1, 0]).unwrap();
        let a = layer.forward(batch.node_features(), &batch).unwrap();
        let b = layer.forward(swapped.node_features(), &swapped).unwrap();

        // Host pairs of each graph are identical bit for bit
        let pa = layer.persistence(batch.node_features(), &batch).unwrap();
        let pb = layer.persistence(swapped.node_features(), &swapped).unwrap();
        for f in 0..2 {
            assert_eq!(pa.pairs.dim0.pairs(f, 0), pb.pairs.dim0.pairs(f, 1));
            assert_eq!(pa.pairs.dim0.pairs(f, 1), pb.pairs.dim0.pairs(f, 0));
        }
        (a, b, layer)
    }

    #[test]
    fn test_batch_order_invariance_is_exact_for_mean_pooling() {
        let (a, b, _) = forward_both_orders(AggregatorConfig::all_families(3, Reduction::Mean));

        let ca: Vec<Vec<f32>> = a.cycle_embedding.unwrap().to_vec2().unwrap();
        let cb: Vec<Vec<f32>> = b.cycle_embedding.unwrap().to_vec2().unwrap();
        assert_eq!(ca[0], cb[1]);
        assert_eq!(ca[1], cb[0]);

        let na: Vec<Vec<f32>> = a.node_embedding.to_vec2().unwrap();
        let nb: Vec<Vec<f32>> = b.node_embedding.to_vec2().unwrap();
        assert_eq!(na[0..4], nb[4..8]);
        assert_eq!(na[4..8], nb[0..4]);
    }

    #[test]
    fn test_batch_order_invariance_for_attention() {
        let (a, b, _) = forward_both_orders(AggregatorConfig::attention(8, 2, 4));

        let ca: Vec<Vec<f32>> = a.cycle_embedding.unwrap().to_vec2().unwrap();
        let cb: Vec<Vec<f32>> = b.cycle_embedding.unwrap().to_vec2().unwrap();
        assert_rows_close(&[ca[0].clone(), ca[1].clone()], &[cb[1].clone(), cb[0].clone()], 1e-5);

        let na: Vec<Vec<f32>> = a.node_embedding.to_vec2().unwrap();
        let nb: Vec<Vec<f32>> = b.node_embedding.to_vec2().unwrap();
        assert_rows_close(&na[0..4], &nb[4..8], 1e-5);
        assert_rows_close(&na[4..8], &nb[0..4], 1e-5);
    }

    #[test]
    fn test_component_activations_are_per_vertex() {
        let mut varmap = VarMap::new();
        let mut config = config(AggregatorConfig::all_families(2, Reduction::Sum));
        config.dim0 = AggregatorConfig::all_families(2, Reduction::Mean);
        let layer = identity_layer(&mut varmap, &config);
        let batch = cycle_and_path();

        // Path 4-5-6-7 with values 0..3: vertex 4 survives, vertex k dies
        // at the edge to its predecessor with pair (k - 4, k - 4)
        let p = layer.persistence(batch.node_features(), &batch).unwrap();
        let rows: Vec<Vec<f32>> = layer.component_activations(&p).unwrap().to_vec2().unwrap();
        assert_eq!(rows.len(), 8);
        assert_eq!(rows[0].len(), 8);

        assert!(rows[4].iter().all(|&v| v == 0.0));
        for k in 5..8 {
            assert!(rows[k].iter().any(|&v| v != 0.0));
        }
        assert_ne!(rows[5], rows[6]);
        assert_ne!(rows[6], rows[7]);
        assert_ne!(rows[5], rows[7]);

        // Same vertex values and merges in the cycle: rows 1..3 match the path
        assert_rows_close(&rows[1..4], &rows[5..8], 1e-6);

        let out = layer.forward(batch.node_features(), &batch).unwrap();
        let nodes: Vec<Vec<f32>> = out.node_embedding.to_vec2().unwrap();
        assert_ne!(nodes[5], nodes[6]);
    }

    #[test]
    fn test_gradients_reach_filtrations() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let layer = TopologyLayer::new(&config(AggregatorConfig::all_families(2, Reduction::Sum)), vb).unwrap();
        let batch = cycle_and_path();

        let out = layer.forward(batch.node_features(), &batch).unwrap();
        let loss = (out.node_embedding.sum_all().unwrap() + out.cycle_embedding.unwrap().sum_all().unwrap()).unwrap();
        let grads = loss.backward().unwrap();

        let vars = varmap.data().lock().unwrap();
        let head = vars.get("filtration.0.2.weight").unwrap();
        assert!(grads.get(head.as_tensor()).is_some());
    }

    #[test]
    fn test_wrong_input_width() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let layer = TopologyLayer::new(&TopologyConfig::new(3, 4), vb).unwrap();
        let batch = cycle_and_path();
        assert!(matches!(
            layer.forward(batch.node_features(), &batch),
            Err(TopoError::ShapeMismatch { .. })
        ));
    }

    /// Reports one graph too many
    struct Miscounting;

    impl PersistenceBackend for Miscounting {
        fn compute(&self, input: &PersistenceInput<'_>, _with_cycles: bool) -> Result<PersistencePairs> {
            let (f, b) = (input.num_filtrations(), input.num_graphs() + 1);
            Ok(PersistencePairs {
                dim0: PairBlock {
                    values: Array4::zeros((f, b, 1, 2)),
                    generators: Array4::zeros((f, b, 1, 2)),
                    counts: Array2::zeros((f, b)),
                },
                dim1: None,
            })
        }

        fn name(&self) -> &'static str {
            "miscounting"
        }
    }

    #[test]
    fn test_backend_shape_mismatch_is_fatal() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let mut config = TopologyConfig::new(1, 4);
        config.num_filtrations = 1;
        let layer = TopologyLayer::new(&config, vb).unwrap().with_backend(Box::new(Miscounting));
        let batch = cycle_and_path();
        assert!(matches!(
            layer.forward(batch.node_features(), &batch),
            Err(TopoError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_single_nodes_and_no_edges() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let layer = TopologyLayer::new(&config(AggregatorConfig::all_families(2, Reduction::Sum)), vb).unwrap();
        let a = Graph::new(array![[0.5]], vec![]).unwrap();
        let b = Graph::new(array![[0.1], [0.2]], vec![]).unwrap();
        let batch = BatchedGraph::from_graphs(&[a, b], &Device::Cpu).unwrap();

        let out = layer.forward(batch.node_features(), &batch).unwrap();
        assert_eq!(out.node_embedding.dims(), &[3, 4]);
        let cycles: Vec<Vec<f32>> = out.cycle_embedding.unwrap().to_vec2().unwrap();
        assert!(cycles.iter().flatten().all(|&v| v == 0.0));
    }
}
