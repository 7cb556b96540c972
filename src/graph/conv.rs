//! Message-Passing Convolutions
//!
//! Opaque feature transformers `(x [N, Cin], edges) -> x' [N, Cout]` used
//! before and after the topological layer. Messages flow along the stored
//! directed pairs, source → target; undirected graphs are expected to be
//! stored with both directions.
//!
//! ```text
//! h_i' = UPDATE(h_i, Σ_{(j → i) ∈ E} MESSAGE(h_j))
//! ```
//!
//! Aggregation is a scatter-add (`index_add`) over the target index, which
//! keeps the whole operator differentiable.

use candle_core::{DType, Module, Tensor};
use candle_nn::{linear, linear_no_bias, Init, Linear, VarBuilder};

use super::batch::EdgeIndex;
use crate::error::{Result, TopoError};

/// A message-passing operator that preserves the node count.
pub trait MessagePassing: std::fmt::Debug {
    fn forward(&self, x: &Tensor, edges: &EdgeIndex) -> Result<Tensor>;
}

/// Σ_{(j → i)} messages[e] into a fresh [N, C] tensor
fn scatter_to_targets(messages: &Tensor, edges: &EdgeIndex, n: usize) -> Result<Tensor> {
    let c = messages.dim(1)?;
    let zeros = Tensor::zeros((n, c), messages.dtype(), messages.device())?;
    if edges.is_empty() {
        return Ok(zeros);
    }
    Ok(zeros.index_add(edges.dst(), messages, 0)?)
}

fn check_nodes(x: &Tensor, edges: &EdgeIndex, context: &str) -> Result<usize> {
    let n = x.dim(0)?;
    if n != edges.num_nodes() {
        return Err(TopoError::shape(context, format!("{} nodes", edges.num_nodes()), format!("{} nodes", n)));
    }
    Ok(n)
}

/// Graph Convolutional Network layer.
///
/// Implements: H' = D^{-1/2} (A + I) D^{-1/2} H W + b
///
/// where D counts incoming pairs plus the self loop.
///
/// # Reference
///
/// Kipf & Welling, "Semi-Supervised Classification with Graph Convolutional
/// Networks", ICLR 2017.
#[derive(Debug, Clone)]
pub struct GcnConv {
    linear: Linear,
    bias: Tensor,
}

impl GcnConv {
    pub fn new(in_features: usize, out_features: usize, vb: VarBuilder) -> Result<Self> {
        let linear = linear_no_bias(in_features, out_features, vb.pp("lin"))?;
        let bias = vb.get_with_hints(out_features, "bias", Init::Const(0.0))?;
        Ok(Self { linear, bias })
    }

    /// Symmetric normalisation weight per stored pair, and 1/deg per node
    fn normalisation(edges: &EdgeIndex) -> (Vec<f32>, Vec<f32>) {
        let degree: Vec<f32> = edges.in_degree().iter().map(|d| d + 1.0).collect();
        let edge_weight = edges
            .pairs()
            .iter()
            .map(|&(u, v)| 1.0 / (degree[u] * degree[v]).sqrt())
            .collect();
        let self_weight = degree.iter().map(|d| 1.0 / d).collect();
        (edge_weight, self_weight)
    }
}

impl MessagePassing for GcnConv {
    fn forward(&self, x: &Tensor, edges: &EdgeIndex) -> Result<Tensor> {
        let n = check_nodes(x, edges, "gcn input")?;
        let h = self.linear.forward(x)?;
        let (dtype, device) = (h.dtype(), h.device());

        let (edge_weight, self_weight) = Self::normalisation(edges);
        let self_weight = Tensor::from_vec(self_weight, (n, 1), device)?.to_dtype(dtype)?;
        let mut out = h.broadcast_mul(&self_weight)?;

        if !edges.is_empty() {
            let e = edges.num_edges();
            let edge_weight = Tensor::from_vec(edge_weight, (e, 1), device)?.to_dtype(dtype)?;
            let messages = h.index_select(edges.src(), 0)?.broadcast_mul(&edge_weight)?;
            out = (out + scatter_to_targets(&messages, edges, n)?)?;
        }

        Ok(out.broadcast_add(&self.bias)?)
    }
}

/// Graph Isomorphism Network layer.
///
/// Implements: h_i' = MLP((1 + ε) h_i + Σ_{j → i} h_j)
///
/// with MLP = Linear → ReLU → Linear and ε learnable when `train_eps`.
///
/// # Reference
///
/// Xu et al., "How Powerful are Graph Neural Networks?", ICLR 2019.
#[derive(Debug, Clone)]
pub struct GinConv {
    lin1: Linear,
    lin2: Linear,
    /// ε as a [1] tensor (a variable only when trained)
    eps: Tensor,
}

impl GinConv {
    pub fn new(
        in_features: usize,
        out_features: usize,
        train_eps: bool,
        vb: VarBuilder,
    ) -> Result<Self> {
        let lin1 = linear(in_features, out_features, vb.pp("nn.0"))?;
        let lin2 = linear(out_features, out_features, vb.pp("nn.2"))?;
        let eps = if train_eps {
            vb.get_with_hints(1, "eps", Init::Const(0.0))?
        } else {
            Tensor::zeros(1, DType::F32, vb.device())?.to_dtype(vb.dtype())?
        };
        Ok(Self { lin1, lin2, eps })
    }
}

impl MessagePassing for GinConv {
    fn forward(&self, x: &Tensor, edges: &EdgeIndex) -> Result<Tensor> {
        let n = check_nodes(x, edges, "gin input")?;
        let messages = if edges.is_empty() {
            x.zeros_like()?
        } else {
            scatter_to_targets(&x.index_select(edges.src(), 0)?, edges, n)?
        };
        let scale = (&self.eps + 1.0)?;
        let h = (x.broadcast_mul(&scale)? + messages)?;
        let h = self.lin1.forward(&h)?.relu()?;
        Ok(self.lin2.forward(&h)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{BatchedGraph, Graph};
    use candle_core::Device;
    use candle_nn::VarMap;
    use ndarray::array;

    fn two_paths() -> BatchedGraph {
        let path = Graph::new(array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]], vec![(0, 1), (1, 0), (1, 2), (2, 1)]).unwrap();
        let single = Graph::new(array![[2.0, 2.0]], vec![]).unwrap();
        BatchedGraph::from_graphs(&[path, single], &Device::Cpu).unwrap()
    }

    #[test]
    fn test_gcn_shape_and_isolated_node() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let conv = GcnConv::new(2, 5, vb).unwrap();
        let batch = two_paths();

        let out = conv.forward(batch.node_features(), batch.edge_index()).unwrap();
        assert_eq!(out.dims(), &[4, 5]);

        // An isolated node only sees itself: D = 1, so h' = x W
        let alone = conv.linear.forward(&batch.node_features().get(3).unwrap().unsqueeze(0).unwrap()).unwrap();
        let got: Vec<f32> = out.get(3).unwrap().to_vec1().unwrap();
        let want: Vec<f32> = alone.squeeze(0).unwrap().to_vec1().unwrap();
        for (g, w) in got.iter().zip(&want) {
            assert!((g - w).abs() < 1e-6);
        }
    }

    #[test]
    fn test_gcn_rejects_wrong_node_count() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let conv = GcnConv::new(2, 3, vb).unwrap();
        let batch = two_paths();
        let x = Tensor::zeros((3, 2), DType::F32, &Device::Cpu).unwrap();
        assert!(matches!(
            conv.forward(&x, batch.edge_index()),
            Err(TopoError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_gin_sums_neighbours() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let conv = GinConv::new(2, 4, true, vb).unwrap();
        let batch = two_paths();
        let out = conv.forward(batch.node_features(), batch.edge_index()).unwrap();
        assert_eq!(out.dims(), &[4, 4]);
        // ε is a trainable variable
        assert_eq!(varmap.all_vars().len(), 5);
    }
}
