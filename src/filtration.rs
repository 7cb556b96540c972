//! Learned Filtrations
//!
//! F independent heads map node features to one scalar each:
//!
//!   f_k(x) = W₂ ReLU(W₁ x + b₁) + b₂,     k = 1..F
//!
//! The heads share no parameters. Values are extended to edges by
//!
//!   f_k(u, v) = max(f_k(u), f_k(v))
//!
//! so an edge never enters the sweep before its endpoints. Any other
//! reduction (min, mean) breaks this monotonicity and with it the elder
//! rule.

use candle_core::{Module, Tensor};
use candle_nn::{linear, Linear, VarBuilder};

use crate::error::{Result, TopoError};
use crate::graph::BatchedGraph;

/// One filtration head: Linear → ReLU → Linear(·, 1)
#[derive(Debug, Clone)]
struct FiltrationHead {
    hidden: Linear,
    out: Linear,
}

impl FiltrationHead {
    fn new(features_in: usize, hidden: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            hidden: linear(features_in, hidden, vb.pp("0"))?,
            out: linear(hidden, 1, vb.pp("2"))?,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let h = self.hidden.forward(x)?.relu()?;
        Ok(self.out.forward(&h)?)
    }
}

/// The F filtration heads of a topological layer
#[derive(Debug, Clone)]
pub struct FiltrationFunctions {
    heads: Vec<FiltrationHead>,
    features_in: usize,
}

impl FiltrationFunctions {
    pub fn new(
        features_in: usize,
        hidden: usize,
        num_filtrations: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        if features_in == 0 || hidden == 0 || num_filtrations == 0 {
            return Err(TopoError::config(format!(
                "filtration sizes must be positive (features_in {}, hidden {}, filtrations {})",
                features_in, hidden, num_filtrations
            )));
        }
        let heads = (0..num_filtrations)
            .map(|k| FiltrationHead::new(features_in, hidden, vb.pp(k.to_string())))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { heads, features_in })
    }

    pub fn num_filtrations(&self) -> usize {
        self.heads.len()
    }

    /// Node values: [N, Cin] -> [N, F]
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (_, cin) = x.dims2()?;
        if cin != self.features_in {
            return Err(TopoError::shape("filtration input", format!("[N, {}]", self.features_in), format!("[N, {}]", cin)));
        }
        let columns = self
            .heads
            .iter()
            .map(|head| head.forward(x))
            .collect::<Result<Vec<_>>>()?;
        Ok(Tensor::cat(&columns, 1)?)
    }
}

/// Edge values by max extension: [N, F] -> [E, F]
pub fn extend_to_edges(values: &Tensor, batch: &BatchedGraph) -> Result<Tensor> {
    let (n, f) = values.dims2()?;
    if n != batch.num_nodes() {
        return Err(TopoError::shape("filtration values", format!("[{}, F]", batch.num_nodes()), format!("[{}, {}]", n, f)));
    }
    let edges = batch.edge_index();
    if edges.is_empty() {
        return Ok(Tensor::zeros((0, f), values.dtype(), values.device())?);
    }
    let src = values.index_select(edges.src(), 0)?;
    let dst = values.index_select(edges.dst(), 0)?;
    Ok(src.maximum(&dst)?)
}
