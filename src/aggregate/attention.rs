//! Inducing-Point Attention over Pair Sets
//!
//! Set Transformer blocks (Lee et al., ICML 2019):
//!
//! ```text
//!   MAB(Q, K) = H + ReLU(W_o H),   H = Q W_q + softmax(Q W_q (K W_k)ᵀ / √d) K W_v
//!   ISAB(X)   = MAB(X, MAB(I, X))  with m learned inducing points I [m, d]
//! ```
//!
//! The first block attends from the inducing points to the set, so
//! padded slots are masked as keys (logit - 1e9, zero weight after the
//! softmax). The second attends from every slot to the m summaries; its
//! padded query rows are zeroed, or dropped by the final masked mean.
//!
//! The same ISAB runs over any padded set of d-dimensional rows, not only
//! (birth, death) pairs: the baseline model uses it over node features.

use candle_core::{Tensor, D};
use candle_nn::{linear, ops, Init, Linear, Module, VarBuilder};

use super::{PairSet, SetAggregator};
use crate::error::{Result, TopoError};

/// Additive logit for masked keys
const MASKED_LOGIT: f64 = -1e9;

/// Multihead attention block MAB(Q, K)
#[derive(Debug, Clone)]
pub struct MultiheadAttentionBlock {
    fc_q: Linear,
    fc_k: Linear,
    fc_v: Linear,
    fc_o: Linear,
    dim: usize,
    heads: usize,
}

impl MultiheadAttentionBlock {
    pub fn new(dim_q: usize, dim_k: usize, dim: usize, heads: usize, vb: VarBuilder) -> Result<Self> {
        if heads == 0 || dim % heads != 0 {
            return Err(TopoError::config(format!(
                "attention width {} is not divisible by {} heads",
                dim, heads
            )));
        }
        Ok(Self {
            fc_q: linear(dim_q, dim, vb.pp("fc_q"))?,
            fc_k: linear(dim_k, dim, vb.pp("fc_k"))?,
            fc_v: linear(dim_k, dim, vb.pp("fc_v"))?,
            fc_o: linear(dim, dim, vb.pp("fc_o"))?,
            dim,
            heads,
        })
    }

    /// [B, n, dim] -> [B, heads, n, dim / heads]
    fn split_heads(&self, x: &Tensor) -> Result<Tensor> {
        let (b, n, _) = x.dims3()?;
        Ok(x
            .reshape((b, n, self.heads, self.dim / self.heads))?
            .transpose(1, 2)?
            .contiguous()?)
    }

    /// Q [B, nq, dim_q], K [B, nk, dim_k], optional key mask [B, nk]
    /// -> [B, nq, dim]
    pub fn forward(&self, q: &Tensor, k: &Tensor, key_mask: Option<&Tensor>) -> Result<Tensor> {
        let (b, nq, _) = q.dims3()?;
        let q = self.fc_q.forward(q)?;
        let keys = self.split_heads(&self.fc_k.forward(k)?)?;
        let values = self.split_heads(&self.fc_v.forward(k)?)?;
        let queries = self.split_heads(&q)?;

        let scale = (self.dim as f64).sqrt();
        let mut logits = (queries.matmul(&keys.t()?.contiguous()?)? / scale)?;
        if let Some(mask) = key_mask {
            let (_, nk) = mask.dims2()?;
            let penalty = ((mask - 1.0)? * -MASKED_LOGIT)?.reshape((b, 1, 1, nk))?;
            logits = logits.broadcast_add(&penalty)?;
        }
        let weights = ops::softmax(&logits, D::Minus1)?;

        let attended = weights
            .matmul(&values)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((b, nq, self.dim))?;
        let h = (q + attended)?;
        let out = self.fc_o.forward(&h)?.relu()?;
        Ok((h + out)?)
    }
}

/// ISAB over the raw set elements followed by a masked mean
#[derive(Debug, Clone)]
pub struct AttentionAggregator {
    /// Inducing points [1, m, dim]
    inducing: Tensor,
    summarise: MultiheadAttentionBlock,
    broadcast: MultiheadAttentionBlock,
    dim: usize,
}

impl AttentionAggregator {
    pub fn new(
        dim_in: usize,
        dim: usize,
        heads: usize,
        num_inds: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        if dim_in == 0 || dim == 0 || num_inds == 0 {
            return Err(TopoError::config(format!(
                "attention sizes must be positive (dim_in {}, dim {}, num_inds {})",
                dim_in, dim, num_inds
            )));
        }
        let stdev = (2.0 / (num_inds + dim) as f64).sqrt();
        let inducing = vb.get_with_hints((1, num_inds, dim), "inducing", Init::Randn { mean: 0.0, stdev })?;
        Ok(Self {
            inducing,
            summarise: MultiheadAttentionBlock::new(dim, dim_in, dim, heads, vb.pp("mab0"))?,
            broadcast: MultiheadAttentionBlock::new(dim_in, dim, dim, heads, vb.pp("mab1"))?,
            dim,
        })
    }

    pub fn num_inducing_points(&self) -> usize {
        self.inducing.dims()[1]
    }

    /// ISAB(X) for padded sets X [B, cap, dim_in] with mask [B, cap]
    /// -> [B, cap, dim], padded rows not yet zeroed
    pub fn isab(&self, set: &Tensor, mask: &Tensor) -> Result<Tensor> {
        let (b, _, _) = set.dims3()?;
        let (_, m, dim) = self.inducing.dims3()?;
        let inducing = self.inducing.broadcast_as((b, m, dim))?.contiguous()?;

        let summary = self.summarise.forward(&inducing, set, Some(mask))?;
        self.broadcast.forward(set, &summary, None)
    }
}

impl SetAggregator for AttentionAggregator {
    fn embed(&self, pairs: &PairSet) -> Result<Tensor> {
        pairs.masked(&self.isab(&pairs.values, &pairs.mask)?)
    }

    fn reduce(&self, pairs: &PairSet) -> Result<Tensor> {
        pairs.masked_mean(&self.isab(&pairs.values, &pairs.mask)?)
    }

    fn output_dim(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn aggregator(varmap: &VarMap) -> AttentionAggregator {
        let vb = VarBuilder::from_varmap(varmap, DType::F32, &Device::Cpu);
        AttentionAggregator::new(2, 8, 2, 4, vb).unwrap()
    }

    #[test]
    fn test_shapes_and_empty_graph() {
        let varmap = VarMap::new();
        let agg = aggregator(&varmap);
        let set = PairSet::new(
            Tensor::new(&[[[0.1f32, 0.5], [0.2, 0.9]], [[0.0, 0.0], [0.0, 0.0]]], &Device::Cpu).unwrap(),
            Tensor::new(&[[1.0f32, 1.0], [0.0, 0.0]], &Device::Cpu).unwrap(),
        )
        .unwrap();

        let out: Vec<Vec<f32>> = agg.reduce(&set).unwrap().to_vec2().unwrap();
        assert_eq!(out[0].len(), 8);
        assert!(out[0].iter().all(|v| v.is_finite()));
        assert!(out[1].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_padded_slots_get_no_weight() {
        let varmap = VarMap::new();
        let agg = aggregator(&varmap);
        let short = PairSet::new(
            Tensor::new(&[[[0.1f32, 0.5], [0.3, 0.4]]], &Device::Cpu).unwrap(),
            Tensor::new(&[[1.0f32, 1.0]], &Device::Cpu).unwrap(),
        )
        .unwrap();
        // Same set with a padded slot holding a large decoy value
        let padded = PairSet::new(
            Tensor::new(&[[[0.1f32, 0.5], [0.3, 0.4], [7.0, 9.0]]], &Device::Cpu).unwrap(),
            Tensor::new(&[[1.0f32, 1.0, 0.0]], &Device::Cpu).unwrap(),
        )
        .unwrap();

        let a: Vec<Vec<f32>> = agg.reduce(&short).unwrap().to_vec2().unwrap();
        let b: Vec<Vec<f32>> = agg.reduce(&padded).unwrap().to_vec2().unwrap();
        for (x, y) in a[0].iter().zip(&b[0]) {
            assert!((x - y).abs() < 1e-5, "{} vs {}", x, y);
        }
    }

    #[test]
    fn test_permutation_invariant() {
        let varmap = VarMap::new();
        let agg = aggregator(&varmap);
        let mask = Tensor::new(&[[1.0f32, 1.0, 1.0]], &Device::Cpu).unwrap();
        let a = PairSet::new(
            Tensor::new(&[[[0.1f32, 0.5], [0.3, 0.4], [0.2, 0.8]]], &Device::Cpu).unwrap(),
            mask.clone(),
        )
        .unwrap();
        let b = PairSet::new(
            Tensor::new(&[[[0.2f32, 0.8], [0.1, 0.5], [0.3, 0.4]]], &Device::Cpu).unwrap(),
            mask,
        )
        .unwrap();

        let x: Vec<Vec<f32>> = agg.reduce(&a).unwrap().to_vec2().unwrap();
        let y: Vec<Vec<f32>> = agg.reduce(&b).unwrap().to_vec2().unwrap();
        for (u, v) in x[0].iter().zip(&y[0]) {
            assert!((u - v).abs() < 1e-5);
        }
    }

    #[test]
    fn test_embed_is_per_slot() {
        let varmap = VarMap::new();
        let agg = aggregator(&varmap);
        let set = PairSet::new(
            Tensor::new(&[[[0.1f32, 0.5], [0.2, 0.9], [0.0, 0.0]]], &Device::Cpu).unwrap(),
            Tensor::new(&[[1.0f32, 1.0, 0.0]], &Device::Cpu).unwrap(),
        )
        .unwrap();

        let slots: Vec<Vec<Vec<f32>>> = agg.embed(&set).unwrap().to_vec3().unwrap();
        assert_eq!(slots[0].len(), 3);
        assert_ne!(slots[0][0], slots[0][1]);
        assert!(slots[0][2].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_heads_must_divide() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        assert!(matches!(
            AttentionAggregator::new(2, 10, 4, 4, vb),
            Err(TopoError::Config(_))
        ));
    }
}
