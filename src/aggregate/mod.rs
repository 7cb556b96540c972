//! Set Aggregation of Persistence Pairs
//!
//! The pairs of one graph under one filtration form a set of variable
//! size. An aggregator either embeds every slot of the padded batch of
//! such sets, or reduces each set to one fixed-width vector per graph:
//!
//! ```text
//!   values [B, cap, 2] ─┐   ┌────────────┐ ─ embed  ─▶ [B, cap, out]
//!                       ├──▶│ aggregator │
//!   mask   [B, cap]    ─┘   └────────────┘ ─ reduce ─▶ [B, out]
//! ```
//!
//! Two policies are provided:
//!
//! - `CoordinatePooling`: coordinate functions on every pair, then a
//!   masked mean or sum
//! - `AttentionAggregator`: inducing-point attention over the raw pairs,
//!   then a masked mean
//!
//! Padded slots never contribute: their embeddings are zero, and a graph
//! without valid pairs reduces to the zero vector.

mod attention;
mod pooling;

use candle_core::Tensor;
use candle_nn::VarBuilder;

use crate::config::AggregatorConfig;
use crate::error::{Result, TopoError};
use crate::topology::PairTensors;

pub use attention::{AttentionAggregator, MultiheadAttentionBlock};
pub use pooling::CoordinatePooling;

/// Padded pair sets of one filtration and one homology dimension
#[derive(Debug, Clone)]
pub struct PairSet {
    /// (birth, death) [B, cap, 2]
    pub values: Tensor,
    /// 1.0 for valid slots [B, cap]
    pub mask: Tensor,
}

impl PairSet {
    pub fn new(values: Tensor, mask: Tensor) -> Result<Self> {
        let (b, cap, two) = values.dims3()?;
        let (mb, mcap) = mask.dims2()?;
        if two != 2 || mb != b || mcap != cap {
            return Err(TopoError::shape(
                "pair set",
                format!("values [B, cap, 2] with mask [B, cap], got mask [{}, {}]", mb, mcap),
                format!("values {:?}", values.dims()),
            ));
        }
        Ok(Self { values, mask })
    }

    /// Filtration `f` of a gathered pair block
    pub fn from_tensors(tensors: &PairTensors, f: usize) -> Result<Self> {
        let (values, mask) = tensors.filtration(f)?;
        Self::new(values, mask)
    }

    pub fn num_graphs(&self) -> usize {
        self.mask.dims()[0]
    }

    pub fn capacity(&self) -> usize {
        self.mask.dims()[1]
    }

    /// max(valid count, 1) per graph [B, 1]
    pub(crate) fn divisor(&self) -> Result<Tensor> {
        Ok(self.mask.sum_keepdim(1)?.maximum(1.0)?)
    }

    /// Masked mean over slots of per-slot vectors [B, cap, d] -> [B, d]
    pub(crate) fn masked_mean(&self, per_slot: &Tensor) -> Result<Tensor> {
        let summed = self.masked_sum(per_slot)?;
        Ok(summed.broadcast_div(&self.divisor()?)?)
    }

    /// Masked sum over slots [B, cap, d] -> [B, d]
    pub(crate) fn masked_sum(&self, per_slot: &Tensor) -> Result<Tensor> {
        Ok(self.masked(per_slot)?.sum(1)?)
    }

    /// Zero the padded slots of [B, cap, d]
    pub(crate) fn masked(&self, per_slot: &Tensor) -> Result<Tensor> {
        Ok(per_slot.broadcast_mul(&self.mask.unsqueeze(2)?)?)
    }
}

/// Embeds padded pair sets slot by slot, or reduces them to one vector per
/// graph.
pub trait SetAggregator: std::fmt::Debug {
    /// [B, cap, 2] + mask -> [B, cap, output_dim], zero in padded slots
    fn embed(&self, pairs: &PairSet) -> Result<Tensor>;

    /// [B, cap, 2] + mask -> [B, output_dim]
    fn reduce(&self, pairs: &PairSet) -> Result<Tensor>;

    fn output_dim(&self) -> usize;
}

/// Build the aggregator a config asks for
pub fn build_aggregator(config: &AggregatorConfig, vb: VarBuilder) -> Result<Box<dyn SetAggregator>> {
    config.validate("aggregator")?;
    let aggregator: Box<dyn SetAggregator> = match config {
        AggregatorConfig::Coordinates { widths, reduction } => {
            Box::new(CoordinatePooling::from_widths(widths, *reduction, vb)?)
        }
        AggregatorConfig::Attention {
            out_dim,
            heads,
            num_inds,
        } => Box::new(AttentionAggregator::new(2, *out_dim, *heads, *num_inds, vb)?),
    };
    Ok(aggregator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Reduction;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    #[test]
    fn test_pair_set_shape_check() {
        let values = Tensor::zeros((2, 3, 2), DType::F32, &Device::Cpu).unwrap();
        let mask = Tensor::zeros((2, 4), DType::F32, &Device::Cpu).unwrap();
        assert!(PairSet::new(values, mask).is_err());
    }

    #[test]
    fn test_build_from_config() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let pooled = build_aggregator(&AggregatorConfig::all_families(3, Reduction::Mean), vb.pp("a")).unwrap();
        assert_eq!(pooled.output_dim(), 12);

        let attention = build_aggregator(&AggregatorConfig::attention(8, 2, 4), vb.pp("b")).unwrap();
        assert_eq!(attention.output_dim(), 8);

        assert!(build_aggregator(&AggregatorConfig::attention(8, 3, 4), vb.pp("c")).is_err());
    }
}
