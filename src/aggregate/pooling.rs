use std::collections::BTreeMap;

use candle_core::Tensor;
use candle_nn::VarBuilder;

use super::{PairSet, SetAggregator};
use crate::config::Reduction;
use crate::coord::CoordinateFamily;
use crate::error::Result;

/// Coordinate functions evaluated on every slot, masked, then pooled.
///
///   v_g = (1 / max(|D_g|, 1)) Σ_{x ∈ D_g} ψ(x)     (mean)
///   v_g = Σ_{x ∈ D_g} ψ(x)                          (sum)
#[derive(Debug, Clone)]
pub struct CoordinatePooling {
    family: CoordinateFamily,
    reduction: Reduction,
}

impl CoordinatePooling {
    pub fn new(family: CoordinateFamily, reduction: Reduction) -> Self {
        Self { family, reduction }
    }

    pub fn from_widths(
        widths: &BTreeMap<String, usize>,
        reduction: Reduction,
        vb: VarBuilder,
    ) -> Result<Self> {
        Ok(Self::new(CoordinateFamily::from_widths(widths, vb)?, reduction))
    }

    pub fn family(&self) -> &CoordinateFamily {
        &self.family
    }

    pub fn reduction(&self) -> Reduction {
        self.reduction
    }

    /// Unmasked activations of every slot [B, cap, k]
    fn activations(&self, pairs: &PairSet) -> Result<Tensor> {
        let (b, cap) = (pairs.num_graphs(), pairs.capacity());
        let flat = pairs.values.reshape((b * cap, 2))?;
        Ok(self
            .family
            .forward(&flat)?
            .reshape((b, cap, self.family.output_dim()))?)
    }
}

impl SetAggregator for CoordinatePooling {
    fn embed(&self, pairs: &PairSet) -> Result<Tensor> {
        pairs.masked(&self.activations(pairs)?)
    }

    fn reduce(&self, pairs: &PairSet) -> Result<Tensor> {
        let activations = self.activations(pairs)?;
        match self.reduction {
            Reduction::Mean => pairs.masked_mean(&activations),
            Reduction::Sum => pairs.masked_sum(&activations),
        }
    }

    fn output_dim(&self) -> usize {
        self.family.output_dim()
    }
}
