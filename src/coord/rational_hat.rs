use candle_core::Tensor;
use candle_nn::{Init, VarBuilder};

use crate::error::Result;

/// Rational hat: with n_j = ‖x - c_j‖₁,
///
///   ψ_j(x) = 1 / (1 + n_j) - 1 / (1 + | |r_j| - n_j |)
///
/// A bump of radius |r_j| around c_j with polynomial (heavier than
/// Gaussian) tails.
#[derive(Debug, Clone)]
pub struct RationalHat {
    /// Centres [k, 2], ~ N(0, 1)
    c: Tensor,
    /// Radii [1, k], ~ N(0, 1)
    r: Tensor,
}

impl RationalHat {
    pub fn new(width: usize, vb: VarBuilder) -> Result<Self> {
        let c = vb.get_with_hints((width, 2), "c_param", Init::Randn { mean: 0.0, stdev: 1.0 })?;
        let r = vb.get_with_hints((1, width), "r_param", Init::Randn { mean: 0.0, stdev: 1.0 })?;
        Ok(Self { c, r })
    }

    pub fn output_dim(&self) -> usize {
        self.c.dims()[0]
    }

    /// [P, 2] -> [P, k]
    pub fn forward(&self, pairs: &Tensor) -> Result<Tensor> {
        let norm = pairs
            .unsqueeze(1)?
            .broadcast_sub(&self.c.unsqueeze(0)?)?
            .abs()?
            .sum(2)?;
        let inner = (norm.clone() + 1.0)?.recip()?;
        let outer = (self.r.abs()?.broadcast_sub(&norm)?.abs()? + 1.0)?.recip()?;
        Ok((inner - outer)?)
    }
}
