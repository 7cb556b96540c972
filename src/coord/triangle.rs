use candle_core::Tensor;
use candle_nn::{Init, VarBuilder};

use crate::error::Result;

/// Tent response: ψ_j(b, d) = max(0, d - |t_j - b|)
///
/// Peaks at birth = t_j with height d; pairs far from every centre map to
/// zero.
#[derive(Debug, Clone)]
pub struct Triangle {
    /// Centres [k], ~ N(0, 1)
    t: Tensor,
}

impl Triangle {
    pub fn new(width: usize, vb: VarBuilder) -> Result<Self> {
        let t = vb.get_with_hints(width, "t_param", Init::Randn { mean: 0.0, stdev: 1.0 })?;
        Ok(Self { t })
    }

    pub fn output_dim(&self) -> usize {
        self.t.elem_count()
    }

    /// [P, 2] -> [P, k]
    pub fn forward(&self, pairs: &Tensor) -> Result<Tensor> {
        let birth = pairs.narrow(1, 0, 1)?;
        let death = pairs.narrow(1, 1, 1)?;
        let distance = self.t.unsqueeze(0)?.broadcast_sub(&birth)?.abs()?;
        Ok(death.broadcast_sub(&distance)?.relu()?)
    }
}
