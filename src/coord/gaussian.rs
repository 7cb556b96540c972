use candle_core::Tensor;
use candle_nn::{Init, VarBuilder};

use crate::error::Result;

/// Smallest σ² used in the exponent
const MIN_VARIANCE: f64 = 1e-6;

/// Gaussian bump: ψ_j(x) = exp(-‖x - t_j‖² / (2 max(σ², ε)))
#[derive(Debug, Clone)]
pub struct Gaussian {
    /// Centres [k, 2], ~ N(0, 1)
    t: Tensor,
    /// Shared bandwidth [1], starts at 1
    sigma: Tensor,
}

impl Gaussian {
    pub fn new(width: usize, vb: VarBuilder) -> Result<Self> {
        let t = vb.get_with_hints((width, 2), "t_param", Init::Randn { mean: 0.0, stdev: 1.0 })?;
        let sigma = vb.get_with_hints(1, "sigma", Init::Const(1.0))?;
        Ok(Self { t, sigma })
    }

    pub fn output_dim(&self) -> usize {
        self.t.dims()[0]
    }

    /// [P, 2] -> [P, k]
    pub fn forward(&self, pairs: &Tensor) -> Result<Tensor> {
        let squared = pairs
            .unsqueeze(1)?
            .broadcast_sub(&self.t.unsqueeze(0)?)?
            .sqr()?
            .sum(2)?;
        // σ → 0 would turn a pair sitting on a centre into 0/0
        let scale = (self.sigma.sqr()?.maximum(MIN_VARIANCE)? * 2.0)?;
        Ok(squared.broadcast_div(&scale)?.neg()?.exp()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_bump_values() {
        let g = Gaussian {
            t: Tensor::new(&[[0.0f32, 0.0]], &Device::Cpu).unwrap(),
            sigma: Tensor::new(&[1.0f32], &Device::Cpu).unwrap(),
        };
        let x = Tensor::new(&[[0.0f32, 0.0], [1.0, 1.0]], &Device::Cpu).unwrap();
        let out: Vec<Vec<f32>> = g.forward(&x).unwrap().to_vec2().unwrap();
        assert_eq!(out[0][0], 1.0);
        assert!((out[1][0] - (-1.0f32).exp()).abs() < 1e-6);
    }

    #[test]
    fn test_collapsed_bandwidth_stays_finite() {
        let g = Gaussian {
            t: Tensor::new(&[[0.0f32, 0.0], [2.0, 2.0]], &Device::Cpu).unwrap(),
            sigma: Tensor::new(&[0.0f32], &Device::Cpu).unwrap(),
        };
        // A padded (0, 0) slot on top of a centre, then masked out
        let x = Tensor::new(&[[0.5f32, 1.0], [0.0, 0.0]], &Device::Cpu).unwrap();
        let mask = Tensor::new(&[[1.0f32], [0.0]], &Device::Cpu).unwrap();
        let out: Vec<Vec<f32>> = g.forward(&x).unwrap().broadcast_mul(&mask).unwrap().to_vec2().unwrap();
        assert!(out.iter().flatten().all(|v| v.is_finite()));
        assert_eq!(out[1], vec![0.0, 0.0]);
    }
}
