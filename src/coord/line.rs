use candle_core::{Module, Tensor};
use candle_nn::{linear, Linear, VarBuilder};

use crate::error::Result;

/// Linear response: ψ_j(b, d) = w_j b + w'_j d + c_j
#[derive(Debug, Clone)]
pub struct Line {
    lin: Linear,
    width: usize,
}

impl Line {
    pub fn new(width: usize, vb: VarBuilder) -> Result<Self> {
        let lin = linear(2, width, vb.pp("lin"))?;
        Ok(Self { lin, width })
    }

    pub fn output_dim(&self) -> usize {
        self.width
    }

    /// [P, 2] -> [P, k]
    pub fn forward(&self, pairs: &Tensor) -> Result<Tensor> {
        Ok(self.lin.forward(pairs)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn line() -> Line {
        let w = Tensor::new(&[[1.0f32, 2.0], [0.0, -1.0]], &Device::Cpu).unwrap();
        let b = Tensor::new(&[0.5f32, 1.0], &Device::Cpu).unwrap();
        Line {
            lin: Linear::new(w, Some(b)),
            width: 2,
        }
    }

    #[test]
    fn test_affine_values() {
        let x = Tensor::new(&[[3.0f32, 4.0]], &Device::Cpu).unwrap();
        let out: Vec<Vec<f32>> = line().forward(&x).unwrap().to_vec2().unwrap();
        assert_eq!(out, vec![vec![11.5, -3.0]]);
    }

    #[test]
    fn test_padded_slot_is_masked() {
        // The bias makes a (0, 0) sentinel non-zero until the mask is applied
        let x = Tensor::new(&[[3.0f32, 4.0], [0.0, 0.0]], &Device::Cpu).unwrap();
        let raw: Vec<Vec<f32>> = line().forward(&x).unwrap().to_vec2().unwrap();
        assert_eq!(raw[1], vec![0.5, 1.0]);

        let mask = Tensor::new(&[[1.0f32], [0.0]], &Device::Cpu).unwrap();
        let out: Vec<Vec<f32>> = line().forward(&x).unwrap().broadcast_mul(&mask).unwrap().to_vec2().unwrap();
        assert_eq!(out, vec![vec![11.5, -3.0], vec![0.0, 0.0]]);
    }
}
