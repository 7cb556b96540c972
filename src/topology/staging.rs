//! Host Staging for the Persistence Hand-off
//!
//! Persistence runs on host memory with irregular data structures, while
//! filtration values live on the model device. The hand-off is one
//! scoped, blocking round trip:
//!
//! 1. `HostStaging::stage` detaches the filtration tensors, copies them to
//!    the CPU and lays them out filtration-major in owned buffers;
//! 2. `HostStaging::run` blocks on the backend;
//! 3. `PairBlock::to_device` gathers the pair values back out of the
//!    on-device filtration tensor by generator index, so gradients reach
//!    the filtration functions.
//!
//! The staging buffers are owned by the guard and released when it goes
//! out of scope, also when the backend fails.

use candle_core::{DType, Device, Tensor};
use log::{debug, trace};
use ndarray::Array2;

use super::batched::{PairBlock, PersistenceBackend, PersistenceInput, PersistencePairs};
use crate::error::{Result, TopoError};
use crate::graph::BatchedGraph;

/// Owned host copies of the filtration values
#[derive(Debug)]
pub struct HostStaging {
    /// Vertex values [F, N]
    vertex_values: Array2<f32>,
    /// Edge values [F, E]
    edge_values: Array2<f32>,
}

impl HostStaging {
    /// Copy `[N, F]` vertex and `[E, F]` edge values to the host.
    pub fn stage(vertex_values: &Tensor, edge_values: &Tensor) -> Result<Self> {
        let (n, f) = vertex_values.dims2()?;
        let (e, fe) = edge_values.dims2()?;
        if f != fe {
            return Err(TopoError::shape("edge filtration values", format!("[E, {}]", f), format!("[{}, {}]", e, fe)));
        }

        let vertex = to_host_filtration_major(vertex_values, f, n)?;
        let edge = to_host_filtration_major(edge_values, f, e)?;
        trace!("staged {} filtrations: {} vertex and {} edge values per filtration", f, n, e);

        Ok(Self {
            vertex_values: vertex,
            edge_values: edge,
        })
    }

    /// Run `backend` on the staged values; blocks until every lane is done.
    pub fn run(
        &self,
        batch: &BatchedGraph,
        backend: &dyn PersistenceBackend,
        with_cycles: bool,
    ) -> Result<PersistencePairs> {
        let input = PersistenceInput {
            vertex_values: self.vertex_values.view(),
            edge_values: self.edge_values.view(),
            edge_index: batch.edge_index().pairs(),
            node_slice: batch.node_slice(),
            edge_slice: batch.edge_slice(),
        };
        let pairs = backend.compute(&input, with_cycles)?;
        debug!(
            "{} persistence: {} graphs x {} filtrations, cap0 = {}, cap1 = {:?}",
            backend.name(),
            pairs.num_graphs(),
            pairs.num_filtrations(),
            pairs.dim0.capacity(),
            pairs.dim1.as_ref().map(PairBlock::capacity)
        );
        Ok(pairs)
    }

    pub fn vertex_values(&self) -> &Array2<f32> {
        &self.vertex_values
    }

    pub fn edge_values(&self) -> &Array2<f32> {
        &self.edge_values
    }
}

impl Drop for HostStaging {
    fn drop(&mut self) {
        trace!(
            "released host staging ({} + {} values)",
            self.vertex_values.len(),
            self.edge_values.len()
        );
    }
}

/// `[rows, F]` tensor on any device -> `[F, rows]` host array
fn to_host_filtration_major(values: &Tensor, f: usize, rows: usize) -> Result<Array2<f32>> {
    let host = values
        .detach()
        .to_device(&Device::Cpu)?
        .to_dtype(DType::F32)?
        .t()?
        .contiguous()?
        .flatten_all()?
        .to_vec1::<f32>()?;
    Array2::from_shape_vec((f, rows), host)
        .map_err(|e| TopoError::persistence(format!("staging layout: {}", e)))
}

/// Pair values and validity re-gathered on the model device
#[derive(Debug, Clone)]
pub struct PairTensors {
    /// (birth, death) [F, B, cap, 2], exactly zero in invalid slots
    pub values: Tensor,
    /// 1.0 for valid slots, 0.0 for sentinels [F, B, cap]
    pub mask: Tensor,
}

impl PairTensors {
    /// Values and mask of filtration `f`: ([B, cap, 2], [B, cap])
    pub fn filtration(&self, f: usize) -> Result<(Tensor, Tensor)> {
        Ok((self.values.get(f)?, self.mask.get(f)?))
    }
}

impl PairBlock {
    /// Gather pair values from `all_values` = [vertex values ; edge values]
    /// laid out as [F, N + E] on the model device.
    pub fn to_device(&self, all_values: &Tensor) -> Result<PairTensors> {
        let (f, b, cap) = (self.num_filtrations(), self.num_graphs(), self.capacity());
        let (fv, width) = all_values.dims2()?;
        if fv != f {
            return Err(TopoError::shape("persistence output", format!("{} filtrations", fv), format!("{} filtrations", f)));
        }
        if let Some(&max) = self.generators.iter().max() {
            if max >= width {
                return Err(TopoError::shape("generator index", format!("< {}", width), max));
            }
        }

        let device = all_values.device();
        let index: Vec<u32> = self.generators.iter().map(|&i| i as u32).collect();
        let index = Tensor::from_vec(index, (f, b * cap * 2), device)?;
        let mask = Tensor::from_vec(self.mask(), (f, b, cap), device)?.to_dtype(all_values.dtype())?;

        let values = all_values
            .contiguous()?
            .gather(&index, 1)?
            .reshape((f, b, cap, 2))?
            .broadcast_mul(&mask.unsqueeze(3)?)?;

        Ok(PairTensors { values, mask })
    }
}
