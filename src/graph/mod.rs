//! Graph Module: Batched Graphs and Message Passing
//!
//! - `batch`: host graphs and their disjoint-union mini-batches
//! - `conv`: GCN and GIN message-passing operators
//! - `synthetic`: cycle/path/tree generators and the cycles dataset

mod batch;
mod conv;
pub mod synthetic;

pub use batch::{BatchedGraph, EdgeIndex, Graph, LabelLevel};
pub use conv::{GcnConv, GinConv, MessagePassing};
pub use synthetic::{collate, mini_batches, CyclesConfig, CyclesDataset};
