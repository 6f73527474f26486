//! CPU runtime implementation
//!
//! The CPU runtime allocates on the host heap and runs the portable kernels
//! in [`kernels`]. Calls block until the result is written; batched calls
//! spread batch elements over rayon workers when the `rayon` feature is on.

mod blas;
mod client;
mod device;
pub(crate) mod kernels;
mod runtime;

pub use crate::tensor::Tensor;
pub use client::{CpuClient, ParallelismConfig};
pub use device::CpuDevice;
pub use runtime::CpuRuntime;
