//! CUDA runtime
//!
//! NVIDIA accelerator backend through cudarc. Multiplies and triangular
//! primitives run on cuBLAS; `potrf` and `potri` run on cuSOLVER when the
//! `cusolver` feature is enabled and are refused by the capability gate
//! otherwise.
//!
//! - `CudaDevice` - one GPU, by ordinal
//! - `CudaClient` - context, stream, and library handles; the stream argument
//!   of every dispatch call
//! - `CudaRuntime` - memory management and the capability gate
//!
//! Dispatch calls on this runtime must name a client explicitly; they
//! enqueue on its stream and return without waiting. Call
//! [`RuntimeClient::synchronize`](crate::runtime::RuntimeClient::synchronize)
//! before reading results on the host through raw pointers. Buffer
//! transfers (`Tensor::to_vec` and friends) run on the device's cached
//! client and synchronize on their own; a client built with
//! [`CudaClient::new`] has its own stream and must be synchronized before
//! its results are transferred.
//!
//! Allocation and copies report failures as errors rather than panicking.

mod blas;
mod cache;
mod client;
mod device;
mod runtime;

pub use client::CudaClient;
pub use device::CudaDevice;
pub use runtime::{CudaRuntime, is_cuda_available};

/// Type alias for CUDA tensors
pub type Tensor = crate::tensor::Tensor<CudaRuntime>;
