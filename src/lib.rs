//! # linalg-dispatch
//!
//! **One calling convention for BLAS3/LAPACK primitives across precisions,
//! devices, and batches.**
//!
//! linalg-dispatch routes general matrix multiply (`gemm`), triangular solve
//! (`trsm`), triangular multiply (`trmm`), Cholesky factorization (`potrf`),
//! Cholesky-based inversion (`potri`), and symmetric rank-k update (`syrk`)
//! to the backend of the runtime that owns the buffers, after checking that
//! the backend can serve the requested precision.
//!
//! ## Highlights
//!
//! - **Transpose markers**: [`linalg::transpose`] tags an input as logically
//!   transposed without copying; one entry point covers all four
//!   orientation combinations of a multiply
//! - **Batches**: every primitive has a batched form over `[batch, rows, cols]`
//!   buffers with results identical to per-slice calls
//! - **In-place contracts**: `trsm`, `trmm`, `potrf`, and `potri` overwrite
//!   their operand exactly as BLAS/LAPACK do
//! - **Capability gate**: unsupported (primitive, device, precision) requests
//!   fail before any backend work, with a message naming what is missing
//!
//! ## Quick Start
//!
//! ```
//! use linalg_dispatch::prelude::*;
//!
//! let device = CpuDevice::new();
//! // SPD matrix [[4, 2], [2, 3]]
//! let mut a = Tensor::<CpuRuntime>::from_slice(&[4.0f64, 2.0, 2.0, 3.0], &[2, 2], &device);
//!
//! linalg_potrf(&mut a, true, None)?;
//! linalg_potri(&mut a, true, None)?;
//!
//! // Lower triangle now holds the inverse: [[3, -2], [-2, 4]] / 8
//! let inv = a.to_vec::<f64>();
//! assert!((inv[0] - 0.375).abs() < 1e-12);
//! assert!((inv[2] + 0.25).abs() < 1e-12);
//! # Ok::<(), linalg_dispatch::error::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `cpu` (default): CPU backend
//! - `rayon` (default): batch elements run on rayon workers
//! - `f16`: Half-precision element types (F16, BF16)
//! - `cuda`: NVIDIA backend through cuBLAS
//! - `cusolver`: accelerator `potrf`/`potri` through cuSOLVER (implies `cuda`)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dtype;
pub mod error;
pub mod linalg;
pub mod runtime;
pub mod tensor;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::dtype::{DType, Element};
    pub use crate::error::{Error, Result};
    pub use crate::linalg::{
        Operand, Primitive, Support, WriteMode, linalg_batch_gemm, linalg_batch_gemm_into,
        linalg_batch_potrf, linalg_batch_potri, linalg_batch_syrk, linalg_batch_trmm,
        linalg_batch_trsm, linalg_gemm, linalg_gemm_into, linalg_potrf, linalg_potri,
        linalg_syrk, linalg_trmm, linalg_trsm, transpose,
    };
    pub use crate::runtime::{Device, Runtime, RuntimeClient};
    pub use crate::tensor::{Layout, Tensor};

    #[cfg(feature = "cpu")]
    pub use crate::runtime::cpu::{CpuClient, CpuDevice, CpuRuntime, ParallelismConfig};

    #[cfg(feature = "cuda")]
    pub use crate::runtime::cuda::{CudaClient, CudaDevice, CudaRuntime};
}

/// Default runtime based on enabled features
///
/// - With `cuda` feature: `CudaRuntime`
/// - Otherwise: `CpuRuntime`
#[cfg(feature = "cuda")]
pub type DefaultRuntime = runtime::cuda::CudaRuntime;

/// Default runtime based on enabled features
#[cfg(all(feature = "cpu", not(feature = "cuda")))]
pub type DefaultRuntime = runtime::cpu::CpuRuntime;
