//! BLAS3/LAPACK dispatch
//!
//! One calling convention for general multiply, triangular solve and
//! multiply, Cholesky factorization and inversion, and symmetric rank-k
//! update, independent of element type, device, and whether the call works
//! on one matrix or a batch.
//!
//! # Calling convention
//!
//! - Inputs are `impl Into<Operand>`: pass `&tensor`, or [`transpose`]`(&tensor)`
//!   to use the transpose without copying.
//! - Outputs are `&mut Tensor`; in-place primitives overwrite their operand.
//! - Scalars (`alpha`, `beta`) have the buffers' element type.
//! - `stream` is the runtime's client. `None` runs on the device's default
//!   client on the CPU; accelerators require an explicit stream.
//!
//! # Failure families
//!
//! - Capability: the runtime has no path for this primitive and dtype in
//!   this build. Reported before operands are inspected or any backend
//!   code runs; see [`capability_table`] and [`is_supported`].
//! - Shape: rank, dimension, dtype, device, layout, or overlap violations.
//!   Nothing is written.
//! - Numerical: a factorization or inversion found a non-positive-definite
//!   leading minor (or zero diagonal), reported with its order and, for
//!   batches, the failing element indices.
//!
//! # Precision
//!
//! F32 and F64 run natively everywhere. With the `f16` feature the CPU
//! runs F16/BF16 multiplies (`gemm`, `trmm`, `syrk`) through an F32 working
//! copy and refuses half-precision solves and factorizations.

mod backend;
mod batch;
mod check;
mod engine;
mod gate;
mod mode;
mod orientation;
mod single;

pub use backend::{
    BlasBackend, CholeskyCall, FactorStatus, GemmCall, MatDesc, SyrkCall, TriangularCall,
};
pub use batch::{
    linalg_batch_gemm, linalg_batch_gemm_into, linalg_batch_potrf, linalg_batch_potri,
    linalg_batch_syrk, linalg_batch_trmm, linalg_batch_trsm,
};
pub use gate::{
    CapabilityEntry, Primitive, Support, capability_table, has_native_path, is_supported,
};
pub use mode::WriteMode;
pub use orientation::{Operand, transpose};
pub use single::{
    linalg_gemm, linalg_gemm_into, linalg_potrf, linalg_potri, linalg_syrk, linalg_trmm,
    linalg_trsm,
};
