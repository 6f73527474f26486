//! Error types for linalg-dispatch
//!
//! Errors fall into three families that callers are expected to treat
//! differently:
//!
//! - **Capability** ([`Error::is_capability`]): the requested
//!   (primitive, device, precision) combination has no backend in this build.
//! - **Shape/precondition** ([`Error::is_shape`]): operands do not fit the
//!   primitive's contract. These are programming errors; nothing is written.
//! - **Numerical** ([`Error::is_numerical`]): the backend ran and reported a
//!   diagnostic (e.g. a non-positive-definite leading minor). Callers may
//!   recover, for example by adding jitter to the diagonal and retrying.

use crate::dtype::DType;
use thiserror::Error;

/// Result type alias using linalg-dispatch's Error
pub type Result<T> = std::result::Result<T, Error>;

/// One failing element of a batched factorization or inversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchFailure {
    /// Position of the element along the batch axis
    pub index: usize,
    /// Order of the leading minor that failed (1-based, LAPACK `info`)
    pub order: usize,
}

/// Errors that can occur while dispatching a linear algebra primitive
#[derive(Error, Debug)]
pub enum Error {
    /// Shape mismatch in an operation
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected shape
        expected: Vec<usize>,
        /// Actual shape
        got: Vec<usize>,
    },

    /// Unsupported dtype for an operation
    #[error("Unsupported dtype {dtype:?} for operation '{op}'")]
    UnsupportedDType {
        /// The unsupported dtype
        dtype: DType,
        /// The operation name
        op: &'static str,
    },

    /// DType mismatch between operands (or between operands and scalars)
    #[error("DType mismatch: {lhs:?} vs {rhs:?}")]
    DTypeMismatch {
        /// Left-hand side dtype
        lhs: DType,
        /// Right-hand side dtype
        rhs: DType,
    },

    /// Device mismatch between operands
    #[error("Device mismatch: operands must live on the same device")]
    DeviceMismatch,

    /// Out of memory
    #[error("Out of memory: failed to allocate {size} bytes")]
    OutOfMemory {
        /// Requested size in bytes
        size: usize,
    },

    /// Invalid argument provided to an operation
    #[error("Invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// The argument name
        arg: &'static str,
        /// Reason for invalidity
        reason: String,
    },

    /// Operand layout cannot be expressed as a BLAS leading dimension
    #[error("Operand '{arg}' needs unit column stride, got strides {strides:?}")]
    NotContiguous {
        /// The argument name
        arg: &'static str,
        /// Strides of the offending operand
        strides: Vec<isize>,
    },

    /// Backend has no implementation for this primitive/dtype combination
    #[error("{backend} limitation: {operation} - {reason}")]
    BackendLimitation {
        /// The backend that has the limitation
        backend: &'static str,
        /// The operation being attempted
        operation: &'static str,
        /// Description of the limitation
        reason: String,
    },

    /// Accelerator backends refuse to run on an implicit default stream
    #[error("{backend} requires an explicit stream for '{op}'")]
    StreamRequired {
        /// The backend that needs a stream
        backend: &'static str,
        /// The operation being attempted
        op: &'static str,
    },

    /// Factorization or inversion hit a non-positive-definite leading minor
    #[error("{op}: leading minor of order {order} is not positive definite")]
    NotPositiveDefinite {
        /// The operation that failed
        op: &'static str,
        /// Order of the failing leading minor (1-based)
        order: usize,
    },

    /// Per-element failures of a batched factorization or inversion
    #[error(
        "{op}: {} batch element(s) not positive definite (first: element {}, order {})",
        .failures.len(),
        .failures.first().map_or(0, |f| f.index),
        .failures.first().map_or(0, |f| f.order)
    )]
    BatchNotPositiveDefinite {
        /// The operation that failed
        op: &'static str,
        /// Every failing element, in batch order
        failures: Vec<BatchFailure>,
    },

    /// Batch-wide failure from a backend without per-element diagnostics
    #[error("{op}: batch failed with backend code {code} (element not attributable)")]
    BatchFailure {
        /// The operation that failed
        op: &'static str,
        /// Raw diagnostic code reported by the backend
        code: i32,
    },

    /// Backend-specific error
    #[error("Backend error: {0}")]
    Backend(String),

    /// CUDA-specific error
    #[cfg(feature = "cuda")]
    #[error("CUDA error: {0}")]
    Cuda(#[from] cudarc::driver::DriverError),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a shape mismatch error
    pub fn shape_mismatch(expected: &[usize], got: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    /// Create an unsupported dtype error
    pub fn unsupported_dtype(dtype: DType, op: &'static str) -> Self {
        Self::UnsupportedDType { dtype, op }
    }

    /// Create a backend limitation error
    pub fn backend_limitation(
        backend: &'static str,
        operation: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::BackendLimitation {
            backend,
            operation,
            reason: reason.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }

    /// True for errors raised because this build has no path for the request
    pub fn is_capability(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedDType { .. } | Self::BackendLimitation { .. } | Self::StreamRequired { .. }
        )
    }

    /// True for operand shape, dtype, device, or layout violations
    pub fn is_shape(&self) -> bool {
        matches!(
            self,
            Self::ShapeMismatch { .. }
                | Self::DTypeMismatch { .. }
                | Self::DeviceMismatch
                | Self::InvalidArgument { .. }
                | Self::NotContiguous { .. }
        )
    }

    /// True for diagnostics reported by a backend that ran to completion
    pub fn is_numerical(&self) -> bool {
        matches!(
            self,
            Self::NotPositiveDefinite { .. }
                | Self::BatchNotPositiveDefinite { .. }
                | Self::BatchFailure { .. }
        )
    }

    /// Failing batch elements, if the error carries per-element diagnostics
    pub fn batch_failures(&self) -> Option<&[BatchFailure]> {
        match self {
            Self::BatchNotPositiveDefinite { failures, .. } => Some(failures),
            _ => None,
        }
    }
}
