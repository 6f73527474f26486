//! Capability/precision gate
//!
//! Every dispatch call resolves `(primitive, runtime, dtype)` here before any
//! operand is inspected further or any backend code runs. The answer is a
//! static property of the build (Cargo features), so resolving it is a
//! constant match per runtime.

use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::runtime::Runtime;
use std::fmt;

/// The primitives routed through the dispatch layer
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// General matrix multiply
    Gemm,
    /// Triangular solve
    Trsm,
    /// Triangular multiply
    Trmm,
    /// Cholesky factorization
    Potrf,
    /// Inverse from a Cholesky factor
    Potri,
    /// Symmetric rank-k update
    Syrk,
}

impl Primitive {
    /// Every primitive
    pub const ALL: [Primitive; 6] = [
        Primitive::Gemm,
        Primitive::Trsm,
        Primitive::Trmm,
        Primitive::Potrf,
        Primitive::Potri,
        Primitive::Syrk,
    ];

    /// BLAS/LAPACK routine name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Gemm => "gemm",
            Self::Trsm => "trsm",
            Self::Trmm => "trmm",
            Self::Potrf => "potrf",
            Self::Potri => "potri",
            Self::Syrk => "syrk",
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a runtime serves one primitive at one precision
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Support {
    /// Backend kernel for this exact dtype
    Native,
    /// Operands are promoted to `via`, computed natively, and rounded back
    Fallback {
        /// Working precision
        via: DType,
    },
    /// Refused at the first call with a capability error
    Unsupported {
        /// Names the missing capability
        reason: &'static str,
    },
}

impl Support {
    /// True unless unsupported
    #[inline]
    pub fn is_available(self) -> bool {
        !matches!(self, Self::Unsupported { .. })
    }
}

/// One row of [`capability_table`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CapabilityEntry {
    /// Primitive
    pub primitive: Primitive,
    /// Element type
    pub dtype: DType,
    /// Resolution on the queried runtime
    pub support: Support,
}

/// Resolve the gate, turning `Unsupported` into a capability error
pub(crate) fn resolve<R: Runtime>(primitive: Primitive, dtype: DType) -> Result<Support> {
    match R::support(primitive, dtype) {
        Support::Unsupported { reason } => {
            tracing::debug!(
                runtime = R::name(),
                op = primitive.name(),
                %dtype,
                reason,
                "capability gate refused request"
            );
            if dtype.is_float() {
                Err(Error::backend_limitation(
                    R::name(),
                    primitive.name(),
                    format!("{dtype}: {reason}"),
                ))
            } else {
                Err(Error::unsupported_dtype(dtype, primitive.name()))
            }
        }
        support => Ok(support),
    }
}

/// True if `primitive` can run on `dtype` buffers of runtime `R`
pub fn is_supported<R: Runtime>(primitive: Primitive, dtype: DType) -> bool {
    R::support(primitive, dtype).is_available()
}

/// True if `primitive` has a backend kernel for `dtype` itself (no promotion)
///
/// On the accelerator this is how callers detect whether the optimized
/// factorization library was compiled in.
pub fn has_native_path<R: Runtime>(primitive: Primitive, dtype: DType) -> bool {
    R::support(primitive, dtype) == Support::Native
}

/// Gate resolution for every (primitive, dtype) pair, primitives outermost
pub fn capability_table<R: Runtime>() -> Vec<CapabilityEntry> {
    Primitive::ALL
        .iter()
        .flat_map(|&primitive| {
            DType::ALL.iter().map(move |&dtype| CapabilityEntry {
                primitive,
                dtype,
                support: R::support(primitive, dtype),
            })
        })
        .collect()
}
