//! Batched entry points
//!
//! Operands are rank-3 buffers `[batch, rows, cols]`; the leading axis
//! indexes independent problems and every operand must have the same batch
//! size. Element `i` of the result equals the corresponding single-matrix
//! call on slice `i` with the same scalars and flags. On the CPU backend the
//! two are bit-for-bit identical.
//!
//! Rows and batch elements may be strided, so slices of a larger buffer are
//! accepted. An input may even use a zero batch stride to share one matrix
//! across the batch; outputs may not overlap between elements.
//!
//! # Failure attribution
//!
//! Batched factorizations report which elements failed when the backend
//! exposes per-element diagnostics, as
//! [`Error::BatchNotPositiveDefinite`](crate::error::Error::BatchNotPositiveDefinite).
//! A backend that only reports one code for the whole call yields
//! [`Error::BatchFailure`](crate::error::Error::BatchFailure) instead. Both
//! shipped backends attribute per element.

use super::backend::BlasBackend;
use super::engine::{self, Scalars, TriFlags};
use super::gate::Primitive;
use super::mode::WriteMode;
use super::orientation::Operand;
use crate::dtype::Element;
use crate::error::Result;
use crate::runtime::Runtime;
use crate::tensor::Tensor;

/// Batched [`linalg_gemm`](super::linalg_gemm): `C[i] = alpha op(A[i]) op(B[i]) + beta C[i]`
///
/// Transpose markers apply to every slice; the batch axis is never moved.
/// `beta == 0` never reads C.
pub fn linalg_batch_gemm<'a, R, T>(
    a: impl Into<Operand<'a, R>>,
    b: impl Into<Operand<'a, R>>,
    c: &mut Tensor<R>,
    alpha: T,
    beta: T,
    stream: Option<&R::Client>,
) -> Result<()>
where
    R: Runtime,
    R::Client: BlasBackend<R>,
    T: Element,
{
    let scalars = Scalars {
        alpha: alpha.to_f64(),
        beta: beta.to_f64(),
        dtype: Some(T::DTYPE),
    };
    engine::gemm(a.into(), b.into(), c, scalars, true, stream)
}

/// Batched [`linalg_gemm_into`](super::linalg_gemm_into)
pub fn linalg_batch_gemm_into<'a, R>(
    a: impl Into<Operand<'a, R>>,
    b: impl Into<Operand<'a, R>>,
    c: &mut Tensor<R>,
    mode: WriteMode,
    stream: Option<&R::Client>,
) -> Result<()>
where
    R: Runtime,
    R::Client: BlasBackend<R>,
{
    let Some((alpha, beta)) = mode.scalars() else {
        return Ok(());
    };
    let scalars = Scalars {
        alpha,
        beta,
        dtype: None,
    };
    engine::gemm(a.into(), b.into(), c, scalars, true, stream)
}

/// Batched [`linalg_trsm`](super::linalg_trsm)
///
/// **Destroys B**: every slice of B is overwritten with its solution.
pub fn linalg_batch_trsm<'a, R, T>(
    a: impl Into<Operand<'a, R>>,
    b: &mut Tensor<R>,
    alpha: T,
    rightside: bool,
    lower: bool,
    stream: Option<&R::Client>,
) -> Result<()>
where
    R: Runtime,
    R::Client: BlasBackend<R>,
    T: Element,
{
    let flags = TriFlags {
        lower,
        right: rightside,
    };
    engine::triangular(
        Primitive::Trsm,
        a.into(),
        b,
        alpha.to_f64(),
        Some(T::DTYPE),
        flags,
        true,
        stream,
    )
}

/// Batched [`linalg_trmm`](super::linalg_trmm)
///
/// **Destroys B**: every slice of B is overwritten with its product.
pub fn linalg_batch_trmm<'a, R, T>(
    a: impl Into<Operand<'a, R>>,
    b: &mut Tensor<R>,
    alpha: T,
    rightside: bool,
    lower: bool,
    stream: Option<&R::Client>,
) -> Result<()>
where
    R: Runtime,
    R::Client: BlasBackend<R>,
    T: Element,
{
    let flags = TriFlags {
        lower,
        right: rightside,
    };
    engine::triangular(
        Primitive::Trmm,
        a.into(),
        b,
        alpha.to_f64(),
        Some(T::DTYPE),
        flags,
        true,
        stream,
    )
}

/// Batched [`linalg_potrf`](super::linalg_potrf)
///
/// **Destroys A**: every slice is overwritten with its factor. Elements
/// that fail are reported by index; the others are still factored.
pub fn linalg_batch_potrf<R>(
    a: &mut Tensor<R>,
    lower: bool,
    stream: Option<&R::Client>,
) -> Result<()>
where
    R: Runtime,
    R::Client: BlasBackend<R>,
{
    engine::cholesky(Primitive::Potrf, a, lower, true, stream)
}

/// Batched [`linalg_potri`](super::linalg_potri)
///
/// **Destroys A**: every slice is overwritten with its inverse. Elements
/// whose factor has a zero diagonal are reported by index and left unchanged.
pub fn linalg_batch_potri<R>(
    a: &mut Tensor<R>,
    lower: bool,
    stream: Option<&R::Client>,
) -> Result<()>
where
    R: Runtime,
    R::Client: BlasBackend<R>,
{
    engine::cholesky(Primitive::Potri, a, lower, true, stream)
}

/// Batched [`linalg_syrk`](super::linalg_syrk)
pub fn linalg_batch_syrk<'a, R, T>(
    a: impl Into<Operand<'a, R>>,
    c: &mut Tensor<R>,
    alpha: T,
    beta: T,
    stream: Option<&R::Client>,
) -> Result<()>
where
    R: Runtime,
    R::Client: BlasBackend<R>,
    T: Element,
{
    let scalars = Scalars {
        alpha: alpha.to_f64(),
        beta: beta.to_f64(),
        dtype: Some(T::DTYPE),
    };
    engine::syrk(a.into(), c, scalars, true, stream)
}
