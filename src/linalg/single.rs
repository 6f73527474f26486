//! Single-matrix entry points
//!
//! Operands are rank-2 buffers `[rows, cols]`. Inputs are taken as
//! `impl Into<Operand>`, so a plain `&Tensor` or a [`transpose`] marker is
//! accepted in every input position.
//!
//! Several primitives overwrite an operand in place. This is part of the
//! contract, not an implementation detail: callers rely on it to avoid an
//! extra allocation, and each function documents which buffer it destroys.
//!
//! [`transpose`]: super::transpose

use super::backend::BlasBackend;
use super::engine::{self, Scalars, TriFlags};
use super::gate::Primitive;
use super::mode::WriteMode;
use super::orientation::Operand;
use crate::dtype::Element;
use crate::error::Result;
use crate::runtime::Runtime;
use crate::tensor::Tensor;

/// General matrix multiply: `C = alpha * op(A) * op(B) + beta * C`
///
/// `op(A)` is `m x k` and `op(B)` is `k x n`; `C` must be `m x n`. Mark an
/// input with [`transpose`](super::transpose) to use its transpose.
///
/// With `beta == 0`, C is overwritten and its prior contents are never
/// read, so NaN or infinity already in C does not propagate. With
/// `beta != 0`, C must hold finite values; this is not checked.
///
/// `alpha` and `beta` must have the buffers' element type.
///
/// # Errors
///
/// Capability errors if the runtime has no path for the dtype, shape
/// errors for mismatched dimensions, dtypes, devices, non-BLAS layouts, or
/// a C that overlaps A or B. C is untouched on any error.
///
/// # Example
///
/// ```
/// use linalg_dispatch::prelude::*;
///
/// let device = CpuDevice::new();
/// let a = Tensor::<CpuRuntime>::from_slice(&[1.0f32, 2.0, 3.0, 4.0], &[2, 2], &device);
/// let b = Tensor::<CpuRuntime>::from_slice(&[5.0f32, 6.0, 7.0, 8.0], &[2, 2], &device);
/// let mut c = Tensor::<CpuRuntime>::zeros(&[2, 2], DType::F32, &device);
///
/// linalg_gemm(&a, transpose(&b), &mut c, 1.0f32, 0.0, None)?;
/// assert_eq!(c.to_vec::<f32>(), vec![17.0, 23.0, 39.0, 53.0]);
/// # Ok::<(), linalg_dispatch::error::Error>(())
/// ```
pub fn linalg_gemm<'a, R, T>(
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
    engine::gemm(a.into(), b.into(), c, scalars, false, stream)
}

/// Multiply into `C` according to a [`WriteMode`]
///
/// `Overwrite` is `C = op(A) op(B)` (C not read), `Accumulate` is
/// `C = op(A) op(B) + C`, and `Skip` returns immediately without
/// validating operands or touching C.
pub fn linalg_gemm_into<'a, R>(
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
    engine::gemm(a.into(), b.into(), c, scalars, false, stream)
}

/// Triangular solve, in place: `B := X`
///
/// Solves `op(A) X = alpha B` (`rightside == false`) or
/// `X op(A) = alpha B` (`rightside == true`). `A` is square with order equal
/// to B's rows (left) or columns (right); only its `lower` (or upper)
/// triangle is read. Mark A with [`transpose`](super::transpose) to solve
/// against `Aᵀ`.
///
/// **Destroys B**: on success B holds the solution. A singular A is not
/// detected and yields non-finite values.
pub fn linalg_trsm<'a, R, T>(
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
        false,
        stream,
    )
}

/// Triangular multiply, in place: `B := alpha op(A) B` or `B := alpha B op(A)`
///
/// Same operand rules as [`linalg_trsm`]; only A's `lower` (or upper)
/// triangle is read.
///
/// **Destroys B**: on success B holds the product.
pub fn linalg_trmm<'a, R, T>(
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
        false,
        stream,
    )
}

/// Cholesky factorization, in place
///
/// A must be symmetric positive definite; only its `lower` (or upper)
/// triangle is read. On success that triangle holds `L` with `A = L Lᵀ`
/// (or `U` with `A = Uᵀ U`).
///
/// **Destroys A**. The opposite triangle is not zeroed; its contents are
/// unspecified.
///
/// # Errors
///
/// [`Error::NotPositiveDefinite`](crate::error::Error::NotPositiveDefinite)
/// with the order of the first leading minor that is not positive
/// definite. A is partially overwritten in that case.
pub fn linalg_potrf<R>(a: &mut Tensor<R>, lower: bool, stream: Option<&R::Client>) -> Result<()>
where
    R: Runtime,
    R::Client: BlasBackend<R>,
{
    engine::cholesky(Primitive::Potrf, a, lower, false, stream)
}

/// Inverse of the original matrix from its Cholesky factor, in place
///
/// A must hold the factor written by [`linalg_potrf`] with the same
/// `lower` flag. On success that triangle holds the corresponding triangle
/// of the inverse; the other triangle is unspecified. A buffer that is not
/// a factor yields meaningless values rather than an error.
///
/// **Destroys A**.
///
/// # Errors
///
/// [`Error::NotPositiveDefinite`](crate::error::Error::NotPositiveDefinite)
/// if the factor has a zero on its diagonal; A is left unchanged.
pub fn linalg_potri<R>(a: &mut Tensor<R>, lower: bool, stream: Option<&R::Client>) -> Result<()>
where
    R: Runtime,
    R::Client: BlasBackend<R>,
{
    engine::cholesky(Primitive::Potri, a, lower, false, stream)
}

/// Symmetric rank-k update: `C = alpha * op(A) * op(A)ᵀ + beta * C`
///
/// `op(A)` is `n x k` and C is `n x n`. The full symmetric result is
/// written. With `beta != 0` only C's lower triangle is read.
pub fn linalg_syrk<'a, R, T>(
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
    engine::syrk(a.into(), c, scalars, false, stream)
}
