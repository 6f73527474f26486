//! Triangular solve and triangular multiply kernels
//!
//! `A` is triangular (`lower` selects the stored triangle) and only that
//! triangle is read. `op(A)` is `A` or `Aᵀ`; transposing flips which
//! triangle `op(A)` occupies. `B` is `m x n` and is overwritten in place.

use super::{OpMat, RawMat, scale_block};
use crate::dtype::LinalgElement;

/// Triangular solve: `op(A) X = alpha B` (left) or `X op(A) = alpha B` (right)
///
/// X overwrites B. A singular A divides by zero; it is not detected.
///
/// # Safety
/// - `a` must be valid for an `m x m` (left) or `n x n` (right) matrix with leading dimension `lda`
/// - `b` must be valid for an `m x n` matrix with leading dimension `ldb`
/// - `b` must not alias with `a`
#[allow(clippy::too_many_arguments)]
pub unsafe fn trsm_kernel<T: LinalgElement>(
    right: bool,
    lower: bool,
    trans: bool,
    m: usize,
    n: usize,
    alpha: T,
    a: *const T,
    lda: usize,
    b: *mut T,
    ldb: usize,
) {
    let op = OpMat::new(RawMat::from_const(a, lda), trans);
    let b = RawMat::new(b, ldb);
    let op_lower = lower != trans;

    scale_block(b, m, n, alpha);
    if alpha == T::zero() {
        return;
    }

    if !right {
        for j in 0..n {
            if op_lower {
                // Forward substitution
                for i in 0..m {
                    let mut sum = b.get(i, j);
                    for p in 0..i {
                        sum = sum - op.get(i, p) * b.get(p, j);
                    }
                    b.set(i, j, sum / op.get(i, i));
                }
            } else {
                // Backward substitution
                for i in (0..m).rev() {
                    let mut sum = b.get(i, j);
                    for p in (i + 1)..m {
                        sum = sum - op.get(i, p) * b.get(p, j);
                    }
                    b.set(i, j, sum / op.get(i, i));
                }
            }
        }
    } else {
        for i in 0..m {
            if op_lower {
                // x_j depends on x_p for p > j
                for j in (0..n).rev() {
                    let mut sum = b.get(i, j);
                    for p in (j + 1)..n {
                        sum = sum - b.get(i, p) * op.get(p, j);
                    }
                    b.set(i, j, sum / op.get(j, j));
                }
            } else {
                for j in 0..n {
                    let mut sum = b.get(i, j);
                    for p in 0..j {
                        sum = sum - b.get(i, p) * op.get(p, j);
                    }
                    b.set(i, j, sum / op.get(j, j));
                }
            }
        }
    }
}

/// Triangular multiply: `B = alpha op(A) B` (left) or `B = alpha B op(A)` (right)
///
/// Rows (left) or columns (right) of B are updated in the order that keeps
/// every still-needed input element unmodified.
///
/// # Safety
/// - `a` must be valid for an `m x m` (left) or `n x n` (right) matrix with leading dimension `lda`
/// - `b` must be valid for an `m x n` matrix with leading dimension `ldb`
/// - `b` must not alias with `a`
#[allow(clippy::too_many_arguments)]
pub unsafe fn trmm_kernel<T: LinalgElement>(
    right: bool,
    lower: bool,
    trans: bool,
    m: usize,
    n: usize,
    alpha: T,
    a: *const T,
    lda: usize,
    b: *mut T,
    ldb: usize,
) {
    let op = OpMat::new(RawMat::from_const(a, lda), trans);
    let b = RawMat::new(b, ldb);
    let op_lower = lower != trans;

    if alpha == T::zero() {
        scale_block(b, m, n, alpha);
        return;
    }

    if !right {
        for t in 0..m {
            let i = if op_lower { m - 1 - t } else { t };
            let (lo, hi) = if op_lower { (0, i + 1) } else { (i, m) };
            for j in 0..n {
                let mut sum = T::zero();
                for p in lo..hi {
                    sum = sum + op.get(i, p) * b.get(p, j);
                }
                b.set(i, j, alpha * sum);
            }
        }
    } else {
        for t in 0..n {
            let j = if op_lower { t } else { n - 1 - t };
            let (lo, hi) = if op_lower { (j, n) } else { (0, j + 1) };
            for i in 0..m {
                let mut sum = T::zero();
                for p in lo..hi {
                    sum = sum + b.get(i, p) * op.get(p, j);
                }
                b.set(i, j, alpha * sum);
            }
        }
    }
}
