//! Cholesky factorization and Cholesky-based inversion kernels
//!
//! Both kernels return a LAPACK-style `info`: 0 on success, otherwise the
//! 1-based order of the leading minor (potrf) or diagonal entry (potri)
//! that failed.

use super::{RawMat, Tri};
use crate::dtype::LinalgElement;

/// In-place Cholesky factorization of an `n x n` SPD matrix
///
/// Reads and writes only the triangle selected by `lower`; on success it
/// holds `L` (with `A = L Lᵀ`) or `U` (with `A = Uᵀ U`). The other
/// triangle is not touched.
///
/// On failure the columns before the failing one hold the partial factor.
///
/// # Safety
/// - `a` must be valid for an `n x n` matrix with leading dimension `lda`
pub unsafe fn potrf_kernel<T: LinalgElement>(lower: bool, n: usize, a: *mut T, lda: usize) -> i32 {
    let l = Tri::new(RawMat::new(a, lda), lower);

    for j in 0..n {
        let mut d = l.get(j, j);
        for p in 0..j {
            let v = l.get(j, p);
            d = d - v * v;
        }
        // Written so that NaN also fails
        if !(d > T::zero()) {
            return (j + 1) as i32;
        }
        let ljj = d.sqrt_val();
        l.set(j, j, ljj);

        for i in (j + 1)..n {
            let mut s = l.get(i, j);
            for p in 0..j {
                s = s - l.get(i, p) * l.get(j, p);
            }
            l.set(i, j, s / ljj);
        }
    }
    0
}

/// In-place inverse of `A` from its Cholesky factor
///
/// On entry the `lower` triangle holds the factor produced by
/// [`potrf_kernel`]; on exit the same triangle holds that triangle of
/// `A⁻¹`. A zero diagonal entry is reported before anything is written.
///
/// # Safety
/// - `a` must be valid for an `n x n` matrix with leading dimension `lda`
pub unsafe fn potri_kernel<T: LinalgElement>(lower: bool, n: usize, a: *mut T, lda: usize) -> i32 {
    let l = Tri::new(RawMat::new(a, lda), lower);

    for j in 0..n {
        if l.get(j, j) == T::zero() {
            return (j + 1) as i32;
        }
    }

    // Step 1: L := L⁻¹, one column at a time from the right. Column j of
    // L⁻¹ uses the already inverted columns p > j and the original column j.
    for j in (0..n).rev() {
        let inv = T::one() / l.get(j, j);
        l.set(j, j, inv);
        for i in ((j + 1)..n).rev() {
            let mut s = T::zero();
            for p in (j + 1)..=i {
                s = s + l.get(i, p) * l.get(p, j);
            }
            l.set(i, j, (s * inv).neg_val());
        }
    }

    // Step 2: A⁻¹ = L⁻ᵀ L⁻¹. Entry (i, j), i >= j, needs rows p >= i of L⁻¹,
    // which are still intact when rows are finished in ascending order.
    for i in 0..n {
        for j in 0..=i {
            let mut s = T::zero();
            for p in i..n {
                s = s + l.get(p, i) * l.get(p, j);
            }
            l.set(i, j, s);
        }
    }
    0
}
