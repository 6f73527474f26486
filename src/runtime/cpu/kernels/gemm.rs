//! General and symmetric matrix multiplication kernels

use super::{OpMat, RawMat, scale_block};
use crate::dtype::LinalgElement;

/// General matrix multiply: `C = alpha * op(A) * op(B) + beta * C`
///
/// `op(A)` is `m x k`, `op(B)` is `k x n`, `C` is `m x n`. A stored operand
/// is read transposed when its `trans_*` flag is set.
///
/// `beta == 0` overwrites C without reading it. `alpha == 0` skips the
/// product and only scales C.
///
/// # Safety
/// - All pointers must be valid for the specified dimensions and leading dimensions
/// - `c` must not alias with `a` or `b`
#[allow(clippy::too_many_arguments)]
pub unsafe fn gemm_kernel<T: LinalgElement>(
    trans_a: bool,
    trans_b: bool,
    m: usize,
    n: usize,
    k: usize,
    alpha: T,
    a: *const T,
    lda: usize,
    b: *const T,
    ldb: usize,
    beta: T,
    c: *mut T,
    ldc: usize,
) {
    let c = RawMat::new(c, ldc);
    scale_block(c, m, n, beta);

    if alpha == T::zero() || k == 0 {
        return;
    }

    let a = OpMat::new(RawMat::from_const(a, lda), trans_a);
    let b = OpMat::new(RawMat::from_const(b, ldb), trans_b);

    // ikj order: the inner loop walks a row of C
    for i in 0..m {
        for p in 0..k {
            let a_val = alpha * a.get(i, p);
            for j in 0..n {
                c.set(i, j, c.get(i, j) + a_val * b.get(p, j));
            }
        }
    }
}

/// Symmetric rank-k update: `C = alpha * op(A) * op(A)ᵀ + beta * C`
///
/// `op(A)` is `n x k`; `C` is `n x n`. The lower triangle of C is computed
/// (reading only C's lower triangle when `beta != 0`) and mirrored, so the
/// full symmetric result is stored.
///
/// # Safety
/// - All pointers must be valid for the specified dimensions and leading dimensions
/// - `c` must not alias with `a`
#[allow(clippy::too_many_arguments)]
pub unsafe fn syrk_kernel<T: LinalgElement>(
    trans: bool,
    n: usize,
    k: usize,
    alpha: T,
    a: *const T,
    lda: usize,
    beta: T,
    c: *mut T,
    ldc: usize,
) {
    let a = OpMat::new(RawMat::from_const(a, lda), trans);
    let c = RawMat::new(c, ldc);

    for i in 0..n {
        for j in 0..=i {
            let mut sum = T::zero();
            if alpha != T::zero() {
                for p in 0..k {
                    sum = sum + a.get(i, p) * a.get(j, p);
                }
            }
            let v = if beta == T::zero() {
                alpha * sum
            } else {
                alpha * sum + beta * c.get(i, j)
            };
            c.set(i, j, v);
            c.set(j, i, v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemm_all_orientations() {
        // A = [[1, 2], [3, 4]], B = [[5, 6], [7, 8]]
        let a = [1.0f64, 2.0, 3.0, 4.0];
        let b = [5.0f64, 6.0, 7.0, 8.0];
        let cases = [
            (false, false, [19.0, 22.0, 43.0, 50.0]),
            (true, false, [26.0, 30.0, 38.0, 44.0]),
            (false, true, [17.0, 23.0, 39.0, 53.0]),
            (true, true, [23.0, 31.0, 34.0, 46.0]),
        ];
        for (ta, tb, expected) in cases {
            let mut c = [0.0f64; 4];
            unsafe {
                gemm_kernel(ta, tb, 2, 2, 2, 1.0, a.as_ptr(), 2, b.as_ptr(), 2, 0.0, c.as_mut_ptr(), 2);
            }
            assert_eq!(c, expected, "trans_a={ta} trans_b={tb}");
        }
    }

    #[test]
    fn test_gemm_beta_zero_ignores_nan() {
        let a = [1.0f32, 0.0, 0.0, 1.0];
        let b = [2.0f32, 3.0, 4.0, 5.0];
        let mut c = [f32::NAN; 4];
        unsafe {
            gemm_kernel(false, false, 2, 2, 2, 1.0, a.as_ptr(), 2, b.as_ptr(), 2, 0.0, c.as_mut_ptr(), 2);
        }
        assert_eq!(c, b);
    }

    #[test]
    fn test_gemm_accumulate_with_padded_ld() {
        // C is a 2x2 block inside a 2x3 buffer
        let a = [1.0f64, 2.0, 3.0, 4.0];
        let b = [1.0f64, 0.0, 0.0, 1.0];
        let mut c = [1.0f64, 1.0, -9.0, 1.0, 1.0, -9.0];
        unsafe {
            gemm_kernel(false, false, 2, 2, 2, 2.0, a.as_ptr(), 2, b.as_ptr(), 2, 1.0, c.as_mut_ptr(), 3);
        }
        assert_eq!(c, [3.0, 5.0, -9.0, 7.0, 9.0, -9.0]);
    }

    #[test]
    fn test_syrk_matches_gemm() {
        // A is 2x3
        let a = [1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut c = [0.0f64; 4];
        let mut expected = [0.0f64; 4];
        unsafe {
            syrk_kernel(false, 2, 3, 1.0, a.as_ptr(), 3, 0.0, c.as_mut_ptr(), 2);
            gemm_kernel(false, true, 2, 2, 3, 1.0, a.as_ptr(), 3, a.as_ptr(), 3, 0.0, expected.as_mut_ptr(), 2);
        }
        assert_eq!(c, expected);
        assert_eq!(c, [14.0, 32.0, 32.0, 77.0]);
    }

    #[test]
    fn test_syrk_transposed() {
        // op(A) = Aᵀ with A 3x2 gives Aᵀ A
        let a = [1.0f64, 4.0, 2.0, 5.0, 3.0, 6.0];
        let mut c = [0.0f64; 4];
        unsafe {
            syrk_kernel(true, 2, 3, 1.0, a.as_ptr(), 2, 0.0, c.as_mut_ptr(), 2);
        }
        assert_eq!(c, [14.0, 32.0, 32.0, 77.0]);
    }
}
