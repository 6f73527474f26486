//! CPU kernel implementations
//!
//! Row-major BLAS3/LAPACK kernels over raw pointers with leading dimensions.
//! Each kernel handles one matrix; the batch loop lives in the backend.

#![allow(unsafe_op_in_unsafe_fn)] // Kernels are already marked unsafe, inner unsafe is redundant

pub mod cholesky;
pub mod gemm;
pub mod triangular;

pub use cholesky::{potrf_kernel, potri_kernel};
pub use gemm::{gemm_kernel, syrk_kernel};
pub use triangular::{trmm_kernel, trsm_kernel};

use crate::dtype::LinalgElement;

/// Row-major matrix view over a raw pointer
///
/// Element `(i, j)` lives at `ptr + i * ld + j`.
#[derive(Clone, Copy)]
pub(crate) struct RawMat<T> {
    ptr: *mut T,
    ld: usize,
}

impl<T: LinalgElement> RawMat<T> {
    #[inline]
    pub(crate) fn new(ptr: *mut T, ld: usize) -> Self {
        Self { ptr, ld }
    }

    #[inline]
    pub(crate) fn from_const(ptr: *const T, ld: usize) -> Self {
        Self {
            ptr: ptr as *mut T,
            ld,
        }
    }

    #[inline]
    pub(crate) unsafe fn get(&self, i: usize, j: usize) -> T {
        *self.ptr.add(i * self.ld + j)
    }

    #[inline]
    pub(crate) unsafe fn set(&self, i: usize, j: usize, v: T) {
        *self.ptr.add(i * self.ld + j) = v;
    }
}

/// `op(A)` over a stored matrix: reads `A(j, i)` when transposed
#[derive(Clone, Copy)]
pub(crate) struct OpMat<T> {
    mat: RawMat<T>,
    trans: bool,
}

impl<T: LinalgElement> OpMat<T> {
    #[inline]
    pub(crate) fn new(mat: RawMat<T>, trans: bool) -> Self {
        Self { mat, trans }
    }

    #[inline]
    pub(crate) unsafe fn get(&self, i: usize, j: usize) -> T {
        if self.trans {
            self.mat.get(j, i)
        } else {
            self.mat.get(i, j)
        }
    }
}

/// Lower-triangular view of a factor stored in either triangle
///
/// `L(i, j)` for `i >= j` is `A[i, j]` when `lower`, else `A[j, i]`
/// (the upper factor is `U = Lᵀ`).
#[derive(Clone, Copy)]
pub(crate) struct Tri<T> {
    mat: RawMat<T>,
    lower: bool,
}

impl<T: LinalgElement> Tri<T> {
    #[inline]
    pub(crate) fn new(mat: RawMat<T>, lower: bool) -> Self {
        Self { mat, lower }
    }

    #[inline]
    pub(crate) unsafe fn get(&self, i: usize, j: usize) -> T {
        if self.lower {
            self.mat.get(i, j)
        } else {
            self.mat.get(j, i)
        }
    }

    #[inline]
    pub(crate) unsafe fn set(&self, i: usize, j: usize, v: T) {
        if self.lower {
            self.mat.set(i, j, v)
        } else {
            self.mat.set(j, i, v)
        }
    }
}

/// Multiply every element of an `m x n` block by `alpha`
///
/// `alpha == 0` stores zeros without reading, so NaN in the block is cleared.
#[inline]
pub(crate) unsafe fn scale_block<T: LinalgElement>(mat: RawMat<T>, m: usize, n: usize, alpha: T) {
    if alpha == T::one() {
        return;
    }
    for i in 0..m {
        for j in 0..n {
            let v = if alpha == T::zero() {
                T::zero()
            } else {
                alpha * mat.get(i, j)
            };
            mat.set(i, j, v);
        }
    }
}
