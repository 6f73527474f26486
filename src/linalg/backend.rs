//! Backend strategy trait and the call descriptors it consumes
//!
//! The dispatch layer validates operands, resolves the capability gate, and
//! lowers each request to a plain descriptor: device addresses, dimensions,
//! leading dimensions, batch strides, flags, and scalars. A runtime's client
//! implements [`BlasBackend`] to execute those descriptors. Descriptors are
//! always row-major; backends with column-major libraries translate.
//!
//! Single-matrix calls are descriptors with `batch == 1`, so the batch
//! contract (element `i` equals the single call on slice `i`) holds by
//! construction on backends that loop the same kernel over the batch.

use crate::dtype::LinalgElement;
use crate::error::Result;
use crate::runtime::Runtime;

/// One matrix (or a strided stack of them) in device memory
///
/// Element `(b, i, j)` lives at byte address
/// `ptr + (b * batch_stride + i * ld + j) * size_of::<T>()`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MatDesc {
    /// Device address of element `(0, 0, 0)`
    pub ptr: u64,
    /// Stored rows per matrix
    pub rows: usize,
    /// Stored columns per matrix
    pub cols: usize,
    /// Row stride in elements (`>= cols`)
    pub ld: usize,
    /// Distance between consecutive matrices in elements (0 for a single matrix)
    pub batch_stride: usize,
}

impl MatDesc {
    /// Device address of matrix `index` for element type `T`
    #[inline]
    pub fn matrix_ptr<T: LinalgElement>(&self, index: usize) -> u64 {
        self.ptr + (index * self.batch_stride * std::mem::size_of::<T>()) as u64
    }
}

/// `C = alpha * op(A) * op(B) + beta * C`
#[derive(Copy, Clone, Debug)]
pub struct GemmCall<T> {
    /// Number of independent problems
    pub batch: usize,
    /// Read A as `Aᵀ`
    pub trans_a: bool,
    /// Read B as `Bᵀ`
    pub trans_b: bool,
    /// Product scale
    pub alpha: T,
    /// Left operand as stored
    pub a: MatDesc,
    /// Right operand as stored
    pub b: MatDesc,
    /// Output scale; zero means C is not read
    pub beta: T,
    /// Output
    pub c: MatDesc,
}

impl<T> GemmCall<T> {
    /// `(m, n, k)`: `op(A)` is `m x k`, `op(B)` is `k x n`
    #[inline]
    pub fn dims(&self) -> (usize, usize, usize) {
        let k = if self.trans_a { self.a.rows } else { self.a.cols };
        (self.c.rows, self.c.cols, k)
    }
}

/// Triangular solve or multiply against `B`, written back into `B`
#[derive(Copy, Clone, Debug)]
pub struct TriangularCall<T> {
    /// Number of independent problems
    pub batch: usize,
    /// `A` multiplies from the right
    pub right: bool,
    /// `A` is stored in its lower triangle
    pub lower: bool,
    /// Use `Aᵀ`
    pub trans: bool,
    /// Scale applied to `B`
    pub alpha: T,
    /// Triangular operand
    pub a: MatDesc,
    /// Right-hand side, overwritten with the result
    pub b: MatDesc,
}

/// In-place Cholesky factorization or inversion of `A`
#[derive(Copy, Clone, Debug)]
pub struct CholeskyCall {
    /// Number of independent problems
    pub batch: usize,
    /// Work on the lower triangle
    pub lower: bool,
    /// Square matrix, overwritten
    pub a: MatDesc,
}

/// `C = alpha * op(A) * op(A)ᵀ + beta * C`
#[derive(Copy, Clone, Debug)]
pub struct SyrkCall<T> {
    /// Number of independent problems
    pub batch: usize,
    /// `op(A) = Aᵀ`
    pub trans: bool,
    /// Product scale
    pub alpha: T,
    /// Operand as stored
    pub a: MatDesc,
    /// Output scale; zero means C is not read
    pub beta: T,
    /// Square output, fully written
    pub c: MatDesc,
}

impl<T> SyrkCall<T> {
    /// `(n, k)`: `op(A)` is `n x k`
    #[inline]
    pub fn dims(&self) -> (usize, usize) {
        let k = if self.trans { self.a.rows } else { self.a.cols };
        (self.c.rows, k)
    }
}

/// Diagnostics from a factorization or inversion
///
/// Codes follow LAPACK `info`: 0 is success, `k > 0` is the 1-based order
/// of the failing leading minor or diagonal entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FactorStatus {
    /// One code per batch element, in batch order
    PerElement(Vec<i32>),
    /// One code for the whole call; a failure cannot be attributed
    BatchWide(i32),
}

/// Strategy trait implemented by each runtime's client
///
/// Methods receive descriptors that already passed validation: dimensions
/// agree, dtypes match `T`, operands live on this client's device, and
/// outputs do not overlap inputs. Implementations on asynchronous devices
/// enqueue on the client's stream and may return before the work completes.
pub trait BlasBackend<R: Runtime> {
    /// General matrix multiply
    fn gemm<T: LinalgElement>(&self, call: &GemmCall<T>) -> Result<()>;

    /// Triangular solve, `B` overwritten with `X`
    fn trsm<T: LinalgElement>(&self, call: &TriangularCall<T>) -> Result<()>;

    /// Triangular multiply, `B` overwritten with the product
    fn trmm<T: LinalgElement>(&self, call: &TriangularCall<T>) -> Result<()>;

    /// Cholesky factorization in place
    fn potrf<T: LinalgElement>(&self, call: &CholeskyCall) -> Result<FactorStatus>;

    /// Inverse from a Cholesky factor, in place
    fn potri<T: LinalgElement>(&self, call: &CholeskyCall) -> Result<FactorStatus>;

    /// Symmetric rank-k update
    fn syrk<T: LinalgElement>(&self, call: &SyrkCall<T>) -> Result<()>;
}
