//! `BlasBackend` for CUDA through cuBLAS and cuSOLVER
//!
//! Both libraries are column-major. A row-major matrix with leading
//! dimension `ld` is, read column-major, its own transpose with the same
//! `ld`, so each call is issued on the transposed problem:
//!
//! - `C = op(A) op(B)` becomes `Cᵀ = op(B)ᵀ op(A)ᵀ`: operands swap, the
//!   transpose flags stay with their matrices.
//! - Triangular and Cholesky calls flip side and fill mode.
//!
//! Nothing here synchronizes except the factorizations, which must read
//! their status codes back to the host.

use cudarc::cublas::sys::{
    cublasDgemmStridedBatched, cublasDiagType_t, cublasDtrmm_v2, cublasDtrsm_v2,
    cublasFillMode_t, cublasOperation_t, cublasSgemmStridedBatched, cublasSideMode_t,
    cublasStatus_t, cublasStrmm_v2, cublasStrsm_v2,
};

use super::client::CudaClient;
use super::runtime::CudaRuntime;
use crate::dtype::{DType, LinalgElement};
use crate::error::{Error, Result};
use crate::linalg::{BlasBackend, CholeskyCall, FactorStatus, GemmCall, SyrkCall, TriangularCall};

#[inline]
fn op(trans: bool) -> cublasOperation_t {
    if trans {
        cublasOperation_t::CUBLAS_OP_T
    } else {
        cublasOperation_t::CUBLAS_OP_N
    }
}

/// Library dimension argument
fn dim(value: usize, arg: &'static str) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| Error::invalid_argument(arg, format!("{value} exceeds the 32-bit BLAS range")))
}

fn check(status: cublasStatus_t, what: &str) -> Result<()> {
    if status == cublasStatus_t::CUBLAS_STATUS_SUCCESS {
        Ok(())
    } else {
        Err(Error::Backend(format!("cuBLAS {what} failed: {status:?}")))
    }
}

impl BlasBackend<CudaRuntime> for CudaClient {
    fn gemm<T: LinalgElement>(&self, call: &GemmCall<T>) -> Result<()> {
        let (m, n, k) = call.dims();
        let (m, n, k) = (dim(m, "m")?, dim(n, "n")?, dim(k, "k")?);
        let (lda, ldb, ldc) = (dim(call.a.ld, "lda")?, dim(call.b.ld, "ldb")?, dim(call.c.ld, "ldc")?);
        let batch = dim(call.batch, "batch")?;
        let (stride_a, stride_b, stride_c) = (
            call.a.batch_stride as i64,
            call.b.batch_stride as i64,
            call.c.batch_stride as i64,
        );
        let handle = *self.cublas.handle();

        let status = unsafe {
            match T::DTYPE {
                DType::F32 => {
                    let alpha = call.alpha.to_f64() as f32;
                    let beta = call.beta.to_f64() as f32;
                    cublasSgemmStridedBatched(
                        handle,
                        op(call.trans_b),
                        op(call.trans_a),
                        n,
                        m,
                        k,
                        &alpha,
                        call.b.ptr as *const f32,
                        ldb,
                        stride_b,
                        call.a.ptr as *const f32,
                        lda,
                        stride_a,
                        &beta,
                        call.c.ptr as *mut f32,
                        ldc,
                        stride_c,
                        batch,
                    )
                }
                DType::F64 => {
                    let alpha = call.alpha.to_f64();
                    let beta = call.beta.to_f64();
                    cublasDgemmStridedBatched(
                        handle,
                        op(call.trans_b),
                        op(call.trans_a),
                        n,
                        m,
                        k,
                        &alpha,
                        call.b.ptr as *const f64,
                        ldb,
                        stride_b,
                        call.a.ptr as *const f64,
                        lda,
                        stride_a,
                        &beta,
                        call.c.ptr as *mut f64,
                        ldc,
                        stride_c,
                        batch,
                    )
                }
                other => return Err(Error::unsupported_dtype(other, "gemm")),
            }
        };
        check(status, "gemm")
    }

    fn trsm<T: LinalgElement>(&self, call: &TriangularCall<T>) -> Result<()> {
        self.triangular(call, false)
    }

    fn trmm<T: LinalgElement>(&self, call: &TriangularCall<T>) -> Result<()> {
        self.triangular(call, true)
    }

    fn potrf<T: LinalgElement>(&self, call: &CholeskyCall) -> Result<FactorStatus> {
        self.cholesky::<T>(call, Factor::Potrf)
    }

    fn potri<T: LinalgElement>(&self, call: &CholeskyCall) -> Result<FactorStatus> {
        self.cholesky::<T>(call, Factor::Potri)
    }

    /// Issued as `op(A) op(A)ᵀ` through gemm; the full output is written
    fn syrk<T: LinalgElement>(&self, call: &SyrkCall<T>) -> Result<()> {
        self.gemm(&GemmCall {
            batch: call.batch,
            trans_a: call.trans,
            trans_b: !call.trans,
            alpha: call.alpha,
            a: call.a,
            b: call.a,
            beta: call.beta,
            c: call.c,
        })
    }
}

impl CudaClient {
    /// cuBLAS has no strided-batched triangular routines; one call per element
    fn triangular<T: LinalgElement>(&self, call: &TriangularCall<T>, multiply: bool) -> Result<()> {
        let side = if call.right {
            cublasSideMode_t::CUBLAS_SIDE_LEFT
        } else {
            cublasSideMode_t::CUBLAS_SIDE_RIGHT
        };
        let uplo = if call.lower {
            cublasFillMode_t::CUBLAS_FILL_MODE_UPPER
        } else {
            cublasFillMode_t::CUBLAS_FILL_MODE_LOWER
        };
        let trans = op(call.trans);
        let diag = cublasDiagType_t::CUBLAS_DIAG_NON_UNIT;
        let (m, n) = (dim(call.b.cols, "n")?, dim(call.b.rows, "m")?);
        let (lda, ldb) = (dim(call.a.ld, "lda")?, dim(call.b.ld, "ldb")?);
        let handle = *self.cublas.handle();
        let what = if multiply { "trmm" } else { "trsm" };

        for i in 0..call.batch {
            let a = call.a.matrix_ptr::<T>(i);
            let b = call.b.matrix_ptr::<T>(i);
            let status = unsafe {
                match (T::DTYPE, multiply) {
                    (DType::F32, false) => {
                        let alpha = call.alpha.to_f64() as f32;
                        cublasStrsm_v2(
                            handle, side, uplo, trans, diag, m, n, &alpha,
                            a as *const f32, lda, b as *mut f32, ldb,
                        )
                    }
                    (DType::F64, false) => {
                        let alpha = call.alpha.to_f64();
                        cublasDtrsm_v2(
                            handle, side, uplo, trans, diag, m, n, &alpha,
                            a as *const f64, lda, b as *mut f64, ldb,
                        )
                    }
                    // Out-of-place API; C aliasing B is the documented in-place form
                    (DType::F32, true) => {
                        let alpha = call.alpha.to_f64() as f32;
                        cublasStrmm_v2(
                            handle, side, uplo, trans, diag, m, n, &alpha,
                            a as *const f32, lda, b as *const f32, ldb, b as *mut f32, ldb,
                        )
                    }
                    (DType::F64, true) => {
                        let alpha = call.alpha.to_f64();
                        cublasDtrmm_v2(
                            handle, side, uplo, trans, diag, m, n, &alpha,
                            a as *const f64, lda, b as *const f64, ldb, b as *mut f64, ldb,
                        )
                    }
                    (other, _) => return Err(Error::unsupported_dtype(other, what)),
                }
            };
            check(status, what)?;
        }
        Ok(())
    }
}

#[derive(Copy, Clone, Debug)]
enum Factor {
    Potrf,
    Potri,
}

impl Factor {
    fn name(self) -> &'static str {
        match self {
            Self::Potrf => "potrf",
            Self::Potri => "potri",
        }
    }
}

#[cfg(not(feature = "cusolver"))]
impl CudaClient {
    fn cholesky<T: LinalgElement>(&self, _call: &CholeskyCall, factor: Factor) -> Result<FactorStatus> {
        Err(Error::backend_limitation(
            "cuda",
            factor.name(),
            "built without the `cusolver` feature",
        ))
    }
}

#[cfg(feature = "cusolver")]
mod solver {
    use cudarc::cusolver::sys::{
        cublasFillMode_t, cusolverDnDpotrf, cusolverDnDpotrf_bufferSize, cusolverDnDpotri,
        cusolverDnDpotri_bufferSize, cusolverDnSpotrf, cusolverDnSpotrf_bufferSize,
        cusolverDnSpotri, cusolverDnSpotri_bufferSize, cusolverStatus_t,
    };

    use cudarc::driver::CudaStream;
    use cudarc::driver::sys::{CUresult, cuMemAllocAsync, cuMemFreeAsync, cuMemcpyDtoHAsync_v2};

    use super::{CudaClient, Factor, dim};
    use crate::dtype::{DType, LinalgElement};
    use crate::error::{Error, Result};
    use crate::linalg::{CholeskyCall, FactorStatus};
    use crate::runtime::RuntimeClient;
    use crate::runtime::cuda::cache::log_cuda_memory_error;

    fn check(status: cusolverStatus_t, what: &str) -> Result<()> {
        if status == cusolverStatus_t::CUSOLVER_STATUS_SUCCESS {
            Ok(())
        } else {
            Err(Error::Backend(format!("cuSOLVER {what} failed: {status:?}")))
        }
    }

    /// Device allocation ordered on the stream that uses it
    ///
    /// Allocation and release are both enqueued on `stream`, so the buffer
    /// outlives every solver call queued before it is dropped, including on
    /// an early error return.
    struct Scratch<'a> {
        ptr: u64,
        stream: &'a CudaStream,
    }

    impl<'a> Scratch<'a> {
        fn new(size: usize, stream: &'a CudaStream) -> Result<Self> {
            let mut ptr = 0u64;
            let result = unsafe { cuMemAllocAsync(&mut ptr, size.max(1), stream.cu_stream()) };
            if result != CUresult::CUDA_SUCCESS {
                tracing::warn!(size, ?result, "cuSOLVER scratch allocation failed");
                return Err(Error::OutOfMemory { size });
            }
            Ok(Self { ptr, stream })
        }
    }

    impl Drop for Scratch<'_> {
        fn drop(&mut self) {
            let result = unsafe { cuMemFreeAsync(self.ptr, self.stream.cu_stream()) };
            if result != CUresult::CUDA_SUCCESS {
                log_cuda_memory_error("cuMemFreeAsync", self.ptr, result);
            }
        }
    }

    impl CudaClient {
        /// One cuSOLVER call per element, each with its own `info` slot
        pub(super) fn cholesky<T: LinalgElement>(
            &self,
            call: &CholeskyCall,
            factor: Factor,
        ) -> Result<FactorStatus> {
            let uplo = if call.lower {
                cublasFillMode_t::CUBLAS_FILL_MODE_UPPER
            } else {
                cublasFillMode_t::CUBLAS_FILL_MODE_LOWER
            };
            let n = dim(call.a.rows, "n")?;
            let lda = dim(call.a.ld, "lda")?;
            let handle = self.cusolver.raw();
            let what = factor.name();
            let first = call.a.ptr;

            let mut lwork = 0i32;
            let status = unsafe {
                match (T::DTYPE, factor) {
                    (DType::F32, Factor::Potrf) => cusolverDnSpotrf_bufferSize(
                        handle, uplo, n, first as *mut f32, lda, &mut lwork,
                    ),
                    (DType::F64, Factor::Potrf) => cusolverDnDpotrf_bufferSize(
                        handle, uplo, n, first as *mut f64, lda, &mut lwork,
                    ),
                    (DType::F32, Factor::Potri) => cusolverDnSpotri_bufferSize(
                        handle, uplo, n, first as *mut f32, lda, &mut lwork,
                    ),
                    (DType::F64, Factor::Potri) => cusolverDnDpotri_bufferSize(
                        handle, uplo, n, first as *mut f64, lda, &mut lwork,
                    ),
                    (other, _) => return Err(Error::unsupported_dtype(other, what)),
                }
            };
            check(status, what)?;

            let elem = T::DTYPE.size_in_bytes();
            let info_bytes = call.batch * std::mem::size_of::<i32>();
            let work = Scratch::new(lwork.max(1) as usize * elem, &self.stream)?;
            let info = Scratch::new(info_bytes, &self.stream)?;

            for i in 0..call.batch {
                let a = call.a.matrix_ptr::<T>(i);
                let info_i = (info.ptr + (i * std::mem::size_of::<i32>()) as u64) as *mut i32;
                let status = unsafe {
                    match (T::DTYPE, factor) {
                        (DType::F32, Factor::Potrf) => cusolverDnSpotrf(
                            handle, uplo, n, a as *mut f32, lda, work.ptr as *mut f32, lwork, info_i,
                        ),
                        (DType::F64, Factor::Potrf) => cusolverDnDpotrf(
                            handle, uplo, n, a as *mut f64, lda, work.ptr as *mut f64, lwork, info_i,
                        ),
                        (DType::F32, Factor::Potri) => cusolverDnSpotri(
                            handle, uplo, n, a as *mut f32, lda, work.ptr as *mut f32, lwork, info_i,
                        ),
                        (DType::F64, Factor::Potri) => cusolverDnDpotri(
                            handle, uplo, n, a as *mut f64, lda, work.ptr as *mut f64, lwork, info_i,
                        ),
                        (other, _) => return Err(Error::unsupported_dtype(other, what)),
                    }
                };
                check(status, what)?;
            }

            let mut codes = vec![0i32; call.batch];
            let result = unsafe {
                cuMemcpyDtoHAsync_v2(
                    codes.as_mut_ptr() as *mut std::ffi::c_void,
                    info.ptr,
                    info_bytes,
                    self.stream.cu_stream(),
                )
            };
            if result != CUresult::CUDA_SUCCESS {
                return Err(Error::Backend(format!(
                    "copying {what} status codes failed: {result:?}"
                )));
            }

            // Status codes are only meaningful once the stream drains
            self.synchronize()?;
            Ok(FactorStatus::PerElement(codes))
        }
    }
}
