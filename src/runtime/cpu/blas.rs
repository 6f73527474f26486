//! `BlasBackend` for the CPU: one kernel call per batch element

use super::client::CpuClient;
use super::kernels::{gemm_kernel, potrf_kernel, potri_kernel, syrk_kernel, trmm_kernel, trsm_kernel};
use super::runtime::CpuRuntime;
use crate::dtype::LinalgElement;
use crate::error::Result;
use crate::linalg::{BlasBackend, CholeskyCall, FactorStatus, GemmCall, SyrkCall, TriangularCall};

impl BlasBackend<CpuRuntime> for CpuClient {
    fn gemm<T: LinalgElement>(&self, call: &GemmCall<T>) -> Result<()> {
        let (m, n, k) = call.dims();
        self.batch_map(call.batch, |i| unsafe {
            gemm_kernel(
                call.trans_a,
                call.trans_b,
                m,
                n,
                k,
                call.alpha,
                call.a.matrix_ptr::<T>(i) as *const T,
                call.a.ld,
                call.b.matrix_ptr::<T>(i) as *const T,
                call.b.ld,
                call.beta,
                call.c.matrix_ptr::<T>(i) as *mut T,
                call.c.ld,
            )
        });
        Ok(())
    }

    fn trsm<T: LinalgElement>(&self, call: &TriangularCall<T>) -> Result<()> {
        self.batch_map(call.batch, |i| unsafe {
            trsm_kernel(
                call.right,
                call.lower,
                call.trans,
                call.b.rows,
                call.b.cols,
                call.alpha,
                call.a.matrix_ptr::<T>(i) as *const T,
                call.a.ld,
                call.b.matrix_ptr::<T>(i) as *mut T,
                call.b.ld,
            )
        });
        Ok(())
    }

    fn trmm<T: LinalgElement>(&self, call: &TriangularCall<T>) -> Result<()> {
        self.batch_map(call.batch, |i| unsafe {
            trmm_kernel(
                call.right,
                call.lower,
                call.trans,
                call.b.rows,
                call.b.cols,
                call.alpha,
                call.a.matrix_ptr::<T>(i) as *const T,
                call.a.ld,
                call.b.matrix_ptr::<T>(i) as *mut T,
                call.b.ld,
            )
        });
        Ok(())
    }

    fn potrf<T: LinalgElement>(&self, call: &CholeskyCall) -> Result<FactorStatus> {
        let codes = self.batch_map(call.batch, |i| unsafe {
            potrf_kernel::<T>(
                call.lower,
                call.a.rows,
                call.a.matrix_ptr::<T>(i) as *mut T,
                call.a.ld,
            )
        });
        Ok(FactorStatus::PerElement(codes))
    }

    fn potri<T: LinalgElement>(&self, call: &CholeskyCall) -> Result<FactorStatus> {
        let codes = self.batch_map(call.batch, |i| unsafe {
            potri_kernel::<T>(
                call.lower,
                call.a.rows,
                call.a.matrix_ptr::<T>(i) as *mut T,
                call.a.ld,
            )
        });
        Ok(FactorStatus::PerElement(codes))
    }

    fn syrk<T: LinalgElement>(&self, call: &SyrkCall<T>) -> Result<()> {
        let (n, k) = call.dims();
        self.batch_map(call.batch, |i| unsafe {
            syrk_kernel(
                call.trans,
                n,
                k,
                call.alpha,
                call.a.matrix_ptr::<T>(i) as *const T,
                call.a.ld,
                call.beta,
                call.c.matrix_ptr::<T>(i) as *mut T,
                call.c.ld,
            )
        });
        Ok(())
    }
}
