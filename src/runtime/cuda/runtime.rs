//! CUDA runtime implementation

use super::cache::{
    get_or_create_client, is_cuda_context_valid, log_cuda_memory_error, try_get_cached_stream,
};
use super::client::CudaClient;
use super::device::CudaDevice;
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::linalg::{Primitive, Support};
use crate::runtime::Runtime;

/// CUDA runtime adapter
///
/// Memory is stream-ordered (`cuMemAllocAsync`/`cuMemFreeAsync`) on the
/// device's cached client.
#[derive(Clone, Debug, Default)]
pub struct CudaRuntime;

impl Runtime for CudaRuntime {
    type Device = CudaDevice;
    type Client = CudaClient;

    fn name() -> &'static str {
        "cuda"
    }

    fn requires_stream() -> bool {
        true
    }

    fn support(primitive: Primitive, dtype: DType) -> Support {
        match dtype {
            DType::F32 | DType::F64 => match primitive {
                Primitive::Gemm | Primitive::Trsm | Primitive::Trmm | Primitive::Syrk => {
                    Support::Native
                }
                Primitive::Potrf | Primitive::Potri => factor_support(),
            },
            DType::F16 | DType::BF16 => Support::Unsupported {
                reason: "no half-precision path on the accelerator",
            },
            _ => Support::Unsupported {
                reason: "integer buffers have no BLAS/LAPACK path",
            },
        }
    }

    /// Allocate GPU memory.
    ///
    /// Returns `Err(OutOfMemory)` if CUDA memory allocation fails.
    fn allocate(size_bytes: usize, device: &Self::Device) -> Result<u64> {
        if size_bytes == 0 {
            return Ok(0);
        }

        let client = get_or_create_client(device)?;

        unsafe {
            let mut ptr: u64 = 0;
            let result =
                cudarc::driver::sys::cuMemAllocAsync(&mut ptr, size_bytes, client.stream.cu_stream());
            if result == cudarc::driver::sys::CUresult::CUDA_SUCCESS {
                return Ok(ptr);
            }

            // Flush pending frees and retry once
            let _ = client.stream.synchronize();

            let result =
                cudarc::driver::sys::cuMemAllocAsync(&mut ptr, size_bytes, client.stream.cu_stream());
            if result == cudarc::driver::sys::CUresult::CUDA_SUCCESS {
                return Ok(ptr);
            }

            tracing::warn!(size_bytes, ?result, "CUDA allocation failed");
        }

        Err(Error::OutOfMemory { size: size_bytes })
    }

    fn deallocate(ptr: u64, _size_bytes: usize, device: &Self::Device) {
        if ptr == 0 {
            return;
        }

        unsafe {
            // Context gone: the driver reclaims the memory
            if !is_cuda_context_valid() {
                return;
            }

            let result = match try_get_cached_stream(device.index) {
                Some(stream) => cudarc::driver::sys::cuMemFreeAsync(ptr, stream),
                None => cudarc::driver::sys::cuMemFree_v2(ptr),
            };

            if result != cudarc::driver::sys::CUresult::CUDA_SUCCESS
                && result != cudarc::driver::sys::CUresult::CUDA_ERROR_ILLEGAL_ADDRESS
            {
                log_cuda_memory_error("cuMemFree", ptr, result);
            }
        }
    }

    /// Copy data from host to device, waiting for completion.
    fn copy_to_device(src: &[u8], dst: u64, device: &Self::Device) -> Result<()> {
        if src.is_empty() || dst == 0 {
            return Ok(());
        }

        let client = get_or_create_client(device)?;

        unsafe {
            let result = cudarc::driver::sys::cuMemcpyHtoDAsync_v2(
                dst,
                src.as_ptr() as *const std::ffi::c_void,
                src.len(),
                client.stream.cu_stream(),
            );

            if result != cudarc::driver::sys::CUresult::CUDA_SUCCESS {
                return Err(Error::Backend(format!(
                    "CUDA host-to-device copy failed: {} bytes ({result:?})",
                    src.len()
                )));
            }
        }

        client.stream.synchronize()?;
        Ok(())
    }

    /// Copy data from device to host, waiting for completion.
    ///
    /// The copy is ordered after all work already enqueued on the device's
    /// cached client.
    fn copy_from_device(src: u64, dst: &mut [u8], device: &Self::Device) -> Result<()> {
        if dst.is_empty() || src == 0 {
            return Ok(());
        }

        let client = get_or_create_client(device)?;

        unsafe {
            let result = cudarc::driver::sys::cuMemcpyDtoHAsync_v2(
                dst.as_mut_ptr() as *mut std::ffi::c_void,
                src,
                dst.len(),
                client.stream.cu_stream(),
            );

            if result != cudarc::driver::sys::CUresult::CUDA_SUCCESS {
                return Err(Error::Backend(format!(
                    "CUDA device-to-host copy failed: {} bytes ({result:?})",
                    dst.len()
                )));
            }
        }

        client.stream.synchronize()?;
        Ok(())
    }

    fn default_device() -> Self::Device {
        CudaDevice::new(0)
    }

    fn default_client(device: &Self::Device) -> Result<Self::Client> {
        get_or_create_client(device)
    }
}

#[cfg(feature = "cusolver")]
fn factor_support() -> Support {
    Support::Native
}

#[cfg(not(feature = "cusolver"))]
fn factor_support() -> Support {
    Support::Unsupported {
        reason: "built without the `cusolver` feature",
    }
}

/// Check if a CUDA device 0 can be opened on this system
///
/// A missing driver library panics inside cudarc; that counts as
/// unavailable.
pub fn is_cuda_available() -> bool {
    matches!(
        std::panic::catch_unwind(|| get_or_create_client(&CudaDevice::new(0))),
        Ok(Ok(_))
    )
}
