//! CPU runtime implementation

use super::client::CpuClient;
use super::device::CpuDevice;
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::linalg::{Primitive, Support};
use crate::runtime::Runtime;
use std::alloc::{Layout as AllocLayout, alloc_zeroed, dealloc};

/// Alignment of host allocations (AVX-512 width)
const ALIGN: usize = 64;

/// CPU compute runtime
///
/// This is the default runtime that works on any platform.
/// Memory is allocated on the heap using the system allocator.
#[derive(Clone, Debug, Default)]
pub struct CpuRuntime;

impl Runtime for CpuRuntime {
    type Device = CpuDevice;
    type Client = CpuClient;

    fn name() -> &'static str {
        "cpu"
    }

    fn support(primitive: Primitive, dtype: DType) -> Support {
        match dtype {
            DType::F32 | DType::F64 => Support::Native,
            DType::F16 | DType::BF16 => half_support(primitive),
            _ => Support::Unsupported {
                reason: "integer buffers have no BLAS/LAPACK path",
            },
        }
    }

    fn allocate(size_bytes: usize, _device: &Self::Device) -> Result<u64> {
        if size_bytes == 0 {
            return Ok(0);
        }

        let layout = AllocLayout::from_size_align(size_bytes, ALIGN)
            .map_err(|e| Error::Internal(format!("invalid allocation layout: {e}")))?;

        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            return Err(Error::OutOfMemory { size: size_bytes });
        }

        Ok(ptr as u64)
    }

    fn deallocate(ptr: u64, size_bytes: usize, _device: &Self::Device) {
        if ptr == 0 || size_bytes == 0 {
            return;
        }

        // Same size/alignment pair that allocate() accepted
        if let Ok(layout) = AllocLayout::from_size_align(size_bytes, ALIGN) {
            unsafe {
                dealloc(ptr as *mut u8, layout);
            }
        }
    }

    fn copy_to_device(src: &[u8], dst: u64, _device: &Self::Device) -> Result<()> {
        if src.is_empty() || dst == 0 {
            return Ok(());
        }

        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), dst as *mut u8, src.len());
        }
        Ok(())
    }

    fn copy_from_device(src: u64, dst: &mut [u8], _device: &Self::Device) -> Result<()> {
        if dst.is_empty() || src == 0 {
            return Ok(());
        }

        unsafe {
            std::ptr::copy_nonoverlapping(src as *const u8, dst.as_mut_ptr(), dst.len());
        }
        Ok(())
    }

    fn default_device() -> Self::Device {
        CpuDevice::new()
    }

    fn default_client(device: &Self::Device) -> Result<Self::Client> {
        Ok(CpuClient::new(device.clone()))
    }
}

/// Half-precision buffers run through an F32 working copy where the result
/// survives rounding back to 16 bits; solves and factorizations do not.
#[cfg(feature = "f16")]
fn half_support(primitive: Primitive) -> Support {
    match primitive {
        Primitive::Gemm | Primitive::Trmm | Primitive::Syrk => Support::Fallback { via: DType::F32 },
        Primitive::Trsm | Primitive::Potrf | Primitive::Potri => Support::Unsupported {
            reason: "half-precision solves and factorizations are not provided",
        },
    }
}

#[cfg(not(feature = "f16"))]
fn half_support(_primitive: Primitive) -> Support {
    Support::Unsupported {
        reason: "half-precision support requires the `f16` feature",
    }
}
