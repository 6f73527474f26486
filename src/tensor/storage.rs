//! Storage: device memory shared between views through an `Arc`

use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::runtime::Runtime;
use std::sync::Arc;

/// Device memory backing one or more buffer views
///
/// Views produced by `transpose`, `narrow`, and `select` clone the storage
/// handle and keep the allocation alive; memory is released when the last
/// handle drops.
pub struct Storage<R: Runtime> {
    inner: Arc<StorageInner<R>>,
}

struct StorageInner<R: Runtime> {
    /// Raw device pointer (accelerator address or host pointer cast to u64)
    ptr: u64,
    /// Number of elements (not bytes)
    len: usize,
    dtype: DType,
    device: R::Device,
    /// Deallocate on drop only when we allocated the memory
    owned: bool,
}

impl<R: Runtime> Storage<R> {
    /// Allocate zero-initialized storage for `len` elements of `dtype`
    pub fn new(len: usize, dtype: DType, device: &R::Device) -> Result<Self> {
        let size_bytes = len * dtype.size_in_bytes();
        let ptr = R::allocate(size_bytes, device)?;
        Ok(Self::owned(ptr, len, dtype, device))
    }

    /// Copy `data` to the device; the dtype comes from the element type
    pub fn from_slice<T: Element>(data: &[T], device: &R::Device) -> Result<Self> {
        Self::from_bytes(bytemuck::cast_slice(data), T::DTYPE, device)
    }

    /// Copy raw bytes to the device under an explicit dtype
    ///
    /// This is how buffers of element types without a Rust representation in
    /// the current build (e.g. F16 without the `f16` feature) are created.
    pub fn from_bytes(data: &[u8], dtype: DType, device: &R::Device) -> Result<Self> {
        let elem = dtype.size_in_bytes();
        if data.len() % elem != 0 {
            return Err(Error::invalid_argument(
                "data",
                format!("{} bytes is not a whole number of {dtype} elements", data.len()),
            ));
        }
        let ptr = R::allocate(data.len(), device)?;
        if let Err(e) = R::copy_to_device(data, ptr, device) {
            R::deallocate(ptr, data.len(), device);
            return Err(e);
        }
        Ok(Self::owned(ptr, data.len() / elem, dtype, device))
    }

    /// Wrap existing device memory without taking ownership
    ///
    /// # Safety
    /// - `ptr` must point to at least `len` elements of `dtype` on `device`
    /// - The memory must outlive this storage and every view of it
    /// - The caller remains responsible for deallocation
    pub unsafe fn from_ptr(ptr: u64, len: usize, dtype: DType, device: &R::Device) -> Self {
        Self {
            inner: Arc::new(StorageInner {
                ptr,
                len,
                dtype,
                device: device.clone(),
                owned: false,
            }),
        }
    }

    fn owned(ptr: u64, len: usize, dtype: DType, device: &R::Device) -> Self {
        Self {
            inner: Arc::new(StorageInner {
                ptr,
                len,
                dtype,
                device: device.clone(),
                owned: true,
            }),
        }
    }

    /// Raw device pointer of element 0
    #[inline]
    pub fn ptr(&self) -> u64 {
        self.inner.ptr
    }

    /// Number of elements
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len
    }

    /// Check if storage is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    /// Element type
    #[inline]
    pub fn dtype(&self) -> DType {
        self.inner.dtype
    }

    /// Device holding the memory
    #[inline]
    pub fn device(&self) -> &R::Device {
        &self.inner.device
    }

    /// Size in bytes
    #[inline]
    pub fn size_in_bytes(&self) -> usize {
        self.inner.len * self.inner.dtype.size_in_bytes()
    }

    /// True if both handles refer to the same allocation
    #[inline]
    pub fn same_allocation(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Copy the whole allocation to the host as raw bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; self.size_in_bytes()];
        R::copy_from_device(self.inner.ptr, &mut bytes, &self.inner.device)?;
        Ok(bytes)
    }

    /// Copy the whole allocation to the host as typed elements
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if T::DTYPE != self.inner.dtype {
            return Err(Error::DTypeMismatch {
                lhs: self.inner.dtype,
                rhs: T::DTYPE,
            });
        }
        // Allocate as T so the host buffer has T's alignment
        let mut result = vec![T::zeroed(); self.inner.len];
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut result);
        R::copy_from_device(self.inner.ptr, bytes, &self.inner.device)?;
        Ok(result)
    }

    /// Overwrite the whole allocation from host bytes
    pub fn write_bytes(&self, data: &[u8]) -> Result<()> {
        if data.len() != self.size_in_bytes() {
            return Err(Error::invalid_argument(
                "data",
                format!(
                    "expected {} bytes, got {}",
                    self.size_in_bytes(),
                    data.len()
                ),
            ));
        }
        R::copy_to_device(data, self.inner.ptr, &self.inner.device)
    }
}

impl<R: Runtime> Clone for Storage<R> {
    /// Clone increments the reference count (zero-copy)
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Runtime> Drop for StorageInner<R> {
    fn drop(&mut self) {
        if self.owned && self.ptr != 0 {
            R::deallocate(
                self.ptr,
                self.len * self.dtype.size_in_bytes(),
                &self.device,
            );
        }
    }
}

impl<R: Runtime> std::fmt::Debug for Storage<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("ptr", &format!("0x{:x}", self.inner.ptr))
            .field("len", &self.inner.len)
            .field("dtype", &self.inner.dtype)
            .field("owned", &self.inner.owned)
            .finish()
    }
}
