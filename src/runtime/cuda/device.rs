//! CUDA device identity

use crate::runtime::Device;

/// One NVIDIA GPU, identified by its ordinal
///
/// Buffers and clients compare devices by index; two tensors on
/// `CudaDevice::new(0)` are on the same device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CudaDevice {
    /// Index of the GPU device (0, 1, 2, ...)
    pub(crate) index: usize,
}

impl CudaDevice {
    /// Create a handle for GPU `index`
    pub fn new(index: usize) -> Self {
        Self { index }
    }

    /// Device ordinal
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Device for CudaDevice {
    fn id(&self) -> usize {
        self.index
    }

    fn name(&self) -> String {
        format!("cuda:{}", self.index)
    }
}

impl Default for CudaDevice {
    fn default() -> Self {
        Self::new(0)
    }
}
