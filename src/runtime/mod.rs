//! Runtime backends
//!
//! This module defines the `Runtime` trait and provides implementations
//! for the host CPU and (with the `cuda` feature) NVIDIA accelerators.
//!
//! # Architecture
//!
//! ```text
//! Runtime (backend identity, memory, capability gate)
//! ├── Device (identifies a specific GPU/CPU)
//! └── Client (execution stream; implements BlasBackend)
//! ```

#[cfg(feature = "cpu")]
pub mod cpu;

#[cfg(feature = "cuda")]
pub mod cuda;

use crate::dtype::DType;
use crate::error::Result;
use crate::linalg::{Primitive, Support};

/// Core trait for compute backends
///
/// `Runtime` abstracts over compute devices with static dispatch: dispatch
/// functions are generic over `R: Runtime`, and the runtime named by the
/// operands' type decides which backend executes.
///
/// # Example
///
/// ```
/// use linalg_dispatch::prelude::*;
///
/// let device = CpuRuntime::default_device();
/// let ptr = CpuRuntime::allocate(1024, &device)?;
/// CpuRuntime::deallocate(ptr, 1024, &device);
/// # Ok::<(), linalg_dispatch::error::Error>(())
/// ```
pub trait Runtime: Clone + Send + Sync + 'static {
    /// Device identifier type
    type Device: Device;

    /// Client for dispatching operations; the runtime's stream handle
    type Client: RuntimeClient<Self>;

    /// Human-readable name of this runtime
    fn name() -> &'static str;

    /// Whether dispatch calls must name a stream explicitly
    ///
    /// Asynchronous devices return `true`: a call with no stream is
    /// rejected instead of being queued on an implicit default stream.
    fn requires_stream() -> bool {
        false
    }

    /// Capability gate: how this build serves `primitive` on `dtype` buffers
    ///
    /// Must be a pure function of the build configuration.
    fn support(primitive: Primitive, dtype: DType) -> Support;

    /// Allocate device memory
    ///
    /// Returns a device pointer (u64). Returns `Err(OutOfMemory)` if
    /// allocation fails.
    fn allocate(size_bytes: usize, device: &Self::Device) -> Result<u64>;

    /// Deallocate device memory
    fn deallocate(ptr: u64, size_bytes: usize, device: &Self::Device);

    /// Copy data from host to device
    fn copy_to_device(src: &[u8], dst: u64, device: &Self::Device) -> Result<()>;

    /// Copy data from device to host
    fn copy_from_device(src: u64, dst: &mut [u8], device: &Self::Device) -> Result<()>;

    /// Get the default device
    fn default_device() -> Self::Device;

    /// Get the default client for a device
    fn default_client(device: &Self::Device) -> Result<Self::Client>;
}

/// Trait for device identification
pub trait Device: Clone + Send + Sync + 'static {
    /// Unique identifier for this device
    fn id(&self) -> usize;

    /// Check if two devices are the same
    fn is_same(&self, other: &Self) -> bool {
        self.id() == other.id()
    }

    /// Human-readable name
    fn name(&self) -> String {
        format!("Device({})", self.id())
    }
}

/// Trait for runtime clients (execution streams)
pub trait RuntimeClient<R: Runtime>: Clone + Send + Sync {
    /// Get the device this client operates on
    fn device(&self) -> &R::Device;

    /// Wait for all work enqueued on this client to complete
    fn synchronize(&self) -> Result<()>;
}
