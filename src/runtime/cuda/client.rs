//! CUDA client: the stream every dispatch call enqueues on
//!
//! # Thread Safety
//!
//! `CudaClient` is `Clone` and can be shared across threads. The context,
//! stream, and library handles are reference-counted; clones enqueue on the
//! same stream, so work from clones is ordered.

use cudarc::cublas::CudaBlas;
use cudarc::driver::safe::{CudaContext, CudaStream};
use std::sync::Arc;

use super::CudaRuntime;
use super::device::CudaDevice;
use crate::error::{Error, Result};
use crate::runtime::RuntimeClient;

/// CUDA runtime client
///
/// Owns a context, one stream, and the library handles bound to that
/// stream. Every primitive dispatched with this client runs on
/// [`stream`](Self::stream); calls return once the work is enqueued.
#[derive(Clone)]
pub struct CudaClient {
    /// GPU device index
    pub(crate) device: CudaDevice,

    /// CUDA context for this device
    pub(crate) context: Arc<CudaContext>,

    /// Stream on which all library calls launch
    pub(crate) stream: Arc<CudaStream>,

    /// cuBLAS handle bound to `stream`
    pub(crate) cublas: Arc<CudaBlas>,

    /// cuSOLVER dense handle bound to `stream`
    #[cfg(feature = "cusolver")]
    pub(crate) cusolver: Arc<CusolverHandle>,
}

impl std::fmt::Debug for CudaClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CudaClient")
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

impl CudaClient {
    /// Create a client with a fresh context and stream on `device`
    ///
    /// # Errors
    ///
    /// Returns an error if context creation fails (e.g. invalid device
    /// index), or if the stream or library handles cannot be created.
    pub fn new(device: CudaDevice) -> Result<Self> {
        let context = CudaContext::new(device.index).map_err(|e| {
            Error::Backend(format!(
                "failed to create CUDA context for device {}: {e:?}",
                device.index
            ))
        })?;

        context
            .bind_to_thread()
            .map_err(|e| Error::Backend(format!("failed to bind CUDA context: {e:?}")))?;

        let stream = context
            .new_stream()
            .map_err(|e| Error::Backend(format!("failed to create CUDA stream: {e:?}")))?;

        let cublas = CudaBlas::new(stream.clone())
            .map_err(|e| Error::Backend(format!("failed to initialize cuBLAS: {e:?}")))?;

        #[cfg(feature = "cusolver")]
        let cusolver = CusolverHandle::new(&stream)?;

        tracing::debug!(device = device.index, "created CUDA client");

        Ok(Self {
            device,
            context,
            stream,
            cublas: Arc::new(cublas),
            #[cfg(feature = "cusolver")]
            cusolver: Arc::new(cusolver),
        })
    }

    /// Stream all dispatched work is ordered on
    #[inline]
    pub fn stream(&self) -> &Arc<CudaStream> {
        &self.stream
    }

    /// CUDA context of this client
    #[inline]
    pub fn context(&self) -> &Arc<CudaContext> {
        &self.context
    }

    /// cuBLAS handle bound to this client's stream
    #[inline]
    pub fn cublas(&self) -> &CudaBlas {
        &self.cublas
    }
}

impl RuntimeClient<CudaRuntime> for CudaClient {
    fn device(&self) -> &CudaDevice {
        &self.device
    }

    fn synchronize(&self) -> Result<()> {
        self.stream.synchronize().map_err(|e| {
            tracing::warn!(device = self.device.index, error = ?e, "stream synchronization failed");
            Error::Cuda(e)
        })
    }
}

/// Owned cuSOLVER dense handle
///
/// cudarc exposes cuSOLVER dense only through raw bindings, so the handle
/// is created and destroyed here.
#[cfg(feature = "cusolver")]
pub(crate) struct CusolverHandle {
    raw: cudarc::cusolver::sys::cusolverDnHandle_t,
}

// The handle is only used on its client's stream, which serializes access.
#[cfg(feature = "cusolver")]
unsafe impl Send for CusolverHandle {}
#[cfg(feature = "cusolver")]
unsafe impl Sync for CusolverHandle {}

#[cfg(feature = "cusolver")]
impl CusolverHandle {
    fn new(stream: &CudaStream) -> Result<Self> {
        use cudarc::cusolver::sys::{cusolverDnCreate, cusolverDnSetStream, cusolverStatus_t};

        let mut raw = std::mem::MaybeUninit::uninit();
        let status = unsafe { cusolverDnCreate(raw.as_mut_ptr()) };
        if status != cusolverStatus_t::CUSOLVER_STATUS_SUCCESS {
            return Err(Error::Backend(format!("cusolverDnCreate failed: {status:?}")));
        }
        let handle = Self {
            raw: unsafe { raw.assume_init() },
        };

        let status = unsafe { cusolverDnSetStream(handle.raw, stream.cu_stream() as _) };
        if status != cusolverStatus_t::CUSOLVER_STATUS_SUCCESS {
            return Err(Error::Backend(format!(
                "cusolverDnSetStream failed: {status:?}"
            )));
        }
        Ok(handle)
    }

    #[inline]
    pub(crate) fn raw(&self) -> cudarc::cusolver::sys::cusolverDnHandle_t {
        self.raw
    }
}

#[cfg(feature = "cusolver")]
impl Drop for CusolverHandle {
    fn drop(&mut self) {
        let status = unsafe { cudarc::cusolver::sys::cusolverDnDestroy(self.raw) };
        if status != cudarc::cusolver::sys::cusolverStatus_t::CUSOLVER_STATUS_SUCCESS {
            tracing::warn!(?status, "cusolverDnDestroy failed");
        }
    }
}
