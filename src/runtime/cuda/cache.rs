//! Per-device client cache

use super::client::CudaClient;
use super::device::CudaDevice;
use crate::error::Result;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

/// Device index -> cached client
///
/// Memory management and `default_client` share one context and stream
/// per device instead of creating new ones on every call.
static CLIENT_CACHE: OnceLock<Mutex<HashMap<usize, CudaClient>>> = OnceLock::new();

/// Check if the CUDA context on the current thread is valid.
///
/// # Safety
///
/// Calls the driver API directly. The answer only holds for the current
/// thread's context state.
#[inline]
pub(super) unsafe fn is_cuda_context_valid() -> bool {
    let mut ctx: cudarc::driver::sys::CUcontext = std::ptr::null_mut();
    // SAFETY: cuCtxGetCurrent only writes to the provided pointer.
    let result = unsafe { cudarc::driver::sys::cuCtxGetCurrent(&mut ctx) };
    result == cudarc::driver::sys::CUresult::CUDA_SUCCESS && !ctx.is_null()
}

/// Lock the cache, recovering from a poisoned mutex.
///
/// Cache operations are idempotent, so a guard left behind by a panicking
/// thread is still usable.
#[inline]
fn lock_client_cache(
    cache: &Mutex<HashMap<usize, CudaClient>>,
) -> MutexGuard<'_, HashMap<usize, CudaClient>> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Get or create the cached client for a device.
pub(super) fn get_or_create_client(device: &CudaDevice) -> Result<CudaClient> {
    let cache = CLIENT_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = lock_client_cache(cache);

    if let Some(client) = guard.get(&device.index) {
        return Ok(client.clone());
    }

    let client = CudaClient::new(device.clone())?;
    guard.insert(device.index, client.clone());
    Ok(client)
}

/// Stream of the cached client for a device, if one exists.
#[inline]
pub(super) fn try_get_cached_stream(device_index: usize) -> Option<cudarc::driver::sys::CUstream> {
    let cache = CLIENT_CACHE.get()?;
    let guard = lock_client_cache(cache);
    guard
        .get(&device_index)
        .map(|client| client.stream.cu_stream())
}

/// Log a CUDA memory operation failure.
#[cold]
#[inline(never)]
pub(super) fn log_cuda_memory_error(
    operation: &str,
    ptr: u64,
    result: cudarc::driver::sys::CUresult,
) {
    tracing::warn!(operation, ptr = format_args!("0x{ptr:x}"), ?result, "CUDA memory operation failed");
}
