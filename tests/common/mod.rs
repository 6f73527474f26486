//! Common test utilities
#![allow(dead_code)]

use linalg_dispatch::dtype::DType;
use linalg_dispatch::runtime::Runtime;
use linalg_dispatch::runtime::cpu::{CpuClient, CpuDevice, CpuRuntime};
#[cfg(feature = "cuda")]
use linalg_dispatch::runtime::cuda::{CudaClient, CudaDevice, CudaRuntime};
use linalg_dispatch::tensor::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
#[cfg(feature = "cuda")]
use std::sync::{Mutex, OnceLock};

/// Create a CPU client and device for testing
pub fn create_cpu_client() -> (CpuClient, CpuDevice) {
    let device = CpuDevice::new();
    let client = CpuRuntime::default_client(&device).expect("cpu client");
    (client, device)
}

/// Create a CUDA client and device, returning None if CUDA is unavailable
#[cfg(feature = "cuda")]
pub fn create_cuda_client() -> Option<(CudaClient, CudaDevice)> {
    if !linalg_dispatch::runtime::cuda::is_cuda_available() {
        return None;
    }
    let device = CudaDevice::new(0);
    let client = CudaRuntime::default_client(&device).ok()?;
    Some((client, device))
}

#[cfg(feature = "cuda")]
static CUDA_BACKEND_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// Run `f` against device 0, one test at a time
#[cfg(feature = "cuda")]
pub fn with_cuda_backend<F>(f: F)
where
    F: FnOnce(CudaClient, CudaDevice),
{
    let _guard = CUDA_BACKEND_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let (client, device) =
        create_cuda_client().expect("CUDA feature is enabled but CUDA runtime is unavailable");
    f(client, device);
}

/// Default `(rtol, atol)` for comparisons in a dtype
pub fn tolerance(dtype: DType) -> (f64, f64) {
    match dtype {
        DType::F64 => (1e-10, 1e-12),
        DType::F32 => (1e-4, 1e-5),
        DType::F16 | DType::BF16 => (2e-2, 2e-2),
        _ => (0.0, 0.0),
    }
}

/// Assert two f64 slices are close within tolerance
///
/// Uses the formula: |a - b| <= atol + rtol * |b|
pub fn assert_allclose_f64(a: &[f64], b: &[f64], rtol: f64, atol: f64, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}

/// Assert two f32 slices are close within tolerance
pub fn assert_allclose_f32(a: &[f32], b: &[f32], rtol: f32, atol: f32, msg: &str) {
    assert_eq!(a.len(), b.len(), "{}: length mismatch", msg);
    for (i, (x, y)) in a.iter().zip(b.iter()).enumerate() {
        let diff = (x - y).abs();
        let tol = atol + rtol * y.abs();
        assert!(
            diff <= tol,
            "{}: element {} differs: {} vs {} (diff={}, tol={})",
            msg,
            i,
            x,
            y,
            diff,
            tol
        );
    }
}

/// Deterministic uniform values in `[-1, 1)`
pub fn random_f64(len: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.random_range(-1.0..1.0)).collect()
}

/// Deterministic uniform values in `[-1, 1)`
pub fn random_f32(len: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.random_range(-1.0f32..1.0)).collect()
}

/// Row-major `n x n` symmetric positive definite matrix: `M Mᵀ + n I`
pub fn spd_matrix(n: usize, seed: u64) -> Vec<f64> {
    let m = random_f64(n * n, seed);
    let mut out = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            let mut sum = 0.0;
            for p in 0..n {
                sum += m[i * n + p] * m[j * n + p];
            }
            out[i * n + j] = sum + if i == j { n as f64 } else { 0.0 };
        }
    }
    out
}

/// Reference `op(A) op(B)` for row-major inputs
pub fn reference_matmul(
    a: &[f64],
    a_shape: (usize, usize),
    trans_a: bool,
    b: &[f64],
    b_shape: (usize, usize),
    trans_b: bool,
) -> Vec<f64> {
    let at = |i: usize, p: usize| {
        if trans_a {
            a[p * a_shape.1 + i]
        } else {
            a[i * a_shape.1 + p]
        }
    };
    let bt = |p: usize, j: usize| {
        if trans_b {
            b[j * b_shape.1 + p]
        } else {
            b[p * b_shape.1 + j]
        }
    };
    let (m, k) = if trans_a {
        (a_shape.1, a_shape.0)
    } else {
        a_shape
    };
    let n = if trans_b { b_shape.0 } else { b_shape.1 };

    let mut out = vec![0.0; m * n];
    for i in 0..m {
        for j in 0..n {
            out[i * n + j] = (0..k).map(|p| at(i, p) * bt(p, j)).sum();
        }
    }
    out
}

/// Row-major transpose of an `r x c` matrix
pub fn transposed(a: &[f64], rows: usize, cols: usize) -> Vec<f64> {
    let mut out = vec![0.0; a.len()];
    for i in 0..rows {
        for j in 0..cols {
            out[j * rows + i] = a[i * cols + j];
        }
    }
    out
}

/// Copy of the `lower` (or upper) triangle, the other triangle zeroed
pub fn triangle(a: &[f64], n: usize, lower: bool) -> Vec<f64> {
    let mut out = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            if (lower && j <= i) || (!lower && j >= i) {
                out[i * n + j] = a[i * n + j];
            }
        }
    }
    out
}

/// Tensor of the given shape on the CPU
pub fn cpu_tensor<T: linalg_dispatch::dtype::Element>(
    data: &[T],
    shape: &[usize],
    device: &CpuDevice,
) -> Tensor<CpuRuntime> {
    Tensor::<CpuRuntime>::from_slice(data, shape, device)
}
