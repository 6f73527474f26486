//! Shared implementation behind the single and batched entry points
//!
//! Each primitive runs the same pipeline:
//!
//! 1. capability gate (nothing else is inspected for refused requests)
//! 2. dtype agreement between operands and scalars
//! 3. stream resolution and device agreement
//! 4. shapes, layouts, and output/input overlap
//! 5. one backend call, natively or through a promoted working copy
//!
//! Single calls are the `batched == false` case: rank-2 operands lowered to
//! descriptors with `batch == 1`.

use super::backend::{BlasBackend, CholeskyCall, FactorStatus, GemmCall, SyrkCall, TriangularCall};
use super::check;
use super::gate::{self, Primitive, Support};
use super::orientation::Operand;
use crate::dtype::{DType, LinalgElement};
use crate::error::{BatchFailure, Error, Result};
use crate::runtime::{Runtime, RuntimeClient};
use crate::tensor::Tensor;

/// Run `$body` with `$T` bound to the Rust type of a compute dtype
macro_rules! dispatch_float {
    ($dtype:expr, $T:ident => $body:block, $op:expr) => {
        match $dtype {
            DType::F64 => {
                type $T = f64;
                $body
            }
            DType::F32 => {
                type $T = f32;
                $body
            }
            other => Err(Error::unsupported_dtype(other, $op)),
        }
    };
}

/// Scalars carried as f64 until the compute type is known
///
/// f32, f64, f16 and bf16 values all round-trip through f64 exactly.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Scalars {
    pub alpha: f64,
    pub beta: f64,
    /// Dtype of the caller's scalar type; `None` when the layer picked them
    pub dtype: Option<DType>,
}

#[inline]
fn cast<T: LinalgElement>(v: f64) -> T {
    T::from_f64(v)
}

fn trace_dispatch<R: Runtime>(op: Primitive, dtype: DType, batch: usize, support: Support) {
    tracing::trace!(
        op = op.name(),
        runtime = R::name(),
        %dtype,
        batch,
        ?support,
        "linalg dispatch"
    );
}

/// Run natively, or through working copies in the fallback precision
///
/// `buffers[output]` is the buffer the primitive writes. On the fallback
/// path every buffer is copied into a contiguous tensor of the working
/// dtype, the primitive runs on the copies, and the written copy is rounded
/// back into the caller's buffer.
fn execute<R, O>(
    op: Primitive,
    support: Support,
    client: &R::Client,
    dtype: DType,
    buffers: &[&Tensor<R>],
    output: usize,
    run: impl FnOnce(DType, &[&Tensor<R>]) -> Result<O>,
) -> Result<O>
where
    R: Runtime,
{
    match support {
        Support::Native => run(dtype, buffers),
        Support::Fallback { via } => {
            tracing::debug!(
                op = op.name(),
                runtime = R::name(),
                from = %dtype,
                %via,
                "running through promoted working copy"
            );
            client.synchronize()?;
            let promoted = buffers
                .iter()
                .map(|t| promote(t, via))
                .collect::<Result<Vec<_>>>()?;
            let refs: Vec<&Tensor<R>> = promoted.iter().collect();
            let out = run(via, &refs)?;
            client.synchronize()?;
            demote_into(&promoted[output], buffers[output])?;
            Ok(out)
        }
        Support::Unsupported { reason } => Err(Error::backend_limitation(R::name(), op.name(), reason)),
    }
}

/// Contiguous copy of `t` in the working dtype `via`
#[cfg(feature = "f16")]
fn promote<R: Runtime>(t: &Tensor<R>, via: DType) -> Result<Tensor<R>> {
    if via != DType::F32 {
        return Err(Error::backend_limitation(
            R::name(),
            "promote",
            format!("no {via} working copy for {}", t.dtype()),
        ));
    }
    let data: Vec<f32> = match t.dtype() {
        DType::F16 => t
            .try_to_vec::<half::f16>()?
            .into_iter()
            .map(half::f16::to_f32)
            .collect(),
        DType::BF16 => t
            .try_to_vec::<half::bf16>()?
            .into_iter()
            .map(half::bf16::to_f32)
            .collect(),
        DType::F32 => t.try_to_vec::<f32>()?,
        other => return Err(Error::unsupported_dtype(other, "promote")),
    };
    Tensor::try_from_slice(&data, t.shape(), t.device())
}

/// Round `src` (working dtype) into the elements of `dst`'s view
#[cfg(feature = "f16")]
fn demote_into<R: Runtime>(src: &Tensor<R>, dst: &Tensor<R>) -> Result<()> {
    let data: Vec<f32> = src.try_to_vec()?;
    match dst.dtype() {
        DType::F16 => {
            let out: Vec<half::f16> = data.iter().map(|&v| half::f16::from_f32(v)).collect();
            dst.write_from_slice(&out)
        }
        DType::BF16 => {
            let out: Vec<half::bf16> = data.iter().map(|&v| half::bf16::from_f32(v)).collect();
            dst.write_from_slice(&out)
        }
        DType::F32 => dst.write_from_slice(&data),
        other => Err(Error::unsupported_dtype(other, "demote")),
    }
}

#[cfg(not(feature = "f16"))]
fn promote<R: Runtime>(t: &Tensor<R>, via: DType) -> Result<Tensor<R>> {
    Err(Error::backend_limitation(
        R::name(),
        "promote",
        format!(
            "{} -> {via} working copies require the `f16` feature",
            t.dtype()
        ),
    ))
}

#[cfg(not(feature = "f16"))]
fn demote_into<R: Runtime>(_src: &Tensor<R>, dst: &Tensor<R>) -> Result<()> {
    Err(Error::unsupported_dtype(dst.dtype(), "demote"))
}

// ============================================================================
// Multiply
// ============================================================================

pub(crate) fn gemm<R>(
    a: Operand<'_, R>,
    b: Operand<'_, R>,
    c: &Tensor<R>,
    scalars: Scalars,
    batched: bool,
    stream: Option<&R::Client>,
) -> Result<()>
where
    R: Runtime,
    R::Client: BlasBackend<R>,
{
    let op = Primitive::Gemm;
    let dtype = c.dtype();
    let support = gate::resolve::<R>(op, dtype)?;
    check::dtypes(dtype, scalars.dtype, &[a.tensor(), b.tensor(), c])?;
    let client = check::resolve_client::<R>(op.name(), stream, &[a.tensor(), b.tensor(), c])?;

    let (batch, m, k) = check::operand_dims(&a, "a", batched)?;
    let (b_batch, k2, n) = check::operand_dims(&b, "b", batched)?;
    let (c_batch, cm, cn) = check::matrix_dims(c, "c", batched)?;
    if batched {
        check::same_batch(batch, b_batch, b.tensor().shape())?;
        check::same_batch(batch, c_batch, c.shape())?;
    }
    if k != k2 {
        return Err(Error::invalid_argument(
            "b",
            format!("inner dimensions differ: op(a) is {m}x{k}, op(b) is {k2}x{n}"),
        ));
    }
    if (cm, cn) != (m, n) {
        return Err(Error::shape_mismatch(&[m, n], &[cm, cn]));
    }
    check::mat_desc(a.tensor(), "a", batched, false)?;
    check::mat_desc(b.tensor(), "b", batched, false)?;
    check::mat_desc(c, "c", batched, true)?;
    check::no_alias(("c", c), &[("a", a.tensor()), ("b", b.tensor())])?;

    trace_dispatch::<R>(op, dtype, batch, support);
    if batch == 0 {
        return Ok(());
    }

    let buffers = [a.tensor(), b.tensor(), c];
    execute::<R, ()>(op, support, &client, dtype, &buffers, 2, |dtype, bufs| {
        let a_desc = check::mat_desc(bufs[0], "a", batched, false)?;
        let b_desc = check::mat_desc(bufs[1], "b", batched, false)?;
        let c_desc = check::mat_desc(bufs[2], "c", batched, true)?;
        dispatch_float!(dtype, T => {
            client.gemm::<T>(&GemmCall {
                batch,
                trans_a: a.is_transposed(),
                trans_b: b.is_transposed(),
                alpha: cast::<T>(scalars.alpha),
                a: a_desc,
                b: b_desc,
                beta: cast::<T>(scalars.beta),
                c: c_desc,
            })
        }, op.name())
    })
}

pub(crate) fn syrk<R>(
    a: Operand<'_, R>,
    c: &Tensor<R>,
    scalars: Scalars,
    batched: bool,
    stream: Option<&R::Client>,
) -> Result<()>
where
    R: Runtime,
    R::Client: BlasBackend<R>,
{
    let op = Primitive::Syrk;
    let dtype = c.dtype();
    let support = gate::resolve::<R>(op, dtype)?;
    check::dtypes(dtype, scalars.dtype, &[a.tensor(), c])?;
    let client = check::resolve_client::<R>(op.name(), stream, &[a.tensor(), c])?;

    let (batch, n, _k) = check::operand_dims(&a, "a", batched)?;
    let (c_batch, cr, cc) = check::matrix_dims(c, "c", batched)?;
    if batched {
        check::same_batch(batch, c_batch, c.shape())?;
    }
    let cn = check::square(cr, cc)?;
    if cn != n {
        return Err(Error::shape_mismatch(&[n, n], &[cn, cn]));
    }
    check::mat_desc(a.tensor(), "a", batched, false)?;
    check::mat_desc(c, "c", batched, true)?;
    check::no_alias(("c", c), &[("a", a.tensor())])?;

    trace_dispatch::<R>(op, dtype, batch, support);
    if batch == 0 {
        return Ok(());
    }

    let buffers = [a.tensor(), c];
    execute::<R, ()>(op, support, &client, dtype, &buffers, 1, |dtype, bufs| {
        let a_desc = check::mat_desc(bufs[0], "a", batched, false)?;
        let c_desc = check::mat_desc(bufs[1], "c", batched, true)?;
        dispatch_float!(dtype, T => {
            client.syrk::<T>(&SyrkCall {
                batch,
                trans: a.is_transposed(),
                alpha: cast::<T>(scalars.alpha),
                a: a_desc,
                beta: cast::<T>(scalars.beta),
                c: c_desc,
            })
        }, op.name())
    })
}

// ============================================================================
// Triangular solve / multiply
// ============================================================================

/// `lower` and `right` flags of a triangular call
#[derive(Copy, Clone, Debug)]
pub(crate) struct TriFlags {
    pub lower: bool,
    pub right: bool,
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn triangular<R>(
    op: Primitive,
    a: Operand<'_, R>,
    b: &Tensor<R>,
    alpha: f64,
    scalar: Option<DType>,
    flags: TriFlags,
    batched: bool,
    stream: Option<&R::Client>,
) -> Result<()>
where
    R: Runtime,
    R::Client: BlasBackend<R>,
{
    let dtype = b.dtype();
    let support = gate::resolve::<R>(op, dtype)?;
    check::dtypes(dtype, scalar, &[a.tensor(), b])?;
    let client = check::resolve_client::<R>(op.name(), stream, &[a.tensor(), b])?;

    let (batch, ar, ac) = check::matrix_dims(a.tensor(), "a", batched)?;
    let (b_batch, m, n) = check::matrix_dims(b, "b", batched)?;
    if batched {
        check::same_batch(batch, b_batch, b.shape())?;
    }
    let order = check::square(ar, ac)?;
    let want = if flags.right { n } else { m };
    if order != want {
        return Err(Error::shape_mismatch(&[want, want], &[order, order]));
    }
    check::mat_desc(a.tensor(), "a", batched, false)?;
    check::mat_desc(b, "b", batched, true)?;
    check::no_alias(("b", b), &[("a", a.tensor())])?;

    trace_dispatch::<R>(op, dtype, batch, support);
    if batch == 0 {
        return Ok(());
    }

    let buffers = [a.tensor(), b];
    execute::<R, ()>(op, support, &client, dtype, &buffers, 1, |dtype, bufs| {
        let a_desc = check::mat_desc(bufs[0], "a", batched, false)?;
        let b_desc = check::mat_desc(bufs[1], "b", batched, true)?;
        dispatch_float!(dtype, T => {
            let call = TriangularCall {
                batch,
                right: flags.right,
                lower: flags.lower,
                trans: a.is_transposed(),
                alpha: cast::<T>(alpha),
                a: a_desc,
                b: b_desc,
            };
            match op {
                Primitive::Trmm => client.trmm::<T>(&call),
                _ => client.trsm::<T>(&call),
            }
        }, op.name())
    })
}

// ============================================================================
// Cholesky factorization / inversion
// ============================================================================

pub(crate) fn cholesky<R>(
    op: Primitive,
    a: &Tensor<R>,
    lower: bool,
    batched: bool,
    stream: Option<&R::Client>,
) -> Result<()>
where
    R: Runtime,
    R::Client: BlasBackend<R>,
{
    let dtype = a.dtype();
    let support = gate::resolve::<R>(op, dtype)?;
    let client = check::resolve_client::<R>(op.name(), stream, &[a])?;

    let (batch, rows, cols) = check::matrix_dims(a, "a", batched)?;
    check::square(rows, cols)?;
    check::mat_desc(a, "a", batched, true)?;

    trace_dispatch::<R>(op, dtype, batch, support);
    if batch == 0 {
        return Ok(());
    }

    let status = execute::<R, FactorStatus>(op, support, &client, dtype, &[a], 0, |dtype, bufs| {
        let call = CholeskyCall {
            batch,
            lower,
            a: check::mat_desc(bufs[0], "a", batched, true)?,
        };
        dispatch_float!(dtype, T => {
            match op {
                Primitive::Potri => client.potri::<T>(&call),
                _ => client.potrf::<T>(&call),
            }
        }, op.name())
    })?;
    factor_result(op, status, batched)
}

/// Turn backend `info` codes into the numerical-failure errors
fn factor_result(op: Primitive, status: FactorStatus, batched: bool) -> Result<()> {
    let name = op.name();
    match status {
        FactorStatus::PerElement(codes) => {
            if let Some(&bad) = codes.iter().find(|&&code| code < 0) {
                return Err(Error::Backend(format!(
                    "{name}: backend rejected argument {}",
                    -bad
                )));
            }
            let failures: Vec<BatchFailure> = codes
                .iter()
                .enumerate()
                .filter(|&(_, &code)| code > 0)
                .map(|(index, &code)| BatchFailure {
                    index,
                    order: code as usize,
                })
                .collect();
            let Some(first) = failures.first().copied() else {
                return Ok(());
            };
            tracing::debug!(
                op = name,
                failed = failures.len(),
                first_index = first.index,
                first_order = first.order,
                "not positive definite"
            );
            if batched {
                Err(Error::BatchNotPositiveDefinite { op: name, failures })
            } else {
                Err(Error::NotPositiveDefinite {
                    op: name,
                    order: first.order,
                })
            }
        }
        FactorStatus::BatchWide(0) => Ok(()),
        FactorStatus::BatchWide(code) if code < 0 => Err(Error::Backend(format!(
            "{name}: backend rejected argument {}",
            -code
        ))),
        FactorStatus::BatchWide(code) => {
            tracing::debug!(op = name, code, "batch-wide factorization failure");
            if batched {
                Err(Error::BatchFailure { op: name, code })
            } else {
                Err(Error::NotPositiveDefinite {
                    op: name,
                    order: code as usize,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::{linalg_batch_potrf, linalg_gemm, linalg_potrf};
    use crate::runtime::Device;
    use std::alloc::{Layout as AllocLayout, alloc_zeroed, dealloc};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // A host-memory runtime whose backend only counts calls. F64 is native,
    // everything else is refused, and every call needs a stream.
    #[derive(Clone, Debug)]
    struct CountingRuntime;

    #[derive(Clone, Debug)]
    struct CountingDevice(usize);

    impl Device for CountingDevice {
        fn id(&self) -> usize {
            self.0
        }
    }

    #[derive(Clone, Debug)]
    struct CountingClient {
        device: CountingDevice,
        calls: Arc<AtomicUsize>,
        status: FactorStatus,
    }

    impl CountingClient {
        fn new(status: FactorStatus) -> Self {
            Self {
                device: CountingDevice(0),
                calls: Arc::new(AtomicUsize::new(0)),
                status,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn hit(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl RuntimeClient<CountingRuntime> for CountingClient {
        fn device(&self) -> &CountingDevice {
            &self.device
        }

        fn synchronize(&self) -> Result<()> {
            Ok(())
        }
    }

    impl Runtime for CountingRuntime {
        type Device = CountingDevice;
        type Client = CountingClient;

        fn name() -> &'static str {
            "counting"
        }

        fn requires_stream() -> bool {
            true
        }

        fn support(_primitive: Primitive, dtype: DType) -> Support {
            match dtype {
                DType::F64 => Support::Native,
                _ => Support::Unsupported {
                    reason: "only f64 is wired up",
                },
            }
        }

        fn allocate(size_bytes: usize, _device: &CountingDevice) -> Result<u64> {
            if size_bytes == 0 {
                return Ok(0);
            }
            let layout = AllocLayout::from_size_align(size_bytes, 16).unwrap();
            Ok(unsafe { alloc_zeroed(layout) } as u64)
        }

        fn deallocate(ptr: u64, size_bytes: usize, _device: &CountingDevice) {
            if ptr != 0 {
                let layout = AllocLayout::from_size_align(size_bytes, 16).unwrap();
                unsafe { dealloc(ptr as *mut u8, layout) };
            }
        }

        fn copy_to_device(src: &[u8], dst: u64, _device: &CountingDevice) -> Result<()> {
            if !src.is_empty() {
                unsafe { std::ptr::copy_nonoverlapping(src.as_ptr(), dst as *mut u8, src.len()) };
            }
            Ok(())
        }

        fn copy_from_device(src: u64, dst: &mut [u8], _device: &CountingDevice) -> Result<()> {
            if !dst.is_empty() {
                unsafe { std::ptr::copy_nonoverlapping(src as *const u8, dst.as_mut_ptr(), dst.len()) };
            }
            Ok(())
        }

        fn default_device() -> CountingDevice {
            CountingDevice(0)
        }

        fn default_client(_device: &CountingDevice) -> Result<CountingClient> {
            Ok(CountingClient::new(FactorStatus::PerElement(vec![])))
        }
    }

    impl BlasBackend<CountingRuntime> for CountingClient {
        fn gemm<T: LinalgElement>(&self, _call: &GemmCall<T>) -> Result<()> {
            self.hit();
            Ok(())
        }
        fn trsm<T: LinalgElement>(&self, _call: &TriangularCall<T>) -> Result<()> {
            self.hit();
            Ok(())
        }
        fn trmm<T: LinalgElement>(&self, _call: &TriangularCall<T>) -> Result<()> {
            self.hit();
            Ok(())
        }
        fn potrf<T: LinalgElement>(&self, _call: &CholeskyCall) -> Result<FactorStatus> {
            self.hit();
            Ok(self.status.clone())
        }
        fn potri<T: LinalgElement>(&self, _call: &CholeskyCall) -> Result<FactorStatus> {
            self.hit();
            Ok(self.status.clone())
        }
        fn syrk<T: LinalgElement>(&self, _call: &SyrkCall<T>) -> Result<()> {
            self.hit();
            Ok(())
        }
    }

    type T = Tensor<CountingRuntime>;

    fn square<E: crate::dtype::Element>(v: E) -> T {
        T::from_slice(&[v; 4], &[2, 2], &CountingDevice(0))
    }

    #[test]
    fn test_refused_dtype_never_reaches_backend() {
        let client = CountingClient::new(FactorStatus::PerElement(vec![0]));
        let a = square(1i32);
        let b = square(2i32);
        let mut c = square(7i32);

        let err = linalg_gemm(&a, &b, &mut c, 1i32, 0i32, Some(&client)).unwrap_err();
        assert!(err.is_capability(), "{err}");
        assert_eq!(client.calls(), 0);
        assert_eq!(c.to_vec::<i32>(), vec![7; 4]);

        let f = square(1.0f32);
        let mut fc = square(3.0f32);
        let err = linalg_gemm(&f, &f, &mut fc, 1.0f32, 0.0, Some(&client)).unwrap_err();
        assert!(matches!(err, Error::BackendLimitation { backend: "counting", .. }));
        assert_eq!(client.calls(), 0);
    }

    #[test]
    fn test_gate_runs_before_shape_checks() {
        let client = CountingClient::new(FactorStatus::PerElement(vec![0]));
        let a = T::from_slice(&[1i64; 6], &[2, 3], &CountingDevice(0));
        let mut c = square(0i64);
        // Shapes are also wrong; the capability error wins
        let err = linalg_gemm(&a, &a, &mut c, 1i64, 0i64, Some(&client)).unwrap_err();
        assert!(err.is_capability());
    }

    #[test]
    fn test_missing_stream_is_rejected() {
        let a = square(1.0f64);
        let mut c = square(0.0f64);
        let err = linalg_gemm(&a, &a, &mut c, 1.0f64, 0.0, None).unwrap_err();
        assert!(matches!(err, Error::StreamRequired { op: "gemm", .. }));
    }

    #[test]
    fn test_stream_on_other_device_is_rejected() {
        let mut client = CountingClient::new(FactorStatus::PerElement(vec![0]));
        client.device = CountingDevice(3);
        let a = square(1.0f64);
        let mut c = square(0.0f64);
        let err = linalg_gemm(&a, &a, &mut c, 1.0f64, 0.0, Some(&client)).unwrap_err();
        assert!(matches!(err, Error::DeviceMismatch));
        assert_eq!(client.calls(), 0);
    }

    #[test]
    fn test_supported_call_is_issued_once() {
        let client = CountingClient::new(FactorStatus::PerElement(vec![0]));
        let a = square(1.0f64);
        let mut c = square(0.0f64);
        linalg_gemm(&a, &a, &mut c, 1.0f64, 0.0, Some(&client)).unwrap();
        assert_eq!(client.calls(), 1);
    }

    #[test]
    fn test_batch_wide_status_is_unattributed() {
        let client = CountingClient::new(FactorStatus::BatchWide(2));
        let mut a = T::from_slice(&[1.0f64; 12], &[3, 2, 2], &CountingDevice(0));
        let err = linalg_batch_potrf(&mut a, true, Some(&client)).unwrap_err();
        assert!(matches!(err, Error::BatchFailure { op: "potrf", code: 2 }));
        assert!(err.is_numerical());
        assert!(err.batch_failures().is_none());

        let mut single = square(1.0f64);
        let err = linalg_potrf(&mut single, true, Some(&client)).unwrap_err();
        assert!(matches!(err, Error::NotPositiveDefinite { order: 2, .. }));
    }

    #[test]
    fn test_per_element_status_is_attributed() {
        let err = factor_result(
            Primitive::Potrf,
            FactorStatus::PerElement(vec![0, 3, 0, 1]),
            true,
        )
        .unwrap_err();
        assert_eq!(
            err.batch_failures(),
            Some(
                &[
                    BatchFailure { index: 1, order: 3 },
                    BatchFailure { index: 3, order: 1 }
                ][..]
            )
        );
        assert!(factor_result(Primitive::Potri, FactorStatus::PerElement(vec![0, 0]), true).is_ok());
        assert!(matches!(
            factor_result(Primitive::Potri, FactorStatus::PerElement(vec![-4]), false),
            Err(Error::Backend(_))
        ));
    }
}
