//! Operand validation and lowering to backend descriptors
//!
//! Everything here runs before any backend call, so a request that fails a
//! check leaves every buffer untouched.

use super::backend::MatDesc;
use super::orientation::Operand;
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::runtime::{Device, Runtime, RuntimeClient};
use crate::tensor::Tensor;
use std::borrow::Cow;

/// `(batch, rows, cols)` of a matrix (`batched == false`) or batch buffer
pub(crate) fn matrix_dims<R: Runtime>(
    t: &Tensor<R>,
    arg: &'static str,
    batched: bool,
) -> Result<(usize, usize, usize)> {
    let shape = t.shape();
    let dims = match (batched, shape) {
        (false, &[r, c]) => (1, r, c),
        (true, &[b, r, c]) => (b, r, c),
        _ => {
            let want = if batched {
                "rank-3 batch [batch, rows, cols]"
            } else {
                "rank-2 matrix [rows, cols]"
            };
            return Err(Error::invalid_argument(
                arg,
                format!("expected {want}, got shape {shape:?}"),
            ));
        }
    };
    if dims.1 == 0 || dims.2 == 0 {
        return Err(Error::invalid_argument(
            arg,
            format!("matrix dimensions must be positive, got shape {shape:?}"),
        ));
    }
    Ok(dims)
}

/// Logical `(batch, rows, cols)` of an operand after its orientation
pub(crate) fn operand_dims<R: Runtime>(
    op: &Operand<'_, R>,
    arg: &'static str,
    batched: bool,
) -> Result<(usize, usize, usize)> {
    let (b, r, c) = matrix_dims(op.tensor(), arg, batched)?;
    Ok(if op.is_transposed() { (b, c, r) } else { (b, r, c) })
}

/// Every batched operand must carry the same number of matrices
pub(crate) fn same_batch(expected: usize, got: usize, shape: &[usize]) -> Result<()> {
    if expected != got {
        let mut want = shape.to_vec();
        want[0] = expected;
        return Err(Error::shape_mismatch(&want, shape));
    }
    Ok(())
}

/// Square `n x n` check; returns `n`
pub(crate) fn square(rows: usize, cols: usize) -> Result<usize> {
    if rows != cols {
        return Err(Error::shape_mismatch(&[rows, rows], &[rows, cols]));
    }
    Ok(rows)
}

/// Every operand has the primitive's dtype, and so do the scalars
pub(crate) fn dtypes<R: Runtime>(
    dtype: DType,
    scalar: Option<DType>,
    operands: &[&Tensor<R>],
) -> Result<()> {
    for t in operands {
        if t.dtype() != dtype {
            return Err(Error::DTypeMismatch {
                lhs: dtype,
                rhs: t.dtype(),
            });
        }
    }
    match scalar {
        Some(s) if s != dtype => Err(Error::DTypeMismatch { lhs: dtype, rhs: s }),
        _ => Ok(()),
    }
}

/// Pick the client that executes the call
///
/// An explicit stream must live on the operands' device. Without one, the
/// runtime's default client is used unless the runtime requires a stream.
pub(crate) fn resolve_client<'s, R: Runtime>(
    op: &'static str,
    stream: Option<&'s R::Client>,
    operands: &[&Tensor<R>],
) -> Result<Cow<'s, R::Client>> {
    let Some(first) = operands.first() else {
        return Err(Error::Internal(format!("{op}: no operands")));
    };
    let device = first.device();
    if operands.iter().any(|t| !t.device().is_same(device)) {
        return Err(Error::DeviceMismatch);
    }

    match stream {
        Some(client) => {
            if !client.device().is_same(device) {
                return Err(Error::DeviceMismatch);
            }
            Ok(Cow::Borrowed(client))
        }
        None if R::requires_stream() => Err(Error::StreamRequired {
            backend: R::name(),
            op,
        }),
        None => Ok(Cow::Owned(R::default_client(device)?)),
    }
}

/// Lower a validated buffer to a descriptor
///
/// Columns must be unit-stride; rows and batch elements may be strided. A
/// batched output must not reuse memory across batch elements.
pub(crate) fn mat_desc<R: Runtime>(
    t: &Tensor<R>,
    arg: &'static str,
    batched: bool,
    output: bool,
) -> Result<MatDesc> {
    let (batch, rows, cols) = matrix_dims(t, arg, batched)?;
    let strides = t.strides();
    let n = strides.len();
    let (row_stride, col_stride) = (strides[n - 2], strides[n - 1]);
    let batch_stride = if batched { strides[0] } else { 0 };

    let not_blas = || Error::NotContiguous {
        arg,
        strides: strides.to_vec(),
    };

    if col_stride != 1 && cols > 1 {
        return Err(not_blas());
    }
    if row_stride < 0 || batch_stride < 0 {
        return Err(not_blas());
    }
    let ld = if rows > 1 {
        row_stride as usize
    } else {
        (row_stride as usize).max(cols)
    };
    if ld < cols {
        return Err(not_blas());
    }

    let batch_stride = batch_stride as usize;
    let matrix_span = (rows - 1) * ld + cols;
    if output && batch > 1 && batch_stride < matrix_span {
        return Err(Error::invalid_argument(
            arg,
            format!(
                "batch elements overlap in memory (batch stride {batch_stride} < matrix span {matrix_span})"
            ),
        ));
    }

    Ok(MatDesc {
        ptr: t.data_ptr(),
        rows,
        cols,
        ld,
        batch_stride,
    })
}

/// Reject an output whose memory overlaps any input's
///
/// In-place operands (B of trsm/trmm, A of potrf/potri) are outputs and
/// are not listed as inputs. Views of one buffer that interleave without
/// sharing an element, such as two column blocks, do not overlap.
pub(crate) fn no_alias<R: Runtime>(
    output: (&'static str, &Tensor<R>),
    inputs: &[(&'static str, &Tensor<R>)],
) -> Result<()> {
    let (out_name, out) = output;
    for &(name, t) in inputs {
        if views_overlap(out, t) {
            return Err(Error::invalid_argument(
                out_name,
                format!("output memory overlaps input '{name}'"),
            ));
        }
    }
    Ok(())
}

/// True when two views share at least one byte of device memory
fn views_overlap<R: Runtime>(x: &Tensor<R>, y: &Tensor<R>) -> bool {
    let (Some((xs, xe)), Some((ys, ye))) = (x.byte_span(), y.byte_span()) else {
        return false;
    };
    if xe <= ys || ye <= xs {
        return false;
    }

    let mut xr = x.row_byte_spans();
    let mut yr = y.row_byte_spans();
    xr.sort_unstable();
    yr.sort_unstable();

    // Both lists sorted by start: the range that ends first cannot meet
    // anything later in the other list
    let (mut i, mut j) = (0, 0);
    while i < xr.len() && j < yr.len() {
        let ((xs, xe), (ys, ye)) = (xr[i], yr[j]);
        if xs < ye && ys < xe {
            return true;
        }
        if xe <= ye {
            i += 1;
        } else {
            j += 1;
        }
    }
    false
}
