//! Orientation marker: a borrowed operand tagged as logically transposed

use crate::runtime::Runtime;
use crate::tensor::Tensor;

/// Input operand of a dispatch call, optionally marked transposed
///
/// Wrapping is free: nothing is copied and the buffer is not touched. The
/// flag is handed to the backend, which reads the stored matrix as its
/// transpose. For batch buffers each slice is transposed; the batch axis is
/// never moved.
///
/// Plain `&Tensor` converts into an untransposed operand, so every entry
/// point taking `impl Into<Operand>` accepts both forms:
///
/// ```
/// use linalg_dispatch::prelude::*;
///
/// let device = CpuDevice::new();
/// let a = Tensor::<CpuRuntime>::from_slice(&[1.0f64, 2.0, 3.0, 4.0], &[2, 2], &device);
/// let b = Tensor::<CpuRuntime>::from_slice(&[1.0f64, 0.0, 0.0, 1.0], &[2, 2], &device);
/// let mut c = Tensor::<CpuRuntime>::zeros(&[2, 2], DType::F64, &device);
///
/// linalg_gemm(transpose(&a), &b, &mut c, 1.0f64, 0.0, None)?;
/// assert_eq!(c.to_vec::<f64>(), vec![1.0, 3.0, 2.0, 4.0]);
/// # Ok::<(), linalg_dispatch::error::Error>(())
/// ```
#[derive(Debug)]
pub struct Operand<'a, R: Runtime> {
    tensor: &'a Tensor<R>,
    transposed: bool,
}

impl<'a, R: Runtime> Operand<'a, R> {
    /// Wrap a buffer with an explicit orientation
    #[inline]
    pub fn new(tensor: &'a Tensor<R>, transposed: bool) -> Self {
        Self { tensor, transposed }
    }

    /// Borrowed buffer
    #[inline]
    pub fn tensor(&self) -> &'a Tensor<R> {
        self.tensor
    }

    /// True if the operand is read as its transpose
    #[inline]
    pub fn is_transposed(&self) -> bool {
        self.transposed
    }

    /// Logical `(rows, cols)` of one matrix after applying the orientation
    ///
    /// `None` if the buffer has fewer than two dimensions.
    pub fn logical_dims(&self) -> Option<(usize, usize)> {
        let shape = self.tensor.shape();
        let n = shape.len();
        if n < 2 {
            return None;
        }
        let (r, c) = (shape[n - 2], shape[n - 1]);
        Some(if self.transposed { (c, r) } else { (r, c) })
    }
}

impl<R: Runtime> Clone for Operand<'_, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<R: Runtime> Copy for Operand<'_, R> {}

impl<'a, R: Runtime> From<&'a Tensor<R>> for Operand<'a, R> {
    #[inline]
    fn from(tensor: &'a Tensor<R>) -> Self {
        Self::new(tensor, false)
    }
}

/// Mark `tensor` as logically transposed
#[inline]
pub fn transpose<R: Runtime>(tensor: &Tensor<R>) -> Operand<'_, R> {
    Operand::new(tensor, true)
}
