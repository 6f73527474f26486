//! Core Tensor type

use super::{Layout, Storage};
use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::runtime::Runtime;
use std::fmt;

/// Shaped buffer on a compute device
///
/// A `Tensor` is reference-counted [`Storage`] plus a [`Layout`] (shape,
/// strides in elements, offset). The dispatch functions in
/// [`crate::linalg`] borrow tensors for the duration of one call: inputs by
/// shared reference, outputs by `&mut`, and never take ownership.
///
/// Views created by [`Tensor::transpose`], [`Tensor::narrow`], and
/// [`Tensor::select`] share storage with their parent. Writing through a
/// view is visible in the parent.
///
/// # Example
///
/// ```
/// use linalg_dispatch::prelude::*;
///
/// let device = CpuDevice::new();
/// let a = Tensor::<CpuRuntime>::from_slice(&[1.0f32, 2.0, 3.0, 4.0], &[2, 2], &device);
/// let at = a.transpose(-1, -2).unwrap();
/// assert_eq!(at.to_vec::<f32>(), vec![1.0, 3.0, 2.0, 4.0]);
/// ```
pub struct Tensor<R: Runtime> {
    storage: Storage<R>,
    layout: Layout,
}

impl<R: Runtime> Tensor<R> {
    /// Create a tensor from storage and layout
    ///
    /// Returns an error if the layout addresses elements before the start
    /// or past the end of the storage.
    pub fn from_parts(storage: Storage<R>, layout: Layout) -> Result<Self> {
        if layout.shape().len() != layout.strides().len() {
            return Err(Error::invalid_argument(
                "layout",
                format!("{layout:?} has mismatched shape and strides"),
            ));
        }
        if let Some((start, end)) = layout.span() {
            if start < 0 || end as usize > storage.len() {
                return Err(Error::invalid_argument(
                    "layout",
                    format!(
                        "view {layout:?} addresses elements [{start}, {end}) of a {}-element storage",
                        storage.len()
                    ),
                ));
            }
        }
        Ok(Self { storage, layout })
    }

    /// Create a tensor from a slice of data
    ///
    /// # Panics
    ///
    /// Panics if `data.len()` does not equal the product of the `shape` dimensions.
    /// For a fallible alternative, use [`Self::try_from_slice`].
    pub fn from_slice<T: Element>(data: &[T], shape: &[usize], device: &R::Device) -> Self {
        Self::try_from_slice(data, shape, device).expect("Tensor::from_slice failed")
    }

    /// Create a tensor from a slice of data (fallible version)
    pub fn try_from_slice<T: Element>(
        data: &[T],
        shape: &[usize],
        device: &R::Device,
    ) -> Result<Self> {
        let expected_len: usize = shape.iter().product();
        if data.len() != expected_len {
            return Err(Error::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![data.len()],
            });
        }

        Ok(Self {
            storage: Storage::from_slice(data, device)?,
            layout: Layout::contiguous(shape),
        })
    }

    /// Create a contiguous tensor from raw little-endian element bytes
    pub fn from_bytes(
        data: &[u8],
        dtype: DType,
        shape: &[usize],
        device: &R::Device,
    ) -> Result<Self> {
        let expected_len: usize = shape.iter().product::<usize>() * dtype.size_in_bytes();
        if data.len() != expected_len {
            return Err(Error::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![data.len() / dtype.size_in_bytes()],
            });
        }

        Ok(Self {
            storage: Storage::from_bytes(data, dtype, device)?,
            layout: Layout::contiguous(shape),
        })
    }

    /// Create a tensor filled with zeros
    ///
    /// # Panics
    ///
    /// Panics if allocation fails. See [`Self::try_zeros`].
    pub fn zeros(shape: &[usize], dtype: DType, device: &R::Device) -> Self {
        Self::try_zeros(shape, dtype, device).expect("Tensor::zeros failed")
    }

    /// Create a tensor filled with zeros (fallible version)
    pub fn try_zeros(shape: &[usize], dtype: DType, device: &R::Device) -> Result<Self> {
        let len: usize = shape.iter().product();
        // All supported dtypes encode zero as all-zero bytes
        let bytes = vec![0u8; len * dtype.size_in_bytes()];
        Ok(Self {
            storage: Storage::from_bytes(&bytes, dtype, device)?,
            layout: Layout::contiguous(shape),
        })
    }

    // ===== Accessors =====

    /// Shape of the view
    #[inline]
    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    /// Strides of the view, in elements
    #[inline]
    pub fn strides(&self) -> &[isize] {
        self.layout.strides()
    }

    /// Number of dimensions
    #[inline]
    pub fn ndim(&self) -> usize {
        self.layout.ndim()
    }

    /// Number of elements in the view
    #[inline]
    pub fn numel(&self) -> usize {
        self.layout.elem_count()
    }

    /// Element type
    #[inline]
    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    /// Device holding the data
    #[inline]
    pub fn device(&self) -> &R::Device {
        self.storage.device()
    }

    /// Layout of the view
    #[inline]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Backing storage
    #[inline]
    pub fn storage(&self) -> &Storage<R> {
        &self.storage
    }

    /// Element offset of the view into its storage
    #[inline]
    pub fn offset(&self) -> usize {
        self.layout.offset()
    }

    /// Device address of the first element of the view
    #[inline]
    pub fn data_ptr(&self) -> u64 {
        self.storage.ptr() + (self.layout.offset() * self.dtype().size_in_bytes()) as u64
    }

    /// Device byte range `[start, end)` the view can touch, `None` if empty
    pub fn byte_span(&self) -> Option<(u64, u64)> {
        let elem = self.dtype().size_in_bytes() as u64;
        self.layout.span().map(|(start, end)| {
            let base = self.storage.ptr();
            (base + start as u64 * elem, base + end as u64 * elem)
        })
    }

    /// Device byte ranges `[start, end)` of every innermost row of the view
    pub fn row_byte_spans(&self) -> Vec<(u64, u64)> {
        let elem = self.dtype().size_in_bytes() as u64;
        let base = self.storage.ptr();
        self.layout
            .row_spans()
            .into_iter()
            .map(|(start, end)| (base + start as u64 * elem, base + end as u64 * elem))
            .collect()
    }

    /// Check if the view is dense row-major from storage element 0
    #[inline]
    pub fn is_contiguous(&self) -> bool {
        self.layout.is_contiguous()
    }

    // ===== Views =====

    /// Swap two dimensions (zero-copy)
    pub fn transpose(&self, dim0: isize, dim1: isize) -> Result<Self> {
        let layout = self.layout.transpose(dim0, dim1).ok_or_else(|| {
            Error::invalid_argument(
                "dim",
                format!(
                    "cannot transpose dims ({dim0}, {dim1}) of a rank-{} tensor",
                    self.ndim()
                ),
            )
        })?;
        Ok(self.view(layout))
    }

    /// Restrict one dimension to `[start, start + length)` (zero-copy)
    pub fn narrow(&self, dim: isize, start: usize, length: usize) -> Result<Self> {
        let layout = self.layout.narrow(dim, start, length).ok_or_else(|| {
            Error::invalid_argument(
                "dim",
                format!(
                    "narrow({dim}, {start}, {length}) out of range for shape {:?}",
                    self.shape()
                ),
            )
        })?;
        Ok(self.view(layout))
    }

    /// Take element `index` along the leading dimension (zero-copy)
    ///
    /// For a batch buffer `[batch, rows, cols]` this is the matrix slice at
    /// position `index`.
    pub fn select(&self, index: usize) -> Result<Self> {
        let layout = self.layout.select_first(index).ok_or_else(|| {
            Error::invalid_argument(
                "index",
                format!("index {index} out of range for shape {:?}", self.shape()),
            )
        })?;
        Ok(self.view(layout))
    }

    fn view(&self, layout: Layout) -> Self {
        Self {
            storage: self.storage.clone(),
            layout,
        }
    }

    // ===== Host transfer =====

    /// Copy the view to the host in logical row-major order
    ///
    /// # Panics
    ///
    /// Panics if `T` does not match the tensor dtype or the device copy
    /// fails. See [`Self::try_to_vec`].
    pub fn to_vec<T: Element>(&self) -> Vec<T> {
        self.try_to_vec().expect("Tensor::to_vec failed")
    }

    /// Copy the view to the host in logical row-major order (fallible version)
    pub fn try_to_vec<T: Element>(&self) -> Result<Vec<T>> {
        let all = self.storage.to_vec::<T>()?;
        if self.layout.is_contiguous() && all.len() == self.numel() {
            return Ok(all);
        }
        Ok(self.element_offsets().map(|i| all[i]).collect())
    }

    /// Overwrite the view's elements from host data in logical row-major order
    ///
    /// Storage outside the view is left unchanged.
    pub fn write_from_slice<T: Element>(&self, data: &[T]) -> Result<()> {
        if data.len() != self.numel() {
            return Err(Error::shape_mismatch(self.shape(), &[data.len()]));
        }
        let mut all = self.storage.to_vec::<T>()?;
        for (i, &v) in self.element_offsets().zip(data) {
            all[i] = v;
        }
        self.storage.write_bytes(bytemuck::cast_slice(&all))
    }

    /// Storage element index of every element, in logical row-major order
    fn element_offsets(&self) -> impl Iterator<Item = usize> + '_ {
        let shape = self.shape();
        let strides = self.strides();
        let offset = self.layout.offset() as isize;
        let mut index = vec![0usize; shape.len()];
        let mut remaining = self.numel();

        std::iter::from_fn(move || {
            if remaining == 0 {
                return None;
            }
            remaining -= 1;
            let linear = index
                .iter()
                .zip(strides)
                .fold(offset, |acc, (&i, &s)| acc + i as isize * s);
            for d in (0..shape.len()).rev() {
                index[d] += 1;
                if index[d] < shape[d] {
                    break;
                }
                index[d] = 0;
            }
            Some(linear as usize)
        })
    }
}

impl<R: Runtime> Clone for Tensor<R> {
    /// Clone shares storage (zero-copy)
    fn clone(&self) -> Self {
        self.view(self.layout.clone())
    }
}

impl<R: Runtime> fmt::Debug for Tensor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape())
            .field("strides", &self.strides())
            .field("dtype", &self.dtype())
            .field("runtime", &R::name())
            .finish()
    }
}

#[cfg(all(test, feature = "cpu"))]
mod tests {
    use super::*;
    use crate::runtime::cpu::{CpuDevice, CpuRuntime};

    fn device() -> CpuDevice {
        CpuDevice::new()
    }

    #[test]
    fn test_try_from_slice_rejects_wrong_length() {
        let err = Tensor::<CpuRuntime>::try_from_slice(&[1.0f32, 2.0, 3.0], &[2, 2], &device())
            .unwrap_err();
        assert!(err.is_shape());
    }

    #[test]
    fn test_transpose_to_vec_gathers() {
        let t = Tensor::<CpuRuntime>::from_slice(&[1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3], &device());
        let tt = t.transpose(0, 1).unwrap();
        assert_eq!(tt.shape(), &[3, 2]);
        assert_eq!(tt.to_vec::<f64>(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_narrow_view_writes_through() {
        let t = Tensor::<CpuRuntime>::zeros(&[3, 3], DType::F32, &device());
        let inner = t.narrow(0, 1, 2).unwrap().narrow(1, 1, 2).unwrap();
        inner.write_from_slice(&[1.0f32, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(
            t.to_vec::<f32>(),
            vec![0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 0.0, 3.0, 4.0]
        );
    }

    #[test]
    fn test_select_batch_slice() {
        let data: Vec<f32> = (0..8).map(|v| v as f32).collect();
        let t = Tensor::<CpuRuntime>::from_slice(&data, &[2, 2, 2], &device());
        assert_eq!(t.select(1).unwrap().to_vec::<f32>(), vec![4.0, 5.0, 6.0, 7.0]);
        assert!(t.select(2).is_err());
    }

    #[test]
    fn test_byte_span_of_views_overlap() {
        let t = Tensor::<CpuRuntime>::zeros(&[4, 4], DType::F64, &device());
        let top = t.narrow(0, 0, 2).unwrap();
        let bottom = t.narrow(0, 2, 2).unwrap();
        let (ts, te) = top.byte_span().unwrap();
        let (bs, be) = bottom.byte_span().unwrap();
        assert_eq!(te - ts, 2 * 4 * 8);
        assert!(te <= bs && be > bs);
    }

    #[test]
    fn test_from_parts_checks_both_ends_of_storage() {
        use crate::tensor::{Shape, Strides};

        let storage = Storage::<CpuRuntime>::from_slice(&[1.0f64, 2.0, 3.0, 4.0], &device()).unwrap();
        let reversed_rows = |offset| {
            Layout::new(Shape::from_slice(&[2, 2]), Strides::from_slice(&[-2, 1]), offset)
        };

        let err = Tensor::from_parts(storage.clone(), reversed_rows(0)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { arg: "layout", .. }), "{err}");

        let flipped = Tensor::from_parts(storage.clone(), reversed_rows(2)).unwrap();
        assert_eq!(flipped.try_to_vec::<f64>().unwrap(), vec![3.0, 4.0, 1.0, 2.0]);

        let past_end = Layout::new(Shape::from_slice(&[2, 3]), Strides::from_slice(&[3, 1]), 0);
        assert!(Tensor::from_parts(storage, past_end).is_err());
    }

    #[test]
    fn test_to_vec_dtype_mismatch() {
        let t = Tensor::<CpuRuntime>::from_slice(&[1i32, 2], &[2], &device());
        assert!(t.try_to_vec::<f32>().is_err());
    }
}
