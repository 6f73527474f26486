//! Layout: shape, strides, and offset for buffer memory layout

use smallvec::SmallVec;
use std::fmt;

/// Stack allocation threshold for dimensions
/// Matrix and batch buffers have at most 3 dimensions
const STACK_DIMS: usize = 4;

/// Shape type: dimensions of a buffer
pub type Shape = SmallVec<[usize; STACK_DIMS]>;

/// Strides type: element offsets between consecutive elements along each dimension
/// NOTE: Strides are in ELEMENTS, not bytes
pub type Strides = SmallVec<[isize; STACK_DIMS]>;

/// Layout describes the memory layout of a buffer
///
/// Address of element at indices [i0, i1, ..., in]:
///   offset + i0 * strides[0] + i1 * strides[1] + ... + in * strides[n]
#[derive(Clone, PartialEq, Eq)]
pub struct Layout {
    /// Shape: size along each dimension
    shape: Shape,
    /// Strides: offset (in elements) between consecutive elements along each dimension
    strides: Strides,
    /// Offset: starting element index in the underlying storage
    offset: usize,
}

impl Layout {
    /// Create a new contiguous (row-major/C-order) layout from a shape
    ///
    /// # Example
    /// ```
    /// use linalg_dispatch::tensor::Layout;
    /// let layout = Layout::contiguous(&[2, 3, 4]);
    /// assert_eq!(layout.shape(), &[2, 3, 4]);
    /// assert_eq!(layout.strides(), &[12, 4, 1]);
    /// ```
    pub fn contiguous(shape: &[usize]) -> Self {
        let shape: Shape = shape.iter().copied().collect();
        let strides = Self::compute_contiguous_strides(&shape);
        Self {
            shape,
            strides,
            offset: 0,
        }
    }

    /// Create a layout with explicit shape, strides, and offset
    pub fn new(shape: Shape, strides: Strides, offset: usize) -> Self {
        debug_assert_eq!(shape.len(), strides.len());
        Self {
            shape,
            strides,
            offset,
        }
    }

    /// Compute contiguous strides for a given shape (row-major order)
    fn compute_contiguous_strides(shape: &[usize]) -> Strides {
        let mut strides: Strides = SmallVec::with_capacity(shape.len());
        let mut stride = 1isize;

        for &dim in shape.iter().rev() {
            strides.push(stride);
            stride *= dim as isize;
        }

        strides.reverse();
        strides
    }

    /// Get the shape
    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Get the strides
    #[inline]
    pub fn strides(&self) -> &[isize] {
        &self.strides
    }

    /// Get the offset
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of dimensions (rank)
    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements
    #[inline]
    pub fn elem_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Check if memory is contiguous (row-major order) starting at offset 0
    pub fn is_contiguous(&self) -> bool {
        let expected = Self::compute_contiguous_strides(&self.shape);
        self.strides == expected && self.offset == 0
    }

    /// Normalize a dimension index (handle negative indices)
    pub fn normalize_dim(&self, d: isize) -> Option<usize> {
        let ndim = self.ndim() as isize;
        let idx = if d < 0 { ndim + d } else { d };
        if idx >= 0 && idx < ndim {
            Some(idx as usize)
        } else {
            None
        }
    }

    /// Compute the linear index (element offset) for given indices
    pub fn index(&self, indices: &[usize]) -> Option<usize> {
        if indices.len() != self.ndim() {
            return None;
        }

        for (idx, &dim) in indices.iter().zip(self.shape.iter()) {
            if *idx >= dim {
                return None;
            }
        }

        let mut linear = self.offset as isize;
        for (&idx, &stride) in indices.iter().zip(self.strides.iter()) {
            linear += idx as isize * stride;
        }

        Some(linear as usize)
    }

    /// Storage element range `[start, end)` touched by this view
    ///
    /// Returns `None` for empty views. `start` is negative when a negative
    /// stride reaches before the storage origin.
    pub fn span(&self) -> Option<(isize, isize)> {
        if self.elem_count() == 0 {
            return None;
        }
        let mut first = self.offset as isize;
        let mut last = first;
        for (&dim, &stride) in self.shape.iter().zip(self.strides.iter()) {
            let reach = (dim as isize - 1) * stride;
            first += reach.min(0);
            last += reach.max(0);
        }
        Some((first, last + 1))
    }

    /// Storage element ranges `[start, end)` of every innermost row
    ///
    /// Exact for a unit-stride last dimension; otherwise each range is the
    /// row's hull. Empty views have no rows.
    pub fn row_spans(&self) -> Vec<(isize, isize)> {
        if self.elem_count() == 0 {
            return Vec::new();
        }
        let offset = self.offset as isize;
        let (Some((&len, outer)), Some((&stride, outer_strides))) =
            (self.shape.split_last(), self.strides.split_last())
        else {
            return vec![(offset, offset + 1)];
        };
        let reach = (len as isize - 1) * stride;
        let (lo, hi) = (reach.min(0), reach.max(0) + 1);

        let rows: usize = outer.iter().product();
        let mut index = vec![0usize; outer.len()];
        let mut spans = Vec::with_capacity(rows);
        for _ in 0..rows {
            let base = index
                .iter()
                .zip(outer_strides)
                .fold(offset, |acc, (&i, &s)| acc + i as isize * s);
            spans.push((base + lo, base + hi));
            for d in (0..outer.len()).rev() {
                index[d] += 1;
                if index[d] < outer[d] {
                    break;
                }
                index[d] = 0;
            }
        }
        spans
    }

    /// Create a transposed layout (swap two dimensions)
    pub fn transpose(&self, dim0: isize, dim1: isize) -> Option<Self> {
        let d0 = self.normalize_dim(dim0)?;
        let d1 = self.normalize_dim(dim1)?;

        let mut new_shape = self.shape.clone();
        let mut new_strides = self.strides.clone();

        new_shape.swap(d0, d1);
        new_strides.swap(d0, d1);

        Some(Self {
            shape: new_shape,
            strides: new_strides,
            offset: self.offset,
        })
    }

    /// Narrow one dimension to `[start, start + length)` (zero-copy)
    pub fn narrow(&self, dim: isize, start: usize, length: usize) -> Option<Self> {
        let d = self.normalize_dim(dim)?;
        if start.checked_add(length)? > self.shape[d] {
            return None;
        }

        let mut new_shape = self.shape.clone();
        new_shape[d] = length;
        let offset = self.offset as isize + start as isize * self.strides[d];
        if offset < 0 {
            return None;
        }

        Some(Self {
            shape: new_shape,
            strides: self.strides.clone(),
            offset: offset as usize,
        })
    }

    /// Drop the leading dimension at position `index` (zero-copy batch slice)
    pub fn select_first(&self, index: usize) -> Option<Self> {
        if self.ndim() == 0 || index >= self.shape[0] {
            return None;
        }
        let offset = self.offset as isize + index as isize * self.strides[0];
        Some(Self {
            shape: self.shape[1..].iter().copied().collect(),
            strides: self.strides[1..].iter().copied().collect(),
            offset: offset as usize,
        })
    }
}

impl fmt::Debug for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Layout {{ shape: {:?}, strides: {:?}, offset: {} }}",
            self.shape.as_slice(),
            self.strides.as_slice(),
            self.offset
        )
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.shape.as_slice())
    }
}
