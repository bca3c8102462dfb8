use crate::error::{Error, Result};
use crate::shape::Shape;

// Layout — shape, strides and offset of a view
//
// Position of logical index i in storage:
//
//   offset + Σ_k i[k] * strides[k]
//
//   contiguous [2, 3]      strides [3, 1]
//   transposed [3, 2]      strides [1, 3]    (reversed, no copy)
//   expanded   [1, 3]→[4, 3]  strides [0, 1] (stride 0 repeats the row)
//   narrowed   axis 1 from 2  offset += 2 * strides[1]
//
// Strides are unsigned: views only walk storage forwards.

/// Mapping from a view's logical indices to storage positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    shape: Shape,
    strides: Vec<usize>,
    /// Storage position of the first logical element.
    offset: usize,
}

impl Layout {
    /// Row-major layout starting at position 0.
    pub fn contiguous(shape: Shape) -> Self {
        Layout {
            strides: shape.stride_contiguous(),
            shape,
            offset: 0,
        }
    }

    pub fn new(shape: Shape, strides: Vec<usize>, offset: usize) -> Self {
        debug_assert_eq!(shape.rank(), strides.len());
        Layout {
            shape,
            strides,
            offset,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn elem_count(&self) -> usize {
        self.shape.elem_count()
    }

    /// Check if this layout is contiguous (row-major, no gaps, offset 0).
    /// Size-1 axes are ignored since their stride is never used.
    pub fn is_contiguous(&self) -> bool {
        if self.offset != 0 {
            return false;
        }
        let expected = self.shape.stride_contiguous();
        self.dims()
            .iter()
            .zip(self.strides.iter().zip(expected.iter()))
            .all(|(&d, (&s, &e))| d == 1 || s == e)
    }

    /// Whether several logical elements share one storage position through
    /// a stride-0 axis of size > 1 (an `expand`ed or broadcast view).
    pub fn has_repeated_positions(&self) -> bool {
        self.dims()
            .iter()
            .zip(&self.strides)
            .any(|(&d, &s)| d > 1 && s == 0)
    }

    /// Largest storage position addressed by this layout, plus one.
    /// Zero for empty views.
    pub fn storage_extent(&self) -> usize {
        if self.elem_count() == 0 {
            return 0;
        }
        self.offset
            + self
                .dims()
                .iter()
                .zip(self.strides.iter())
                .map(|(&d, &s)| (d - 1) * s)
                .sum::<usize>()
            + 1
    }

    /// Reverse the order of all axes.
    ///
    /// Example: [2, 3, 4] strides [12, 4, 1] → [4, 3, 2] strides [1, 4, 12]
    pub fn transpose(&self) -> Layout {
        let mut dims = self.dims().to_vec();
        let mut strides = self.strides.clone();
        dims.reverse();
        strides.reverse();
        Layout::new(Shape::new(dims), strides, self.offset)
    }

    pub fn swap_axes(&self, a: usize, b: usize) -> Result<Layout> {
        self.shape.check_axis(a)?;
        self.shape.check_axis(b)?;
        let mut perm: Vec<usize> = (0..self.rank()).collect();
        perm.swap(a, b);
        self.permute(&perm)
    }

    /// Reorder axes: axis `i` of the result is axis `perm[i]` of `self`.
    pub fn permute(&self, perm: &[usize]) -> Result<Layout> {
        let rank = self.rank();
        if perm.len() != rank {
            return Err(Error::msg(format!(
                "permute: expected {} axes, got {:?}",
                rank, perm
            )));
        }
        let mut seen = vec![false; rank];
        for &p in perm {
            if p >= rank {
                return Err(Error::DimOutOfRange { dim: p, rank });
            }
            if seen[p] {
                return Err(Error::msg(format!("permute: axis {} repeated in {:?}", p, perm)));
            }
            seen[p] = true;
        }
        let dims = perm.iter().map(|&p| self.dims()[p]).collect();
        let strides = perm.iter().map(|&p| self.strides[p]).collect();
        Ok(Layout::new(Shape::new(dims), strides, self.offset))
    }

    /// Keep positions `start..start + len` of `axis`.
    pub fn narrow(&self, axis: usize, start: usize, len: usize) -> Result<Layout> {
        let dim_size = self.shape.dim(axis)?;
        if start.checked_add(len).map_or(true, |end| end > dim_size) {
            return Err(Error::NarrowOutOfBounds {
                dim: axis,
                start,
                len,
                dim_size,
            });
        }
        let mut dims = self.dims().to_vec();
        dims[axis] = len;
        let offset = self.offset + start * self.strides[axis];
        Ok(Layout::new(Shape::new(dims), self.strides.clone(), offset))
    }

    /// Insert a new axis of size 1 at position `axis` (0..=rank).
    pub fn stretch(&self, axis: usize) -> Result<Layout> {
        let shape = self.shape.insert_axis(axis, 1)?;
        let mut strides = self.strides.clone();
        // any stride works for a size-1 axis; reuse the neighbour's for contiguity
        let s = if axis < self.rank() {
            self.strides[axis] * self.dims()[axis]
        } else {
            1
        };
        strides.insert(axis, s);
        Ok(Layout::new(shape, strides, self.offset))
    }

    /// Expand a size-1 axis to `size` without copying (stride 0).
    pub fn expand(&self, axis: usize, size: usize) -> Result<Layout> {
        self.shape.check_axis(axis)?;
        let current = self.dims()[axis];
        if current == size {
            return Ok(self.clone());
        }
        if current != 1 {
            return Err(Error::msg(format!(
                "expand: axis {} has size {}, only size-1 axes can be expanded (target {})",
                axis, current, size
            )));
        }
        let mut dims = self.dims().to_vec();
        let mut strides = self.strides.clone();
        dims[axis] = size;
        strides[axis] = 0;
        Ok(Layout::new(Shape::new(dims), strides, self.offset))
    }

    /// Remove a size-1 axis.
    pub fn squeeze(&self, axis: usize) -> Result<Layout> {
        self.shape.check_axis(axis)?;
        if self.dims()[axis] != 1 {
            return Err(Error::msg(format!(
                "squeeze: axis {} has size {}, expected 1",
                axis,
                self.dims()[axis]
            )));
        }
        let mut strides = self.strides.clone();
        strides.remove(axis);
        Ok(Layout::new(self.shape.remove_axis(axis)?, strides, self.offset))
    }

    /// A layout for `shape` over the same storage, if one exists without
    /// copying. Only contiguous (offset may be non-zero) views qualify.
    pub fn reshape_view(&self, shape: &Shape) -> Option<Layout> {
        if shape.elem_count() != self.elem_count() {
            return None;
        }
        let expected = self.shape.stride_contiguous();
        let dense = self
            .dims()
            .iter()
            .zip(self.strides.iter().zip(expected.iter()))
            .all(|(&d, (&s, &e))| d == 1 || s == e);
        if !dense {
            return None;
        }
        Some(Layout::new(
            shape.clone(),
            shape.stride_contiguous(),
            self.offset,
        ))
    }

    /// Storage position of a logical index. Unchecked.
    pub fn flat_index(&self, index: &[usize]) -> usize {
        index
            .iter()
            .zip(&self.strides)
            .fold(self.offset, |pos, (&i, &s)| pos + i * s)
    }

    /// Bounds-checked version of [`Layout::flat_index`].
    pub fn checked_flat_index(&self, index: &[usize]) -> Result<usize> {
        let in_bounds =
            index.len() == self.rank() && index.iter().zip(self.dims()).all(|(&i, &d)| i < d);
        if !in_bounds {
            return Err(Error::IndexOutOfBounds {
                index: index.to_vec(),
                shape: self.shape.clone(),
            });
        }
        Ok(self.flat_index(index))
    }

    /// Storage positions of every element, in row-major logical order.
    pub fn strided_indices(&self) -> StridedIter {
        StridedIter {
            index: vec![0; self.rank()],
            dims: self.dims().to_vec(),
            strides: self.strides.clone(),
            pos: self.offset,
            remaining: self.elem_count(),
        }
    }
}

/// Odometer over a layout that carries the storage position along with
/// the logical index, so each step costs one add in the common case.
pub struct StridedIter {
    index: Vec<usize>,
    dims: Vec<usize>,
    strides: Vec<usize>,
    pos: usize,
    remaining: usize,
}

impl Iterator for StridedIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.pos;
        self.remaining -= 1;
        if self.remaining > 0 {
            for axis in (0..self.dims.len()).rev() {
                self.index[axis] += 1;
                self.pos += self.strides[axis];
                if self.index[axis] < self.dims[axis] {
                    break;
                }
                // wrap: undo the whole axis
                self.pos -= self.strides[axis] * self.dims[axis];
                self.index[axis] = 0;
            }
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for StridedIter {}
