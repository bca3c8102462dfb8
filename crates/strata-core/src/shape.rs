use std::fmt;

use crate::error::{Error, Result};

// Shape — dimension sizes of an array view
//
//   []          rank 0, one element
//   [5]         rank 1
//   [2, 3, 4]   rank 3, 24 elements
//
// A zero anywhere makes the element count zero. Views never edit a shape in
// place: stretch, expand, squeeze and reshape each produce a new one.

/// Ordered dimension sizes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape(Vec<usize>);

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    /// Rank 0.
    pub fn scalar() -> Self {
        Shape(Vec::new())
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Product of the dimension sizes; 1 for a scalar.
    pub fn elem_count(&self) -> usize {
        self.0.iter().product()
    }

    /// Row-major strides, e.g. `[12, 4, 1]` for `[2, 3, 4]`.
    pub fn stride_contiguous(&self) -> Vec<usize> {
        let mut acc = 1;
        let mut out: Vec<usize> = self
            .0
            .iter()
            .rev()
            .map(|&d| {
                let s = acc;
                acc *= d;
                s
            })
            .collect();
        out.reverse();
        out
    }

    pub fn dim(&self, axis: usize) -> Result<usize> {
        self.check_axis(axis)?;
        Ok(self.0[axis])
    }

    /// Fails with `DimOutOfRange` unless `axis < rank`.
    pub fn check_axis(&self, axis: usize) -> Result<()> {
        match axis < self.rank() {
            true => Ok(()),
            false => Err(Error::DimOutOfRange {
                dim: axis,
                rank: self.rank(),
            }),
        }
    }

    pub fn remove_axis(&self, axis: usize) -> Result<Shape> {
        self.check_axis(axis)?;
        let mut dims = self.0.clone();
        dims.remove(axis);
        Ok(Shape(dims))
    }

    /// Insert a dimension of `size` before `axis`; `axis == rank` appends.
    pub fn insert_axis(&self, axis: usize, size: usize) -> Result<Shape> {
        if axis > self.rank() {
            return Err(Error::DimOutOfRange {
                dim: axis,
                rank: self.rank() + 1,
            });
        }
        let mut dims = self.0.clone();
        dims.insert(axis, size);
        Ok(Shape(dims))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|d| d.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

impl From<()> for Shape {
    fn from(_: ()) -> Self {
        Shape::scalar()
    }
}

impl From<usize> for Shape {
    fn from(len: usize) -> Self {
        Shape(vec![len])
    }
}

macro_rules! shape_from_tuple {
    ($($d:ident),+) => {
        impl From<($(shape_from_tuple!(@usize $d),)+)> for Shape {
            fn from(($($d,)+): ($(shape_from_tuple!(@usize $d),)+)) -> Self {
                Shape(vec![$($d),+])
            }
        }
    };
    (@usize $d:ident) => { usize };
}

shape_from_tuple!(a);
shape_from_tuple!(a, b);
shape_from_tuple!(a, b, c);
shape_from_tuple!(a, b, c, d);

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(dims: [usize; N]) -> Self {
        Shape(dims.to_vec())
    }
}

impl From<&Shape> for Shape {
    fn from(shape: &Shape) -> Self {
        shape.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_shape() {
        let s = Shape::from(());
        assert_eq!(s.rank(), 0);
        assert_eq!(s.elem_count(), 1);
        assert_eq!(s.stride_contiguous(), Vec::<usize>::new());
    }

    #[test]
    fn test_matrix_shape() {
        let s = Shape::from((3, 4));
        assert_eq!(s.rank(), 2);
        assert_eq!(s.elem_count(), 12);
        assert_eq!(s.stride_contiguous(), vec![4, 1]);
    }

    #[test]
    fn test_3d_strides() {
        let s = Shape::from((2, 3, 4));
        assert_eq!(s.stride_contiguous(), vec![12, 4, 1]);
        assert_eq!(s.elem_count(), 24);
    }

    #[test]
    fn test_zero_sized_dimension() {
        assert_eq!(Shape::from((3, 0)).elem_count(), 0);
    }

    #[test]
    fn test_axis_edits() {
        let s = Shape::from((2, 3, 4));
        assert_eq!(s.remove_axis(1).unwrap(), Shape::from((2, 4)));
        assert_eq!(s.insert_axis(3, 1).unwrap(), Shape::from((2, 3, 4, 1)));
        assert!(s.remove_axis(3).is_err());
        assert!(s.insert_axis(5, 1).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Shape::from((3, 4))), "[3, 4]");
        assert_eq!(format!("{}", Shape::scalar()), "[]");
    }
}
