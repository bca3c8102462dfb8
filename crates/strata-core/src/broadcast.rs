use crate::array::Array;
use crate::error::{Error, Result};
use crate::shape::Shape;

// Broadcast — NumPy-style shape alignment
//
// Shapes are aligned at their trailing dimension. At every trailing position
// the sizes reported by the inputs must either agree or be 1; a shape that
// is too short to reach the position counts as size 1.
//
//   (3, 1)  and  (1, 4)   →  (3, 4)
//   (5, 3)  and     (3)   →  (5, 3)
//   (3, 2)  and  (4, 2)   →  invalid
//
// The target size at a position is the common non-1 size, or 1 when every
// input reports 1 (or nothing). A zero-sized dimension is an ordinary size
// here: (0,) and (1,) broadcast to (0,).
//
// `transform` turns a view into one of the target shape without copying:
// missing leading axes are stretched in and size-1 axes are expanded with
// stride 0.

/// Result of aligning a set of shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementWise {
    valid: bool,
    unchanged: bool,
    shape: Shape,
    inputs: Vec<Shape>,
}

/// Align `shapes` for an element-wise operation.
pub fn element_wise(shapes: &[&Shape]) -> ElementWise {
    let rank = shapes.iter().map(|s| s.rank()).max().unwrap_or(0);
    let mut dims = vec![1usize; rank];
    let mut valid = true;
    let mut unchanged = true;

    for pos in 0..rank {
        let at = |s: &Shape| (s.rank() > pos).then(|| s.dims()[s.rank() - 1 - pos]);

        let mut target = 1;
        for d in shapes.iter().filter_map(|&s| at(s)) {
            if d == 1 || d == target {
                continue;
            }
            if target == 1 {
                target = d;
            } else {
                valid = false;
            }
        }
        dims[rank - 1 - pos] = target;

        for &s in shapes {
            match at(s) {
                Some(d) if d == target => {}
                Some(1) | None => unchanged = false,
                Some(_) => valid = false,
            }
        }
    }

    ElementWise {
        valid,
        unchanged,
        shape: Shape::new(dims),
        inputs: shapes.iter().map(|&s| s.clone()).collect(),
    }
}

/// Common shape of two operands, or a broadcast error naming both.
pub fn broadcast_shapes(lhs: &Shape, rhs: &Shape) -> Result<Shape> {
    Ok(element_wise(&[lhs, rhs]).checked()?.shape)
}

impl ElementWise {
    /// Whether all inputs can be aligned.
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Whether every input already has the target shape.
    pub fn unchanged(&self) -> bool {
        self.unchanged
    }

    /// The target shape. Meaningless when `valid()` is false.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// `Ok(self)` if valid, otherwise the broadcast error listing the inputs.
    pub fn checked(self) -> Result<Self> {
        if self.valid {
            Ok(self)
        } else {
            Err(Error::Broadcast {
                shapes: self.inputs,
            })
        }
    }

    /// A view of `array` with the target shape, sharing its storage.
    pub fn transform(&self, array: &Array) -> Result<Array> {
        let incompatible = || Error::Broadcast {
            shapes: vec![array.shape().clone(), self.shape.clone()],
        };
        let target = self.shape.dims();
        if !self.valid || array.rank() > target.len() {
            return Err(incompatible());
        }
        let mut out = array.clone();
        for _ in array.rank()..target.len() {
            out = out.stretch(0)?;
        }
        for (axis, &size) in target.iter().enumerate() {
            match out.dims()[axis] {
                d if d == size => {}
                1 => out = out.expand(axis, size)?,
                _ => return Err(incompatible()),
            }
        }
        Ok(out)
    }
}
