use crate::dtype::DType;
use crate::shape::Shape;

/// All errors that can occur within strata.
///
/// Every failure is synchronous: the operation that detects it aborts and the
/// error propagates to the caller. Nothing is retried at this layer. NaN and
/// infinities are *not* errors; they flow through arithmetic untouched.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Shapes cannot be aligned with the equal-or-one rule.
    #[error("cannot broadcast shapes {}", fmt_shapes(.shapes))]
    Broadcast { shapes: Vec<Shape> },

    /// Operation is not defined for the element kind it was invoked on
    /// (e.g. a floating-point-only operator applied to an integer array).
    #[error("operation `{op}` is not supported for dtype {dtype}")]
    Unsupported { op: &'static str, dtype: DType },

    /// Axis index outside `[0, rank)`.
    #[error("dimension out of range: dim {dim} for array with {rank} dimensions")]
    DimOutOfRange { dim: usize, rank: usize },

    /// Operation requires a minimum rank (e.g. an axis op on a scalar).
    #[error("operation `{op}` requires rank >= {min}, got rank {got}")]
    RankTooLow {
        op: &'static str,
        min: usize,
        got: usize,
    },

    /// Shape mismatch between two arrays where equality is required.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: Shape, got: Shape },

    /// Element kinds differ where they must agree.
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },

    /// Element count mismatch when creating an array from flat data.
    #[error("element count mismatch: shape {shape} requires {expected} elements, got {got}")]
    ElementCountMismatch {
        shape: Shape,
        expected: usize,
        got: usize,
    },

    /// Narrow out of bounds.
    #[error("narrow out of bounds: dim {dim}, start {start}, len {len}, dim_size {dim_size}")]
    NarrowOutOfBounds {
        dim: usize,
        start: usize,
        len: usize,
        dim_size: usize,
    },

    /// A multi-dimensional index does not address an element of the array.
    #[error("index {index:?} out of bounds for shape {shape}")]
    IndexOutOfBounds { index: Vec<usize>, shape: Shape },

    /// A single element was requested from an array holding several.
    #[error("expected a single-element array, got shape {shape}")]
    NotAScalar { shape: Shape },

    /// A parameter is outside of its valid domain (dropout probability, ...).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Generic message for cases not covered above.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create an error from any string message.
    pub fn msg(s: impl Into<String>) -> Self {
        Error::Msg(s.into())
    }

    /// Shortcut for a two-shape broadcast failure.
    pub fn broadcast(lhs: &Shape, rhs: &Shape) -> Self {
        Error::Broadcast {
            shapes: vec![lhs.clone(), rhs.clone()],
        }
    }

    /// True for the IndexError family (bad axis, bad index, rank too low).
    pub fn is_index_error(&self) -> bool {
        matches!(
            self,
            Error::DimOutOfRange { .. } | Error::RankTooLow { .. } | Error::IndexOutOfBounds { .. }
        )
    }
}

fn fmt_shapes(shapes: &[Shape]) -> String {
    shapes
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience Result type used throughout strata.
pub type Result<T> = std::result::Result<T, Error>;

/// Macro for early return with a formatted error message.
/// Usage: `bail!("something went wrong: {}", detail)`
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::Error::Msg(format!($($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_message_lists_shapes() {
        let err = Error::broadcast(&Shape::from((3, 2)), &Shape::from((4, 2)));
        assert_eq!(err.to_string(), "cannot broadcast shapes [3, 2], [4, 2]");
    }

    #[test]
    fn test_index_error_family() {
        assert!(Error::DimOutOfRange { dim: 3, rank: 2 }.is_index_error());
        assert!(!Error::msg("x").is_index_error());
    }
}
