// Operator dispatch
//
// Operators are closed sets of tagged variants (`UnaryOp`, `BinaryOp`,
// `ReduceOp`, `LaneOp`). Each variant carries a pure scalar rule, and each
// family exposes the same three loops over a StrideLoop plan:
//
//   apply_unit     — contiguous slice, step 1
//   apply_step     — slice with an arbitrary step (including 0)
//   apply_generic  — any Buffer, through get/set only
//
// The `*_buffer` entry points pick the loop with `LoopKind::select` and the
// `*_storage` entry points add the element-kind match and the float-only
// check. An operator that refuses integer kinds fails with
// `Error::Unsupported` before a single element is touched.
//
// The operator enums are `Copy` values with no state beyond their
// parameters, so callers may keep them in constants and reuse them freely.

pub mod binary;
pub mod lane;
pub mod reduce;
pub mod unary;

pub use binary::BinaryOp;
pub use lane::LaneOp;
pub use reduce::ReduceOp;
pub use unary::{CmpOp, UnaryOp};

use crate::dtype::DType;
use crate::error::{Error, Result};

/// Refuse integer kinds for floating-point-only operators.
pub(crate) fn ensure_kind(op: &'static str, float_only: bool, dtype: DType) -> Result<()> {
    if float_only && !dtype.is_float() {
        return Err(Error::Unsupported { op, dtype });
    }
    Ok(())
}
