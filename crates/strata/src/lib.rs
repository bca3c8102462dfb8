//! # Strata
//!
//! Strided n-dimensional arrays with broadcasting, and reverse-mode
//! automatic differentiation on top of them.
//!
//! This is the top-level facade crate that re-exports everything you need.
//!
//! ## Usage
//!
//! ```rust
//! use strata::prelude::*;
//!
//! # fn main() -> strata::Result<()> {
//! let x = Tensor::var(Array::from_f64_slice(&[1.0, 2.0, 3.0, 4.0], 4, DType::F64)?);
//! x.mean_axis(0)?.backward()?;
//! assert_eq!(x.grad().unwrap().to_f64_vec()?, vec![0.25; 4]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|---------|
//! | `strata-core` | Array, Shape, Layout, DType, broadcasting, strided loops, operators |
//! | `strata-autograd` | Tensor graph nodes, backward pass, gradient checks |

/// Re-export core types.
pub use strata_core::{
    broadcast_shapes, element_wise, Array, BinaryOp, CmpOp, DType, ElementWise, EngineConfig,
    Error, LaneOp, Layout, LoopKind, ReduceOp, Result, Shape, Storage, UnaryOp, WithDType,
};

/// Re-export autodiff types.
pub use strata_autograd::{
    backward, backward_with, check_gradients, parameters, zero_grad, GradCheck, Tensor, TensorId,
    TensorManager, DEFAULT_STD_EPS,
};

/// Process-wide engine settings.
pub mod config {
    pub use strata_core::config::*;
}

/// Operator families over arrays.
pub mod ops {
    pub use strata_core::ops::*;
}

/// Graph-level utilities.
pub mod autograd {
    pub use strata_autograd::*;
}

/// Prelude: import this for the most common types.
pub mod prelude {
    pub use crate::{
        backward_with, check_gradients, zero_grad, Array, CmpOp, DType, EngineConfig, Shape, Tensor,
        TensorManager,
    };
}
