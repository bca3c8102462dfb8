//! # strata-autograd
//!
//! Define-by-run reverse-mode automatic differentiation over strata arrays.
//!
//! This crate provides:
//! - [`Tensor`]: a graph node holding an eager value, a gradient
//!   accumulator and one backward edge per differentiable operand
//! - operator factories as `Tensor` methods (see [`ops`])
//! - [`backward`] / [`backward_with`]: the reverse pass over the graph
//! - [`gradcheck`]: central-difference verification of gradients
//! - [`TensorManager`]: defaults for leaf construction
// - Graph order: node ids come from a global counter, so operands precede consumers
// - Gradients are summed into accumulators, never assigned

pub mod backward;
pub mod gradcheck;
pub mod manager;
pub mod ops;
pub mod tensor;

pub use backward::{backward, backward_with, parameters, reachable, zero_grad};
pub use gradcheck::{check_gradients, numerical_gradient, GradCheck};
pub use manager::TensorManager;
pub use ops::stats::DEFAULT_STD_EPS;
pub use tensor::{BackEdge, NodeBuilder, Tensor, TensorId};
