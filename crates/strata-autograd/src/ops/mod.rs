// Operator nodes — Factories that extend the graph
//
// Every differentiable operator is a method on Tensor that:
//
//   1. validates its operands (broadcast check, axis range, rank)
//   2. computes the forward value eagerly on the operand values
//   3. registers one backward edge per operand that requires a gradient
//
// Edge closures capture the forward Arrays they need (cheap Arc clones that
// alias the forward storage) and nothing mutable. Binary operators reduce
// their contributions back to the operand shape with `reduce_to_shape`, so
// broadcasting in the forward pass sums correctly in the backward pass.
//
// Families:
//   shape    identity, reshape, narrow, split, stretch, gather
//   binary   add, sub, mul, div (+ scalar right-hand sides)
//   unary    neg, sqr, sqrt, exp, log, log_eps, sigmoid, tanh, max_threshold,
//            compare_true, compare_false
//   reduce   sum_all, sum_axis, mean_axis, mean_on
//   stats    std_axis, std_on, standardize_axis, standardize_on
//   softmax  softmax, log_softmax
//   dropout  dropout
//   bvtm     batched vector-times-matrix

pub mod binary;
pub mod bvtm;
pub mod dropout;
pub mod reduce;
pub mod shape;
pub mod softmax;
pub mod stats;
pub mod unary;
