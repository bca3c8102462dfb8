// Property tests for strata-core
//
// Randomized shapes and layouts checked against simple reference
// computations over row-major f64 data.

use proptest::prelude::*;
use strata_core::{element_wise, Array, BinaryOp, CmpOp, DType, LaneOp, ReduceOp, Shape, UnaryOp};

fn shape_strategy() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..=4, 1..=4)
}

fn iota(dims: &[usize]) -> Array {
    let shape = Shape::from(dims.to_vec());
    let data: Vec<f64> = (0..shape.elem_count()).map(|i| i as f64 * 0.5 - 3.0).collect();
    Array::from_f64_slice(&data, shape, DType::F64).unwrap()
}

/// Randomly replace sizes with 1 and drop leading axes.
fn broadcastable_from(dims: &[usize], ones: &[bool], drop: usize) -> Vec<usize> {
    dims.iter()
        .zip(ones.iter().cycle())
        .map(|(&d, &one)| if one { 1 } else { d })
        .skip(drop.min(dims.len()))
        .collect()
}

proptest! {
    #[test]
    fn prop_broadcast_accepts_derived_shapes(
        dims in shape_strategy(),
        ones in prop::collection::vec(any::<bool>(), 4),
        drop in 0usize..4,
    ) {
        let target = Shape::from(dims.clone());
        let other = Shape::from(broadcastable_from(&dims, &ones, drop));
        let ew = element_wise(&[&target, &other]);
        prop_assert!(ew.valid());
        prop_assert_eq!(ew.shape(), &target);
        // alignment is symmetric
        let rev = element_wise(&[&other, &target]);
        prop_assert_eq!(rev.shape(), &target);
    }

    #[test]
    fn prop_broadcast_result_matches_reference(
        dims in prop::collection::vec(1usize..=3, 2..=3),
        ones in prop::collection::vec(any::<bool>(), 3),
    ) {
        let a = iota(&dims);
        let small = broadcastable_from(&dims, &ones, 0);
        let b = iota(&small);
        let out = a.add(&b).unwrap();
        let a_shape = Shape::from(dims.clone());
        let got = out.to_f64_vec().unwrap();
        for (flat, value) in got.iter().enumerate() {
            // unravel against the big shape, clamp to 0 where b has size 1
            let mut rem = flat;
            let mut idx = vec![0; dims.len()];
            for axis in (0..dims.len()).rev() {
                idx[axis] = rem % dims[axis];
                rem /= dims[axis];
            }
            let b_idx: Vec<usize> = idx.iter().zip(&small).map(|(&i, &d)| if d == 1 { 0 } else { i }).collect();
            let expected = a.get_f64(&idx).unwrap() + b.get_f64(&b_idx).unwrap();
            prop_assert_eq!(*value, expected);
        }
        prop_assert_eq!(out.shape(), &a_shape);
    }

    #[test]
    fn prop_sum_of_expanded_axis_scales(
        dims in shape_strategy(),
        axis_seed in 0usize..8,
        n in 1usize..=5,
    ) {
        let x = iota(&dims);
        let axis = axis_seed % (dims.len() + 1);
        let expanded = x.strexp(axis, n).unwrap();
        let summed = expanded.sum(axis, false).unwrap();
        prop_assert_eq!(summed.shape(), x.shape());
        let got = summed.to_f64_vec().unwrap();
        let want: Vec<f64> = x.to_f64_vec().unwrap().iter().map(|v| v * n as f64).collect();
        for (g, w) in got.iter().zip(&want) {
            prop_assert!((g - w).abs() < 1e-9);
        }
    }

    #[test]
    fn prop_unary_loop_variants_agree(dims in prop::collection::vec(1usize..=4, 2..=3)) {
        let dense = iota(&dims);
        for op in all_unary_ops() {
            let want = dense.unary(op).unwrap().to_f64_vec().unwrap();
            // same logical values, strided and virtual
            for other in [strided_clone(&dense), mapped_clone(&dense)] {
                other.unary_(op).unwrap();
                prop_assert!(all_close(&other.to_f64_vec().unwrap(), &want), "{:?}", op);
            }
        }
    }

    #[test]
    fn prop_binary_loop_variants_agree(dims in prop::collection::vec(1usize..=4, 2..=3)) {
        let dense = iota(&dims);
        let rhs = dense.mul_scalar(-0.75).unwrap().add_scalar(1.25).unwrap();
        for op in [BinaryOp::Add, BinaryOp::Sub, BinaryOp::Mul, BinaryOp::Div, BinaryOp::Min, BinaryOp::Max] {
            let want = dense.binary(op, &rhs).unwrap().to_f64_vec().unwrap();
            for other in [strided_clone(&dense), mapped_clone(&dense)] {
                prop_assert!(all_close(&other.binary(op, &rhs).unwrap().to_f64_vec().unwrap(), &want), "{:?}", op);
                // virtual and strided right-hand sides
                prop_assert!(all_close(&dense.binary(op, &strided_clone(&rhs)).unwrap().to_f64_vec().unwrap(), &want));
                prop_assert!(all_close(&dense.binary(op, &mapped_clone(&rhs)).unwrap().to_f64_vec().unwrap(), &want));
                other.binary_(op, &rhs).unwrap();
                prop_assert!(all_close(&other.to_f64_vec().unwrap(), &want), "{:?} in place", op);
            }
        }
    }

    #[test]
    fn prop_reduce_loop_variants_agree(dims in prop::collection::vec(1usize..=4, 2..=3)) {
        let dense = iota(&dims);
        let ops = [
            ReduceOp::Sum,
            ReduceOp::Prod,
            ReduceOp::Min,
            ReduceOp::Max,
            ReduceOp::Mean,
            ReduceOp::Var { ddof: 0, mean: None },
            ReduceOp::Var { ddof: 1, mean: None },
            ReduceOp::Var { ddof: 0, mean: Some(0.5) },
        ];
        for op in ops {
            for axis in 0..dims.len() {
                let want = dense.reduce(op, axis, false).unwrap().to_f64_vec().unwrap();
                for other in [strided_clone(&dense), mapped_clone(&dense)] {
                    let got = other.reduce(op, axis, false).unwrap().to_f64_vec().unwrap();
                    prop_assert!(all_close(&got, &want), "{:?} along {}", op, axis);
                }
            }
            let want = dense.reduce_all(op).unwrap().to_scalar_f64().unwrap();
            for other in [strided_clone(&dense), mapped_clone(&dense)] {
                let got = other.reduce_all(op).unwrap().to_scalar_f64().unwrap();
                prop_assert!(all_close(&[got], &[want]), "{:?} over all", op);
            }
        }
    }

    #[test]
    fn prop_lane_loop_variants_agree(dims in prop::collection::vec(1usize..=4, 2..=3)) {
        let dense = iota(&dims);
        for op in [LaneOp::Softmax, LaneOp::LogSoftmax] {
            for axis in 0..dims.len() {
                let want = match op {
                    LaneOp::Softmax => dense.softmax(axis),
                    LaneOp::LogSoftmax => dense.log_softmax(axis),
                }
                .unwrap()
                .to_f64_vec()
                .unwrap();
                for other in [strided_clone(&dense), mapped_clone(&dense)] {
                    match op {
                        LaneOp::Softmax => other.softmax_(axis),
                        LaneOp::LogSoftmax => other.log_softmax_(axis),
                    }
                    .unwrap();
                    prop_assert!(all_close(&other.to_f64_vec().unwrap(), &want), "{:?} along {}", op, axis);
                }
            }
        }
    }

    #[test]
    fn prop_reshape_preserves_order(dims in shape_strategy()) {
        let a = iota(&dims);
        let flat = a.reshape(a.elem_count()).unwrap();
        prop_assert_eq!(flat.to_f64_vec().unwrap(), a.to_f64_vec().unwrap());
        let t = a.t();
        let tflat = t.reshape(t.elem_count()).unwrap();
        prop_assert_eq!(tflat.to_f64_vec().unwrap(), t.to_f64_vec().unwrap());
    }
}

/// Same logical contents as `a` through a transposed layout.
fn strided_clone(a: &Array) -> Array {
    a.t().copy().unwrap().t()
}

/// Same logical contents as `a` through a reversed index table.
fn mapped_clone(a: &Array) -> Array {
    let values = a.to_vec::<f64>().unwrap();
    let n = values.len();
    Array::from_mapped(values.into_iter().rev().collect(), (0..n).rev().collect(), a.shape().clone())
        .unwrap()
}

fn all_unary_ops() -> Vec<UnaryOp> {
    let mut ops = vec![
        UnaryOp::Fill(1.5),
        UnaryOp::Neg,
        UnaryOp::Abs,
        UnaryOp::Sqr,
        UnaryOp::Sqrt,
        UnaryOp::Exp,
        UnaryOp::Log,
        UnaryOp::Log1p,
        UnaryOp::Tanh,
        UnaryOp::Sigmoid,
        UnaryOp::Sin,
        UnaryOp::Cos,
        UnaryOp::Floor,
        UnaryOp::Ceil,
        UnaryOp::Rint,
        UnaryOp::Pow(3.0),
        UnaryOp::Pow(0.5),
        UnaryOp::Clamp { min: -1.0, max: 2.0 },
        UnaryOp::MaxScalar(0.0),
        UnaryOp::NanToNum(0.0),
    ];
    for cmp in [CmpOp::Eq, CmpOp::Ne, CmpOp::Gt, CmpOp::Ge, CmpOp::Lt, CmpOp::Le] {
        ops.push(UnaryOp::CompareMask(cmp, -1.0));
    }
    ops
}

/// Element-wise equality up to rounding; NaNs match NaNs.
fn all_close(got: &[f64], want: &[f64]) -> bool {
    got.len() == want.len()
        && got.iter().zip(want).all(|(&g, &w)| {
            g == w || (g.is_nan() && w.is_nan()) || (g - w).abs() <= 1e-12 * w.abs().max(1.0)
        })
}
