use proptest::prelude::*;
use strata_autograd::{backward_with, check_gradients, Tensor};
use strata_core::{Array, DType};

fn values(len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-3.0f64..3.0, len)
}

// Magnitudes in [0.5, 3) with either sign
fn divisors(len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec((0.5f64..3.0, any::<bool>()), len)
        .prop_map(|v| v.into_iter().map(|(m, neg)| if neg { -m } else { m }).collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn divide_gradient_is_numerically_exact(
        (a, b) in (1usize..8).prop_flat_map(|n| (values(n), divisors(n)))
    ) {
        let n = a.len();
        let inputs = [
            Array::from_f64_slice(&a, n, DType::F64).unwrap(),
            Array::from_f64_slice(&b, n, DType::F64).unwrap(),
        ];
        let report = check_gradients(|v| v[0].div(&v[1])?.sum_all(), &inputs, 1e-6).unwrap();
        prop_assert!(report.max_abs_error < 1e-6, "{:?}", report);
    }

    #[test]
    fn tanh_never_amplifies_upstream(
        (x, g) in (1usize..16).prop_flat_map(|n| (values(n), values(n)))
    ) {
        let n = x.len();
        let leaf = Tensor::var(Array::from_f64_slice(&x, n, DType::F64).unwrap());
        let upstream = Array::from_f64_slice(&g, n, DType::F64).unwrap();
        backward_with(&leaf.tanh().unwrap(), &upstream).unwrap();
        let dx = leaf.grad().unwrap().to_f64_vec().unwrap();
        for (d, u) in dx.iter().zip(&g) {
            prop_assert!(d.abs() <= u.abs());
        }
    }

    #[test]
    fn sum_all_gradient_is_ones(x in (1usize..12).prop_flat_map(values)) {
        let leaf = Tensor::var(Array::from_f64_slice(&x, x.len(), DType::F64).unwrap());
        leaf.sum_all().unwrap().backward().unwrap();
        prop_assert_eq!(leaf.grad().unwrap().to_f64_vec().unwrap(), vec![1.0; x.len()]);
    }
}
