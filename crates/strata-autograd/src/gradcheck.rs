//! Central-difference gradient checks.
//!
//! A graph is given as a builder `f(&[Tensor]) -> Tensor` with a
//! single-element root. The builder is re-run on perturbed copies of the
//! inputs to estimate each partial derivative numerically, and once on
//! trainable leaves to obtain the analytic gradient through [`backward`].

use strata_core::{Array, Error, Result};

use crate::backward::backward;
use crate::tensor::Tensor;

/// Analytic vs numerical gradients for every input of a graph builder.
#[derive(Debug, Clone)]
pub struct GradCheck {
    /// Per input, row-major analytic gradient.
    pub analytic: Vec<Vec<f64>>,
    /// Per input, row-major central-difference estimate.
    pub numerical: Vec<Vec<f64>>,
    /// Largest absolute difference over all inputs.
    pub max_abs_error: f64,
}

fn evaluate<F>(f: &F, leaves: &[Tensor]) -> Result<f64>
where
    F: Fn(&[Tensor]) -> Result<Tensor>,
{
    f(leaves)?.value().to_scalar_f64()
}

/// Central-difference estimate of `d f / d inputs[wrt]`, row-major.
///
/// Each element is moved by `±eps`; the step should be small relative to
/// the inputs but well above the f64 rounding floor (1e-6 is typical).
pub fn numerical_gradient<F>(f: &F, inputs: &[Array], wrt: usize, eps: f64) -> Result<Vec<f64>>
where
    F: Fn(&[Tensor]) -> Result<Tensor>,
{
    let target = inputs
        .get(wrt)
        .ok_or_else(|| Error::msg(format!("gradcheck: no input {} among {}", wrt, inputs.len())))?;
    let point = target.to_f64_vec()?;
    let mut leaves: Vec<Tensor> = inputs.iter().map(|a| Tensor::constant(a.clone())).collect();
    let mut perturbed = point.clone();
    let mut grads = Vec::with_capacity(point.len());

    for i in 0..point.len() {
        perturbed[i] = point[i] + eps;
        leaves[wrt] = Tensor::constant(Array::from_f64_slice(&perturbed, target.shape(), target.dtype())?);
        let f_plus = evaluate(f, &leaves)?;

        perturbed[i] = point[i] - eps;
        leaves[wrt] = Tensor::constant(Array::from_f64_slice(&perturbed, target.shape(), target.dtype())?);
        let f_minus = evaluate(f, &leaves)?;

        perturbed[i] = point[i];
        grads.push((f_plus - f_minus) / (2.0 * eps));
    }
    Ok(grads)
}

/// Largest absolute element-wise difference between two gradients.
pub fn max_grad_error(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

/// Compare analytic gradients of every input against central differences.
pub fn check_gradients<F>(f: F, inputs: &[Array], eps: f64) -> Result<GradCheck>
where
    F: Fn(&[Tensor]) -> Result<Tensor>,
{
    let leaves = inputs
        .iter()
        .map(|a| Ok(Tensor::var(a.copy()?)))
        .collect::<Result<Vec<_>>>()?;
    backward(&f(&leaves)?)?;

    let mut analytic = Vec::with_capacity(inputs.len());
    let mut numerical = Vec::with_capacity(inputs.len());
    let mut max_abs_error = 0.0f64;
    for (i, leaf) in leaves.iter().enumerate() {
        let a = match leaf.grad() {
            Some(g) => g.to_f64_vec()?,
            // the root does not depend on this input
            None => vec![0.0; leaf.elem_count()],
        };
        let n = numerical_gradient(&f, inputs, i, eps)?;
        max_abs_error = max_abs_error.max(max_grad_error(&a, &n));
        analytic.push(a);
        numerical.push(n);
    }
    tracing::debug!(inputs = inputs.len(), max_abs_error, "gradient check");
    Ok(GradCheck {
        analytic,
        numerical,
        max_abs_error,
    })
}

#[cfg(test)]
mod tests {
    use strata_core::DType;

    use super::*;

    #[test]
    fn test_quadratic() {
        // f(x, y) = Σ x² + 2xy + y²; df/dx = df/dy = 2x + 2y
        let x = Array::from_f64_slice(&[1.0, -0.5], 2, DType::F64).unwrap();
        let y = Array::from_f64_slice(&[2.0, 3.0], 2, DType::F64).unwrap();
        let report = check_gradients(
            |v| {
                let xy = v[0].mul(&v[1])?.mul_scalar(2.0)?;
                v[0].sqr()?.add(&xy)?.add(&v[1].sqr()?)?.sum_all()
            },
            &[x, y],
            1e-6,
        )
        .unwrap();
        assert!(report.max_abs_error < 1e-6);
        assert!((report.analytic[0][0] - 6.0).abs() < 1e-12);
        assert!((report.analytic[1][1] - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_non_scalar_root_rejected() {
        let x = Array::ones(3, DType::F64);
        assert!(numerical_gradient(&|v: &[Tensor]| v[0].exp(), &[x.clone()], 0, 1e-6).is_err());
        assert!(numerical_gradient(&|v: &[Tensor]| v[0].sum_all(), &[x], 1, 1e-6).is_err());
    }

    #[test]
    fn test_max_grad_error() {
        let err = max_grad_error(&[1.0, 2.0, 3.0], &[1.1, 2.0, 2.8]);
        assert!((err - 0.2).abs() < 1e-10);
    }
}
