use strata_core::{Array, Error, Result, Shape};

use crate::tensor::Tensor;

/// Epsilon added to the variance by [`Tensor::std_axis`] and the default
/// for [`TensorManager`](crate::TensorManager).
pub const DEFAULT_STD_EPS: f64 = 1e-3;

// Std / Standardize — moments over the axes a target shape collapses
//
// The axis forms are the special case where the target is the operand shape
// with one axis set to 1. With n elements folded into each target entry,
// dof = n - ddof and c = x - mean (mean broadcast back to the full shape):
//
//   var = (Σc² - (Σc)² / dof) / dof
//   std = √(var + eps)
//
// The (Σc)² term vanishes for the lane's own mean and corrects the variance
// when a different mean is supplied.
//
// Gradients (g already broadcast to the full shape):
//
//   std          dx = g * c / std / dof
//   standardize  dx = (g - mean(g)) / std - c * Σ(g c) / (std³ dof)
//
// The mean operand of Std receives a zero gradient: the dependency of the
// variance on the supplied mean is not propagated.

struct Moments {
    /// `x - mean`, full shape.
    centered: Array,
    /// Standard deviation with the target shape.
    std: Array,
    /// Elements folded into each target entry.
    n: f64,
    dof: f64,
}

// Number of operand elements that land on one entry of `target`.
fn fold_count(full: &Shape, target: &Shape) -> f64 {
    match target.elem_count() {
        0 => 0.0,
        t => (full.elem_count() / t) as f64,
    }
}

// The operand shape with `axis` kept at size 1.
fn keep_axis(x: &Array, axis: usize) -> Result<Shape> {
    x.dim(axis)?;
    let mut dims = x.dims().to_vec();
    dims[axis] = 1;
    Ok(Shape::new(dims))
}

fn moments(x: &Array, target: &Shape, ddof: usize, eps: f64, mean: Option<&Array>) -> Result<Moments> {
    let n = fold_count(x.shape(), target);
    if n <= ddof as f64 {
        tracing::warn!(n, ddof, shape = %target, "std: fewer folded elements than ddof");
    }
    let mean = match mean {
        Some(m) if m.shape() != target => {
            return Err(Error::ShapeMismatch {
                expected: target.clone(),
                got: m.shape().clone(),
            })
        }
        Some(m) => m.clone(),
        None => x.reduce_to_shape(target)?.div_scalar(n)?,
    };
    let dof = n - ddof as f64;
    let centered = x.sub(&mean)?;
    let sq = centered.sqr()?.reduce_to_shape(target)?;
    let lin = centered.reduce_to_shape(target)?;
    let var = sq.sub(&lin.sqr()?.div_scalar(dof)?)?.div_scalar(dof)?;
    let std = var.add_scalar(eps)?.sqrt()?;
    Ok(Moments { centered, std, n, dof })
}

impl Tensor {
    /// Standard deviation along `axis` with `ddof` degrees of freedom
    /// removed and [`DEFAULT_STD_EPS`] added to the variance.
    pub fn std_axis(&self, axis: usize, ddof: usize) -> Result<Tensor> {
        self.std_axis_with(axis, ddof, DEFAULT_STD_EPS, None)
    }

    /// Standard deviation along `axis`, optionally around a supplied
    /// `mean` node of the reduced shape.
    pub fn std_axis_with(&self, axis: usize, ddof: usize, eps: f64, mean: Option<&Tensor>) -> Result<Tensor> {
        let target = keep_axis(self.value(), axis)?;
        let mean = match mean {
            Some(m) => {
                let expected = self.shape().remove_axis(axis)?;
                if m.shape() != &expected {
                    return Err(Error::ShapeMismatch {
                        expected,
                        got: m.shape().clone(),
                    });
                }
                Some((m, m.value().stretch(axis)?))
            }
            None => None,
        };
        let stats = moments(self.value(), &target, ddof, eps, mean.as_ref().map(|(_, a)| a))?;
        let value = stats.std.squeeze(axis)?;
        self.std_node("std_axis", value, stats, mean.map(|(m, _)| m), move |g| g.stretch(axis))
    }

    /// Standard deviation over every axis that `shape` collapses to size 1
    /// (or drops, for a shorter `shape`). The result has `shape`; a supplied
    /// `mean` must have it too.
    pub fn std_on(&self, shape: impl Into<Shape>, ddof: usize, eps: f64, mean: Option<&Tensor>) -> Result<Tensor> {
        let target = shape.into();
        let stats = moments(self.value(), &target, ddof, eps, mean.map(|m| m.value()))?;
        let value = stats.std.clone();
        self.std_node("std_on", value, stats, mean, |g| Ok(g.clone()))
    }

    // `lift` turns the node gradient into the target shape.
    fn std_node<F>(
        &self,
        op: &'static str,
        value: Array,
        stats: Moments,
        mean: Option<&Tensor>,
        lift: F,
    ) -> Result<Tensor>
    where
        F: Fn(&Array) -> Result<Array> + Send + Sync + 'static,
    {
        let Moments { centered, std, dof, .. } = stats;
        let full = self.shape().clone();
        let mut node = Tensor::node(op, value).edge(self, move |g| {
            lift(g)?.broadcast_to(full.clone())?.mul(&centered)?.div(&std)?.div_scalar(dof)
        });
        if let Some(m) = mean {
            let zeros = m.value().zeros_like();
            node = node.edge(m, move |_| {
                tracing::debug!("std: zero gradient routed to supplied mean");
                Ok(zeros.clone())
            });
        }
        Ok(node.build())
    }

    /// `(x - mean) / std` along `axis`, with fresh per-lane moments.
    pub fn standardize_axis(&self, axis: usize, ddof: usize, eps: f64) -> Result<Tensor> {
        let target = keep_axis(self.value(), axis)?;
        self.standardize_node("standardize_axis", target, ddof, eps)
    }

    /// `(x - mean) / std` with the moments taken over every axis that
    /// `shape` collapses, as in [`Tensor::std_on`].
    pub fn standardize_on(&self, shape: impl Into<Shape>, ddof: usize, eps: f64) -> Result<Tensor> {
        self.standardize_node("standardize_on", shape.into(), ddof, eps)
    }

    fn standardize_node(&self, op: &'static str, target: Shape, ddof: usize, eps: f64) -> Result<Tensor> {
        let Moments { centered, std, n, dof } = moments(self.value(), &target, ddof, eps, None)?;
        let value = centered.div(&std)?;
        Ok(Tensor::node(op, value)
            .edge(self, move |g| {
                let g_mean = g.reduce_to_shape(&target)?.div_scalar(n)?;
                let t1 = g.sub(&g_mean)?.div(&std)?;
                let gc = g.mul(&centered)?.reduce_to_shape(&target)?;
                let t2 = centered.mul(&gc)?.div(&std.powf(3.0)?)?.div_scalar(dof)?;
                t1.sub(&t2)
            })
            .build())
    }
}
