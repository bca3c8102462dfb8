use rayon::prelude::*;

use crate::dtype::WithDType;
use crate::error::Result;
use crate::layout::Layout;
use crate::loops::{Generic, LoopKind, Step, StrideLoop, StridedRead, Unit};
use crate::ops::ensure_kind;
use crate::storage::{Buffer, Storage};

/// Reductions over a whole view or over one axis.
///
/// `Sum`, `Prod`, `Min` and `Max` are seed + associative combine and work
/// on every kind. `Mean` and `Var` accumulate in f64 and are float-only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReduceOp {
    Sum,
    Prod,
    Min,
    Max,
    Mean,
    /// Corrected two-pass variance with `ddof` degrees of freedom removed.
    /// `mean` overrides the per-lane mean when supplied.
    Var { ddof: usize, mean: Option<f64> },
}

#[inline]
fn add_rule<T: WithDType>(acc: T, x: T) -> T {
    acc.add(x)
}

#[inline]
fn mul_rule<T: WithDType>(acc: T, x: T) -> T {
    acc.mul(x)
}

// NaN sticks once it enters the accumulator
#[inline]
fn min_rule<T: WithDType>(acc: T, x: T) -> T {
    if x < acc || x.is_nan() {
        x
    } else {
        acc
    }
}

#[inline]
fn max_rule<T: WithDType>(acc: T, x: T) -> T {
    if x > acc || x.is_nan() {
        x
    } else {
        acc
    }
}

impl ReduceOp {
    pub fn name(&self) -> &'static str {
        match self {
            ReduceOp::Sum => "sum",
            ReduceOp::Prod => "prod",
            ReduceOp::Min => "min",
            ReduceOp::Max => "max",
            ReduceOp::Mean => "mean",
            ReduceOp::Var { .. } => "var",
        }
    }

    pub fn is_float_only(&self) -> bool {
        matches!(self, ReduceOp::Mean | ReduceOp::Var { .. })
    }

    /// Identity element of the combine rule.
    pub fn seed<T: WithDType>(&self) -> T {
        match self {
            ReduceOp::Prod => T::one(),
            ReduceOp::Min => T::max_value(),
            ReduceOp::Max => T::min_value(),
            ReduceOp::Sum | ReduceOp::Mean | ReduceOp::Var { .. } => T::zero(),
        }
    }

    /// Associative combine rule. Mean and variance combine partial sums.
    pub fn combine<T: WithDType>(&self, acc: T, x: T) -> T {
        match self {
            ReduceOp::Prod => mul_rule(acc, x),
            ReduceOp::Min => min_rule(acc, x),
            ReduceOp::Max => max_rule(acc, x),
            ReduceOp::Sum | ReduceOp::Mean | ReduceOp::Var { .. } => add_rule(acc, x),
        }
    }

    /// Reduce the positions of `plan` through any accessor.
    pub fn reduce_with<T: WithDType, R: StridedRead<T>>(&self, access: &R, plan: &StrideLoop) -> T {
        let n = plan.len() as f64;
        match *self {
            ReduceOp::Sum => access.fold(plan, T::zero(), add_rule),
            ReduceOp::Prod => access.fold(plan, T::one(), mul_rule),
            ReduceOp::Min => access.fold(plan, T::max_value(), min_rule),
            ReduceOp::Max => access.fold(plan, T::min_value(), max_rule),
            ReduceOp::Mean => T::from_f64(access.fold(plan, 0.0, |s, x| s + x.to_f64()) / n),
            ReduceOp::Var { ddof, mean } => {
                let mean = match mean {
                    Some(m) => m,
                    None => access.fold(plan, 0.0, |s, x| s + x.to_f64()) / n,
                };
                let (sq, lin) = access.fold(plan, (0.0, 0.0), |(sq, lin), x| {
                    let c = x.to_f64() - mean;
                    (sq + c * c, lin + c)
                });
                let dof = n - ddof as f64;
                T::from_f64((sq - lin * lin / dof) / dof)
            }
        }
    }

    pub fn reduce_unit<T: WithDType>(&self, data: &[T], plan: &StrideLoop) -> T {
        self.reduce_with(&Unit(data), plan)
    }

    pub fn reduce_step<T: WithDType>(&self, data: &[T], plan: &StrideLoop) -> T {
        self.reduce_with(&Step(data), plan)
    }

    pub fn reduce_generic<T: WithDType>(&self, buf: &Buffer<T>, plan: &StrideLoop) -> T {
        self.reduce_with(&Generic(buf), plan)
    }

    /// Pick the loop for `buf` and reduce. Returns the value and the variant.
    pub fn reduce_buffer<T: WithDType>(&self, buf: &Buffer<T>, plan: &StrideLoop) -> (T, LoopKind) {
        let kind = LoopKind::select(buf.supports_vectorization(), plan.step);
        let value = match (kind, buf) {
            (LoopKind::Unit, Buffer::Dense(data)) => self.reduce_unit(data, plan),
            (LoopKind::Step, Buffer::Dense(data)) => self.reduce_step(data, plan),
            (_, buf) => self.reduce_generic(buf, plan),
        };
        (value, kind)
    }

    /// Reduce independent lanes that share a step and a length.
    /// Lanes fan out over the rayon pool when `parallel` is set.
    pub fn reduce_lanes<T: WithDType>(
        &self,
        buf: &Buffer<T>,
        bases: &[usize],
        step: usize,
        bound: usize,
        parallel: bool,
    ) -> Vec<T> {
        let lane = |&base: &usize| self.reduce_buffer(buf, &StrideLoop::lane(base, step, bound)).0;
        if parallel {
            bases.par_iter().map(lane).collect()
        } else {
            bases.iter().map(lane).collect()
        }
    }

    /// Reduce every element of `storage` addressed by `layout` to one
    /// value of the same kind, wrapped in a single-element storage.
    pub fn reduce_storage(&self, storage: &Storage, layout: &Layout) -> Result<Storage> {
        ensure_kind(self.name(), self.is_float_only(), storage.dtype())?;
        let plan = StrideLoop::new(layout);
        let (out, kind) = crate::with_buffer!(storage, b => {
            let (v, kind) = self.reduce_buffer(b, &plan);
            (WithDType::into_storage(Buffer::Dense(vec![v])), kind)
        });
        tracing::trace!(op = self.name(), ?kind, n = plan.len(), "reduce");
        Ok(out)
    }
}
