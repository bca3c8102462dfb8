use crate::dtype::WithDType;
use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::loops::{Generic, LoopKind, Step, StrideLoop, StridedWrite, Unit};
use crate::ops::ensure_kind;
use crate::storage::{Buffer, Storage};

/// In-place operators that normalize every lane along one axis.
///
/// Both are computed in three passes over the lane: the maximum, the sum of
/// `exp(x - max)`, then the rewrite. Subtracting the maximum keeps `exp`
/// finite for large inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneOp {
    Softmax,
    LogSoftmax,
}

/// Start position, step and length of every lane of `layout` along `axis`,
/// lanes enumerated in row-major order of the remaining axes.
pub fn lanes(layout: &Layout, axis: usize) -> Result<(Vec<usize>, usize, usize)> {
    if layout.rank() == 0 {
        return Err(Error::RankTooLow {
            op: "lanes",
            min: 1,
            got: 0,
        });
    }
    layout.shape().check_axis(axis)?;
    let mut strides = layout.strides().to_vec();
    let step = strides.remove(axis);
    let outer = Layout::new(layout.shape().remove_axis(axis)?, strides, layout.offset());
    // an empty axis still has one (empty) lane per outer position
    Ok((outer.strided_indices().collect(), step, layout.dims()[axis]))
}

impl LaneOp {
    pub fn name(&self) -> &'static str {
        match self {
            LaneOp::Softmax => "softmax",
            LaneOp::LogSoftmax => "log_softmax",
        }
    }

    /// Rewrite the single lane described by `plan` through any accessor.
    pub fn apply_with<T: WithDType, W: StridedWrite<T>>(&self, access: &mut W, plan: &StrideLoop) {
        let max = access.fold(plan, f64::NEG_INFINITY, |m, x| {
            let v = x.to_f64();
            if v > m {
                v
            } else {
                m
            }
        });
        let sum = access.fold(plan, 0.0, |s, x| s + (x.to_f64() - max).exp());
        match self {
            LaneOp::Softmax => access.map(plan, |x| T::from_f64((x.to_f64() - max).exp() / sum)),
            LaneOp::LogSoftmax => {
                let log_sum = sum.ln();
                access.map(plan, |x| T::from_f64(x.to_f64() - max - log_sum))
            }
        }
    }

    pub fn apply_unit<T: WithDType>(&self, data: &mut [T], plan: &StrideLoop) {
        self.apply_with(&mut Unit(data), plan)
    }

    pub fn apply_step<T: WithDType>(&self, data: &mut [T], plan: &StrideLoop) {
        self.apply_with(&mut Step(data), plan)
    }

    pub fn apply_generic<T: WithDType>(&self, buf: &mut Buffer<T>, plan: &StrideLoop) {
        self.apply_with(&mut Generic(buf), plan)
    }

    /// Rewrite every lane starting at `bases`.
    pub fn apply_buffer<T: WithDType>(
        &self,
        buf: &mut Buffer<T>,
        bases: &[usize],
        step: usize,
        bound: usize,
    ) -> LoopKind {
        let kind = LoopKind::select(buf.supports_vectorization(), step);
        for &base in bases {
            let plan = StrideLoop::lane(base, step, bound);
            match (kind, &mut *buf) {
                (LoopKind::Unit, Buffer::Dense(data)) => self.apply_unit(data, &plan),
                (LoopKind::Step, Buffer::Dense(data)) => self.apply_step(data, &plan),
                (_, buf) => self.apply_generic(buf, &plan),
            }
        }
        kind
    }

    /// Apply in place along `axis` of the view `layout`.
    pub fn apply_storage(&self, storage: &mut Storage, layout: &Layout, axis: usize) -> Result<LoopKind> {
        ensure_kind(self.name(), true, storage.dtype())?;
        let (bases, step, bound) = lanes(layout, axis)?;
        let kind = crate::with_buffer!(storage, b => self.apply_buffer(b, &bases, step, bound));
        tracing::trace!(op = self.name(), ?kind, lanes = bases.len(), "lane");
        Ok(kind)
    }
}
