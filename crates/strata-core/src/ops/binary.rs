use crate::dtype::WithDType;
use crate::error::Result;
use crate::layout::Layout;
use crate::loops::{BinaryLoop, LoopKind};
use crate::storage::{Buffer, Storage};

/// Element-wise binary operators: `dst[i] = op(dst[i], src[i])`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
}

/// Receives the monomorphized scalar rule of a binary operator.
pub trait BinaryKernel<T: WithDType> {
    type Output;
    fn run<F: Fn(T, T) -> T>(self, rule: F) -> Self::Output;
}

struct Scalar<T>(T, T);

impl<T: WithDType> BinaryKernel<T> for Scalar<T> {
    type Output = T;

    fn run<F: Fn(T, T) -> T>(self, rule: F) -> T {
        rule(self.0, self.1)
    }
}

struct ZipUnit<'a, T> {
    dst: &'a mut [T],
    src: &'a [T],
    plan: &'a BinaryLoop,
}

impl<T: WithDType> BinaryKernel<T> for ZipUnit<'_, T> {
    type Output = ();

    fn run<F: Fn(T, T) -> T>(self, rule: F) {
        let n = self.plan.bound;
        for &(d, s) in &self.plan.offsets {
            for (x, &y) in self.dst[d..d + n].iter_mut().zip(&self.src[s..s + n]) {
                *x = rule(*x, y);
            }
        }
    }
}

struct ZipStep<'a, T> {
    dst: &'a mut [T],
    src: &'a [T],
    plan: &'a BinaryLoop,
}

impl<T: WithDType> BinaryKernel<T> for ZipStep<'_, T> {
    type Output = ();

    fn run<F: Fn(T, T) -> T>(self, rule: F) {
        let plan = self.plan;
        for &(d, s) in &plan.offsets {
            let (mut p, mut q) = (d, s);
            for _ in 0..plan.bound {
                self.dst[p] = rule(self.dst[p], self.src[q]);
                p += plan.dst_step;
                q += plan.src_step;
            }
        }
    }
}

struct ZipGeneric<'a, T> {
    dst: &'a mut Buffer<T>,
    src: &'a Buffer<T>,
    plan: &'a BinaryLoop,
}

impl<T: WithDType> BinaryKernel<T> for ZipGeneric<'_, T> {
    type Output = ();

    fn run<F: Fn(T, T) -> T>(self, rule: F) {
        let plan = self.plan;
        for &(d, s) in &plan.offsets {
            let (mut p, mut q) = (d, s);
            for _ in 0..plan.bound {
                let v = rule(self.dst.get(p), self.src.get(q));
                self.dst.set(p, v);
                p += plan.dst_step;
                q += plan.src_step;
            }
        }
    }
}

impl BinaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Min => "min",
            BinaryOp::Max => "max",
        }
    }

    /// Match the variant and pass its scalar rule to `kernel`.
    pub fn with_rule<T: WithDType, K: BinaryKernel<T>>(&self, kernel: K) -> K::Output {
        match self {
            BinaryOp::Add => kernel.run(|a: T, b: T| a.add(b)),
            BinaryOp::Sub => kernel.run(|a: T, b: T| a.sub(b)),
            BinaryOp::Mul => kernel.run(|a: T, b: T| a.mul(b)),
            BinaryOp::Div => kernel.run(|a: T, b: T| a.div(b)),
            // NaN on the left wins; NaN on the right is ignored
            BinaryOp::Min => kernel.run(|a: T, b: T| if b < a { b } else { a }),
            BinaryOp::Max => kernel.run(|a: T, b: T| if b > a { b } else { a }),
        }
    }

    /// The scalar rule.
    pub fn apply<T: WithDType>(&self, a: T, b: T) -> T {
        self.with_rule(Scalar(a, b))
    }

    pub fn apply_unit<T: WithDType>(&self, dst: &mut [T], src: &[T], plan: &BinaryLoop) {
        self.with_rule(ZipUnit { dst, src, plan })
    }

    pub fn apply_step<T: WithDType>(&self, dst: &mut [T], src: &[T], plan: &BinaryLoop) {
        self.with_rule(ZipStep { dst, src, plan })
    }

    pub fn apply_generic<T: WithDType>(&self, dst: &mut Buffer<T>, src: &Buffer<T>, plan: &BinaryLoop) {
        self.with_rule(ZipGeneric { dst, src, plan })
    }

    /// Pick the loop for the pair of buffers and run it.
    ///
    /// The fast paths need both sides dense; the unit path additionally
    /// needs both steps to be 1.
    pub fn apply_buffers<T: WithDType>(
        &self,
        dst: &mut Buffer<T>,
        src: &Buffer<T>,
        plan: &BinaryLoop,
    ) -> LoopKind {
        let vectorizable = dst.supports_vectorization() && src.supports_vectorization();
        let kind = match LoopKind::select(vectorizable, plan.dst_step) {
            LoopKind::Unit if plan.src_step != 1 => LoopKind::Step,
            kind => kind,
        };
        match (kind, dst, src) {
            (LoopKind::Unit, Buffer::Dense(d), Buffer::Dense(s)) => self.apply_unit(d, s, plan),
            (LoopKind::Step, Buffer::Dense(d), Buffer::Dense(s)) => self.apply_step(d, s, plan),
            (_, dst, src) => self.apply_generic(dst, src, plan),
        }
        kind
    }

    /// Apply in place: `dst` elements addressed by `dst_layout` are combined
    /// with `src` elements addressed by `src_layout`. Shapes must agree and
    /// both storages must hold the same kind.
    pub fn apply_storage(
        &self,
        dst: &mut Storage,
        dst_layout: &Layout,
        src: &Storage,
        src_layout: &Layout,
    ) -> Result<LoopKind> {
        fn typed<T: WithDType>(
            op: &BinaryOp,
            dst: &mut Buffer<T>,
            src: &Storage,
            plan: &BinaryLoop,
        ) -> Result<LoopKind> {
            Ok(op.apply_buffers(dst, src.typed::<T>()?, plan))
        }

        if dst_layout.shape() != src_layout.shape() {
            return Err(crate::Error::ShapeMismatch {
                expected: dst_layout.shape().clone(),
                got: src_layout.shape().clone(),
            });
        }
        let plan = BinaryLoop::new(dst_layout, src_layout);
        let kind = crate::with_buffer!(dst, b => typed(self, b, src, &plan))?;
        tracing::trace!(op = self.name(), ?kind, runs = plan.offsets.len(), "binary");
        Ok(kind)
    }
}
