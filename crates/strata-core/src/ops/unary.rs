use crate::dtype::WithDType;
use crate::error::Result;
use crate::layout::Layout;
use crate::loops::{Generic, LoopKind, Step, StrideLoop, StridedWrite, Unit};
use crate::ops::ensure_kind;
use crate::storage::{Buffer, Storage};

/// Comparison used by threshold masks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CmpOp {
    /// Evaluate `lhs <cmp> rhs`. Any comparison involving NaN is false,
    /// except `Ne`.
    pub fn eval(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
        }
    }

    /// The comparison that is true exactly when `self` is false
    /// (for non-NaN operands).
    pub fn negate(&self) -> CmpOp {
        match self {
            CmpOp::Eq => CmpOp::Ne,
            CmpOp::Ne => CmpOp::Eq,
            CmpOp::Gt => CmpOp::Le,
            CmpOp::Ge => CmpOp::Lt,
            CmpOp::Lt => CmpOp::Ge,
            CmpOp::Le => CmpOp::Gt,
        }
    }
}

/// Element-wise unary operators.
///
/// Parameters are stored as f64 and converted to the element kind once per
/// call. Comparisons and clamps are evaluated in f64, which is exact for
/// every supported kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    /// Overwrite every element with a constant.
    Fill(f64),
    Neg,
    Abs,
    Sqr,
    Sqrt,
    Exp,
    Log,
    Log1p,
    Tanh,
    Sigmoid,
    Sin,
    Cos,
    Floor,
    Ceil,
    /// Round half to even.
    Rint,
    Pow(f64),
    Clamp { min: f64, max: f64 },
    /// `max(x, t)`; NaN elements stay NaN.
    MaxScalar(f64),
    /// 1 where `x <cmp> t` holds, 0 elsewhere.
    CompareMask(CmpOp, f64),
    /// Replace NaN with the given value.
    NanToNum(f64),
}

/// Receives the monomorphized scalar rule of a unary operator.
///
/// `UnaryOp::with_rule` matches the variant once and hands the resulting
/// closure to the kernel, so each loop is compiled once per rule.
pub trait UnaryKernel<T: WithDType> {
    type Output;
    fn run<F: Fn(T) -> T>(self, rule: F) -> Self::Output;
}

struct Scalar<T>(T);

impl<T: WithDType> UnaryKernel<T> for Scalar<T> {
    type Output = T;

    fn run<F: Fn(T) -> T>(self, rule: F) -> T {
        rule(self.0)
    }
}

struct Map<'a, W> {
    access: &'a mut W,
    plan: &'a StrideLoop,
}

impl<T: WithDType, W: StridedWrite<T>> UnaryKernel<T> for Map<'_, W> {
    type Output = ();

    fn run<F: Fn(T) -> T>(self, rule: F) {
        self.access.map(self.plan, rule)
    }
}

#[inline]
fn via_f64<T: WithDType>(x: T, f: impl Fn(f64) -> f64) -> T {
    T::from_f64(f(x.to_f64()))
}

impl UnaryOp {
    /// Short name used in errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            UnaryOp::Fill(_) => "fill",
            UnaryOp::Neg => "neg",
            UnaryOp::Abs => "abs",
            UnaryOp::Sqr => "sqr",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Exp => "exp",
            UnaryOp::Log => "log",
            UnaryOp::Log1p => "log1p",
            UnaryOp::Tanh => "tanh",
            UnaryOp::Sigmoid => "sigmoid",
            UnaryOp::Sin => "sin",
            UnaryOp::Cos => "cos",
            UnaryOp::Floor => "floor",
            UnaryOp::Ceil => "ceil",
            UnaryOp::Rint => "rint",
            UnaryOp::Pow(_) => "pow",
            UnaryOp::Clamp { .. } => "clamp",
            UnaryOp::MaxScalar(_) => "max_scalar",
            UnaryOp::CompareMask(..) => "compare_mask",
            UnaryOp::NanToNum(_) => "nan_to_num",
        }
    }

    /// Operators with no meaningful integer definition.
    pub fn is_float_only(&self) -> bool {
        matches!(
            self,
            UnaryOp::Sqrt
                | UnaryOp::Exp
                | UnaryOp::Log
                | UnaryOp::Log1p
                | UnaryOp::Tanh
                | UnaryOp::Sigmoid
                | UnaryOp::Sin
                | UnaryOp::Cos
                | UnaryOp::Pow(_)
        )
    }

    /// Match the variant and pass its scalar rule to `kernel`.
    pub fn with_rule<T: WithDType, K: UnaryKernel<T>>(&self, kernel: K) -> K::Output {
        match *self {
            UnaryOp::Fill(v) => {
                let v = T::from_f64(v);
                kernel.run(move |_| v)
            }
            UnaryOp::Neg => kernel.run(|x: T| T::zero().sub(x)),
            UnaryOp::Abs => kernel.run(|x: T| if x < T::zero() { T::zero().sub(x) } else { x }),
            UnaryOp::Sqr => kernel.run(|x: T| x.mul(x)),
            UnaryOp::Sqrt => kernel.run(|x: T| via_f64(x, f64::sqrt)),
            UnaryOp::Exp => kernel.run(|x: T| via_f64(x, f64::exp)),
            UnaryOp::Log => kernel.run(|x: T| via_f64(x, f64::ln)),
            UnaryOp::Log1p => kernel.run(|x: T| via_f64(x, f64::ln_1p)),
            UnaryOp::Tanh => kernel.run(|x: T| via_f64(x, f64::tanh)),
            UnaryOp::Sigmoid => kernel.run(|x: T| via_f64(x, |v| 1.0 / (1.0 + (-v).exp()))),
            UnaryOp::Sin => kernel.run(|x: T| via_f64(x, f64::sin)),
            UnaryOp::Cos => kernel.run(|x: T| via_f64(x, f64::cos)),
            UnaryOp::Floor => kernel.run(|x: T| via_f64(x, f64::floor)),
            UnaryOp::Ceil => kernel.run(|x: T| via_f64(x, f64::ceil)),
            UnaryOp::Rint => kernel.run(|x: T| via_f64(x, f64::round_ties_even)),
            UnaryOp::Pow(p) => kernel.run(move |x: T| via_f64(x, |v| v.powf(p))),
            UnaryOp::Clamp { min, max } => kernel.run(move |x: T| {
                let v = x.to_f64();
                if v < min {
                    T::from_f64(min)
                } else if v > max {
                    T::from_f64(max)
                } else {
                    x
                }
            }),
            UnaryOp::MaxScalar(t) => kernel.run(move |x: T| {
                if x.to_f64() < t {
                    T::from_f64(t)
                } else {
                    x
                }
            }),
            UnaryOp::CompareMask(cmp, t) => kernel.run(move |x: T| {
                if cmp.eval(x.to_f64(), t) {
                    T::one()
                } else {
                    T::zero()
                }
            }),
            UnaryOp::NanToNum(r) => {
                let r = T::from_f64(r);
                kernel.run(move |x: T| if x.is_nan() { r } else { x })
            }
        }
    }

    /// The scalar rule.
    pub fn apply<T: WithDType>(&self, x: T) -> T {
        self.with_rule(Scalar(x))
    }

    /// Unit-stride loop over a dense slice.
    pub fn apply_unit<T: WithDType>(&self, data: &mut [T], plan: &StrideLoop) {
        self.with_rule(Map {
            access: &mut Unit(data),
            plan,
        })
    }

    /// Strided loop over a dense slice.
    pub fn apply_step<T: WithDType>(&self, data: &mut [T], plan: &StrideLoop) {
        self.with_rule(Map {
            access: &mut Step(data),
            plan,
        })
    }

    /// Get/set loop usable on any buffer.
    pub fn apply_generic<T: WithDType>(&self, buf: &mut Buffer<T>, plan: &StrideLoop) {
        self.with_rule(Map {
            access: &mut Generic(buf),
            plan,
        })
    }

    /// Pick the loop for `buf` and run it. Returns the variant that ran.
    pub fn apply_buffer<T: WithDType>(&self, buf: &mut Buffer<T>, plan: &StrideLoop) -> LoopKind {
        let kind = LoopKind::select(buf.supports_vectorization(), plan.step);
        match (kind, buf) {
            (LoopKind::Unit, Buffer::Dense(data)) => self.apply_unit(data, plan),
            (LoopKind::Step, Buffer::Dense(data)) => self.apply_step(data, plan),
            (_, buf) => self.apply_generic(buf, plan),
        }
        kind
    }

    /// Apply in place to the elements of `storage` addressed by `layout`.
    pub fn apply_storage(&self, storage: &mut Storage, layout: &Layout) -> Result<LoopKind> {
        ensure_kind(self.name(), self.is_float_only(), storage.dtype())?;
        let plan = StrideLoop::new(layout);
        let kind = crate::with_buffer!(storage, b => self.apply_buffer(b, &plan));
        tracing::trace!(op = self.name(), ?kind, runs = plan.offsets.len(), "unary");
        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dtype::DType;
    use crate::error::Error;
    use crate::shape::Shape;

    #[test]
    fn test_scalar_rules() {
        assert_eq!(UnaryOp::Neg.apply(3.0f64), -3.0);
        assert_eq!(UnaryOp::Abs.apply(-4i32), 4);
        assert_eq!(UnaryOp::Sqr.apply(3u8), 9);
        assert_eq!(UnaryOp::Rint.apply(2.5f64), 2.0);
        assert_eq!(UnaryOp::Rint.apply(3.5f32), 4.0);
        assert_eq!(UnaryOp::Clamp { min: 0.0, max: 1.0 }.apply(7i32), 1);
        assert_eq!(UnaryOp::MaxScalar(0.0).apply(-2.0f64), 0.0);
        assert!(UnaryOp::MaxScalar(0.0).apply(f64::NAN).is_nan());
        assert_eq!(UnaryOp::CompareMask(CmpOp::Gt, 1.0).apply(2.0f32), 1.0);
        assert_eq!(UnaryOp::CompareMask(CmpOp::Gt, 1.0).apply(1.0f32), 0.0);
        assert_eq!(UnaryOp::NanToNum(0.0).apply(f64::NAN), 0.0);
        assert_eq!(UnaryOp::Fill(5.0).apply(1u8), 5);
    }

    #[test]
    fn test_sigmoid_tanh_values() {
        assert!((UnaryOp::Sigmoid.apply(0.0f64) - 0.5).abs() < 1e-12);
        assert!((UnaryOp::Tanh.apply(0.5f64) - 0.5f64.tanh()).abs() < 1e-15);
    }

    #[test]
    fn test_negate_compare() {
        for cmp in [CmpOp::Eq, CmpOp::Ne, CmpOp::Gt, CmpOp::Ge, CmpOp::Lt, CmpOp::Le] {
            for (a, b) in [(1.0, 2.0), (2.0, 2.0), (3.0, 2.0)] {
                assert_ne!(cmp.eval(a, b), cmp.negate().eval(a, b));
            }
        }
    }

    #[test]
    fn test_float_only_rejects_integers_before_looping() {
        let mut s = Storage::from_f64_slice(DType::I32, &[1.0, 2.0]);
        let layout = Layout::contiguous(Shape::from(2));
        let err = UnaryOp::Exp.apply_storage(&mut s, &layout).unwrap_err();
        assert!(matches!(err, Error::Unsupported { op: "exp", dtype: DType::I32 }));
        assert_eq!(s.get_f64(0), 1.0);
    }

    #[test]
    fn test_loop_variants_agree() {
        let data: Vec<f64> = (0..12).map(|i| i as f64 * 0.25 - 1.0).collect();
        let layout = Layout::contiguous(Shape::from((3, 4))).transpose();
        let plan = StrideLoop::new(&layout);
        assert_eq!(plan.step, 4);

        let mut step = data.clone();
        UnaryOp::Tanh.apply_step(&mut step, &plan);

        let mut generic = Buffer::Dense(data.clone());
        UnaryOp::Tanh.apply_generic(&mut generic, &plan);

        let mut unit = data.clone();
        UnaryOp::Tanh.apply_unit(&mut unit, &StrideLoop::new(&Layout::contiguous(Shape::from(12))));

        assert_eq!(generic.as_slice().unwrap(), step.as_slice());
        assert_eq!(unit, step);
    }

    #[test]
    fn test_dispatch_reports_variant() {
        let layout = Layout::contiguous(Shape::from((2, 3)));
        let mut dense = Storage::filled(DType::F32, 6, 2.0);
        assert_eq!(UnaryOp::Sqr.apply_storage(&mut dense, &layout).unwrap(), LoopKind::Unit);
        assert_eq!(
            UnaryOp::Sqr.apply_storage(&mut dense, &layout.transpose()).unwrap(),
            LoopKind::Step
        );
        assert_eq!(dense.get_f64(5), 16.0);
    }
}
