use crate::dtype::WithDType;
use crate::layout::Layout;
use crate::storage::Buffer;

// StrideLoop — Precomputed iteration plan for one view
//
// Every elementwise or reduction kernel walks a view as a list of runs:
//
//     for p in offsets:            // one entry per run
//         for i in 0..bound:       // elements inside the run
//             visit(p + i * step)
//
// The innermost run is the view's last axis, widened by merging outer axes
// for as long as they are memory-adjacent (stride[i] == stride[i+1] * dim[i+1]).
// A contiguous view therefore collapses to ONE run with step 1, a transposed
// view keeps its large inner step, and a broadcast (expanded) axis shows up
// as step 0. Runs are produced in logical row-major order.
//
// The plan decides which loop variant the dispatcher may pick:
//
//   Unit     — step == 1 on a dense buffer: plain slice iteration, which the
//              compiler auto-vectorizes.
//   Step     — dense buffer, step != 1: indexed slice access.
//   Generic  — storage without a backing slice: get/set per element.
//
// A plan is only valid for the layout it was computed from.

/// Iteration plan over a single view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrideLoop {
    /// Storage position where each run starts.
    pub offsets: Vec<usize>,
    /// Distance between consecutive elements of a run.
    pub step: usize,
    /// Number of elements in each run.
    pub bound: usize,
}

impl StrideLoop {
    /// Build the plan for `layout`.
    pub fn new(layout: &Layout) -> Self {
        if layout.elem_count() == 0 {
            return StrideLoop {
                offsets: vec![],
                step: 1,
                bound: 0,
            };
        }
        // size-1 axes never move the pointer
        let axes: Vec<(usize, usize)> = layout
            .dims()
            .iter()
            .zip(layout.strides())
            .filter(|(&d, _)| d != 1)
            .map(|(&d, &s)| (d, s))
            .collect();
        let Some(&(mut bound, step)) = axes.last() else {
            return StrideLoop {
                offsets: vec![layout.offset()],
                step: 1,
                bound: 1,
            };
        };
        let mut outer = axes.len() - 1;
        while outer > 0 {
            let (d, s) = axes[outer - 1];
            if s != step * bound {
                break;
            }
            bound *= d;
            outer -= 1;
        }
        let offsets = run_offsets(layout.offset(), &axes[..outer]);
        StrideLoop {
            offsets,
            step,
            bound,
        }
    }

    /// Plan for a single lane starting at `base`.
    pub fn lane(base: usize, step: usize, bound: usize) -> Self {
        StrideLoop {
            offsets: vec![base],
            step,
            bound,
        }
    }

    /// Total number of visited positions.
    pub fn len(&self) -> usize {
        self.offsets.len() * self.bound
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Joint iteration plan for a destination and a source view of equal shape.
///
/// Axes are merged only when they merge for *both* layouts, so run `k`
/// visits matching logical elements on each side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryLoop {
    /// `(dst, src)` start positions of each run.
    pub offsets: Vec<(usize, usize)>,
    pub dst_step: usize,
    pub src_step: usize,
    pub bound: usize,
}

impl BinaryLoop {
    /// Build the joint plan. Shapes must already agree.
    pub fn new(dst: &Layout, src: &Layout) -> Self {
        debug_assert_eq!(dst.dims(), src.dims());
        if dst.elem_count() == 0 {
            return BinaryLoop {
                offsets: vec![],
                dst_step: 1,
                src_step: 1,
                bound: 0,
            };
        }
        let axes: Vec<(usize, usize, usize)> = dst
            .dims()
            .iter()
            .zip(dst.strides().iter().zip(src.strides()))
            .filter(|(&d, _)| d != 1)
            .map(|(&d, (&ds, &ss))| (d, ds, ss))
            .collect();
        let Some(&(mut bound, dst_step, src_step)) = axes.last() else {
            return BinaryLoop {
                offsets: vec![(dst.offset(), src.offset())],
                dst_step: 1,
                src_step: 1,
                bound: 1,
            };
        };
        let mut outer = axes.len() - 1;
        while outer > 0 {
            let (d, ds, ss) = axes[outer - 1];
            if ds != dst_step * bound || ss != src_step * bound {
                break;
            }
            bound *= d;
            outer -= 1;
        }
        let dst_axes: Vec<(usize, usize)> = axes[..outer].iter().map(|&(d, s, _)| (d, s)).collect();
        let src_axes: Vec<(usize, usize)> = axes[..outer].iter().map(|&(d, _, s)| (d, s)).collect();
        let offsets = run_offsets(dst.offset(), &dst_axes)
            .into_iter()
            .zip(run_offsets(src.offset(), &src_axes))
            .collect();
        BinaryLoop {
            offsets,
            dst_step,
            src_step,
            bound,
        }
    }
}

/// Enumerate run start positions over the outer `(dim, stride)` axes in
/// row-major order.
fn run_offsets(base: usize, axes: &[(usize, usize)]) -> Vec<usize> {
    let count: usize = axes.iter().map(|&(d, _)| d).product();
    let mut offsets = Vec::with_capacity(count);
    let mut index = vec![0usize; axes.len()];
    let mut pos = base;
    for _ in 0..count {
        offsets.push(pos);
        for k in (0..axes.len()).rev() {
            let (d, s) = axes[k];
            index[k] += 1;
            pos += s;
            if index[k] < d {
                break;
            }
            pos -= s * d;
            index[k] = 0;
        }
    }
    offsets
}

/// Loop variant chosen by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    Unit,
    Step,
    Generic,
}

impl LoopKind {
    /// Unit when vectorizable with step 1, step when vectorizable otherwise,
    /// generic for everything else.
    pub fn select(vectorizable: bool, step: usize) -> LoopKind {
        match (vectorizable, step) {
            (true, 1) => LoopKind::Unit,
            (true, _) => LoopKind::Step,
            (false, _) => LoopKind::Generic,
        }
    }
}

// Accessors
//
// The three loop variants are expressed as three accessor types over the
// same traversal contract. Operators write their arithmetic once against
// `StridedRead` / `StridedWrite` and get one monomorphized loop per variant
// and per element kind. The operator is matched once per call, never per
// element.

/// Unit-stride access to a dense slice.
pub struct Unit<S>(pub S);

/// Strided access to a dense slice.
pub struct Step<S>(pub S);

/// Element-by-element access through the buffer get/set contract.
pub struct Generic<S>(pub S);

/// Read-only traversal of a plan.
pub trait StridedRead<T: WithDType> {
    fn fold<A, F: FnMut(A, T) -> A>(&self, plan: &StrideLoop, init: A, f: F) -> A;
}

/// In-place traversal of a plan.
pub trait StridedWrite<T: WithDType>: StridedRead<T> {
    fn map<F: Fn(T) -> T>(&mut self, plan: &StrideLoop, f: F);
}

impl<T: WithDType, S: AsRef<[T]>> StridedRead<T> for Unit<S> {
    #[inline]
    fn fold<A, F: FnMut(A, T) -> A>(&self, plan: &StrideLoop, init: A, mut f: F) -> A {
        let data = self.0.as_ref();
        let mut acc = init;
        for &p in &plan.offsets {
            for &x in &data[p..p + plan.bound] {
                acc = f(acc, x);
            }
        }
        acc
    }
}

impl<T: WithDType, S: AsRef<[T]> + AsMut<[T]>> StridedWrite<T> for Unit<S> {
    #[inline]
    fn map<F: Fn(T) -> T>(&mut self, plan: &StrideLoop, f: F) {
        let data = self.0.as_mut();
        for &p in &plan.offsets {
            for x in &mut data[p..p + plan.bound] {
                *x = f(*x);
            }
        }
    }
}

impl<T: WithDType, S: AsRef<[T]>> StridedRead<T> for Step<S> {
    #[inline]
    fn fold<A, F: FnMut(A, T) -> A>(&self, plan: &StrideLoop, init: A, mut f: F) -> A {
        let data = self.0.as_ref();
        let mut acc = init;
        for &p in &plan.offsets {
            let mut q = p;
            for _ in 0..plan.bound {
                acc = f(acc, data[q]);
                q += plan.step;
            }
        }
        acc
    }
}

impl<T: WithDType, S: AsRef<[T]> + AsMut<[T]>> StridedWrite<T> for Step<S> {
    #[inline]
    fn map<F: Fn(T) -> T>(&mut self, plan: &StrideLoop, f: F) {
        let data = self.0.as_mut();
        for &p in &plan.offsets {
            let mut q = p;
            for _ in 0..plan.bound {
                data[q] = f(data[q]);
                q += plan.step;
            }
        }
    }
}

impl<T: WithDType, S: std::ops::Deref<Target = Buffer<T>>> StridedRead<T> for Generic<S> {
    fn fold<A, F: FnMut(A, T) -> A>(&self, plan: &StrideLoop, init: A, mut f: F) -> A {
        let buf: &Buffer<T> = &self.0;
        let mut acc = init;
        for &p in &plan.offsets {
            let mut q = p;
            for _ in 0..plan.bound {
                acc = f(acc, buf.get(q));
                q += plan.step;
            }
        }
        acc
    }
}

impl<T: WithDType, S: std::ops::DerefMut<Target = Buffer<T>>> StridedWrite<T> for Generic<S> {
    fn map<F: Fn(T) -> T>(&mut self, plan: &StrideLoop, f: F) {
        let buf: &mut Buffer<T> = &mut self.0;
        for &p in &plan.offsets {
            let mut q = p;
            for _ in 0..plan.bound {
                let v = buf.get(q);
                buf.set(q, f(v));
                q += plan.step;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Shape;

    #[test]
    fn test_contiguous_collapses_to_one_run() {
        let plan = StrideLoop::new(&Layout::contiguous(Shape::from((2, 3, 4))));
        assert_eq!(plan.offsets, vec![0]);
        assert_eq!(plan.step, 1);
        assert_eq!(plan.bound, 24);
    }

    #[test]
    fn test_transposed_keeps_inner_step() {
        let layout = Layout::contiguous(Shape::from((2, 3))).transpose();
        let plan = StrideLoop::new(&layout);
        // logical order: rows of the [3, 2] view
        assert_eq!(plan.offsets, vec![0, 1, 2]);
        assert_eq!(plan.step, 3);
        assert_eq!(plan.bound, 2);
    }

    #[test]
    fn test_narrowed_columns() {
        let layout = Layout::contiguous(Shape::from((3, 4))).narrow(1, 1, 2).unwrap();
        let plan = StrideLoop::new(&layout);
        assert_eq!(plan.offsets, vec![1, 5, 9]);
        assert_eq!(plan.step, 1);
        assert_eq!(plan.bound, 2);
    }

    #[test]
    fn test_expanded_axis_has_zero_step() {
        let layout = Layout::contiguous(Shape::from((3, 1))).expand(1, 4).unwrap();
        let plan = StrideLoop::new(&layout);
        assert_eq!(plan.offsets, vec![0, 1, 2]);
        assert_eq!(plan.step, 0);
        assert_eq!(plan.bound, 4);
    }

    #[test]
    fn test_scalar_and_empty() {
        let plan = StrideLoop::new(&Layout::contiguous(Shape::scalar()));
        assert_eq!(plan.offsets, vec![0]);
        assert_eq!(plan.bound, 1);
        let empty = StrideLoop::new(&Layout::contiguous(Shape::from((0, 3))));
        assert!(empty.is_empty());
    }

    #[test]
    fn test_plan_matches_strided_iter() {
        let layout = Layout::contiguous(Shape::from((2, 3, 4)))
            .permute(&[1, 0, 2])
            .unwrap()
            .narrow(2, 1, 2)
            .unwrap();
        let plan = StrideLoop::new(&layout);
        let mut visited = vec![];
        for &p in &plan.offsets {
            for i in 0..plan.bound {
                visited.push(p + i * plan.step);
            }
        }
        let expected: Vec<usize> = layout.strided_indices().collect();
        assert_eq!(visited, expected);
    }

    #[test]
    fn test_binary_loop_merges_only_jointly() {
        let dst = Layout::contiguous(Shape::from((2, 3)));
        let src = Layout::contiguous(Shape::from((3, 2))).transpose();
        let plan = BinaryLoop::new(&dst, &src);
        assert_eq!(plan.offsets, vec![(0, 0), (3, 1)]);
        assert_eq!((plan.dst_step, plan.src_step, plan.bound), (1, 2, 3));

        let same = BinaryLoop::new(&dst, &dst);
        assert_eq!(same.offsets, vec![(0, 0)]);
        assert_eq!(same.bound, 6);
    }

    #[test]
    fn test_loop_kind_selection() {
        assert_eq!(LoopKind::select(true, 1), LoopKind::Unit);
        assert_eq!(LoopKind::select(true, 3), LoopKind::Step);
        assert_eq!(LoopKind::select(true, 0), LoopKind::Step);
        assert_eq!(LoopKind::select(false, 1), LoopKind::Generic);
    }

    #[test]
    fn test_accessors_agree() {
        let data = vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
        let plan = StrideLoop::new(&Layout::contiguous(Shape::from(6)));
        let buf = Buffer::Dense(data.clone());
        let sum_unit = Unit(data.as_slice()).fold(&plan, 0.0, |a, x| a + x);
        let sum_step = Step(data.as_slice()).fold(&plan, 0.0, |a, x| a + x);
        let sum_generic = Generic(&buf).fold(&plan, 0.0, |a, x| a + x);
        assert_eq!(sum_unit, 21.0);
        assert_eq!(sum_step, 21.0);
        assert_eq!(sum_generic, 21.0);
    }
}
