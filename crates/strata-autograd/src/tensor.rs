use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use strata_core::{Array, DType, Error, Result, Shape};

// Tensor — A node of the define-by-run autodiff graph
//
// A Tensor wraps an Array value that is computed eagerly when the node is
// built. Besides the value, a node owns:
//
//   - a gradient accumulator, unset until the first contribution arrives
//   - a list of backward edges, one per operand that requires a gradient
//
// CONSTRUCTION ORDER:
//
//   Every node draws its id from a global monotonic counter. An operand must
//   exist before the node that consumes it, so operands always have smaller
//   ids than their consumers, and visiting nodes by descending id is a valid
//   reverse topological order for backward.
//
// EDGES:
//
//   A BackEdge is (operand, contribution). The contribution is a pure
//   function from the node's gradient to the operand's gradient share. It
//   captures the forward values it needs by Array handle, which aliases the
//   forward storage without copying.
//
// ACCUMULATION:
//
//   The first contribution is copied into the accumulator, so the
//   accumulator never aliases a contribution; later contributions are added
//   in place. Diamond graphs (one node feeding several consumers) therefore
//   sum their contributions instead of overwriting them.
//
// Accumulation is not synchronized across graphs: concurrent backward passes
// that reach the same node must be serialized by the caller.

/// Unique, monotonically increasing node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId(u64);

impl TensorId {
    /// Generate a new unique id (global atomic counter).
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        TensorId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

type Contribution = Box<dyn Fn(&Array) -> Result<Array> + Send + Sync>;

/// Deferred gradient contribution from a node to one of its operands.
pub struct BackEdge {
    target: Tensor,
    contribution: Contribution,
}

impl BackEdge {
    /// The operand receiving the contribution.
    pub fn target(&self) -> &Tensor {
        &self.target
    }

    /// Evaluate the contribution for the node gradient `grad`.
    pub fn contribution(&self, grad: &Array) -> Result<Array> {
        (self.contribution)(grad)
    }
}

impl fmt::Debug for BackEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BackEdge(target={:?})", self.target.id())
    }
}

struct TensorInner {
    id: TensorId,
    op: &'static str,
    name: Mutex<Option<String>>,
    value: Array,
    grad: Mutex<Option<Array>>,
    requires_grad: bool,
    edges: Vec<BackEdge>,
}

/// A node of the autodiff graph: an eager value plus backward edges.
///
/// Cloning is cheap (one `Arc` increment) and clones are the same node.
#[derive(Clone)]
pub struct Tensor {
    inner: Arc<TensorInner>,
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tensor(id={:?}, op={}, shape={}, dtype={}",
            self.inner.id,
            self.inner.op,
            self.shape(),
            self.dtype()
        )?;
        if let Some(name) = self.name() {
            write!(f, ", name={}", name)?;
        }
        write!(f, ")")
    }
}

/// Collects the edges of a node under construction.
///
/// Edges are only kept for operands that require a gradient, and the node
/// requires a gradient iff at least one edge was kept.
pub struct NodeBuilder {
    op: &'static str,
    value: Array,
    edges: Vec<BackEdge>,
}

impl NodeBuilder {
    /// Register the contribution `f(grad)` for `operand`.
    pub fn edge<F>(mut self, operand: &Tensor, f: F) -> Self
    where
        F: Fn(&Array) -> Result<Array> + Send + Sync + 'static,
    {
        if operand.requires_grad() {
            self.edges.push(BackEdge {
                target: operand.clone(),
                contribution: Box::new(f),
            });
        }
        self
    }

    pub fn build(self) -> Tensor {
        let requires_grad = !self.edges.is_empty();
        Tensor::make(self.op, self.value, requires_grad, self.edges)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // the guarded values are plain Options; a panic elsewhere cannot leave them torn
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Tensor {
    fn make(op: &'static str, value: Array, requires_grad: bool, edges: Vec<BackEdge>) -> Tensor {
        Tensor {
            inner: Arc::new(TensorInner {
                id: TensorId::new(),
                op,
                name: Mutex::new(None),
                value,
                grad: Mutex::new(None),
                requires_grad,
                edges,
            }),
        }
    }

    /// Wrap a materialized value as a leaf node.
    pub fn leaf(value: Array, requires_grad: bool) -> Tensor {
        Tensor::make("leaf", value, requires_grad, Vec::new())
    }

    /// A trainable leaf (`requires_grad = true`).
    pub fn var(value: Array) -> Tensor {
        Tensor::leaf(value, true)
    }

    /// A constant leaf (`requires_grad = false`).
    pub fn constant(value: Array) -> Tensor {
        Tensor::leaf(value, false)
    }

    /// Start an interior node named `op` with the eagerly computed `value`.
    pub fn node(op: &'static str, value: Array) -> NodeBuilder {
        NodeBuilder {
            op,
            value,
            edges: Vec::new(),
        }
    }

    // Accessors

    pub fn id(&self) -> TensorId {
        self.inner.id
    }

    /// Name of the operator that built this node (`"leaf"` for leaves).
    pub fn op(&self) -> &'static str {
        self.inner.op
    }

    pub fn name(&self) -> Option<String> {
        lock(&self.inner.name).clone()
    }

    /// Attach a name for identification in logs and debug output.
    pub fn set_name(&self, name: impl Into<String>) {
        *lock(&self.inner.name) = Some(name.into());
    }

    /// Builder-style [`set_name`](Self::set_name).
    pub fn with_name(self, name: impl Into<String>) -> Tensor {
        self.set_name(name);
        self
    }

    /// The forward value.
    pub fn value(&self) -> &Array {
        &self.inner.value
    }

    pub fn shape(&self) -> &Shape {
        self.inner.value.shape()
    }

    pub fn dims(&self) -> &[usize] {
        self.inner.value.dims()
    }

    pub fn rank(&self) -> usize {
        self.inner.value.rank()
    }

    pub fn dim(&self, axis: usize) -> Result<usize> {
        self.inner.value.dim(axis)
    }

    pub fn elem_count(&self) -> usize {
        self.inner.value.elem_count()
    }

    pub fn dtype(&self) -> DType {
        self.inner.value.dtype()
    }

    pub fn requires_grad(&self) -> bool {
        self.inner.requires_grad
    }

    pub fn is_leaf(&self) -> bool {
        self.inner.edges.is_empty()
    }

    pub fn edges(&self) -> &[BackEdge] {
        &self.inner.edges
    }

    // Gradient accumulator

    /// The accumulated gradient, if any contribution arrived.
    pub fn grad(&self) -> Option<Array> {
        lock(&self.inner.grad).clone()
    }

    /// Add `grad` into the accumulator. The first contribution is copied.
    pub fn add_grad(&self, grad: &Array) -> Result<()> {
        if grad.shape() != self.shape() {
            return Err(Error::ShapeMismatch {
                expected: self.shape().clone(),
                got: grad.shape().clone(),
            });
        }
        let mut slot = lock(&self.inner.grad);
        match slot.as_ref() {
            Some(acc) => acc.add_(grad)?,
            None => *slot = Some(grad.cast(self.dtype())?),
        }
        Ok(())
    }

    /// Replace the accumulator with a copy of `grad`.
    pub fn set_grad(&self, grad: &Array) -> Result<()> {
        if grad.shape() != self.shape() {
            return Err(Error::ShapeMismatch {
                expected: self.shape().clone(),
                got: grad.shape().clone(),
            });
        }
        *lock(&self.inner.grad) = Some(grad.cast(self.dtype())?);
        Ok(())
    }

    /// Clear the accumulator of this node only.
    pub fn zero_grad(&self) {
        *lock(&self.inner.grad) = None;
    }

    /// Backpropagate from this node with a ones-like seed.
    pub fn backward(&self) -> Result<()> {
        crate::backward::backward(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec_array(data: &[f64]) -> Array {
        Array::from_f64_slice(data, data.len(), DType::F64).unwrap()
    }

    #[test]
    fn test_ids_follow_construction_order() {
        let a = Tensor::var(vec_array(&[1.0]));
        let b = Tensor::var(vec_array(&[2.0]));
        assert!(a.id() < b.id());
        assert_eq!(a.clone().id(), a.id());
    }

    #[test]
    fn test_edges_only_for_grad_operands() {
        let x = Tensor::var(vec_array(&[1.0, 2.0]));
        let c = Tensor::constant(vec_array(&[3.0, 4.0]));
        let node = Tensor::node("scratch", vec_array(&[0.0, 0.0]))
            .edge(&x, |g| Ok(g.clone()))
            .edge(&c, |g| Ok(g.clone()))
            .build();
        assert_eq!(node.edges().len(), 1);
        assert_eq!(node.edges()[0].target().id(), x.id());
        assert!(node.requires_grad());

        let frozen = Tensor::node("scratch", vec_array(&[0.0]))
            .edge(&c, |g| Ok(g.clone()))
            .build();
        assert!(!frozen.requires_grad());
        assert!(frozen.is_leaf());
    }

    #[test]
    fn test_accumulator_copies_then_adds() {
        let x = Tensor::var(vec_array(&[0.0, 0.0]));
        let g = vec_array(&[1.0, 2.0]);
        x.add_grad(&g).unwrap();
        x.add_grad(&g).unwrap();
        assert_eq!(x.grad().unwrap().to_f64_vec().unwrap(), vec![2.0, 4.0]);
        // the caller's array is untouched
        assert_eq!(g.to_f64_vec().unwrap(), vec![1.0, 2.0]);
        x.zero_grad();
        assert!(x.grad().is_none());
    }

    #[test]
    fn test_accumulator_rejects_wrong_shape() {
        let x = Tensor::var(vec_array(&[0.0, 0.0]));
        assert!(x.add_grad(&vec_array(&[1.0, 2.0, 3.0])).is_err());
        assert!(x.set_grad(&vec_array(&[1.0])).is_err());
    }

    #[test]
    fn test_names() {
        let x = Tensor::var(vec_array(&[1.0])).with_name("weight");
        assert_eq!(x.name().as_deref(), Some("weight"));
        assert!(format!("{:?}", x).contains("name=weight"));
    }
}
