use std::collections::HashSet;

use strata_core::{Array, Error, Result};

use crate::tensor::{Tensor, TensorId};

/// Every node reachable from `root` through backward edges, sorted by
/// descending id (root first, leaves last).
pub fn reachable(root: &Tensor) -> Vec<Tensor> {
    let mut seen = HashSet::new();
    let mut nodes = Vec::new();
    let mut stack = vec![root.clone()];
    seen.insert(root.id());
    while let Some(t) = stack.pop() {
        for edge in t.edges() {
            let target = edge.target();
            if seen.insert(target.id()) {
                stack.push(target.clone());
            }
        }
        nodes.push(t);
    }
    nodes.sort_by_key(|t| std::cmp::Reverse(t.id()));
    nodes
}

/// Backpropagate from `root`, seeding its gradient with ones.
pub fn backward(root: &Tensor) -> Result<()> {
    backward_with(root, &root.value().ones_like())
}

/// Backpropagate from `root` with the caller-supplied seed `grad`.
///
/// Accumulators of interior nodes are cleared first; leaf accumulators keep
/// what earlier passes left there, so repeated passes without
/// [`zero_grad`] sum into the leaves.
pub fn backward_with(root: &Tensor, grad: &Array) -> Result<()> {
    if grad.shape() != root.shape() {
        return Err(Error::ShapeMismatch {
            expected: root.shape().clone(),
            got: grad.shape().clone(),
        });
    }
    let nodes = reachable(root);
    let _span = tracing::debug_span!("backward", root = ?root.id(), nodes = nodes.len()).entered();

    for node in nodes.iter().filter(|n| !n.is_leaf()) {
        node.zero_grad();
    }
    root.set_grad(grad)?;

    for node in &nodes {
        let Some(g) = node.grad() else {
            continue;
        };
        for edge in node.edges() {
            let _edge = tracing::trace_span!("edge", op = node.op(), from = ?node.id(), to = ?edge.target().id())
                .entered();
            let contribution = edge.contribution(&g)?;
            edge.target().add_grad(&contribution)?;
        }
    }
    Ok(())
}

/// Clear the accumulator of every node reachable from `root`.
pub fn zero_grad(root: &Tensor) {
    for node in reachable(root) {
        node.zero_grad();
    }
}

/// Ids of the leaves reachable from `root` that require a gradient.
pub fn parameters(root: &Tensor) -> Vec<TensorId> {
    reachable(root)
        .into_iter()
        .filter(|t| t.is_leaf() && t.requires_grad())
        .map(|t| t.id())
        .collect()
}
