//! Reverse-mode differentiation. The tape is the topological order of the
//! `requires_grad` ancestry of the root; each backward rule emits new
//! forward subgraphs that are realized eagerly and accumulated by addition.

use crate::array::Array;
use crate::backend::for_each_index;
use crate::dtype::DType;
use crate::errors::{PgError, PgResult};
use crate::op::{BinaryOp, Op, ReduceOp, UnaryOp};
use crate::storage::Buffer;
use crate::types::ArrayId;
use crate::view::row_major_strides;
use std::collections::{HashMap, HashSet};

pub(crate) fn backward(root: &Array) -> PgResult<()> {
    if !root.requires_grad() {
        tracing::debug!(id = %root.id(), "backward on a non-differentiable root is a no-op");
        return Ok(());
    }
    // A non-scalar root is implicitly summed before the sweep.
    let root = if root.len() == 1 {
        root.clone()
    } else {
        root.sum(&[])?
    };
    super::realize(&root)?;

    let mut order = Vec::new();
    let mut visited = HashSet::new();
    topo(&root, &mut visited, &mut order);

    let mut grads: HashMap<ArrayId, Array> = HashMap::new();
    grads.insert(root.id(), Array::ones(root.shape(), DType::F32)?);

    for node in order.iter().rev() {
        let Some(grad) = grads.get(&node.id()).cloned() else {
            continue;
        };
        super::realize(&grad)?;
        node.set_grad(grad.clone());
        for (input, contrib) in rule(node, &grad)? {
            if !input.requires_grad() {
                continue;
            }
            let contrib = reduce_to_shape(contrib, input.shape())?;
            let acc = match grads.remove(&input.id()) {
                Some(prev) => prev.add(&contrib)?,
                None => contrib,
            };
            super::realize(&acc)?;
            grads.insert(input.id(), acc);
        }
    }
    Ok(())
}

fn topo(node: &Array, visited: &mut HashSet<ArrayId>, order: &mut Vec<Array>) {
    if !node.requires_grad() || !visited.insert(node.id()) {
        return;
    }
    for input in node.node.op.inputs() {
        topo(input, visited, order);
    }
    order.push(node.clone());
}

/// A backward rule may read a forward value only if nothing overwrote it
/// in place since realization.
fn check_value(a: &Array) -> PgResult<()> {
    if a.node.consumed.get() {
        return Err(PgError::InplaceConflict {
            reason: format!(
                "value of {} needed for backward was taken by an in-place op",
                a.id()
            ),
        });
    }
    if let Some(storage) = a.storage() {
        if storage.version() != a.node.seen_version.get() {
            return Err(PgError::InplaceConflict {
                reason: format!(
                    "value of {} needed for backward was overwritten in place",
                    a.id()
                ),
            });
        }
    }
    Ok(())
}

/// Sum a gradient back down to the shape of the input that was broadcast.
fn reduce_to_shape(grad: Array, target: &[usize]) -> PgResult<Array> {
    if grad.shape() == target {
        return Ok(grad);
    }
    let (g_rank, t_rank) = (grad.rank(), target.len());
    let mut axes: Vec<isize> = (0..(g_rank - t_rank) as isize).collect();
    for (i, &t) in target.iter().enumerate() {
        let g_idx = g_rank - t_rank + i;
        if t == 1 && grad.shape()[g_idx] > 1 {
            axes.push(g_idx as isize);
        }
    }
    let summed = if axes.is_empty() {
        grad
    } else {
        grad.sum(&axes)?
    };
    if summed.shape() == target {
        Ok(summed)
    } else {
        summed.reshape(target)
    }
}

/// Per-op backward rule: gradient contributions for each differentiable
/// input, given `g`, the gradient of this node's output.
fn rule(node: &Array, g: &Array) -> PgResult<Vec<(Array, Array)>> {
    let out = match &node.node.op {
        Op::Unary(op, a) => match op {
            UnaryOp::Neg => vec![(a.clone(), g.neg())],
            UnaryOp::Exp => {
                check_value(node)?;
                vec![(a.clone(), g.mul(node)?)]
            }
            UnaryOp::Log => {
                check_value(a)?;
                vec![(a.clone(), g.div(a)?)]
            }
            UnaryOp::Sqrt => {
                check_value(node)?;
                let denom = node.mul(&Array::scalar(2.0f32))?;
                vec![(a.clone(), g.div(&denom)?)]
            }
            UnaryOp::Sq => {
                check_value(a)?;
                let contrib = g.mul(a)?.mul(&Array::scalar(2.0f32))?;
                vec![(a.clone(), contrib)]
            }
            UnaryOp::Recip => {
                check_value(node)?;
                vec![(a.clone(), g.mul(&node.sq())?.neg())]
            }
        },
        Op::Binary(op, a, b) => match op {
            BinaryOp::Add => vec![(a.clone(), g.clone()), (b.clone(), g.clone())],
            BinaryOp::Sub => vec![(a.clone(), g.clone()), (b.clone(), g.neg())],
            BinaryOp::Mul => {
                check_value(a)?;
                check_value(b)?;
                vec![(a.clone(), g.mul(b)?), (b.clone(), g.mul(a)?)]
            }
            BinaryOp::Div => {
                check_value(a)?;
                check_value(b)?;
                let gb = g.mul(a)?.div(&b.sq())?.neg();
                vec![(a.clone(), g.div(b)?), (b.clone(), gb)]
            }
            BinaryOp::Maximum => {
                check_value(a)?;
                check_value(b)?;
                // ties route to the left operand
                let left = a.ge(b)?.astype(DType::F32);
                let right = a.lt(b)?.astype(DType::F32);
                vec![(a.clone(), g.mul(&left)?), (b.clone(), g.mul(&right)?)]
            }
            BinaryOp::Minimum => {
                check_value(a)?;
                check_value(b)?;
                let left = a.le(b)?.astype(DType::F32);
                let right = a.gt(b)?.astype(DType::F32);
                vec![(a.clone(), g.mul(&left)?), (b.clone(), g.mul(&right)?)]
            }
        },
        Op::Reduce(op, a, axes) => match op {
            ReduceOp::Sum => vec![(a.clone(), g.expand(a.shape())?)],
            ReduceOp::Mean => {
                let group: usize = axes.iter().map(|&ax| a.shape()[ax]).product();
                let scale = Array::scalar(1.0 / group as f32);
                let contrib = g.expand(a.shape())?.mul(&scale)?;
                vec![(a.clone(), contrib)]
            }
            ReduceOp::Max | ReduceOp::Min => {
                check_value(a)?;
                check_value(node)?;
                // every position attaining the extremum receives g
                let mask = a.eq(&node.expand(a.shape())?)?.astype(DType::F32);
                let contrib = g.expand(a.shape())?.mul(&mask)?;
                vec![(a.clone(), contrib)]
            }
        },
        Op::Matmul(a, b) => {
            check_value(a)?;
            check_value(b)?;
            let ga = g.matmul(&b.transpose(-2, -1)?)?;
            let gb = a.transpose(-2, -1)?.matmul(g)?;
            vec![(a.clone(), ga), (b.clone(), gb)]
        }
        Op::Permute(a, axes) => {
            let mut inverse = vec![0isize; axes.len()];
            for (i, &p) in axes.iter().enumerate() {
                inverse[p] = i as isize;
            }
            vec![(a.clone(), g.permute(&inverse)?)]
        }
        Op::Reshape(a) | Op::Unsqueeze(a) | Op::Contiguous(a) => {
            vec![(a.clone(), g.reshape(a.shape())?)]
        }
        Op::Expand(a) => vec![(a.clone(), g.clone())],
        Op::Slice(a, geometry) => vec![(a.clone(), scatter_grad(g, a, geometry)?)],
        // Leaves terminate the sweep; Detach, comparisons and arg-reductions
        // never require grad, so no gradient ever flows into them.
        Op::Buffer
        | Op::Full(_)
        | Op::Arange { .. }
        | Op::Random { .. }
        | Op::Cast(_)
        | Op::Cmp(..)
        | Op::ArgReduce { .. }
        | Op::Detach(_) => vec![],
    };
    Ok(out)
}

/// Zero-padded scatter of a slice gradient back into the input's shape.
fn scatter_grad(g: &Array, input: &Array, geometry: &[(usize, isize)]) -> PgResult<Array> {
    let data = super::realized_f32(g)?;
    let in_shape = input.shape();
    let in_strides = row_major_strides(in_shape);
    let mut out = vec![0f32; input.len()];
    let mut next = 0usize;
    for_each_index(g.shape(), |index| {
        let mut pos = 0isize;
        for (axis, &i) in index.iter().enumerate() {
            let (start, step) = geometry[axis];
            pos += (start as isize + i as isize * step) * in_strides[axis];
        }
        out[pos as usize] += data[next];
        next += 1;
    });
    Ok(Array::from_buffer_unchecked(Buffer::F32(out), in_shape))
}
