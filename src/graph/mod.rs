//! The realizer: walks a lazy DAG bottom-up, executes kernels, and attaches
//! storage to nodes. Realized nodes cache their storage, so a second
//! realization of any subgraph is free.

pub(crate) mod autograd;

use crate::array::Array;
use crate::backend::cpu;
use crate::errors::{PgError, PgResult};
use crate::op::Op;
use crate::profiler;
use crate::storage::{Buffer, Storage};
use crate::view::View;

/// Realize `root` and everything it depends on.
pub(crate) fn realize(root: &Array) -> PgResult<()> {
    if root.node.consumed.get() {
        return Err(PgError::InplaceConflict {
            reason: format!("value of {} was taken by an in-place op", root.id()),
        });
    }
    if root.is_realized() {
        return Ok(());
    }
    for input in root.node.op.inputs() {
        realize(input)?;
    }
    compute(root)
}

fn realized_storage(a: &Array) -> Storage {
    a.storage().expect("inputs are realized before dispatch")
}

/// Take an in-place destination out of its node: the buffer must be packed
/// and uniquely owned, and the node is marked consumed so later reads fail
/// instead of silently seeing the overwritten value.
fn take_inplace_target(a: &Array) -> PgResult<Storage> {
    if !a.view().is_contiguous() {
        return Err(PgError::InplaceConflict {
            reason: format!("destination {} is not contiguous", a.id()),
        });
    }
    {
        let slot = a.node.storage.borrow();
        let storage = slot.as_ref().expect("inputs are realized before dispatch");
        if !storage.is_unique() {
            return Err(PgError::InplaceConflict {
                reason: format!("storage of {} is shared", a.id()),
            });
        }
    }
    let storage = a
        .node
        .storage
        .borrow_mut()
        .take()
        .expect("inputs are realized before dispatch");
    a.node.consumed.set(true);
    Ok(storage)
}

fn compute(array: &Array) -> PgResult<()> {
    let view = array.view();
    let dtype = array.dtype();
    let len = view.len();

    // Movement ops never allocate: the node's view indexes straight into
    // the input's buffer.
    if array.node.op.is_movement() {
        let input = array.node.op.inputs()[0].clone();
        array.attach_storage(realized_storage(&input));
        return Ok(());
    }

    if array.node.inplace {
        return compute_inplace(array);
    }

    let buf = match &array.node.op {
        Op::Buffer => unreachable!("buffer leaves carry storage from construction"),
        Op::Full(value) => cpu::full(*value, len),
        Op::Arange { start, step } => cpu::arange(*start, *step, len, dtype),
        Op::Random { kind, seed } => cpu::random(*kind, *seed, len),
        Op::Unary(op, a) => {
            let sa = realized_storage(a);
            let buf = sa.borrow();
            cpu::unary(*op, &buf, a.view())
        }
        Op::Binary(op, a, b) => {
            let (sa, sb) = (realized_storage(a), realized_storage(b));
            let av = a.view().broadcast_to(view.shape())?;
            let bv = b.view().broadcast_to(view.shape())?;
            let result = cpu::binary(*op, (&sa.borrow(), &av), (&sb.borrow(), &bv));
            result
        }
        Op::Cmp(op, a, b) => {
            let (sa, sb) = (realized_storage(a), realized_storage(b));
            let av = a.view().broadcast_to(view.shape())?;
            let bv = b.view().broadcast_to(view.shape())?;
            let result = cpu::compare(*op, (&sa.borrow(), &av), (&sb.borrow(), &bv));
            result
        }
        Op::Cast(a) => {
            let sa = realized_storage(a);
            let buf = sa.borrow();
            cpu::cast(&buf, a.view(), dtype)
        }
        Op::Reduce(op, a, axes) => {
            let sa = realized_storage(a);
            let buf = sa.borrow();
            cpu::reduce(*op, &buf, a.view(), axes)?
        }
        Op::ArgReduce { max, input, axis } => {
            let sa = realized_storage(input);
            let buf = sa.borrow();
            cpu::arg_reduce(*max, &buf, input.view(), *axis)?
        }
        Op::Matmul(a, b) => {
            let (sa, sb) = (realized_storage(a), realized_storage(b));
            let result = cpu::matmul(
                (&sa.borrow(), a.view()),
                (&sb.borrow(), b.view()),
                view.shape(),
            )?;
            result
        }
        Op::Reshape(a) => {
            let sa = realized_storage(a);
            if a.view().is_contiguous() {
                // free reshape: same packed buffer, new view
                array.attach_storage(sa);
                return Ok(());
            }
            let buf = sa.borrow();
            cpu::gather(&buf, a.view())
        }
        Op::Contiguous(a) => {
            let sa = realized_storage(a);
            let buf = sa.borrow();
            cpu::gather(&buf, a.view())
        }
        Op::Permute(..) | Op::Expand(_) | Op::Unsqueeze(_) | Op::Slice(..) | Op::Detach(_) => {
            unreachable!("movement ops are handled above")
        }
    };

    let storage = Storage::new(buf);
    profiler::record_op(
        array.id(),
        array.node.op.name(),
        view.shape(),
        dtype,
        storage.size_in_bytes(),
    );
    tracing::trace!(id = %array.id(), op = array.node.op.name(), "realized");
    array.attach_storage(storage);
    Ok(())
}

fn compute_inplace(array: &Array) -> PgResult<()> {
    match &array.node.op {
        Op::Unary(op, a) => {
            let target = take_inplace_target(a)?;
            cpu::unary_inplace(*op, &mut target.borrow_mut());
            target.bump_version();
            array.attach_storage(target);
        }
        Op::Binary(op, a, b) => {
            let bv = b.view().broadcast_to(array.view().shape())?;
            if std::rc::Rc::ptr_eq(&a.node, &b.node) {
                // both sides are one node: pack the right read first
                let target = take_inplace_target(a)?;
                let packed = cpu::gather(&target.borrow(), &bv);
                let packed_view = View::contiguous(array.view().shape());
                cpu::binary_inplace(*op, &mut target.borrow_mut(), (&packed, &packed_view));
                target.bump_version();
                array.attach_storage(target);
            } else {
                let sb = realized_storage(b);
                let target = take_inplace_target(a)?;
                cpu::binary_inplace(*op, &mut target.borrow_mut(), (&sb.borrow(), &bv));
                target.bump_version();
                array.attach_storage(target);
            }
        }
        op => unreachable!("{} has no in-place form", op.name()),
    }
    tracing::trace!(id = %array.id(), op = array.node.op.name(), "realized in place");
    Ok(())
}

/// Realize and copy out a gradient buffer. Only autograd needs this; it
/// lives here to keep the storage borrow rules in one module.
pub(crate) fn realized_f32(a: &Array) -> PgResult<Vec<f32>> {
    realize(a)?;
    match a.to_raw()? {
        Buffer::F32(v) => Ok(v),
        b => unreachable!("expected f32 gradient, found {}", b.dtype()),
    }
}
