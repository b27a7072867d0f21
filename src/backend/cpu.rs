//! CPU kernels. Operands arrive already promoted to a single dtype (the op
//! layer inserts lazy casts), so each kernel dispatches on one buffer
//! variant. Inputs are read through their views; outputs are packed
//! row-major.

use crate::backend::StridedOffsets;
use crate::errors::{PgError, PgResult};
use crate::dtype::DType;
use crate::op::{BinaryOp, CmpOp, RandKind, ReduceOp, UnaryOp};
use crate::storage::Buffer;
use crate::types::Scalar;
use crate::view::{row_major_strides, View};
use num_traits::Zero;
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

// ---------------------------------------------------------------------------
// Initializers

pub fn full(value: Scalar, len: usize) -> Buffer {
    match value {
        Scalar::F32(v) => Buffer::F32(vec![v; len]),
        Scalar::I32(v) => Buffer::I32(vec![v; len]),
        Scalar::B8(v) => Buffer::B8(vec![v; len]),
    }
}

pub fn arange(start: f32, step: f32, len: usize, dtype: DType) -> Buffer {
    match dtype {
        DType::F32 => Buffer::F32((0..len).map(|i| start + i as f32 * step).collect()),
        DType::I32 => Buffer::I32((0..len).map(|i| (start + i as f32 * step) as i32).collect()),
        DType::B8 => unreachable!("arange rejects b8 at construction"),
    }
}

pub fn random(kind: RandKind, seed: u64, len: usize) -> Buffer {
    let mut rng = StdRng::seed_from_u64(seed);
    match kind {
        RandKind::Normal => {
            Buffer::F32((0..len).map(|_| rng.sample(StandardNormal)).collect())
        }
        RandKind::Uniform { low, high } => {
            let dist = Uniform::new(low, high);
            Buffer::F32((0..len).map(|_| rng.sample(dist)).collect())
        }
        RandKind::RandInt { low, high } => {
            Buffer::I32((0..len).map(|_| rng.gen_range(low..high)).collect())
        }
        RandKind::RandBool => Buffer::B8((0..len).map(|_| rng.gen_bool(0.5)).collect()),
    }
}

// ---------------------------------------------------------------------------
// Data movement

/// Pack a view's logical elements into a fresh row-major buffer.
pub fn gather(buf: &Buffer, view: &View) -> Buffer {
    match buf {
        Buffer::F32(d) => Buffer::F32(StridedOffsets::new(view).map(|p| d[p]).collect()),
        Buffer::I32(d) => Buffer::I32(StridedOffsets::new(view).map(|p| d[p]).collect()),
        Buffer::B8(d) => Buffer::B8(StridedOffsets::new(view).map(|p| d[p]).collect()),
    }
}

pub fn cast(buf: &Buffer, view: &View, to: DType) -> Buffer {
    match (buf, to) {
        (_, d) if buf.dtype() == d => gather(buf, view),
        (Buffer::F32(s), DType::I32) => {
            Buffer::I32(StridedOffsets::new(view).map(|p| s[p] as i32).collect())
        }
        (Buffer::F32(s), DType::B8) => {
            Buffer::B8(StridedOffsets::new(view).map(|p| s[p] != 0.0).collect())
        }
        (Buffer::I32(s), DType::F32) => {
            Buffer::F32(StridedOffsets::new(view).map(|p| s[p] as f32).collect())
        }
        (Buffer::I32(s), DType::B8) => {
            Buffer::B8(StridedOffsets::new(view).map(|p| s[p] != 0).collect())
        }
        (Buffer::B8(s), DType::F32) => {
            Buffer::F32(StridedOffsets::new(view).map(|p| s[p] as i32 as f32).collect())
        }
        (Buffer::B8(s), DType::I32) => {
            Buffer::I32(StridedOffsets::new(view).map(|p| s[p] as i32).collect())
        }
        _ => unreachable!("cast covered all dtype pairs"),
    }
}

// ---------------------------------------------------------------------------
// Elementwise

fn f32_unary(op: UnaryOp) -> fn(f32) -> f32 {
    match op {
        UnaryOp::Neg => |v| -v,
        UnaryOp::Exp => f32::exp,
        UnaryOp::Log => f32::ln,
        UnaryOp::Sqrt => f32::sqrt,
        UnaryOp::Sq => |v| v * v,
        UnaryOp::Recip => |v| 1.0 / v,
    }
}

fn i32_unary(op: UnaryOp) -> fn(i32) -> i32 {
    match op {
        UnaryOp::Neg => i32::wrapping_neg,
        UnaryOp::Sq => |v| v.wrapping_mul(v),
        _ => unreachable!("float-only unary op reached an i32 kernel"),
    }
}

pub fn unary(op: UnaryOp, buf: &Buffer, view: &View) -> Buffer {
    match buf {
        Buffer::F32(d) => {
            let f = f32_unary(op);
            Buffer::F32(StridedOffsets::new(view).map(|p| f(d[p])).collect())
        }
        Buffer::I32(d) => {
            let f = i32_unary(op);
            Buffer::I32(StridedOffsets::new(view).map(|p| f(d[p])).collect())
        }
        Buffer::B8(_) => unreachable!("unary operands are promoted past b8"),
    }
}

/// In-place unary over a packed buffer.
pub fn unary_inplace(op: UnaryOp, buf: &mut Buffer) {
    match buf {
        Buffer::F32(d) => {
            let f = f32_unary(op);
            for v in d.iter_mut() {
                *v = f(*v);
            }
        }
        Buffer::I32(d) => {
            let f = i32_unary(op);
            for v in d.iter_mut() {
                *v = f(*v);
            }
        }
        Buffer::B8(_) => unreachable!("unary operands are promoted past b8"),
    }
}

fn f32_binary(op: BinaryOp) -> fn(f32, f32) -> f32 {
    match op {
        BinaryOp::Add => |a, b| a + b,
        BinaryOp::Sub => |a, b| a - b,
        BinaryOp::Mul => |a, b| a * b,
        BinaryOp::Div => |a, b| a / b,
        BinaryOp::Maximum => |a, b| if b > a { b } else { a },
        BinaryOp::Minimum => |a, b| if b < a { b } else { a },
    }
}

fn i32_binary(op: BinaryOp) -> fn(i32, i32) -> i32 {
    match op {
        BinaryOp::Add => i32::wrapping_add,
        BinaryOp::Sub => i32::wrapping_sub,
        BinaryOp::Mul => i32::wrapping_mul,
        BinaryOp::Div => unreachable!("division always promotes to f32"),
        BinaryOp::Maximum => std::cmp::max,
        BinaryOp::Minimum => std::cmp::min,
    }
}

fn zip_map<T: Copy, U>(
    a: &[T],
    av: &View,
    b: &[T],
    bv: &View,
    f: impl Fn(T, T) -> U,
) -> Vec<U> {
    StridedOffsets::new(av)
        .zip(StridedOffsets::new(bv))
        .map(|(i, j)| f(a[i], b[j]))
        .collect()
}

/// Binary elementwise; both views are already broadcast to the output shape.
pub fn binary(op: BinaryOp, a: (&Buffer, &View), b: (&Buffer, &View)) -> Buffer {
    match (a.0, b.0) {
        (Buffer::F32(x), Buffer::F32(y)) => Buffer::F32(zip_map(x, a.1, y, b.1, f32_binary(op))),
        (Buffer::I32(x), Buffer::I32(y)) => Buffer::I32(zip_map(x, a.1, y, b.1, i32_binary(op))),
        _ => unreachable!("binary operands are promoted to a common dtype"),
    }
}

/// In-place binary: the packed left operand is updated; the right view is
/// already broadcast to the left's shape.
pub fn binary_inplace(op: BinaryOp, lhs: &mut Buffer, rhs: (&Buffer, &View)) {
    match (lhs, rhs.0) {
        (Buffer::F32(l), Buffer::F32(r)) => {
            let f = f32_binary(op);
            for (dst, src) in StridedOffsets::new(rhs.1).enumerate() {
                l[dst] = f(l[dst], r[src]);
            }
        }
        (Buffer::I32(l), Buffer::I32(r)) => {
            let f = i32_binary(op);
            for (dst, src) in StridedOffsets::new(rhs.1).enumerate() {
                l[dst] = f(l[dst], r[src]);
            }
        }
        _ => unreachable!("binary operands are promoted to a common dtype"),
    }
}

fn cmp_fn<T: PartialOrd + PartialEq>(op: CmpOp) -> fn(T, T) -> bool {
    match op {
        CmpOp::Eq => |a, b| a == b,
        CmpOp::Lt => |a, b| a < b,
        CmpOp::Le => |a, b| a <= b,
        CmpOp::Gt => |a, b| a > b,
        CmpOp::Ge => |a, b| a >= b,
    }
}

pub fn compare(op: CmpOp, a: (&Buffer, &View), b: (&Buffer, &View)) -> Buffer {
    match (a.0, b.0) {
        (Buffer::F32(x), Buffer::F32(y)) => Buffer::B8(zip_map(x, a.1, y, b.1, cmp_fn(op))),
        (Buffer::I32(x), Buffer::I32(y)) => Buffer::B8(zip_map(x, a.1, y, b.1, cmp_fn(op))),
        (Buffer::B8(x), Buffer::B8(y)) => Buffer::B8(zip_map(x, a.1, y, b.1, cmp_fn(op))),
        _ => unreachable!("comparison operands are promoted to a common dtype"),
    }
}

// ---------------------------------------------------------------------------
// Reductions

/// Accumulation view for a keep-dim reduction: iterates the *input* shape
/// but lands on the packed output position of each element's group.
fn accumulator_view(in_shape: &[usize], out_shape: &[usize], axes: &[usize]) -> View {
    let mut strides = row_major_strides(out_shape);
    for &a in axes {
        strides[a] = 0;
    }
    View::from_parts(in_shape.to_vec(), strides, 0)
}

fn sum_groups<T>(data: &[T], in_view: &View, acc_view: &View, out_len: usize) -> Vec<T>
where
    T: Zero + Copy + std::ops::AddAssign,
{
    let mut acc = vec![T::zero(); out_len];
    for (i, o) in StridedOffsets::new(in_view).zip(StridedOffsets::new(acc_view)) {
        acc[o] += data[i];
    }
    acc
}

fn fold_groups<T: Copy>(
    data: &[T],
    in_view: &View,
    acc_view: &View,
    init: T,
    f: impl Fn(T, T) -> T,
    out_len: usize,
) -> Vec<T> {
    let mut acc = vec![init; out_len];
    for (i, o) in StridedOffsets::new(in_view).zip(StridedOffsets::new(acc_view)) {
        acc[o] = f(acc[o], data[i]);
    }
    acc
}

#[tracing::instrument(skip(buf, view), name = "kernel_reduce")]
pub fn reduce(op: ReduceOp, buf: &Buffer, view: &View, axes: &[usize]) -> PgResult<Buffer> {
    let in_shape = view.shape();
    let mut out_shape = in_shape.to_vec();
    for &a in axes {
        out_shape[a] = 1;
    }
    let out_len: usize = out_shape.iter().product();
    let group: usize = axes.iter().map(|&a| in_shape[a]).product();
    if group == 0 && out_len > 0 && matches!(op, ReduceOp::Max | ReduceOp::Min) {
        return Err(PgError::EmptyReduce { op: op.name() });
    }
    let acc = accumulator_view(in_shape, &out_shape, axes);
    let out = match (buf, op) {
        (Buffer::F32(d), ReduceOp::Sum) => Buffer::F32(sum_groups(d, view, &acc, out_len)),
        (Buffer::F32(d), ReduceOp::Mean) => {
            let mut sums = sum_groups(d, view, &acc, out_len);
            let scale = group as f32;
            for v in sums.iter_mut() {
                // group of zero elements divides 0 by 0, yielding NaN
                *v /= scale;
            }
            Buffer::F32(sums)
        }
        (Buffer::F32(d), ReduceOp::Max) => Buffer::F32(fold_groups(
            d,
            view,
            &acc,
            f32::NEG_INFINITY,
            |a, v| if v > a { v } else { a },
            out_len,
        )),
        (Buffer::F32(d), ReduceOp::Min) => Buffer::F32(fold_groups(
            d,
            view,
            &acc,
            f32::INFINITY,
            |a, v| if v < a { v } else { a },
            out_len,
        )),
        (Buffer::I32(d), ReduceOp::Sum) => Buffer::I32(sum_groups(d, view, &acc, out_len)),
        (Buffer::I32(d), ReduceOp::Max) => {
            Buffer::I32(fold_groups(d, view, &acc, i32::MIN, std::cmp::max, out_len))
        }
        (Buffer::I32(d), ReduceOp::Min) => {
            Buffer::I32(fold_groups(d, view, &acc, i32::MAX, std::cmp::min, out_len))
        }
        (Buffer::B8(d), ReduceOp::Max) => {
            Buffer::B8(fold_groups(d, view, &acc, false, |a, v| a | v, out_len))
        }
        (Buffer::B8(d), ReduceOp::Min) => {
            Buffer::B8(fold_groups(d, view, &acc, true, |a, v| a & v, out_len))
        }
        _ => unreachable!("mean reduces f32, sum promotes past b8"),
    };
    Ok(out)
}

pub fn arg_reduce(want_max: bool, buf: &Buffer, view: &View, axis: usize) -> PgResult<Buffer> {
    let in_shape = view.shape();
    let n = in_shape[axis];
    let mut out_shape = in_shape.to_vec();
    out_shape[axis] = 1;
    let out_len: usize = out_shape.iter().product();
    if n == 0 && out_len > 0 {
        return Err(PgError::EmptyReduce {
            op: if want_max { "argmax" } else { "argmin" },
        });
    }
    let step = view.strides()[axis];
    // Base positions: the input view with the reduced axis pinned to 0.
    let base = View::from_parts(out_shape, view.strides().to_vec(), view.offset());

    fn scan<T: Copy + PartialOrd>(
        data: &[T],
        base: &View,
        n: usize,
        step: isize,
        want_max: bool,
    ) -> Vec<i32> {
        let mut out = Vec::with_capacity(base.len());
        for start in StridedOffsets::new(base) {
            let mut best_pos = start;
            let mut best_idx = 0i32;
            for k in 1..n {
                let pos = (start as isize + k as isize * step) as usize;
                // strict comparison: the smallest index wins ties
                let better = if want_max {
                    data[pos] > data[best_pos]
                } else {
                    data[pos] < data[best_pos]
                };
                if better {
                    best_pos = pos;
                    best_idx = k as i32;
                }
            }
            out.push(best_idx);
        }
        out
    }

    let out = match buf {
        Buffer::F32(d) => scan(d, &base, n, step, want_max),
        Buffer::I32(d) => scan(d, &base, n, step, want_max),
        Buffer::B8(d) => scan(d, &base, n, step, want_max),
    };
    Ok(Buffer::I32(out))
}

// ---------------------------------------------------------------------------
// Matmul

/// Batched matrix multiply. Views are the full operand views (rank >= 2);
/// their leading axes broadcast against each other and `out_shape` is the
/// already-inferred `batch.. x m x n` result shape.
#[tracing::instrument(skip(a, b, out_shape), name = "kernel_matmul")]
pub fn matmul(a: (&Buffer, &View), b: (&Buffer, &View), out_shape: &[usize]) -> PgResult<Buffer> {
    let (av, bv) = (a.1, b.1);
    let ra = av.rank();
    let rb = bv.rank();
    let (m, k) = (av.shape()[ra - 2], av.shape()[ra - 1]);
    let n = bv.shape()[rb - 1];
    let batch = &out_shape[..out_shape.len() - 2];

    let a_batch = View::from_parts(
        av.shape()[..ra - 2].to_vec(),
        av.strides()[..ra - 2].to_vec(),
        av.offset(),
    )
    .broadcast_to(batch)?;
    let b_batch = View::from_parts(
        bv.shape()[..rb - 2].to_vec(),
        bv.strides()[..rb - 2].to_vec(),
        bv.offset(),
    )
    .broadcast_to(batch)?;

    let (a_rs, a_cs) = (av.strides()[ra - 2], av.strides()[ra - 1]);
    let (b_rs, b_cs) = (bv.strides()[rb - 2], bv.strides()[rb - 1]);
    let out_len: usize = out_shape.iter().product();

    let out = match (a.0, b.0) {
        (Buffer::F32(x), Buffer::F32(y)) => {
            let mut out = Vec::with_capacity(out_len);
            for (pa, pb) in StridedOffsets::new(&a_batch).zip(StridedOffsets::new(&b_batch)) {
                for i in 0..m {
                    for j in 0..n {
                        let mut acc = 0f32;
                        for t in 0..k {
                            let ia = (pa as isize + i as isize * a_rs + t as isize * a_cs) as usize;
                            let ib = (pb as isize + t as isize * b_rs + j as isize * b_cs) as usize;
                            acc += x[ia] * y[ib];
                        }
                        out.push(acc);
                    }
                }
            }
            Buffer::F32(out)
        }
        (Buffer::I32(x), Buffer::I32(y)) => {
            let mut out = Vec::with_capacity(out_len);
            for (pa, pb) in StridedOffsets::new(&a_batch).zip(StridedOffsets::new(&b_batch)) {
                for i in 0..m {
                    for j in 0..n {
                        let mut acc = 0i32;
                        for t in 0..k {
                            let ia = (pa as isize + i as isize * a_rs + t as isize * a_cs) as usize;
                            let ib = (pb as isize + t as isize * b_rs + j as isize * b_cs) as usize;
                            acc = acc.wrapping_add(x[ia].wrapping_mul(y[ib]));
                        }
                        out.push(acc);
                    }
                }
            }
            Buffer::I32(out)
        }
        _ => unreachable!("matmul operands are promoted to a common dtype"),
    };
    Ok(out)
}
