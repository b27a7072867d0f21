//! The lazy array: a cheap handle on an immutable DAG node. Building an
//! `Array` records an op; nothing is computed until `eval`, `item`,
//! `to_raw` or `backward` forces realization.

mod math;

use crate::dtype::DType;
use crate::errors::{PgError, PgResult};
use crate::graph;
use crate::op::{Op, RandKind};
use crate::profiler;
use crate::rng;
use crate::storage::{Buffer, Storage};
use crate::types::{ArrayId, Scalar};
use crate::view::{SliceSpec, View};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub(crate) struct ArrayNode {
    pub(crate) id: ArrayId,
    pub(crate) op: Op,
    pub(crate) view: View,
    pub(crate) dtype: DType,
    pub(crate) requires_grad: Cell<bool>,
    /// The kernel writes into the input's storage instead of allocating.
    pub(crate) inplace: bool,
    /// Set when an in-place op took this node's storage; the value is gone
    /// and any later read is an `InplaceConflict`.
    pub(crate) consumed: Cell<bool>,
    pub(crate) storage: RefCell<Option<Storage>>,
    /// Storage version observed when this node realized; backward rules
    /// refuse to read a value whose storage moved on since.
    pub(crate) seen_version: Cell<u64>,
    pub(crate) grad: RefCell<Option<Array>>,
}

/// A node in the lazy computation DAG.
///
/// Cloning an `Array` clones a handle, not data; two clones are the same
/// node and share identity (`id`), storage and gradient.
pub struct Array {
    pub(crate) node: Rc<ArrayNode>,
}

impl Clone for Array {
    fn clone(&self) -> Self {
        Array {
            node: Rc::clone(&self.node),
        }
    }
}

fn validate_shape(op: &'static str, shape: &[usize]) -> PgResult<()> {
    if shape.contains(&0) {
        return Err(PgError::ShapeMismatch {
            op,
            lhs: shape.to_vec(),
            rhs: vec![],
        });
    }
    Ok(())
}

impl Array {
    pub(crate) fn new_node(op: Op, view: View, dtype: DType) -> Array {
        let requires_grad = match &op {
            Op::Detach(_) => false,
            o if o.is_leaf() => dtype.is_float(),
            o => dtype.is_float() && o.inputs().iter().any(|a| a.requires_grad()),
        };
        Array::new_node_with(op, view, dtype, requires_grad, false)
    }

    /// Like [`Array::new_node`], but the realizer will write into the first
    /// input's storage instead of allocating.
    pub(crate) fn new_inplace_node(op: Op, view: View, dtype: DType) -> Array {
        let requires_grad =
            dtype.is_float() && op.inputs().iter().any(|a| a.requires_grad());
        Array::new_node_with(op, view, dtype, requires_grad, true)
    }

    pub(crate) fn new_node_with(
        op: Op,
        view: View,
        dtype: DType,
        requires_grad: bool,
        inplace: bool,
    ) -> Array {
        Array {
            node: Rc::new(ArrayNode {
                id: ArrayId::next(),
                op,
                view,
                dtype,
                requires_grad: Cell::new(requires_grad),
                inplace,
                consumed: Cell::new(false),
                storage: RefCell::new(None),
                seen_version: Cell::new(0),
                grad: RefCell::new(None),
            }),
        }
    }

    /// Leaf over an existing buffer, skipping shape validation. Autograd
    /// uses this for gradients of views that may carry size-0 axes.
    pub(crate) fn from_buffer_unchecked(buf: Buffer, shape: &[usize]) -> Array {
        let dtype = buf.dtype();
        let storage = Storage::new(buf);
        let arr = Array::new_node(Op::Buffer, View::contiguous(shape), dtype);
        profiler::record_op(arr.id(), "buffer", shape, dtype, storage.size_in_bytes());
        arr.attach_storage(storage);
        arr
    }

    // -- Construction -------------------------------------------------------

    /// Leaf array over a caller-provided packed buffer.
    pub fn from_raw(buf: Buffer, shape: &[usize]) -> PgResult<Array> {
        validate_shape("from_raw", shape)?;
        let len: usize = shape.iter().product();
        if buf.len() != len {
            return Err(PgError::ShapeMismatch {
                op: "from_raw",
                lhs: shape.to_vec(),
                rhs: vec![buf.len()],
            });
        }
        Ok(Array::from_buffer_unchecked(buf, shape))
    }

    pub fn from_f32(data: &[f32], shape: &[usize]) -> PgResult<Array> {
        Array::from_raw(Buffer::F32(data.to_vec()), shape)
    }

    pub fn from_i32(data: &[i32], shape: &[usize]) -> PgResult<Array> {
        Array::from_raw(Buffer::I32(data.to_vec()), shape)
    }

    pub fn from_b8(data: &[bool], shape: &[usize]) -> PgResult<Array> {
        Array::from_raw(Buffer::B8(data.to_vec()), shape)
    }

    pub fn full(shape: &[usize], value: impl Into<Scalar>) -> PgResult<Array> {
        let value = value.into();
        validate_shape("full", shape)?;
        Ok(Array::new_node(
            Op::Full(value),
            View::contiguous(shape),
            value.dtype(),
        ))
    }

    /// 0-D constant, the lazy form of a host scalar.
    pub fn scalar(value: impl Into<Scalar>) -> Array {
        let value = value.into();
        Array::new_node(Op::Full(value), View::contiguous(&[]), value.dtype())
    }

    pub fn zeros(shape: &[usize], dtype: DType) -> PgResult<Array> {
        Array::full(shape, Scalar::F32(0.0).cast(dtype))
    }

    pub fn ones(shape: &[usize], dtype: DType) -> PgResult<Array> {
        Array::full(shape, Scalar::F32(1.0).cast(dtype))
    }

    /// `start + i * step` over the row-major element order of `shape`.
    pub fn arange(shape: &[usize], start: f32, step: f32, dtype: DType) -> PgResult<Array> {
        validate_shape("arange", shape)?;
        if dtype == DType::B8 {
            return Err(PgError::DTypeMismatch {
                op: "arange",
                lhs: dtype,
                rhs: dtype,
            });
        }
        Ok(Array::new_node(
            Op::Arange { start, step },
            View::contiguous(shape),
            dtype,
        ))
    }

    pub fn zeros_like(&self) -> Array {
        Array::new_node(
            Op::Full(Scalar::F32(0.0).cast(self.dtype())),
            View::contiguous(self.shape()),
            self.dtype(),
        )
    }

    pub fn ones_like(&self) -> Array {
        Array::new_node(
            Op::Full(Scalar::F32(1.0).cast(self.dtype())),
            View::contiguous(self.shape()),
            self.dtype(),
        )
    }

    pub fn full_like(&self, value: impl Into<Scalar>) -> Array {
        Array::new_node(
            Op::Full(value.into().cast(self.dtype())),
            View::contiguous(self.shape()),
            self.dtype(),
        )
    }

    fn random(shape: &[usize], kind: RandKind, dtype: DType) -> PgResult<Array> {
        validate_shape("random", shape)?;
        Ok(Array::new_node(
            Op::Random {
                kind,
                seed: rng::next_seed(),
            },
            View::contiguous(shape),
            dtype,
        ))
    }

    /// Standard normal samples.
    pub fn normal(shape: &[usize]) -> PgResult<Array> {
        Array::random(shape, RandKind::Normal, DType::F32)
    }

    pub fn uniform(shape: &[usize], low: f32, high: f32) -> PgResult<Array> {
        if !(low < high) {
            return Err(PgError::ShapeMismatch {
                op: "uniform",
                lhs: shape.to_vec(),
                rhs: vec![],
            });
        }
        Array::random(shape, RandKind::Uniform { low, high }, DType::F32)
    }

    /// Integers in the half-open range `[low, high)`.
    pub fn randint(shape: &[usize], low: i32, high: i32) -> PgResult<Array> {
        if low >= high {
            return Err(PgError::ShapeMismatch {
                op: "randint",
                lhs: shape.to_vec(),
                rhs: vec![],
            });
        }
        Array::random(shape, RandKind::RandInt { low, high }, DType::I32)
    }

    /// Fair coin flips.
    pub fn randbool(shape: &[usize]) -> PgResult<Array> {
        Array::random(shape, RandKind::RandBool, DType::B8)
    }

    // -- Queries ------------------------------------------------------------

    pub fn id(&self) -> ArrayId {
        self.node.id
    }

    pub fn shape(&self) -> &[usize] {
        self.node.view.shape()
    }

    pub fn rank(&self) -> usize {
        self.node.view.rank()
    }

    /// Number of logical elements.
    pub fn len(&self) -> usize {
        self.node.view.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> DType {
        self.node.dtype
    }

    pub fn view(&self) -> &View {
        &self.node.view
    }

    pub fn is_contiguous(&self) -> bool {
        self.node.view.is_contiguous()
    }

    pub fn is_leaf(&self) -> bool {
        self.node.op.is_leaf()
    }

    pub fn requires_grad(&self) -> bool {
        self.node.requires_grad.get()
    }

    /// Override gradient tracking on a leaf. Only float leaves can require
    /// grad.
    pub fn set_requires_grad(&self, requires_grad: bool) -> PgResult<()> {
        if requires_grad && !self.dtype().is_float() {
            return Err(PgError::DTypeMismatch {
                op: "set_requires_grad",
                lhs: self.dtype(),
                rhs: DType::F32,
            });
        }
        self.node.requires_grad.set(requires_grad);
        Ok(())
    }

    /// Accumulated gradient, present after `backward` reached this node.
    pub fn grad(&self) -> Option<Array> {
        self.node.grad.borrow().clone()
    }

    pub fn zero_grad(&self) {
        *self.node.grad.borrow_mut() = None;
    }

    pub(crate) fn set_grad(&self, grad: Array) {
        *self.node.grad.borrow_mut() = Some(grad);
    }

    pub(crate) fn storage(&self) -> Option<Storage> {
        self.node.storage.borrow().clone()
    }

    pub(crate) fn is_realized(&self) -> bool {
        self.node.storage.borrow().is_some()
    }

    pub(crate) fn attach_storage(&self, storage: Storage) {
        self.node.seen_version.set(storage.version());
        *self.node.storage.borrow_mut() = Some(storage);
    }

    /// Rebind this leaf's storage to another realized array's buffer. The
    /// optimizer uses this to step parameters without changing identity.
    pub(crate) fn bind_storage_from(&self, other: &Array) -> PgResult<()> {
        graph::realize(other)?;
        let storage = other.storage().expect("realized array has storage");
        storage.bump_version();
        self.attach_storage(storage);
        Ok(())
    }

    // -- Evaluation ---------------------------------------------------------

    /// Force realization of this node (and its ancestry).
    pub fn eval(&self) -> PgResult<()> {
        graph::realize(self)
    }

    /// Realize and return the single element of a scalar-shaped array.
    pub fn item(&self) -> PgResult<Scalar> {
        if self.len() != 1 {
            return Err(PgError::NotScalar { len: self.len() });
        }
        graph::realize(self)?;
        let storage = self.storage().expect("realized array has storage");
        let index = vec![0; self.rank()];
        let pos = self.node.view.position_of(&index);
        let out = storage.borrow().scalar_at(pos);
        Ok(out)
    }

    /// Realize and copy out into a packed row-major buffer.
    pub fn to_raw(&self) -> PgResult<Buffer> {
        graph::realize(self)?;
        let storage = self.storage().expect("realized array has storage");
        let buf = storage.borrow();
        Ok(crate::backend::cpu::gather(&buf, &self.node.view))
    }

    pub fn to_vec_f32(&self) -> PgResult<Vec<f32>> {
        match self.to_raw()? {
            Buffer::F32(v) => Ok(v),
            b => Err(PgError::DTypeMismatch {
                op: "to_vec_f32",
                lhs: b.dtype(),
                rhs: DType::F32,
            }),
        }
    }

    pub fn to_vec_i32(&self) -> PgResult<Vec<i32>> {
        match self.to_raw()? {
            Buffer::I32(v) => Ok(v),
            b => Err(PgError::DTypeMismatch {
                op: "to_vec_i32",
                lhs: b.dtype(),
                rhs: DType::I32,
            }),
        }
    }

    pub fn to_vec_b8(&self) -> PgResult<Vec<bool>> {
        match self.to_raw()? {
            Buffer::B8(v) => Ok(v),
            b => Err(PgError::DTypeMismatch {
                op: "to_vec_b8",
                lhs: b.dtype(),
                rhs: DType::B8,
            }),
        }
    }

    /// Run the reverse sweep from this (scalar or implicitly summed) root.
    pub fn backward(&self) -> PgResult<()> {
        graph::autograd::backward(self)
    }

    // -- Movement -----------------------------------------------------------

    pub fn reshape(&self, new_shape: &[usize]) -> PgResult<Array> {
        validate_shape("reshape", new_shape)?;
        let len: usize = new_shape.iter().product();
        if len != self.len() {
            return Err(PgError::ShapeMismatch {
                op: "reshape",
                lhs: self.shape().to_vec(),
                rhs: new_shape.to_vec(),
            });
        }
        Ok(Array::new_node(
            Op::Reshape(self.clone()),
            View::contiguous(new_shape),
            self.dtype(),
        ))
    }

    pub fn permute(&self, axes: &[isize]) -> PgResult<Array> {
        let view = self.node.view.permute(axes)?;
        let normalized = axes
            .iter()
            .map(|&a| crate::view::normalize_axis(a, self.rank()))
            .collect::<PgResult<Vec<usize>>>()?;
        Ok(Array::new_node(
            Op::Permute(self.clone(), normalized),
            view,
            self.dtype(),
        ))
    }

    /// Reverse the axis order between `i` and `j` inclusive.
    pub fn transpose(&self, i: isize, j: isize) -> PgResult<Array> {
        let rank = self.rank();
        let a = crate::view::normalize_axis(i, rank)?;
        let b = crate::view::normalize_axis(j, rank)?;
        let (lo, hi) = (a.min(b), a.max(b));
        let mut axes: Vec<isize> = (0..rank as isize).collect();
        axes[lo..=hi].reverse();
        self.permute(&axes)
    }

    /// Collapse axes `[start, end]` into one.
    pub fn flatten(&self, start: isize, end: isize) -> PgResult<Array> {
        let shape = self.node.view.flatten_shape(start, end)?;
        self.reshape(&shape)
    }

    /// Insert a size-1 axis; `-1` appends after the last axis.
    pub fn unsqueeze(&self, axis: isize) -> PgResult<Array> {
        let view = self.node.view.unsqueeze(axis)?;
        Ok(Array::new_node(
            Op::Unsqueeze(self.clone()),
            view,
            self.dtype(),
        ))
    }

    /// Per-axis `(start, stop, step)` slicing; trailing axes keep their
    /// full range.
    pub fn slice(&self, specs: &[SliceSpec]) -> PgResult<Array> {
        let (view, geometry) = self.node.view.slice(specs)?;
        Ok(Array::new_node(
            Op::Slice(self.clone(), geometry),
            view,
            self.dtype(),
        ))
    }

    /// Broadcast to a wider shape without copying.
    pub fn expand(&self, shape: &[usize]) -> PgResult<Array> {
        let view = self.node.view.broadcast_to(shape)?;
        Ok(Array::new_node(Op::Expand(self.clone()), view, self.dtype()))
    }

    /// Convert to another dtype. Same dtype is the identity (no node).
    pub fn astype(&self, dtype: DType) -> Array {
        if dtype == self.dtype() {
            return self.clone();
        }
        Array::new_node(
            Op::Cast(self.clone()),
            View::contiguous(self.shape()),
            dtype,
        )
    }

    /// Same value, severed from the autograd chain; shares storage once
    /// realized.
    pub fn detach(&self) -> Array {
        Array::new_node(
            Op::Detach(self.clone()),
            self.node.view.clone(),
            self.dtype(),
        )
    }

    /// Force a packed copy unless the view already is one.
    pub fn contiguous(&self) -> Array {
        if self.is_contiguous() {
            return self.clone();
        }
        Array::new_node(
            Op::Contiguous(self.clone()),
            View::contiguous(self.shape()),
            self.dtype(),
        )
    }
}

impl std::fmt::Debug for Array {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Array")
            .field("id", &self.id())
            .field("op", &self.node.op.name())
            .field("shape", &self.shape())
            .field("dtype", &self.dtype())
            .field("requires_grad", &self.requires_grad())
            .field("realized", &self.is_realized())
            .finish()
    }
}
