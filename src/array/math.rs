//! Math surface of `Array`: elementwise ops, comparisons, reductions,
//! matmul, and the operator overloads. Construction is lazy; dtype
//! promotion happens here by inserting cast nodes, so kernels only ever see
//! one dtype.

use super::Array;
use crate::dtype::DType;
use crate::errors::{PgError, PgResult};
use crate::op::{BinaryOp, CmpOp, Op, ReduceOp, UnaryOp};
use crate::view::{normalize_axes, normalize_axis, View};

impl Array {
    // -- Unary --------------------------------------------------------------

    /// Dtype an op computes in for this input: float-only ops lift to f32,
    /// arithmetic lifts booleans to i32.
    fn unary_dtype(&self, op: UnaryOp) -> DType {
        if op.needs_float() {
            DType::F32
        } else {
            self.dtype().promote_arith(self.dtype())
        }
    }

    fn unary_node(&self, op: UnaryOp) -> Array {
        let input = self.astype(self.unary_dtype(op));
        let dtype = input.dtype();
        Array::new_node(
            Op::Unary(op, input),
            View::contiguous(self.shape()),
            dtype,
        )
    }

    fn unary_inplace_node(&self, op: UnaryOp) -> PgResult<Array> {
        let target = self.unary_dtype(op);
        if target != self.dtype() {
            return Err(PgError::DTypeMismatch {
                op: op.name(),
                lhs: self.dtype(),
                rhs: target,
            });
        }
        Ok(Array::new_inplace_node(
            Op::Unary(op, self.clone()),
            View::contiguous(self.shape()),
            target,
        ))
    }

    pub fn neg(&self) -> Array {
        self.unary_node(UnaryOp::Neg)
    }

    pub fn exp(&self) -> Array {
        self.unary_node(UnaryOp::Exp)
    }

    /// Natural log; non-positive inputs produce NaN / -inf, not errors.
    pub fn log(&self) -> Array {
        self.unary_node(UnaryOp::Log)
    }

    pub fn sqrt(&self) -> Array {
        self.unary_node(UnaryOp::Sqrt)
    }

    /// Elementwise square.
    pub fn sq(&self) -> Array {
        self.unary_node(UnaryOp::Sq)
    }

    /// Elementwise reciprocal; zero inputs produce ±inf.
    pub fn recip(&self) -> Array {
        self.unary_node(UnaryOp::Recip)
    }

    pub fn neg_(&self) -> PgResult<Array> {
        self.unary_inplace_node(UnaryOp::Neg)
    }

    pub fn exp_(&self) -> PgResult<Array> {
        self.unary_inplace_node(UnaryOp::Exp)
    }

    pub fn log_(&self) -> PgResult<Array> {
        self.unary_inplace_node(UnaryOp::Log)
    }

    pub fn sqrt_(&self) -> PgResult<Array> {
        self.unary_inplace_node(UnaryOp::Sqrt)
    }

    pub fn recip_(&self) -> PgResult<Array> {
        self.unary_inplace_node(UnaryOp::Recip)
    }

    // -- Binary -------------------------------------------------------------

    fn binary_node(&self, rhs: &Array, op: BinaryOp) -> PgResult<Array> {
        let common = if op == BinaryOp::Div {
            DType::F32
        } else {
            self.dtype().promote_arith(rhs.dtype())
        };
        let out_shape = View::broadcast_shapes(op.name(), self.shape(), rhs.shape())?;
        let a = self.astype(common);
        let b = rhs.astype(common);
        Ok(Array::new_node(
            Op::Binary(op, a, b),
            View::contiguous(&out_shape),
            common,
        ))
    }

    /// In-place binary: the result reuses this array's buffer, so the
    /// output shape must stay the left shape (only the right side may
    /// broadcast) and promotion must not change the left dtype.
    fn binary_inplace_node(&self, rhs: &Array, op: BinaryOp) -> PgResult<Array> {
        let common = if op == BinaryOp::Div {
            DType::F32
        } else {
            self.dtype().promote_arith(rhs.dtype())
        };
        if common != self.dtype() {
            return Err(PgError::DTypeMismatch {
                op: op.name(),
                lhs: self.dtype(),
                rhs: common,
            });
        }
        let out_shape = View::broadcast_shapes(op.name(), self.shape(), rhs.shape())?;
        if out_shape != self.shape() {
            return Err(PgError::InplaceConflict {
                reason: format!(
                    "{} would broadcast the destination from {:?} to {:?}",
                    op.name(),
                    self.shape(),
                    out_shape
                ),
            });
        }
        let b = rhs.astype(common);
        Ok(Array::new_inplace_node(
            Op::Binary(op, self.clone(), b),
            View::contiguous(&out_shape),
            common,
        ))
    }

    pub fn add(&self, rhs: &Array) -> PgResult<Array> {
        self.binary_node(rhs, BinaryOp::Add)
    }

    pub fn sub(&self, rhs: &Array) -> PgResult<Array> {
        self.binary_node(rhs, BinaryOp::Sub)
    }

    pub fn mul(&self, rhs: &Array) -> PgResult<Array> {
        self.binary_node(rhs, BinaryOp::Mul)
    }

    /// Division always computes in f32.
    pub fn div(&self, rhs: &Array) -> PgResult<Array> {
        self.binary_node(rhs, BinaryOp::Div)
    }

    /// Elementwise maximum; gradient at ties goes to the left operand.
    pub fn maximum(&self, rhs: &Array) -> PgResult<Array> {
        self.binary_node(rhs, BinaryOp::Maximum)
    }

    pub fn minimum(&self, rhs: &Array) -> PgResult<Array> {
        self.binary_node(rhs, BinaryOp::Minimum)
    }

    pub fn add_(&self, rhs: &Array) -> PgResult<Array> {
        self.binary_inplace_node(rhs, BinaryOp::Add)
    }

    pub fn sub_(&self, rhs: &Array) -> PgResult<Array> {
        self.binary_inplace_node(rhs, BinaryOp::Sub)
    }

    pub fn mul_(&self, rhs: &Array) -> PgResult<Array> {
        self.binary_inplace_node(rhs, BinaryOp::Mul)
    }

    pub fn div_(&self, rhs: &Array) -> PgResult<Array> {
        self.binary_inplace_node(rhs, BinaryOp::Div)
    }

    // -- Comparisons --------------------------------------------------------

    fn cmp_node(&self, rhs: &Array, op: CmpOp) -> PgResult<Array> {
        let common = self.dtype().promote(rhs.dtype());
        let out_shape = View::broadcast_shapes(op.name(), self.shape(), rhs.shape())?;
        let a = self.astype(common);
        let b = rhs.astype(common);
        Ok(Array::new_node(
            Op::Cmp(op, a, b),
            View::contiguous(&out_shape),
            DType::B8,
        ))
    }

    pub fn eq(&self, rhs: &Array) -> PgResult<Array> {
        self.cmp_node(rhs, CmpOp::Eq)
    }

    pub fn lt(&self, rhs: &Array) -> PgResult<Array> {
        self.cmp_node(rhs, CmpOp::Lt)
    }

    pub fn le(&self, rhs: &Array) -> PgResult<Array> {
        self.cmp_node(rhs, CmpOp::Le)
    }

    pub fn gt(&self, rhs: &Array) -> PgResult<Array> {
        self.cmp_node(rhs, CmpOp::Gt)
    }

    pub fn ge(&self, rhs: &Array) -> PgResult<Array> {
        self.cmp_node(rhs, CmpOp::Ge)
    }

    // -- Reductions ---------------------------------------------------------

    fn reduce_node(&self, op: ReduceOp, axes: &[isize]) -> PgResult<Array> {
        let axes = normalize_axes(axes, self.rank())?;
        let input = match op {
            ReduceOp::Mean => self.astype(DType::F32),
            ReduceOp::Sum if self.dtype() == DType::B8 => self.astype(DType::I32),
            _ => self.clone(),
        };
        let dtype = input.dtype();
        let mut shape = self.shape().to_vec();
        for &a in &axes {
            shape[a] = 1;
        }
        Ok(Array::new_node(
            Op::Reduce(op, input, axes),
            View::contiguous(&shape),
            dtype,
        ))
    }

    /// Sum over `axes` (empty = all axes); reduced axes keep size 1.
    pub fn sum(&self, axes: &[isize]) -> PgResult<Array> {
        self.reduce_node(ReduceOp::Sum, axes)
    }

    /// Mean over `axes` (empty = all); always f32.
    pub fn mean(&self, axes: &[isize]) -> PgResult<Array> {
        self.reduce_node(ReduceOp::Mean, axes)
    }

    pub fn max(&self, axes: &[isize]) -> PgResult<Array> {
        self.reduce_node(ReduceOp::Max, axes)
    }

    pub fn min(&self, axes: &[isize]) -> PgResult<Array> {
        self.reduce_node(ReduceOp::Min, axes)
    }

    fn arg_reduce_node(&self, axis: isize, max: bool) -> PgResult<Array> {
        let axis = normalize_axis(axis, self.rank())?;
        let mut shape = self.shape().to_vec();
        shape[axis] = 1;
        Ok(Array::new_node(
            Op::ArgReduce {
                max,
                input: self.clone(),
                axis,
            },
            View::contiguous(&shape),
            DType::I32,
        ))
    }

    /// Index of the maximum along one axis; smallest index wins ties.
    pub fn argmax(&self, axis: isize) -> PgResult<Array> {
        self.arg_reduce_node(axis, true)
    }

    pub fn argmin(&self, axis: isize) -> PgResult<Array> {
        self.arg_reduce_node(axis, false)
    }

    // -- Matmul -------------------------------------------------------------

    /// Batched matrix product: leading axes broadcast, the trailing two
    /// contract as `(m,k)·(k,n) -> (m,n)`.
    pub fn matmul(&self, rhs: &Array) -> PgResult<Array> {
        let (ra, rb) = (self.rank(), rhs.rank());
        if ra < 2 || rb < 2 {
            return Err(PgError::ShapeMismatch {
                op: "matmul",
                lhs: self.shape().to_vec(),
                rhs: rhs.shape().to_vec(),
            });
        }
        let (m, k) = (self.shape()[ra - 2], self.shape()[ra - 1]);
        let (k2, n) = (rhs.shape()[rb - 2], rhs.shape()[rb - 1]);
        if k != k2 {
            return Err(PgError::ShapeMismatch {
                op: "matmul",
                lhs: self.shape().to_vec(),
                rhs: rhs.shape().to_vec(),
            });
        }
        let mut out_shape =
            View::broadcast_shapes("matmul", &self.shape()[..ra - 2], &rhs.shape()[..rb - 2])?;
        out_shape.push(m);
        out_shape.push(n);
        let common = self.dtype().promote_arith(rhs.dtype());
        let a = self.astype(common);
        let b = rhs.astype(common);
        Ok(Array::new_node(
            Op::Matmul(a, b),
            View::contiguous(&out_shape),
            common,
        ))
    }
}

// ---------------------------------------------------------------------------
// Operator overloads. Fallible ops return `PgResult` from the operator, the
// same shape candle-style tensor crates use.

macro_rules! impl_array_binop {
    ($trait:ident, $method:ident) => {
        impl std::ops::$trait<&Array> for &Array {
            type Output = PgResult<Array>;

            fn $method(self, rhs: &Array) -> PgResult<Array> {
                Array::$method(self, rhs)
            }
        }
    };
}

impl_array_binop!(Add, add);
impl_array_binop!(Sub, sub);
impl_array_binop!(Mul, mul);
impl_array_binop!(Div, div);

macro_rules! impl_scalar_binop {
    ($scalar:ty) => {
        impl std::ops::Add<$scalar> for &Array {
            type Output = PgResult<Array>;

            fn add(self, rhs: $scalar) -> PgResult<Array> {
                Array::add(self, &Array::scalar(rhs))
            }
        }

        impl std::ops::Sub<$scalar> for &Array {
            type Output = PgResult<Array>;

            fn sub(self, rhs: $scalar) -> PgResult<Array> {
                Array::sub(self, &Array::scalar(rhs))
            }
        }

        impl std::ops::Mul<$scalar> for &Array {
            type Output = PgResult<Array>;

            fn mul(self, rhs: $scalar) -> PgResult<Array> {
                Array::mul(self, &Array::scalar(rhs))
            }
        }

        impl std::ops::Div<$scalar> for &Array {
            type Output = PgResult<Array>;

            fn div(self, rhs: $scalar) -> PgResult<Array> {
                Array::div(self, &Array::scalar(rhs))
            }
        }

        impl std::ops::Add<&Array> for $scalar {
            type Output = PgResult<Array>;

            fn add(self, rhs: &Array) -> PgResult<Array> {
                Array::add(&Array::scalar(self), rhs)
            }
        }

        impl std::ops::Sub<&Array> for $scalar {
            type Output = PgResult<Array>;

            fn sub(self, rhs: &Array) -> PgResult<Array> {
                Array::sub(&Array::scalar(self), rhs)
            }
        }

        impl std::ops::Mul<&Array> for $scalar {
            type Output = PgResult<Array>;

            fn mul(self, rhs: &Array) -> PgResult<Array> {
                Array::mul(&Array::scalar(self), rhs)
            }
        }

        impl std::ops::Div<&Array> for $scalar {
            type Output = PgResult<Array>;

            fn div(self, rhs: &Array) -> PgResult<Array> {
                Array::div(&Array::scalar(self), rhs)
            }
        }
    };
}

impl_scalar_binop!(f32);
impl_scalar_binop!(i32);

impl std::ops::Neg for &Array {
    type Output = Array;

    fn neg(self) -> Array {
        Array::neg(self)
    }
}
