//! The op IR: a closed tagged enum of every primitive the engine executes.
//! Each variant carries its operand handles and intrinsic parameters; the
//! owning node carries the derived view and dtype.

use crate::array::Array;
use crate::types::Scalar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Exp,
    Log,
    Sqrt,
    Sq,
    Recip,
}

impl UnaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Exp => "exp",
            UnaryOp::Log => "log",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Sq => "sq",
            UnaryOp::Recip => "recip",
        }
    }

    /// Ops defined on floats only; integer operands are cast up first.
    pub fn needs_float(&self) -> bool {
        !matches!(self, UnaryOp::Neg | UnaryOp::Sq)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Maximum,
    Minimum,
}

impl BinaryOp {
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Maximum => "maximum",
            BinaryOp::Minimum => "minimum",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn name(&self) -> &'static str {
        match self {
            CmpOp::Eq => "eq",
            CmpOp::Lt => "lt",
            CmpOp::Le => "le",
            CmpOp::Gt => "gt",
            CmpOp::Ge => "ge",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Mean,
    Max,
    Min,
}

impl ReduceOp {
    pub fn name(&self) -> &'static str {
        match self {
            ReduceOp::Sum => "sum",
            ReduceOp::Mean => "mean",
            ReduceOp::Max => "max",
            ReduceOp::Min => "min",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RandKind {
    Normal,
    Uniform { low: f32, high: f32 },
    RandInt { low: i32, high: i32 },
    RandBool,
}

/// Primitive operation of a DAG node.
#[derive(Debug, Clone)]
pub enum Op {
    /// Leaf over a caller-provided buffer; storage is attached at
    /// construction.
    Buffer,
    Full(Scalar),
    Arange { start: f32, step: f32 },
    Random { kind: RandKind, seed: u64 },
    Unary(UnaryOp, Array),
    Binary(BinaryOp, Array, Array),
    Cmp(CmpOp, Array, Array),
    Cast(Array),
    /// Reduction over a normalized, sorted axis set; keep-dim always.
    Reduce(ReduceOp, Array, Vec<usize>),
    /// Arg-reduction over exactly one axis; i32 output, smallest index wins.
    ArgReduce { max: bool, input: Array, axis: usize },
    Matmul(Array, Array),
    Permute(Array, Vec<usize>),
    Reshape(Array),
    Expand(Array),
    /// Size-1 axis insertion; unlike `Reshape` it never packs, so it stays
    /// free on non-contiguous inputs.
    Unsqueeze(Array),
    /// The node's view encodes the slice; the geometry `(start, step)` per
    /// axis is kept for the gradient scatter.
    Slice(Array, Vec<(usize, isize)>),
    Contiguous(Array),
    Detach(Array),
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::Buffer => "buffer",
            Op::Full(_) => "full",
            Op::Arange { .. } => "arange",
            Op::Random { .. } => "random",
            Op::Unary(u, _) => u.name(),
            Op::Binary(b, ..) => b.name(),
            Op::Cmp(c, ..) => c.name(),
            Op::Cast(_) => "cast",
            Op::Reduce(r, ..) => r.name(),
            Op::ArgReduce { max: true, .. } => "argmax",
            Op::ArgReduce { max: false, .. } => "argmin",
            Op::Matmul(..) => "matmul",
            Op::Permute(..) => "permute",
            Op::Reshape(_) => "reshape",
            Op::Expand(_) => "expand",
            Op::Unsqueeze(_) => "unsqueeze",
            Op::Slice(..) => "slice",
            Op::Contiguous(_) => "contiguous",
            Op::Detach(_) => "detach",
        }
    }

    pub fn inputs(&self) -> Vec<&Array> {
        match self {
            Op::Buffer | Op::Full(_) | Op::Arange { .. } | Op::Random { .. } => vec![],
            Op::Unary(_, a)
            | Op::Cast(a)
            | Op::Reduce(_, a, _)
            | Op::ArgReduce { input: a, .. }
            | Op::Permute(a, _)
            | Op::Reshape(a)
            | Op::Expand(a)
            | Op::Unsqueeze(a)
            | Op::Slice(a, _)
            | Op::Contiguous(a)
            | Op::Detach(a) => vec![a],
            Op::Binary(_, a, b) | Op::Cmp(_, a, b) | Op::Matmul(a, b) => vec![a, b],
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            Op::Buffer | Op::Full(_) | Op::Arange { .. } | Op::Random { .. }
        )
    }

    /// Movement ops share their input's storage instead of allocating.
    pub fn is_movement(&self) -> bool {
        matches!(
            self,
            Op::Permute(..) | Op::Expand(_) | Op::Unsqueeze(_) | Op::Slice(..) | Op::Detach(_)
        )
    }
}
