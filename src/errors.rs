use crate::dtype::DType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PgError {
    #[error("{op}: incompatible shapes {lhs:?} and {rhs:?}")]
    ShapeMismatch {
        op: &'static str,
        lhs: Vec<usize>,
        rhs: Vec<usize>,
    },
    #[error("{op}: unsupported dtype combination ({lhs}, {rhs})")]
    DTypeMismatch {
        op: &'static str,
        lhs: DType,
        rhs: DType,
    },
    #[error("axis {axis} out of range for rank {rank}")]
    AxisOutOfRange { axis: isize, rank: usize },
    #[error("item() requires a single element, array has {len}")]
    NotScalar { len: usize },
    #[error("{op}: reduction over zero elements")]
    EmptyReduce { op: &'static str },
    #[error("in-place conflict: {reason}")]
    InplaceConflict { reason: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type PgResult<T> = Result<T, PgError>;
