use crate::dtype::DType;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Unique identifier for a node in the computation graph.
///
/// Ids are process-monotonic: a node's inputs always carry smaller ids than
/// the node itself, which is what the gradient maps key on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArrayId(pub usize);

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

impl ArrayId {
    pub(crate) fn next() -> Self {
        ArrayId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ArrayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single host-side element of any supported dtype.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    F32(f32),
    I32(i32),
    B8(bool),
}

impl Scalar {
    pub fn dtype(&self) -> DType {
        match self {
            Scalar::F32(_) => DType::F32,
            Scalar::I32(_) => DType::I32,
            Scalar::B8(_) => DType::B8,
        }
    }

    pub fn to_f32(&self) -> f32 {
        match *self {
            Scalar::F32(v) => v,
            Scalar::I32(v) => v as f32,
            Scalar::B8(v) => v as i32 as f32,
        }
    }

    pub fn to_i32(&self) -> i32 {
        match *self {
            Scalar::F32(v) => v as i32,
            Scalar::I32(v) => v,
            Scalar::B8(v) => v as i32,
        }
    }

    pub fn to_b8(&self) -> bool {
        match *self {
            Scalar::F32(v) => v != 0.0,
            Scalar::I32(v) => v != 0,
            Scalar::B8(v) => v,
        }
    }

    /// Convert to another dtype. Float to int truncates toward zero and
    /// saturates at the integer bounds.
    pub fn cast(&self, dtype: DType) -> Scalar {
        match dtype {
            DType::F32 => Scalar::F32(self.to_f32()),
            DType::I32 => Scalar::I32(self.to_i32()),
            DType::B8 => Scalar::B8(self.to_b8()),
        }
    }
}

impl From<f32> for Scalar {
    fn from(v: f32) -> Self {
        Scalar::F32(v)
    }
}

impl From<i32> for Scalar {
    fn from(v: i32) -> Self {
        Scalar::I32(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::B8(v)
    }
}
