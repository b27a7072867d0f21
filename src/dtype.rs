use serde::{Deserialize, Serialize};

/// Element kind of an array. The set is closed: 32-bit floats, 32-bit
/// signed integers and 8-bit booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    F32,
    I32,
    B8,
}

impl DType {
    /// Promotion rank: b8 < i32 < f32.
    pub fn rank(&self) -> u8 {
        match self {
            DType::B8 => 0,
            DType::I32 => 1,
            DType::F32 => 2,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, DType::F32)
    }

    pub fn is_int(&self) -> bool {
        matches!(self, DType::I32)
    }

    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::F32 | DType::I32 => 4,
            DType::B8 => 1,
        }
    }

    /// Result kind of a binary op: the higher-ranked operand wins.
    pub fn promote(self, other: DType) -> DType {
        if self.rank() >= other.rank() {
            self
        } else {
            other
        }
    }

    /// Promotion for arithmetic: like [`DType::promote`], except booleans
    /// are lifted to i32 (there is no boolean arithmetic).
    pub fn promote_arith(self, other: DType) -> DType {
        match self.promote(other) {
            DType::B8 => DType::I32,
            d => d,
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DType::F32 => "f32",
            DType::I32 => "i32",
            DType::B8 => "b8",
        };
        write!(f, "{name}")
    }
}
