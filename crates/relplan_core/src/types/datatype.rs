use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Type of a bare NULL literal, or of an expression whose type can only be
    /// known at runtime (outer scope references).
    Null,
    Boolean,
    Int32,
    Int64,
    Float64,
    Utf8,
}

impl DataType {
    /// Estimated in-memory width of a value of this type, in bytes.
    ///
    /// Used for the tuple size component of plan costs.
    pub const fn estimated_size(&self) -> usize {
        match self {
            Self::Null => 1,
            Self::Boolean => 1,
            Self::Int32 => 4,
            Self::Int64 => 8,
            Self::Float64 => 8,
            Self::Utf8 => 16,
        }
    }

    /// If range based selectivity estimates apply to this type.
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Int32 | Self::Int64 | Self::Float64)
    }

    pub const fn is_integer(&self) -> bool {
        matches!(self, Self::Int32 | Self::Int64)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Boolean => write!(f, "Boolean"),
            Self::Int32 => write!(f, "Int32"),
            Self::Int64 => write!(f, "Int64"),
            Self::Float64 => write!(f, "Float64"),
            Self::Utf8 => write!(f, "Utf8"),
        }
    }
}
