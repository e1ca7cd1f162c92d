//! Element types and the safe-cast lattice used by type resolution

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{UfuncError, UfuncResult};

/// Element type of an array or of a signature slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

/// Candidate order when searching for a common type: narrowest first,
/// integers before floats of the same width.
const PROMOTION_ORDER: [DType; 10] = [
    DType::I8,
    DType::U8,
    DType::I16,
    DType::U16,
    DType::I32,
    DType::U32,
    DType::I64,
    DType::U64,
    DType::F32,
    DType::F64,
];

impl DType {
    /// All element types, in declaration order
    pub const ALL: [DType; 11] = [
        DType::Bool,
        DType::I8,
        DType::I16,
        DType::I32,
        DType::I64,
        DType::U8,
        DType::U16,
        DType::U32,
        DType::U64,
        DType::F32,
        DType::F64,
    ];

    /// Get the size in bytes of this data type
    pub const fn size(&self) -> usize {
        match self {
            DType::Bool | DType::I8 | DType::U8 => 1,
            DType::I16 | DType::U16 => 2,
            DType::I32 | DType::U32 | DType::F32 => 4,
            DType::I64 | DType::U64 | DType::F64 => 8,
        }
    }

    pub const fn bits(&self) -> usize {
        self.size() * 8
    }

    /// Check if this is a floating point type
    pub const fn is_float(&self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }

    /// Check if this is an integer type
    pub const fn is_int(&self) -> bool {
        matches!(
            self,
            DType::I8
                | DType::I16
                | DType::I32
                | DType::I64
                | DType::U8
                | DType::U16
                | DType::U32
                | DType::U64
        )
    }

    pub const fn is_signed(&self) -> bool {
        matches!(
            self,
            DType::I8 | DType::I16 | DType::I32 | DType::I64 | DType::F32 | DType::F64
        )
    }

    /// Whether every value of `self` is exactly representable in `to`.
    ///
    /// The lattice is fixed: bool widens to anything, integers widen to
    /// wider integers of compatible signedness and to floats of equal or
    /// greater width, floats only widen to wider floats.
    pub fn can_cast_to(&self, to: DType) -> bool {
        let from = *self;
        if from == to || from == DType::Bool {
            return true;
        }
        if to == DType::Bool {
            return false;
        }
        if from.is_float() {
            return to.is_float() && to.bits() >= from.bits();
        }
        if to.is_float() {
            return to.bits() >= from.bits();
        }
        if from.is_signed() {
            return to.is_signed() && to.bits() > from.bits();
        }
        // unsigned source: wider unsigned, or strictly wider signed
        to.bits() > from.bits()
    }

    /// Smallest type that both operands safely cast to
    pub fn promote(a: DType, b: DType) -> DType {
        if a.can_cast_to(b) {
            return b;
        }
        if b.can_cast_to(a) {
            return a;
        }
        PROMOTION_ORDER
            .iter()
            .copied()
            .find(|t| a.can_cast_to(*t) && b.can_cast_to(*t))
            .unwrap_or(DType::F64)
    }

    /// Rust-style name (`f32`, `i64`, `bool`)
    pub const fn name(&self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::I8 => "i8",
            DType::I16 => "i16",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::U8 => "u8",
            DType::U16 => "u16",
            DType::U32 => "u32",
            DType::U64 => "u64",
            DType::F32 => "f32",
            DType::F64 => "f64",
        }
    }
}

impl Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DType {
    type Err = UfuncError;

    /// Accepts Rust names (`f32`), byte-width names (`f4`, `u1`, `b1`) and
    /// NumPy names (`float32`, `int64`).
    fn from_str(s: &str) -> UfuncResult<Self> {
        let dtype = match s.trim() {
            "bool" | "b1" => DType::Bool,
            "i8" | "i1" | "int8" => DType::I8,
            "i16" | "i2" | "int16" => DType::I16,
            "i32" | "i4" | "int32" => DType::I32,
            "i64" | "int64" => DType::I64,
            "u8" | "u1" | "uint8" => DType::U8,
            "u16" | "u2" | "uint16" => DType::U16,
            "u32" | "u4" | "uint32" => DType::U32,
            "u64" | "uint64" => DType::U64,
            "f32" | "f4" | "float32" => DType::F32,
            "f64" | "f8" | "float64" | "double" => DType::F64,
            other => {
                return Err(UfuncError::InvalidInput(format!(
                    "unknown element type '{}'",
                    other
                )))
            }
        };
        Ok(dtype)
    }
}
