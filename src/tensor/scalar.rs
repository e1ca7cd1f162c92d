//! Dynamically typed scalar values flowing through kernels

use std::fmt::{self, Display};
use std::ops::{Add, Div, Mul, Neg, Sub};

use super::dtype::DType;

/// A single element tagged with its type
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
}

/// `as`-convert the payload of a scalar to a primitive type
macro_rules! convert {
    ($value:expr, $t:ty) => {
        match $value {
            Scalar::Bool(x) => (x as u8) as $t,
            Scalar::I8(x) => x as $t,
            Scalar::I16(x) => x as $t,
            Scalar::I32(x) => x as $t,
            Scalar::I64(x) => x as $t,
            Scalar::U8(x) => x as $t,
            Scalar::U16(x) => x as $t,
            Scalar::U32(x) => x as $t,
            Scalar::U64(x) => x as $t,
            Scalar::F32(x) => x as $t,
            Scalar::F64(x) => x as $t,
        }
    };
}

/// Cast both operands to their arithmetic type and apply `$int` or `$float`
macro_rules! pairwise {
    ($lhs:expr, $rhs:expr, |$a:ident, $b:ident| $int:expr, $float:expr) => {{
        let dtype = arithmetic_type($lhs.dtype(), $rhs.dtype());
        match ($lhs.cast(dtype), $rhs.cast(dtype)) {
            (Scalar::I8($a), Scalar::I8($b)) => Scalar::I8($int),
            (Scalar::I16($a), Scalar::I16($b)) => Scalar::I16($int),
            (Scalar::I32($a), Scalar::I32($b)) => Scalar::I32($int),
            (Scalar::I64($a), Scalar::I64($b)) => Scalar::I64($int),
            (Scalar::U8($a), Scalar::U8($b)) => Scalar::U8($int),
            (Scalar::U16($a), Scalar::U16($b)) => Scalar::U16($int),
            (Scalar::U32($a), Scalar::U32($b)) => Scalar::U32($int),
            (Scalar::U64($a), Scalar::U64($b)) => Scalar::U64($int),
            (Scalar::F32($a), Scalar::F32($b)) => Scalar::F32($float),
            (Scalar::F64($a), Scalar::F64($b)) => Scalar::F64($float),
            (lhs, rhs) => unreachable!("{:?} and {:?} were both cast to {}", lhs, rhs, dtype),
        }
    }};
}

/// Booleans do arithmetic as `u8`.
fn arithmetic_type(a: DType, b: DType) -> DType {
    match DType::promote(a, b) {
        DType::Bool => DType::U8,
        dtype => dtype,
    }
}

/// Integer division that yields zero instead of trapping
trait DivOrZero: Sized {
    fn div_or_zero(self, rhs: Self) -> Self;
}

macro_rules! impl_div_or_zero {
    ($($t:ty),*) => {
        $(impl DivOrZero for $t {
            #[inline]
            fn div_or_zero(self, rhs: Self) -> Self {
                self.checked_div(rhs).unwrap_or(0)
            }
        })*
    };
}

impl_div_or_zero!(i8, i16, i32, i64, u8, u16, u32, u64);

fn le_bytes<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

impl Scalar {
    pub fn dtype(&self) -> DType {
        match self {
            Scalar::Bool(_) => DType::Bool,
            Scalar::I8(_) => DType::I8,
            Scalar::I16(_) => DType::I16,
            Scalar::I32(_) => DType::I32,
            Scalar::I64(_) => DType::I64,
            Scalar::U8(_) => DType::U8,
            Scalar::U16(_) => DType::U16,
            Scalar::U32(_) => DType::U32,
            Scalar::U64(_) => DType::U64,
            Scalar::F32(_) => DType::F32,
            Scalar::F64(_) => DType::F64,
        }
    }

    /// Numeric conversion with `as` semantics. Lossless whenever
    /// `self.dtype().can_cast_to(dtype)` holds.
    pub fn cast(self, dtype: DType) -> Scalar {
        match dtype {
            DType::Bool => Scalar::Bool(!self.is_zero()),
            DType::I8 => Scalar::I8(convert!(self, i8)),
            DType::I16 => Scalar::I16(convert!(self, i16)),
            DType::I32 => Scalar::I32(convert!(self, i32)),
            DType::I64 => Scalar::I64(convert!(self, i64)),
            DType::U8 => Scalar::U8(convert!(self, u8)),
            DType::U16 => Scalar::U16(convert!(self, u16)),
            DType::U32 => Scalar::U32(convert!(self, u32)),
            DType::U64 => Scalar::U64(convert!(self, u64)),
            DType::F32 => Scalar::F32(convert!(self, f32)),
            DType::F64 => Scalar::F64(convert!(self, f64)),
        }
    }

    pub fn zero(dtype: DType) -> Scalar {
        Scalar::U8(0).cast(dtype)
    }

    pub fn one(dtype: DType) -> Scalar {
        Scalar::U8(1).cast(dtype)
    }

    pub fn is_zero(&self) -> bool {
        match *self {
            Scalar::Bool(x) => !x,
            Scalar::F32(x) => x == 0.0,
            Scalar::F64(x) => x == 0.0,
            other => convert!(other, i128) == 0,
        }
    }

    pub fn to_f64(self) -> f64 {
        convert!(self, f64)
    }

    pub fn max(self, other: Scalar) -> Scalar {
        pairwise!(self, other, |a, b| a.max(b), a.max(b))
    }

    pub fn min(self, other: Scalar) -> Scalar {
        pairwise!(self, other, |a, b| a.min(b), a.min(b))
    }

    /// Decode one little-endian element
    pub fn read_le(dtype: DType, bytes: &[u8]) -> Scalar {
        match dtype {
            DType::Bool => Scalar::Bool(bytes[0] != 0),
            DType::I8 => Scalar::I8(i8::from_le_bytes(le_bytes(bytes))),
            DType::I16 => Scalar::I16(i16::from_le_bytes(le_bytes(bytes))),
            DType::I32 => Scalar::I32(i32::from_le_bytes(le_bytes(bytes))),
            DType::I64 => Scalar::I64(i64::from_le_bytes(le_bytes(bytes))),
            DType::U8 => Scalar::U8(bytes[0]),
            DType::U16 => Scalar::U16(u16::from_le_bytes(le_bytes(bytes))),
            DType::U32 => Scalar::U32(u32::from_le_bytes(le_bytes(bytes))),
            DType::U64 => Scalar::U64(u64::from_le_bytes(le_bytes(bytes))),
            DType::F32 => Scalar::F32(f32::from_le_bytes(le_bytes(bytes))),
            DType::F64 => Scalar::F64(f64::from_le_bytes(le_bytes(bytes))),
        }
    }

    /// Encode into `bytes[..self.dtype().size()]`
    pub fn write_le(&self, bytes: &mut [u8]) {
        match *self {
            Scalar::Bool(x) => bytes[0] = x as u8,
            Scalar::I8(x) => bytes[..1].copy_from_slice(&x.to_le_bytes()),
            Scalar::I16(x) => bytes[..2].copy_from_slice(&x.to_le_bytes()),
            Scalar::I32(x) => bytes[..4].copy_from_slice(&x.to_le_bytes()),
            Scalar::I64(x) => bytes[..8].copy_from_slice(&x.to_le_bytes()),
            Scalar::U8(x) => bytes[0] = x,
            Scalar::U16(x) => bytes[..2].copy_from_slice(&x.to_le_bytes()),
            Scalar::U32(x) => bytes[..4].copy_from_slice(&x.to_le_bytes()),
            Scalar::U64(x) => bytes[..8].copy_from_slice(&x.to_le_bytes()),
            Scalar::F32(x) => bytes[..4].copy_from_slice(&x.to_le_bytes()),
            Scalar::F64(x) => bytes[..8].copy_from_slice(&x.to_le_bytes()),
        }
    }
}

impl Add for Scalar {
    type Output = Scalar;

    fn add(self, rhs: Scalar) -> Scalar {
        pairwise!(self, rhs, |a, b| a.wrapping_add(b), a + b)
    }
}

impl Sub for Scalar {
    type Output = Scalar;

    fn sub(self, rhs: Scalar) -> Scalar {
        pairwise!(self, rhs, |a, b| a.wrapping_sub(b), a - b)
    }
}

impl Mul for Scalar {
    type Output = Scalar;

    fn mul(self, rhs: Scalar) -> Scalar {
        pairwise!(self, rhs, |a, b| a.wrapping_mul(b), a * b)
    }
}

impl Div for Scalar {
    type Output = Scalar;

    fn div(self, rhs: Scalar) -> Scalar {
        pairwise!(self, rhs, |a, b| a.div_or_zero(b), a / b)
    }
}

impl Neg for Scalar {
    type Output = Scalar;

    fn neg(self) -> Scalar {
        Scalar::zero(self.dtype()) - self
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(x) => write!(f, "{}", x),
            Scalar::I8(x) => write!(f, "{}", x),
            Scalar::I16(x) => write!(f, "{}", x),
            Scalar::I32(x) => write!(f, "{}", x),
            Scalar::I64(x) => write!(f, "{}", x),
            Scalar::U8(x) => write!(f, "{}", x),
            Scalar::U16(x) => write!(f, "{}", x),
            Scalar::U32(x) => write!(f, "{}", x),
            Scalar::U64(x) => write!(f, "{}", x),
            Scalar::F32(x) => write!(f, "{}", x),
            Scalar::F64(x) => write!(f, "{}", x),
        }
    }
}

/// Rust primitives that can be stored in an array
pub trait Element: Copy + Send + Sync + 'static {
    const DTYPE: DType;

    fn into_scalar(self) -> Scalar;

    /// Converts with `as` semantics
    fn from_scalar(value: Scalar) -> Self;
}

macro_rules! impl_element {
    ($($t:ty => $variant:ident),*) => {
        $(
            impl Element for $t {
                const DTYPE: DType = DType::$variant;

                fn into_scalar(self) -> Scalar {
                    Scalar::$variant(self)
                }

                fn from_scalar(value: Scalar) -> Self {
                    convert!(value, $t)
                }
            }

            impl From<$t> for Scalar {
                fn from(value: $t) -> Self {
                    Scalar::$variant(value)
                }
            }
        )*
    };
}

impl_element!(
    i8 => I8, i16 => I16, i32 => I32, i64 => I64,
    u8 => U8, u16 => U16, u32 => U32, u64 => U64,
    f32 => F32, f64 => F64
);

impl Element for bool {
    const DTYPE: DType = DType::Bool;

    fn into_scalar(self) -> Scalar {
        Scalar::Bool(self)
    }

    fn from_scalar(value: Scalar) -> Self {
        !value.is_zero()
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promoting_arithmetic() {
        assert_eq!(Scalar::I32(2) + Scalar::F64(0.5), Scalar::F64(2.5));
        assert_eq!(Scalar::F32(1.5) * Scalar::F32(2.0), Scalar::F32(3.0));
        assert_eq!(Scalar::U8(250) + Scalar::U8(10), Scalar::U8(4));
        assert_eq!(Scalar::Bool(true) + Scalar::Bool(true), Scalar::U8(2));
    }

    #[test]
    fn test_integer_division_by_zero() {
        assert_eq!(Scalar::I32(7) / Scalar::I32(0), Scalar::I32(0));
        assert_eq!(Scalar::I32(7) / Scalar::I32(2), Scalar::I32(3));
        assert_eq!(Scalar::I8(i8::MIN) / Scalar::I8(-1), Scalar::I8(0));
    }

    #[test]
    fn test_cast_round_trips_safe_conversions() {
        let value = Scalar::I32(-123_456);
        assert_eq!(value.cast(DType::I64).cast(DType::I32), value);
        assert_eq!(Scalar::U64(u64::MAX).cast(DType::F64).dtype(), DType::F64);
        assert_eq!(Scalar::F32(3.0).cast(DType::Bool), Scalar::Bool(true));
    }

    #[test]
    fn test_bytes_round_trip() {
        let mut buf = [0u8; 8];
        for value in [Scalar::F64(-2.25), Scalar::I16(-7), Scalar::U32(9), Scalar::Bool(true)] {
            value.write_le(&mut buf);
            assert_eq!(Scalar::read_le(value.dtype(), &buf), value);
        }
    }

    #[test]
    fn test_element_conversion() {
        assert_eq!(f32::from_scalar(Scalar::I32(4)), 4.0);
        assert_eq!(i64::DTYPE, DType::I64);
        assert!(bool::from_scalar(Scalar::F64(0.5)));
        assert_eq!(Scalar::from(2u16), Scalar::U16(2));
    }

    #[test]
    fn test_max_min_and_neg() {
        assert_eq!(Scalar::I32(3).max(Scalar::I32(9)), Scalar::I32(9));
        assert_eq!(Scalar::F64(3.0).min(Scalar::I32(-1)), Scalar::F64(-1.0));
        assert_eq!(-Scalar::F32(2.0), Scalar::F32(-2.0));
    }
}
