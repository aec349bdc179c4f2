//! High level abstraction over a field's primitive (non-message) value.

use crate::time::{FudgeDate, FudgeDateTime, FudgeTime};
use num_traits::NumCast;
use smallvec::SmallVec;
use snafu::Snafu;
use std::fmt;

/// An aggregation of one or more elements in an array value.
pub type C<T> = SmallVec<[T; 2]>;

/// An enum representing a primitive value held by a field.
///
/// Integer values keep the width they were stored with; narrowing to the
/// smallest representation happens when a value enters a message container
/// or is written to the wire, not here.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveValue {
    /// No value. The field is present but carries a zero-byte payload.
    Indicator,
    /// A boolean.
    Boolean(bool),
    /// A signed 8-bit integer.
    Byte(i8),
    /// A signed 16-bit integer.
    Short(i16),
    /// A signed 32-bit integer.
    Int(i32),
    /// A signed 64-bit integer.
    Long(i64),
    /// A 32-bit floating point number.
    Float(f32),
    /// A 64-bit floating point number.
    Double(f64),
    /// An opaque run of bytes.
    ByteArray(C<u8>),
    /// A UTF-8 string.
    Str(String),
    /// An array of signed 16-bit integers.
    ShortArray(C<i16>),
    /// An array of signed 32-bit integers.
    IntArray(C<i32>),
    /// An array of signed 64-bit integers.
    LongArray(C<i64>),
    /// An array of 32-bit floating point numbers.
    FloatArray(C<f32>),
    /// An array of 64-bit floating point numbers.
    DoubleArray(C<f64>),
    /// A date, with optional reduced precision.
    Date(FudgeDate),
    /// A time of day with optional UTC offset.
    Time(FudgeTime),
    /// A combined date and time.
    DateTime(FudgeDateTime),
}

/// An enum of the kinds of primitive value, without the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// No value.
    Indicator,
    /// A boolean.
    Boolean,
    /// A signed 8-bit integer.
    Byte,
    /// A signed 16-bit integer.
    Short,
    /// A signed 32-bit integer.
    Int,
    /// A signed 64-bit integer.
    Long,
    /// A 32-bit float.
    Float,
    /// A 64-bit float.
    Double,
    /// A run of bytes.
    ByteArray,
    /// A UTF-8 string.
    Str,
    /// An array of 16-bit integers.
    ShortArray,
    /// An array of 32-bit integers.
    IntArray,
    /// An array of 64-bit integers.
    LongArray,
    /// An array of 32-bit floats.
    FloatArray,
    /// An array of 64-bit floats.
    DoubleArray,
    /// A date.
    Date,
    /// A time of day.
    Time,
    /// A combined date and time.
    DateTime,
}

/// An error raised when requesting a primitive value as an incompatible type.
#[derive(Debug, Snafu, PartialEq)]
#[snafu(display("cannot interpret {got:?} as {requested}"))]
pub struct CastValueError {
    /// The type requested by the caller.
    pub requested: &'static str,
    /// The kind of value actually held.
    pub got: ValueType,
}

type Result<T> = std::result::Result<T, CastValueError>;

impl PrimitiveValue {
    /// Retrieve the kind of value held, without the data.
    pub fn value_type(&self) -> ValueType {
        match self {
            PrimitiveValue::Indicator => ValueType::Indicator,
            PrimitiveValue::Boolean(_) => ValueType::Boolean,
            PrimitiveValue::Byte(_) => ValueType::Byte,
            PrimitiveValue::Short(_) => ValueType::Short,
            PrimitiveValue::Int(_) => ValueType::Int,
            PrimitiveValue::Long(_) => ValueType::Long,
            PrimitiveValue::Float(_) => ValueType::Float,
            PrimitiveValue::Double(_) => ValueType::Double,
            PrimitiveValue::ByteArray(_) => ValueType::ByteArray,
            PrimitiveValue::Str(_) => ValueType::Str,
            PrimitiveValue::ShortArray(_) => ValueType::ShortArray,
            PrimitiveValue::IntArray(_) => ValueType::IntArray,
            PrimitiveValue::LongArray(_) => ValueType::LongArray,
            PrimitiveValue::FloatArray(_) => ValueType::FloatArray,
            PrimitiveValue::DoubleArray(_) => ValueType::DoubleArray,
            PrimitiveValue::Date(_) => ValueType::Date,
            PrimitiveValue::Time(_) => ValueType::Time,
            PrimitiveValue::DateTime(_) => ValueType::DateTime,
        }
    }

    /// Whether this is the indicator (null) value.
    #[inline]
    pub fn is_indicator(&self) -> bool {
        matches!(self, PrimitiveValue::Indicator)
    }

    /// Retrieve the value as a boolean.
    pub fn to_bool(&self) -> Result<bool> {
        match self {
            PrimitiveValue::Boolean(b) => Ok(*b),
            other => CastValueSnafu {
                requested: "bool",
                got: other.value_type(),
            }
            .fail(),
        }
    }

    /// Retrieve an integer value widened to `i64`.
    pub fn to_i64(&self) -> Result<i64> {
        match self {
            PrimitiveValue::Byte(v) => Ok(<i64 as From<_>>::from(*v)),
            PrimitiveValue::Short(v) => Ok(<i64 as From<_>>::from(*v)),
            PrimitiveValue::Int(v) => Ok(<i64 as From<_>>::from(*v)),
            PrimitiveValue::Long(v) => Ok(*v),
            other => CastValueSnafu {
                requested: "i64",
                got: other.value_type(),
            }
            .fail(),
        }
    }

    /// Retrieve a numeric value as an `f64`.
    ///
    /// Integers are accepted; a 64-bit integer that cannot be represented
    /// exactly still converts with the usual loss of precision.
    pub fn to_f64(&self) -> Result<f64> {
        match self {
            PrimitiveValue::Float(v) => Ok(<f64 as From<_>>::from(*v)),
            PrimitiveValue::Double(v) => Ok(*v),
            other => match other.to_i64() {
                Ok(v) => Ok(v as f64),
                Err(_) => CastValueSnafu {
                    requested: "f64",
                    got: other.value_type(),
                }
                .fail(),
            },
        }
    }

    /// Retrieve an integer value as any primitive integer type,
    /// failing if the value does not fit.
    pub fn to_int<T>(&self) -> Result<T>
    where
        T: NumCast,
    {
        let wide = self.to_i64()?;
        NumCast::from(wide).ok_or(CastValueError {
            requested: "integer",
            got: self.value_type(),
        })
    }

    /// Retrieve the value as a string slice.
    pub fn as_str(&self) -> Result<&str> {
        match self {
            PrimitiveValue::Str(s) => Ok(s),
            other => CastValueSnafu {
                requested: "str",
                got: other.value_type(),
            }
            .fail(),
        }
    }

    /// Retrieve the value as a slice of bytes.
    pub fn as_bytes(&self) -> Result<&[u8]> {
        match self {
            PrimitiveValue::ByteArray(b) => Ok(b),
            other => CastValueSnafu {
                requested: "bytes",
                got: other.value_type(),
            }
            .fail(),
        }
    }
}

impl fmt::Display for PrimitiveValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fn join<T: fmt::Display>(f: &mut fmt::Formatter, items: &[T]) -> fmt::Result {
            f.write_str("[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{item}")?;
            }
            f.write_str("]")
        }

        match self {
            PrimitiveValue::Indicator => f.write_str("indicator"),
            PrimitiveValue::Boolean(v) => write!(f, "{v}"),
            PrimitiveValue::Byte(v) => write!(f, "{v}"),
            PrimitiveValue::Short(v) => write!(f, "{v}"),
            PrimitiveValue::Int(v) => write!(f, "{v}"),
            PrimitiveValue::Long(v) => write!(f, "{v}"),
            PrimitiveValue::Float(v) => write!(f, "{v}"),
            PrimitiveValue::Double(v) => write!(f, "{v}"),
            PrimitiveValue::ByteArray(v) => join(f, v),
            PrimitiveValue::Str(v) => write!(f, "{v:?}"),
            PrimitiveValue::ShortArray(v) => join(f, v),
            PrimitiveValue::IntArray(v) => join(f, v),
            PrimitiveValue::LongArray(v) => join(f, v),
            PrimitiveValue::FloatArray(v) => join(f, v),
            PrimitiveValue::DoubleArray(v) => join(f, v),
            PrimitiveValue::Date(v) => write!(f, "{v}"),
            PrimitiveValue::Time(v) => write!(f, "{v}"),
            PrimitiveValue::DateTime(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for PrimitiveValue {
    fn from(v: bool) -> Self {
        PrimitiveValue::Boolean(v)
    }
}

impl From<i8> for PrimitiveValue {
    fn from(v: i8) -> Self {
        PrimitiveValue::Byte(v)
    }
}

impl From<i16> for PrimitiveValue {
    fn from(v: i16) -> Self {
        PrimitiveValue::Short(v)
    }
}

impl From<i32> for PrimitiveValue {
    fn from(v: i32) -> Self {
        PrimitiveValue::Int(v)
    }
}

impl From<i64> for PrimitiveValue {
    fn from(v: i64) -> Self {
        PrimitiveValue::Long(v)
    }
}

impl From<f32> for PrimitiveValue {
    fn from(v: f32) -> Self {
        PrimitiveValue::Float(v)
    }
}

impl From<f64> for PrimitiveValue {
    fn from(v: f64) -> Self {
        PrimitiveValue::Double(v)
    }
}

impl From<&str> for PrimitiveValue {
    fn from(v: &str) -> Self {
        PrimitiveValue::Str(v.to_owned())
    }
}

impl From<String> for PrimitiveValue {
    fn from(v: String) -> Self {
        PrimitiveValue::Str(v)
    }
}

impl From<&[u8]> for PrimitiveValue {
    fn from(v: &[u8]) -> Self {
        PrimitiveValue::ByteArray(v.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_widening() {
        assert_eq!(PrimitiveValue::Byte(-5).to_i64(), Ok(-5));
        assert_eq!(PrimitiveValue::Short(300).to_i64(), Ok(300));
        assert_eq!(PrimitiveValue::Long(1 << 40).to_i64(), Ok(1 << 40));
        assert!(PrimitiveValue::Str("x".into()).to_i64().is_err());
    }

    #[test]
    fn checked_narrowing_casts() {
        let v = PrimitiveValue::Int(128);
        assert_eq!(v.to_int::<i32>(), Ok(128));
        assert!(v.to_int::<i8>().is_err());
    }

    #[test]
    fn display_renders_arrays() {
        let v = PrimitiveValue::IntArray([1, 2, 3].as_ref().into());
        assert_eq!(v.to_string(), "[1, 2, 3]");
    }
}
