//! The wire-type dictionary: the registry mapping type identifiers to
//! codecs, and the rules for resolving a value to its best wire type.

use fudge_core::value::{PrimitiveValue, ValueType};
use snafu::{ensure, OptionExt, Snafu};
use std::borrow::Cow;

/// Identifiers of the standard wire types. Identifiers below 32 are
/// reserved for this set.
pub mod standard {
    /// Zero-byte payload representing "present but null".
    pub const INDICATOR: u8 = 0;
    /// One-byte boolean.
    pub const BOOLEAN: u8 = 1;
    /// Signed 8-bit integer.
    pub const BYTE: u8 = 2;
    /// Signed 16-bit integer.
    pub const SHORT: u8 = 3;
    /// Signed 32-bit integer.
    pub const INT: u8 = 4;
    /// Signed 64-bit integer.
    pub const LONG: u8 = 5;
    /// IEEE-754 single precision.
    pub const FLOAT: u8 = 6;
    /// IEEE-754 double precision.
    pub const DOUBLE: u8 = 7;
    /// Fixed four-byte array.
    pub const BYTE_ARRAY_4: u8 = 8;
    /// Fixed eight-byte array.
    pub const BYTE_ARRAY_8: u8 = 9;
    /// Fixed sixteen-byte array.
    pub const BYTE_ARRAY_16: u8 = 10;
    /// Fixed twenty-byte array.
    pub const BYTE_ARRAY_20: u8 = 11;
    /// Fixed 32-byte array.
    pub const BYTE_ARRAY_32: u8 = 12;
    /// Fixed 64-byte array.
    pub const BYTE_ARRAY_64: u8 = 13;
    /// Fixed 128-byte array.
    pub const BYTE_ARRAY_128: u8 = 14;
    /// Variable-length byte array.
    pub const BYTE_ARRAY: u8 = 15;
    /// Length-prefixed UTF-8 string.
    pub const STRING: u8 = 16;
    /// Array of signed 16-bit integers.
    pub const SHORT_ARRAY: u8 = 17;
    /// Array of signed 32-bit integers.
    pub const INT_ARRAY: u8 = 18;
    /// Array of signed 64-bit integers.
    pub const LONG_ARRAY: u8 = 19;
    /// Array of IEEE-754 single precision numbers.
    pub const FLOAT_ARRAY: u8 = 20;
    /// Nested message.
    pub const SUB_MESSAGE: u8 = 21;
    /// Array of IEEE-754 double precision numbers.
    pub const DOUBLE_ARRAY: u8 = 22;
    /// Nested message carrying a message type identifier.
    pub const SUB_MESSAGE_WITH_ID: u8 = 23;
    /// Packed date.
    pub const DATE: u8 = 24;
    /// Packed time of day.
    pub const TIME: u8 = 25;
    /// Packed date and time.
    pub const DATETIME: u8 = 26;
    /// Fixed 256-byte array.
    pub const BYTE_ARRAY_256: u8 = 27;
    /// Fixed 512-byte array.
    pub const BYTE_ARRAY_512: u8 = 28;

    /// First identifier available to custom types.
    pub const FIRST_CUSTOM: u8 = 32;
}

/// The lengths served by the fixed byte-array types, each paired with its
/// type identifier, in ascending order of length.
const FIXED_BYTE_ARRAYS: [(usize, u8); 9] = [
    (4, standard::BYTE_ARRAY_4),
    (8, standard::BYTE_ARRAY_8),
    (16, standard::BYTE_ARRAY_16),
    (20, standard::BYTE_ARRAY_20),
    (32, standard::BYTE_ARRAY_32),
    (64, standard::BYTE_ARRAY_64),
    (128, standard::BYTE_ARRAY_128),
    (256, standard::BYTE_ARRAY_256),
    (512, standard::BYTE_ARRAY_512),
];

/// The payload shape of a wire type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireTypeKind {
    /// Zero-byte payload.
    Indicator,
    /// One byte, zero or nonzero.
    Boolean,
    /// Signed 8-bit integer.
    Byte,
    /// Signed 16-bit integer, big-endian.
    Short,
    /// Signed 32-bit integer, big-endian.
    Int,
    /// Signed 64-bit integer, big-endian.
    Long,
    /// IEEE-754 single precision, big-endian.
    Float,
    /// IEEE-754 double precision, big-endian.
    Double,
    /// Byte array of exactly this length, no length field on the wire.
    FixedByteArray(usize),
    /// Length-prefixed byte array.
    ByteArray,
    /// Length-prefixed UTF-8 string.
    String,
    /// Packed array of 16-bit integers.
    ShortArray,
    /// Packed array of 32-bit integers.
    IntArray,
    /// Packed array of 64-bit integers.
    LongArray,
    /// Packed array of single precision numbers.
    FloatArray,
    /// Packed array of double precision numbers.
    DoubleArray,
    /// Recursively framed nested message.
    SubMessage,
    /// Packed date.
    Date,
    /// Packed time of day.
    Time,
    /// Packed date and time.
    DateTime,
    /// A payload this dictionary cannot interpret, kept as raw bytes.
    Opaque,
}

impl WireTypeKind {
    /// The implicit payload width of the type, or `None` when the payload
    /// length travels on the wire.
    pub fn fixed_width(&self) -> Option<u32> {
        match self {
            WireTypeKind::Indicator => Some(0),
            WireTypeKind::Boolean | WireTypeKind::Byte => Some(1),
            WireTypeKind::Short => Some(2),
            WireTypeKind::Int | WireTypeKind::Float => Some(4),
            WireTypeKind::Long | WireTypeKind::Double => Some(8),
            WireTypeKind::FixedByteArray(n) => Some(*n as u32),
            WireTypeKind::Date => Some(4),
            WireTypeKind::Time => Some(8),
            WireTypeKind::DateTime => Some(12),
            _ => None,
        }
    }

    /// Whether this type frames a nested message.
    pub fn is_message(&self) -> bool {
        matches!(self, WireTypeKind::SubMessage)
    }
}

/// A registered wire type: an identifier paired with its payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WireType {
    /// The wire type identifier.
    pub id: u8,
    /// The payload shape.
    pub kind: WireTypeKind,
}

impl WireType {
    /// The implicit payload width, or `None` for variable-width types.
    #[inline]
    pub fn fixed_width(&self) -> Option<u32> {
        self.kind.fixed_width()
    }
}

/// An error raised by dictionary registration or value resolution.
#[derive(Debug, Snafu, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// Registration attempted to claim a reserved identifier.
    #[snafu(display("wire type identifier {id} is reserved for standard types"))]
    ReservedId {
        /// The offending identifier.
        id: u8,
    },
    /// A field's declared wire type cannot carry its value.
    #[snafu(display("value of kind {value:?} cannot be written as wire type {type_id}"))]
    TypeMismatch {
        /// The declared wire type identifier.
        type_id: u8,
        /// The kind of value actually held.
        value: ValueType,
    },
}

type Result<T> = std::result::Result<T, Error>;

/// The registry of wire types, indexed by identifier.
///
/// A dictionary is seeded with the standard types and may be extended with
/// custom types before being published. After publication it is only read,
/// so sharing it between threads is safe.
#[derive(Debug, Clone)]
pub struct TypeDictionary {
    table: Vec<Option<WireType>>,
}

impl Default for TypeDictionary {
    fn default() -> Self {
        Self::standard()
    }
}

/// A process-wide shared instance of the standard dictionary, for the
/// common case of readers and writers without custom types.
pub fn standard_shared() -> std::sync::Arc<TypeDictionary> {
    static STANDARD: std::sync::OnceLock<std::sync::Arc<TypeDictionary>> =
        std::sync::OnceLock::new();
    std::sync::Arc::clone(STANDARD.get_or_init(|| std::sync::Arc::new(TypeDictionary::standard())))
}

impl TypeDictionary {
    /// Create a dictionary holding exactly the standard wire types.
    pub fn standard() -> Self {
        let mut table = vec![None; 256];
        let mut put = |id: u8, kind: WireTypeKind| {
            table[usize::from(id)] = Some(WireType { id, kind });
        };
        put(standard::INDICATOR, WireTypeKind::Indicator);
        put(standard::BOOLEAN, WireTypeKind::Boolean);
        put(standard::BYTE, WireTypeKind::Byte);
        put(standard::SHORT, WireTypeKind::Short);
        put(standard::INT, WireTypeKind::Int);
        put(standard::LONG, WireTypeKind::Long);
        put(standard::FLOAT, WireTypeKind::Float);
        put(standard::DOUBLE, WireTypeKind::Double);
        for (len, id) in FIXED_BYTE_ARRAYS {
            put(id, WireTypeKind::FixedByteArray(len));
        }
        put(standard::BYTE_ARRAY, WireTypeKind::ByteArray);
        put(standard::STRING, WireTypeKind::String);
        put(standard::SHORT_ARRAY, WireTypeKind::ShortArray);
        put(standard::INT_ARRAY, WireTypeKind::IntArray);
        put(standard::LONG_ARRAY, WireTypeKind::LongArray);
        put(standard::FLOAT_ARRAY, WireTypeKind::FloatArray);
        put(standard::DOUBLE_ARRAY, WireTypeKind::DoubleArray);
        put(standard::SUB_MESSAGE, WireTypeKind::SubMessage);
        put(standard::SUB_MESSAGE_WITH_ID, WireTypeKind::SubMessage);
        put(standard::DATE, WireTypeKind::Date);
        put(standard::TIME, WireTypeKind::Time);
        put(standard::DATETIME, WireTypeKind::DateTime);
        TypeDictionary { table }
    }

    /// Register a custom wire type. Identifiers below
    /// [`standard::FIRST_CUSTOM`] are refused.
    pub fn register(&mut self, wire_type: WireType) -> Result<()> {
        ensure!(
            wire_type.id >= standard::FIRST_CUSTOM,
            ReservedIdSnafu { id: wire_type.id }
        );
        self.table[usize::from(wire_type.id)] = Some(wire_type);
        Ok(())
    }

    /// Look up a wire type by identifier.
    pub fn by_id(&self, id: u8) -> Option<WireType> {
        self.table[usize::from(id)]
    }

    /// Resolve a primitive value to the standard wire type that carries it.
    pub fn by_value(&self, value: &PrimitiveValue) -> WireType {
        match value.value_type() {
            ValueType::Indicator => wire(standard::INDICATOR, WireTypeKind::Indicator),
            ValueType::Boolean => wire(standard::BOOLEAN, WireTypeKind::Boolean),
            ValueType::Byte => wire(standard::BYTE, WireTypeKind::Byte),
            ValueType::Short => wire(standard::SHORT, WireTypeKind::Short),
            ValueType::Int => wire(standard::INT, WireTypeKind::Int),
            ValueType::Long => wire(standard::LONG, WireTypeKind::Long),
            ValueType::Float => wire(standard::FLOAT, WireTypeKind::Float),
            ValueType::Double => wire(standard::DOUBLE, WireTypeKind::Double),
            ValueType::ByteArray => wire(standard::BYTE_ARRAY, WireTypeKind::ByteArray),
            ValueType::Str => wire(standard::STRING, WireTypeKind::String),
            ValueType::ShortArray => wire(standard::SHORT_ARRAY, WireTypeKind::ShortArray),
            ValueType::IntArray => wire(standard::INT_ARRAY, WireTypeKind::IntArray),
            ValueType::LongArray => wire(standard::LONG_ARRAY, WireTypeKind::LongArray),
            ValueType::FloatArray => wire(standard::FLOAT_ARRAY, WireTypeKind::FloatArray),
            ValueType::DoubleArray => wire(standard::DOUBLE_ARRAY, WireTypeKind::DoubleArray),
            ValueType::Date => wire(standard::DATE, WireTypeKind::Date),
            ValueType::Time => wire(standard::TIME, WireTypeKind::Time),
            ValueType::DateTime => wire(standard::DATETIME, WireTypeKind::DateTime),
        }
    }

    /// The narrowest standard integer type whose range contains `v`.
    pub fn narrowest_integer(&self, v: i64) -> WireType {
        if i64::from(v as i8) == v {
            wire(standard::BYTE, WireTypeKind::Byte)
        } else if i64::from(v as i16) == v {
            wire(standard::SHORT, WireTypeKind::Short)
        } else if i64::from(v as i32) == v {
            wire(standard::INT, WireTypeKind::Int)
        } else {
            wire(standard::LONG, WireTypeKind::Long)
        }
    }

    /// The fixed-length byte-array type matching `len` exactly, or the
    /// variable byte-array type when no fixed variant matches.
    pub fn best_match_byte_array(&self, len: usize) -> WireType {
        FIXED_BYTE_ARRAYS
            .iter()
            .find(|(n, _)| *n == len)
            .map(|(n, id)| wire(*id, WireTypeKind::FixedByteArray(*n)))
            .unwrap_or(wire(standard::BYTE_ARRAY, WireTypeKind::ByteArray))
    }

    /// Rewrite a field's declared type and value into the form that goes on
    /// the wire: integers shrink to the narrowest standard integer type and
    /// byte arrays take their fixed-length variant when one exists. Values
    /// of other types pass through unchanged under their declared type.
    ///
    /// Fails with [`Error::TypeMismatch`] when the declared type cannot
    /// carry the value at all.
    pub fn minimize<'v>(
        &self,
        type_id: u8,
        value: &'v PrimitiveValue,
    ) -> Result<(WireType, Cow<'v, PrimitiveValue>)> {
        let declared = self.by_id(type_id);
        if let Some(kind) = declared.map(|t| t.kind) {
            let is_integer_kind = matches!(
                kind,
                WireTypeKind::Byte | WireTypeKind::Short | WireTypeKind::Int | WireTypeKind::Long
            );
            if let (true, Some(wide)) = (is_integer_kind, integer_of(value)) {
                let narrow = self.narrowest_integer(wide);
                let value = match narrow.kind {
                    WireTypeKind::Byte => PrimitiveValue::Byte(wide as i8),
                    WireTypeKind::Short => PrimitiveValue::Short(wide as i16),
                    WireTypeKind::Int => PrimitiveValue::Int(wide as i32),
                    _ => PrimitiveValue::Long(wide),
                };
                return Ok((narrow, Cow::Owned(value)));
            }
            if let PrimitiveValue::ByteArray(bytes) = value {
                if matches!(
                    kind,
                    WireTypeKind::ByteArray | WireTypeKind::FixedByteArray(_)
                ) {
                    return Ok((self.best_match_byte_array(bytes.len()), Cow::Borrowed(value)));
                }
            }
        } else if matches!(value, PrimitiveValue::ByteArray(_)) {
            // an unregistered type decoded as opaque bytes round-trips
            // under its original identifier
            return Ok((
                wire(type_id, WireTypeKind::Opaque),
                Cow::Borrowed(value),
            ));
        }
        let wire_type = declared.filter(|t| kind_accepts(t.kind, value)).context(
            TypeMismatchSnafu {
                type_id,
                value: value.value_type(),
            },
        )?;
        Ok((wire_type, Cow::Borrowed(value)))
    }
}

#[inline]
fn wire(id: u8, kind: WireTypeKind) -> WireType {
    WireType { id, kind }
}

/// The wide form of an integer value, if the value is an integer.
fn integer_of(value: &PrimitiveValue) -> Option<i64> {
    match *value {
        PrimitiveValue::Byte(v) => Some(i64::from(v)),
        PrimitiveValue::Short(v) => Some(i64::from(v)),
        PrimitiveValue::Int(v) => Some(i64::from(v)),
        PrimitiveValue::Long(v) => Some(v),
        _ => None,
    }
}

/// Whether a payload of the given kind can carry the given value.
fn kind_accepts(kind: WireTypeKind, value: &PrimitiveValue) -> bool {
    match kind {
        WireTypeKind::Indicator => value.is_indicator(),
        WireTypeKind::Boolean => matches!(value, PrimitiveValue::Boolean(_)),
        WireTypeKind::Byte => matches!(value, PrimitiveValue::Byte(_)),
        WireTypeKind::Short => matches!(value, PrimitiveValue::Short(_)),
        WireTypeKind::Int => matches!(value, PrimitiveValue::Int(_)),
        WireTypeKind::Long => matches!(value, PrimitiveValue::Long(_)),
        WireTypeKind::Float => matches!(value, PrimitiveValue::Float(_)),
        WireTypeKind::Double => matches!(value, PrimitiveValue::Double(_)),
        WireTypeKind::FixedByteArray(n) => {
            matches!(value, PrimitiveValue::ByteArray(b) if b.len() == n)
        }
        WireTypeKind::ByteArray | WireTypeKind::Opaque => {
            matches!(value, PrimitiveValue::ByteArray(_))
        }
        WireTypeKind::String => matches!(value, PrimitiveValue::Str(_)),
        WireTypeKind::ShortArray => matches!(value, PrimitiveValue::ShortArray(_)),
        WireTypeKind::IntArray => matches!(value, PrimitiveValue::IntArray(_)),
        WireTypeKind::LongArray => matches!(value, PrimitiveValue::LongArray(_)),
        WireTypeKind::FloatArray => matches!(value, PrimitiveValue::FloatArray(_)),
        WireTypeKind::DoubleArray => matches!(value, PrimitiveValue::DoubleArray(_)),
        WireTypeKind::Date => matches!(value, PrimitiveValue::Date(_)),
        WireTypeKind::Time => matches!(value, PrimitiveValue::Time(_)),
        WireTypeKind::DateTime => matches!(value, PrimitiveValue::DateTime(_)),
        // nested messages are not primitive values
        WireTypeKind::SubMessage => false,
    }
}
